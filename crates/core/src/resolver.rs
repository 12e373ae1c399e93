//! Form type recovery for documents whose declared type is missing.
//!
//! Tiers are consulted in a fixed order and the first confident answer wins:
//! explicit type field, identifier pattern, content signature score,
//! free-text indicators, structural shape, configured default, fallback.
//! Resolution never fails; the tier that produced the answer is reported
//! with it.

use std::sync::Arc;

use crate::field_value::{Content, FieldValue};
use crate::registry::{FormDefinition, FormRegistry, GENERAL_MESSAGE};
use crate::synonyms::normalize_keys;

/// Used when nothing matches and no default is configured: the general
/// message is by far the most common form in the field.
pub const FALLBACK_FORM_TYPE: &str = GENERAL_MESSAGE;

pub const DEFAULT_MIN_SCORE: u32 = 3;

const REQUIRED_FIELD_POINTS: u32 = 2;
const OPTIONAL_FIELD_POINTS: u32 = 1;
const TITLE_MATCH_POINTS: u32 = 3;

const TYPE_KEYS: [&str; 2] = ["type", "form_type"];

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub default_type: Option<String>,
    /// Accept the best content-signature candidate even below `min_score`.
    pub lenient: bool,
    pub min_score: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_type: None,
            lenient: false,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

impl ResolverConfig {
    pub fn with_default_type(mut self, form_type: &str) -> Self {
        self.default_type = Some(form_type.to_string());
        self
    }

    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    ExplicitField,
    IdentifierPattern,
    ContentSignature,
    TextIndicator,
    Structural,
    ConfiguredDefault,
    Fallback,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitField => "explicit_field",
            Self::IdentifierPattern => "identifier_pattern",
            Self::ContentSignature => "content_signature",
            Self::TextIndicator => "text_indicator",
            Self::Structural => "structural",
            Self::ConfiguredDefault => "configured_default",
            Self::Fallback => "fallback",
        }
    }
}

/// A scored candidate from the content-signature tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionSignal {
    pub form_type: String,
    pub score: u32,
    pub required_matched: usize,
    pub optional_matched: usize,
    pub title_matched: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub form_type: String,
    pub tier: ResolutionTier,
    /// Winning score when the content-signature tier decided.
    pub score: Option<u32>,
    pub signals: Vec<ResolutionSignal>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolutionInput<'a> {
    pub content: &'a Content,
    pub metadata: Option<&'a Content>,
    pub identifier: Option<&'a str>,
}

impl<'a> ResolutionInput<'a> {
    pub fn new(content: &'a Content) -> Self {
        Self {
            content,
            metadata: None,
            identifier: None,
        }
    }

    pub fn with_metadata(mut self, metadata: &'a Content) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_identifier(mut self, identifier: &'a str) -> Self {
        self.identifier = Some(identifier);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TypeResolver {
    registry: Arc<FormRegistry>,
    config: ResolverConfig,
}

impl TypeResolver {
    pub fn new(registry: Arc<FormRegistry>, config: ResolverConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &FormRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn resolve(&self, input: &ResolutionInput<'_>) -> Resolution {
        let content = normalize_keys(input.content);
        let metadata = input.metadata.map(normalize_keys);

        let resolution = self.resolve_normalized(&content, metadata.as_ref(), input.identifier);
        tracing::debug!(
            form_type = %resolution.form_type,
            tier = resolution.tier.as_str(),
            score = ?resolution.score,
            "resolved form type"
        );
        resolution
    }

    fn resolve_normalized(
        &self,
        content: &Content,
        metadata: Option<&Content>,
        identifier: Option<&str>,
    ) -> Resolution {
        if let Some(def) = self.explicit_type(content, metadata) {
            return decided(def, ResolutionTier::ExplicitField);
        }

        if let Some(def) = identifier.and_then(|id| self.identifier_match(id)) {
            return decided(def, ResolutionTier::IdentifierPattern);
        }

        let signals = self.score(content);
        if let Some(best) = self.best_signal(&signals) {
            return Resolution {
                form_type: best.form_type.clone(),
                tier: ResolutionTier::ContentSignature,
                score: Some(best.score),
                signals,
            };
        }

        let fallthrough = |form_type: &str, tier| Resolution {
            form_type: form_type.to_string(),
            tier,
            score: None,
            signals: signals.clone(),
        };

        if let Some(def) = self.indicator_match(content) {
            return fallthrough(&def.id, ResolutionTier::TextIndicator);
        }

        if let Some(def) = self.structural_match(content) {
            return fallthrough(&def.id, ResolutionTier::Structural);
        }

        if let Some(default_type) = self.config.default_type.as_deref() {
            match self.registry.lookup(default_type) {
                Some(def) => return fallthrough(&def.id, ResolutionTier::ConfiguredDefault),
                None => {
                    tracing::warn!(default_type, "configured default form type is not registered")
                }
            }
        }

        let fallback = if self.registry.get(FALLBACK_FORM_TYPE).is_some() || self.registry.is_empty()
        {
            FALLBACK_FORM_TYPE
        } else {
            self.registry.definitions()[0].id.as_str()
        };
        fallthrough(fallback, ResolutionTier::Fallback)
    }

    /// Tier 1: a `type`/`form_type` value naming exactly one registered form.
    fn explicit_type(&self, content: &Content, metadata: Option<&Content>) -> Option<&FormDefinition> {
        let mut found: Option<&FormDefinition> = None;
        for map in metadata.into_iter().chain(std::iter::once(content)) {
            for key in TYPE_KEYS {
                let Some(def) = map
                    .get(key)
                    .and_then(FieldValue::as_text)
                    .and_then(|name| self.registry.lookup(name))
                else {
                    continue;
                };
                match found {
                    Some(prev) if prev.id != def.id => return None,
                    _ => found = Some(def),
                }
            }
        }
        found
    }

    /// Tier 2: exactly one form's identifier pattern matches.
    fn identifier_match(&self, identifier: &str) -> Option<&FormDefinition> {
        let mut matches = self
            .registry
            .definitions()
            .iter()
            .filter(|d| d.matches_identifier(identifier));
        let first = matches.next()?;
        matches.next().is_none().then_some(first)
    }

    /// Tier 3 scoring, one signal per registered form in registry order.
    pub fn score(&self, content: &Content) -> Vec<ResolutionSignal> {
        let texts = collect_texts(content);
        self.registry
            .definitions()
            .iter()
            .map(|def| {
                let filled = |key: &String| content.get(key).is_some_and(|v| !v.is_empty());
                let required_matched = def.required_fields.iter().filter(|k| filled(k)).count();
                let optional_matched = def.optional_fields.iter().filter(|k| filled(k)).count();
                let title_matched = texts.iter().any(|t| def.matches_title(t));
                let score = required_matched as u32 * REQUIRED_FIELD_POINTS
                    + optional_matched as u32 * OPTIONAL_FIELD_POINTS
                    + if title_matched { TITLE_MATCH_POINTS } else { 0 };
                ResolutionSignal {
                    form_type: def.id.clone(),
                    score,
                    required_matched,
                    optional_matched,
                    title_matched,
                }
            })
            .collect()
    }

    /// Highest score, earliest registered form on ties.
    fn best_signal<'s>(&self, signals: &'s [ResolutionSignal]) -> Option<&'s ResolutionSignal> {
        let best = signals
            .iter()
            .reduce(|best, s| if s.score > best.score { s } else { best })?;
        let accepted = best.score >= self.config.min_score || (self.config.lenient && best.score > 0);
        accepted.then_some(best)
    }

    /// Tier 4: the form with strictly the most indicator hits.
    fn indicator_match(&self, content: &Content) -> Option<&FormDefinition> {
        let texts = collect_texts(content);
        let mut best: Option<(&FormDefinition, usize)> = None;
        let mut tied = false;
        for def in self.registry.definitions() {
            let hits: usize = texts.iter().map(|t| def.indicator_hits(t)).sum();
            if hits == 0 {
                continue;
            }
            match best {
                Some((_, top)) if hits < top => {}
                Some((_, top)) if hits == top => tied = true,
                _ => {
                    best = Some((def, hits));
                    tied = false;
                }
            }
        }
        if tied {
            return None;
        }
        best.map(|(def, _)| def)
    }

    /// Tier 5: first form, in registry order, with a matching shape rule.
    fn structural_match(&self, content: &Content) -> Option<&FormDefinition> {
        self.registry
            .definitions()
            .iter()
            .find(|def| def.structural_rules.iter().any(|rule| rule.matches(content)))
    }
}

fn decided(def: &FormDefinition, tier: ResolutionTier) -> Resolution {
    Resolution {
        form_type: def.id.clone(),
        tier,
        score: None,
        signals: Vec::new(),
    }
}

fn collect_texts(content: &Content) -> Vec<&str> {
    let mut texts = Vec::new();
    for value in content.values() {
        value.for_each_text(&mut |s| texts.push(s));
    }
    texts
}
