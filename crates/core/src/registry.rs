use regex::Regex;

use crate::error::CoreError;
use crate::field_value::Content;

pub const GENERAL_MESSAGE: &str = "ics213";
pub const ACTIVITY_LOG: &str = "ics214";
pub const RADIO_PLAN: &str = "ics205";

/// Shape-based evidence that a payload belongs to a form type.
#[derive(Debug, Clone)]
pub enum StructuralRule {
    /// The field is present and list-valued.
    ListField(String),
    /// Every listed field is present.
    AllPresent(Vec<String>),
}

impl StructuralRule {
    pub fn matches(&self, content: &Content) -> bool {
        match self {
            Self::ListField(key) => content.get(key).and_then(|v| v.as_list()).is_some(),
            Self::AllPresent(keys) => keys.iter().all(|k| content.contains_key(k)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormDefinition {
    pub id: String,
    pub title: String,
    pub aliases: Vec<String>,
    pub required_fields: Vec<String>,
    pub optional_fields: Vec<String>,
    pub structural_rules: Vec<StructuralRule>,
    identifier_pattern: Option<Regex>,
    title_pattern: Option<Regex>,
    indicators: Vec<Regex>,
}

impl FormDefinition {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            aliases: Vec::new(),
            required_fields: Vec::new(),
            optional_fields: Vec::new(),
            structural_rules: Vec::new(),
            identifier_pattern: None,
            title_pattern: None,
            indicators: Vec::new(),
        }
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases.extend(aliases.iter().map(|s| s.to_string()));
        self
    }

    pub fn required(mut self, fields: &[&str]) -> Self {
        self.required_fields.extend(fields.iter().map(|s| s.to_string()));
        self
    }

    pub fn optional(mut self, fields: &[&str]) -> Self {
        self.optional_fields.extend(fields.iter().map(|s| s.to_string()));
        self
    }

    pub fn structural(mut self, rule: StructuralRule) -> Self {
        self.structural_rules.push(rule);
        self
    }

    pub fn identifier_pattern(mut self, pattern: &str) -> Result<Self, CoreError> {
        self.identifier_pattern = Some(self.compile(pattern)?);
        Ok(self)
    }

    pub fn title_pattern(mut self, pattern: &str) -> Result<Self, CoreError> {
        self.title_pattern = Some(self.compile(pattern)?);
        Ok(self)
    }

    pub fn indicator(mut self, pattern: &str) -> Result<Self, CoreError> {
        let re = self.compile(pattern)?;
        self.indicators.push(re);
        Ok(self)
    }

    fn compile(&self, pattern: &str) -> Result<Regex, CoreError> {
        Regex::new(pattern).map_err(|source| CoreError::InvalidPattern {
            form_type: self.id.clone(),
            source,
        })
    }

    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.identifier_pattern
            .as_ref()
            .is_some_and(|re| re.is_match(identifier))
    }

    pub fn matches_title(&self, text: &str) -> bool {
        self.title_pattern.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// Number of indicator phrases found in `text`.
    pub fn indicator_hits(&self, text: &str) -> usize {
        self.indicators.iter().filter(|re| re.is_match(text)).count()
    }

    fn answers_to(&self, folded: &str) -> bool {
        fold_name(&self.id) == folded || self.aliases.iter().any(|a| fold_name(a) == folded)
    }
}

/// Lowercase and drop everything but letters and digits, so `ICS-213`,
/// `ics 213` and `ics213` compare equal.
fn fold_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// The set of form types known to one application instance.
///
/// Built once at startup and shared by reference; tests build their own.
#[derive(Debug, Clone, Default)]
pub struct FormRegistry {
    definitions: Vec<FormDefinition>,
}

impl FormRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in ICS forms, most common first.
    pub fn builtin() -> Result<Self, CoreError> {
        let mut registry = Self::new();

        registry.register(
            FormDefinition::new(GENERAL_MESSAGE, "General Message")
                .aliases(&["213", "general message", "general_message", "message", "ics 213"])
                .required(&["to", "from", "subject", "message"])
                .optional(&[
                    "date",
                    "time",
                    "incident_name",
                    "approved_by",
                    "position",
                    "reply",
                    "replied_by",
                    "reply_date",
                ])
                .structural(StructuralRule::AllPresent(vec![
                    "message".to_string(),
                    "subject".to_string(),
                ]))
                .identifier_pattern(r"(?i)(?:^|[^0-9a-f])213(?:[^0-9a-f]|$)|message")?
                .title_pattern(r"(?i)general\s+message")?
                .indicator(r"(?i)\bics[\s_-]*213\b")?
                .indicator(r"(?i)\bmessage\s+form\b")?,
        );

        registry.register(
            FormDefinition::new(ACTIVITY_LOG, "Activity Log")
                .aliases(&["214", "activity log", "activity_log", "unit log", "ics 214"])
                .required(&["incident_name", "operational_period", "activity_log"])
                .optional(&[
                    "unit_name",
                    "unit_leader",
                    "personnel_list",
                    "prepared_by",
                    "home_agency",
                ])
                .structural(StructuralRule::ListField("activity_log".to_string()))
                .structural(StructuralRule::ListField("personnel_list".to_string()))
                .identifier_pattern(r"(?i)(?:^|[^0-9a-f])214(?:[^0-9a-f]|$)|activity|unit_?log")?
                .title_pattern(r"(?i)(?:activity|unit)\s+log")?
                .indicator(r"(?i)\bics[\s_-]*214\b")?
                .indicator(r"(?i)\bnotable\s+activities\b")?
                .indicator(r"(?i)\bresources\s+assigned\b")?,
        );

        registry.register(
            FormDefinition::new(RADIO_PLAN, "Radio Communications Plan")
                .aliases(&["205", "radio plan", "radio_plan", "comms plan", "ics 205"])
                .required(&["incident_name", "operational_period", "channels"])
                .optional(&["prepared_by", "date_prepared", "special_instructions"])
                .structural(StructuralRule::ListField("channels".to_string()))
                .identifier_pattern(r"(?i)(?:^|[^0-9a-f])205(?:[^0-9a-f]|$)|radio")?
                .title_pattern(r"(?i)radio\s+communications?\s+plan")?
                .indicator(r"(?i)\bics[\s_-]*205\b")?
                .indicator(r"(?i)\brepeater\b")?
                .indicator(r"(?i)\bfrequenc(?:y|ies)\b")?,
        );

        Ok(registry)
    }

    /// Add a definition. A definition with the same id replaces the old one.
    pub fn register(&mut self, definition: FormDefinition) {
        match self.definitions.iter_mut().find(|d| d.id == definition.id) {
            Some(existing) => *existing = definition,
            None => self.definitions.push(definition),
        }
    }

    /// Find a definition by id or alias, ignoring case and punctuation.
    pub fn lookup(&self, name: &str) -> Option<&FormDefinition> {
        let folded = fold_name(name);
        if folded.is_empty() {
            return None;
        }
        self.definitions.iter().find(|d| d.answers_to(&folded))
    }

    pub fn get(&self, id: &str) -> Option<&FormDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn definitions(&self) -> &[FormDefinition] {
        &self.definitions
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
