pub mod document;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod payload;
pub mod registry;
pub mod resolver;
pub mod status;
pub mod synonyms;

pub use document::{Document, Property};
pub use error::CoreError;
pub use field_value::{Content, FieldValue};
pub use ids::*;
pub use payload::FormPayload;
pub use registry::{FormDefinition, FormRegistry};
pub use resolver::{Resolution, ResolutionInput, ResolutionTier, ResolverConfig, TypeResolver};
pub use status::DocumentStatus;
