//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// A configurable AI conversational character.
///
/// Personas are created and mutated by the back-office CRUD surface; this
/// subsystem only reads them. `custom_prompt` and `use_custom_prompt`
/// together form the newer of the two prompt sources; the older source is
/// the versioned [`PromptRow`] table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaRecord {
    pub id: Uuid,
    pub display_name: String,
    /// External character identifier used by legacy chat clients.
    pub alias_id: Option<String>,
    pub active: bool,
    pub custom_prompt: Option<String>,
    pub use_custom_prompt: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A versioned system-prompt row attached to a persona.
///
/// At most one row per persona is expected to be active at a time; the
/// resolver flags violations instead of silently picking one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptRow {
    pub id: Uuid,
    pub persona_id: Uuid,
    pub prompt_text: String,
    /// Inference model routed for this persona, e.g. an OpenRouter slug.
    pub model_identifier: Option<String>,
    pub active: bool,
    pub version: i32,
    pub created_at: OffsetDateTime,
}
