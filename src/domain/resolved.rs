//! Resolved persona configuration and the precedence rule that produces it.

use serde::Serialize;

use super::entities::{PersonaRecord, PromptRow};

/// Model used when a persona has no prompt row or the row carries no model.
pub const DEFAULT_MODEL: &str = "mistralai/mistral-medium-3";

/// Effective prompt text for a persona.
///
/// `Unconfigured` is an explicit marker: a persona without a usable prompt
/// source never resolves to an implicit empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum PromptText {
    Configured(String),
    Unconfigured,
}

impl PromptText {
    pub fn as_configured(&self) -> Option<&str> {
        match self {
            Self::Configured(text) => Some(text),
            Self::Unconfigured => None,
        }
    }
}

/// Generation parameters shared by all personas.
///
/// This is deliberately one global record rather than a per-persona column:
/// the settings map carries a copy per key so a future per-persona override
/// only changes how the record is produced, not the map shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InferenceParameters {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for InferenceParameters {
    fn default() -> Self {
        Self {
            temperature: 1.4,
            max_tokens: 800,
            top_p: 1.0,
            frequency_penalty: 0.7,
            presence_penalty: 0.7,
        }
    }
}

/// Effective inference routing for a persona.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceSettings {
    pub model: String,
    pub settings: InferenceParameters,
}

/// Complete resolved configuration for one persona lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub prompt: PromptText,
    pub model: String,
    pub parameters: InferenceParameters,
}

impl ResolvedConfig {
    /// Configuration returned for keys absent from the current build.
    pub fn unconfigured() -> Self {
        Self {
            prompt: PromptText::Unconfigured,
            model: DEFAULT_MODEL.to_string(),
            parameters: InferenceParameters::default(),
        }
    }
}

/// Returns the custom prompt when the persona opts into it and the text is
/// non-blank after trimming.
pub fn usable_custom_prompt(persona: &PersonaRecord) -> Option<&str> {
    if !persona.use_custom_prompt {
        return None;
    }
    persona
        .custom_prompt
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Applies the prompt precedence rule for one persona.
///
/// A flag-gated custom prompt wins over the prompt row; otherwise the active
/// row's text applies; otherwise the persona is unconfigured.
pub fn effective_prompt(persona: &PersonaRecord, row: Option<&PromptRow>) -> PromptText {
    if let Some(custom) = usable_custom_prompt(persona) {
        return PromptText::Configured(custom.to_string());
    }
    match row {
        Some(row) => PromptText::Configured(row.prompt_text.clone()),
        None => PromptText::Unconfigured,
    }
}

/// Applies the settings precedence rule for one persona.
pub fn effective_settings(row: Option<&PromptRow>) -> InferenceSettings {
    let model = row
        .and_then(|row| row.model_identifier.as_deref())
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .unwrap_or(DEFAULT_MODEL)
        .to_string();

    InferenceSettings {
        model,
        settings: InferenceParameters::default(),
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;

    fn persona(custom: Option<&str>, use_custom: bool) -> PersonaRecord {
        PersonaRecord {
            id: Uuid::new_v4(),
            display_name: "Mia".to_string(),
            alias_id: None,
            active: true,
            custom_prompt: custom.map(str::to_string),
            use_custom_prompt: use_custom,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn row(text: &str, model: Option<&str>) -> PromptRow {
        PromptRow {
            id: Uuid::new_v4(),
            persona_id: Uuid::new_v4(),
            prompt_text: text.to_string(),
            model_identifier: model.map(str::to_string),
            active: true,
            version: 1,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn custom_prompt_wins_when_flag_set() {
        let persona = persona(Some("Be playful."), true);
        let row = row("Be formal.", None);
        assert_eq!(
            effective_prompt(&persona, Some(&row)),
            PromptText::Configured("Be playful.".to_string())
        );
    }

    #[test]
    fn custom_prompt_ignored_without_flag() {
        let persona = persona(Some("Be playful."), false);
        let row = row("Be formal.", None);
        assert_eq!(
            effective_prompt(&persona, Some(&row)),
            PromptText::Configured("Be formal.".to_string())
        );
    }

    #[test]
    fn blank_custom_prompt_falls_back_to_row() {
        let persona = persona(Some("   "), true);
        let row = row("Be formal.", None);
        assert_eq!(
            effective_prompt(&persona, Some(&row)),
            PromptText::Configured("Be formal.".to_string())
        );
    }

    #[test]
    fn no_source_is_unconfigured_not_empty() {
        let persona = persona(None, false);
        let prompt = effective_prompt(&persona, None);
        assert_eq!(prompt, PromptText::Unconfigured);
        assert!(prompt.as_configured().is_none());
    }

    #[test]
    fn settings_default_model_when_row_has_none() {
        assert_eq!(effective_settings(None).model, DEFAULT_MODEL);
        assert_eq!(effective_settings(Some(&row("x", None))).model, DEFAULT_MODEL);
        assert_eq!(effective_settings(Some(&row("x", Some("  ")))).model, DEFAULT_MODEL);
    }

    #[test]
    fn settings_use_row_model_when_present() {
        let row = row("x", Some("openai/gpt-4o-mini"));
        assert_eq!(effective_settings(Some(&row)).model, "openai/gpt-4o-mini");
    }
}
