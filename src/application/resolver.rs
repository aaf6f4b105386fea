//! Builds the keyed configuration maps for one cache generation.
//!
//! One generic engine produces both the prompt map and the settings map from
//! the same key assignment, so every key variant of a persona resolves to the
//! same configuration and both maps always cover the same key set.

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::application::repos::{ConfigSource, PromptRowWithPersona};
use crate::domain::entities::{PersonaRecord, PromptRow};
use crate::domain::resolved::{
    InferenceSettings, PromptText, ResolvedConfig, effective_prompt, effective_settings,
    usable_custom_prompt,
};

/// One immutable build of the resolved configuration.
///
/// The maps only contain configured personas; [`ConfigSnapshot::resolve`]
/// returns the explicit unconfigured marker for any other key.
#[derive(Debug, Default)]
pub struct ConfigSnapshot {
    pub prompts: HashMap<String, String>,
    pub settings: HashMap<String, InferenceSettings>,
    /// Malformed personas/rows skipped during this build.
    pub skipped_rows: usize,
}

impl ConfigSnapshot {
    pub fn resolve(&self, key: &str) -> ResolvedConfig {
        match (self.prompts.get(key), self.settings.get(key)) {
            (Some(prompt), Some(settings)) => ResolvedConfig {
                prompt: PromptText::Configured(prompt.clone()),
                model: settings.model.clone(),
                parameters: settings.settings,
            },
            _ => ResolvedConfig::unconfigured(),
        }
    }
}

/// A persona together with its selected active prompt row, if any.
struct PersonaSource {
    persona: PersonaRecord,
    row: Option<PromptRow>,
}

/// Derives the equivalent lookup keys for one persona.
///
/// Produces 2-4 distinct keys: id, exact display name, lowercased display
/// name, and the alias id when present. Pure; duplicates are collapsed.
pub fn fanout_keys(persona: &PersonaRecord) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(4);
    let mut push = |key: String| {
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    };

    push(persona.id.to_string());
    let name = persona.display_name.trim();
    push(name.to_string());
    push(name.to_lowercase());
    if let Some(alias) = persona.alias_id.as_deref() {
        push(alias.trim().to_string());
    }

    keys
}

/// Builds a fresh snapshot from one consistent source read.
pub fn build_snapshot(source: ConfigSource) -> ConfigSnapshot {
    let mut skipped = 0usize;
    let sources = collect_sources(source, &mut skipped);
    let assignments = assign_keys(&sources);

    let prompts = build_keyed_map(&sources, &assignments, |src| match effective_prompt(
        &src.persona,
        src.row.as_ref(),
    ) {
        PromptText::Configured(text) => text,
        // Unreachable by construction: sources without a usable prompt
        // never make it into the list.
        PromptText::Unconfigured => String::new(),
    });
    let settings = build_keyed_map(&sources, &assignments, |src| {
        effective_settings(src.row.as_ref())
    });

    ConfigSnapshot {
        prompts,
        settings,
        skipped_rows: skipped,
    }
}

/// Merges the two source reads into one persona list, applying the prompt-row
/// invariant and dropping malformed records.
fn collect_sources(source: ConfigSource, skipped: &mut usize) -> Vec<PersonaSource> {
    let mut rows_by_persona: HashMap<Uuid, Vec<PromptRow>> = HashMap::new();
    let mut personas: HashMap<Uuid, PersonaRecord> = HashMap::new();

    for PromptRowWithPersona { row, persona } in source.prompt_rows {
        if persona.display_name.trim().is_empty() {
            warn!(persona_id = %persona.id, "Skipping persona with blank display name");
            *skipped += 1;
            continue;
        }
        if row.prompt_text.trim().is_empty() {
            warn!(row_id = %row.id, persona_id = %persona.id, "Skipping prompt row with blank text");
            *skipped += 1;
            continue;
        }
        personas.entry(persona.id).or_insert(persona);
        rows_by_persona.entry(row.persona_id).or_default().push(row);
    }

    for persona in source.custom_prompt_personas {
        if persona.display_name.trim().is_empty() {
            warn!(persona_id = %persona.id, "Skipping persona with blank display name");
            *skipped += 1;
            continue;
        }
        personas.entry(persona.id).or_insert(persona);
    }

    let mut sources: Vec<PersonaSource> = personas
        .into_values()
        .filter_map(|persona| {
            let row = rows_by_persona
                .remove(&persona.id)
                .and_then(|rows| select_active_row(persona.id, rows));
            // Personas with neither a usable custom prompt nor a row are
            // omitted; lookups for their keys resolve to the unconfigured
            // marker.
            if row.is_none() && usable_custom_prompt(&persona).is_none() {
                return None;
            }
            Some(PersonaSource { persona, row })
        })
        .collect();

    // Id ordering makes key-conflict resolution independent of read order.
    sources.sort_by_key(|src| src.persona.id);
    sources
}

/// Picks the single active row for a persona, flagging invariant violations.
fn select_active_row(persona_id: Uuid, mut rows: Vec<PromptRow>) -> Option<PromptRow> {
    if rows.len() > 1 {
        warn!(
            persona_id = %persona_id,
            active_rows = rows.len(),
            "Persona has multiple active prompt rows; using the most recently created"
        );
    }
    rows.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    rows.into_iter().next()
}

/// Assigns each fanout key to exactly one persona index.
///
/// When two personas normalize to the same key, the persona with the smaller
/// id (earlier in the sorted list) wins and the conflict is logged.
fn assign_keys(sources: &[PersonaSource]) -> Vec<(String, usize)> {
    let mut owner: HashMap<String, usize> = HashMap::new();
    let mut assignments: Vec<(String, usize)> = Vec::new();

    for (index, src) in sources.iter().enumerate() {
        for key in fanout_keys(&src.persona) {
            match owner.get(&key) {
                Some(existing) => {
                    warn!(
                        key = %key,
                        winner = %sources[*existing].persona.id,
                        loser = %src.persona.id,
                        "Conflicting fanout key between personas; keeping lower persona id"
                    );
                }
                None => {
                    owner.insert(key.clone(), index);
                    assignments.push((key, index));
                }
            }
        }
    }

    assignments
}

/// Projects each assigned key to a value; the one engine behind both maps.
fn build_keyed_map<T>(
    sources: &[PersonaSource],
    assignments: &[(String, usize)],
    project: impl Fn(&PersonaSource) -> T,
) -> HashMap<String, T> {
    assignments
        .iter()
        .map(|(key, index)| (key.clone(), project(&sources[*index])))
        .collect()
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};

    use crate::application::repos::ConfigSource;
    use crate::domain::resolved::DEFAULT_MODEL;

    use super::*;

    fn persona(id: u128, name: &str, alias: Option<&str>) -> PersonaRecord {
        PersonaRecord {
            id: Uuid::from_u128(id),
            display_name: name.to_string(),
            alias_id: alias.map(str::to_string),
            active: true,
            custom_prompt: None,
            use_custom_prompt: false,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn with_custom(mut persona: PersonaRecord, prompt: &str) -> PersonaRecord {
        persona.custom_prompt = Some(prompt.to_string());
        persona.use_custom_prompt = true;
        persona
    }

    fn row_for(persona: &PersonaRecord, id: u128, text: &str, model: Option<&str>) -> PromptRow {
        PromptRow {
            id: Uuid::from_u128(id),
            persona_id: persona.id,
            prompt_text: text.to_string(),
            model_identifier: model.map(str::to_string),
            active: true,
            version: 1,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn fanout_produces_all_key_variants() {
        let persona = persona(1, "Mia", Some("mia_v1"));
        let keys = fanout_keys(&persona);
        assert_eq!(
            keys,
            vec![
                Uuid::from_u128(1).to_string(),
                "Mia".to_string(),
                "mia".to_string(),
                "mia_v1".to_string(),
            ]
        );
    }

    #[test]
    fn fanout_collapses_duplicate_variants() {
        // Lowercase name equals its own lowercasing; alias equals the name.
        let persona = persona(1, "mia", Some("mia"));
        assert_eq!(
            fanout_keys(&persona),
            vec![Uuid::from_u128(1).to_string(), "mia".to_string()]
        );
    }

    #[test]
    fn every_key_variant_resolves_identically() {
        let mia = with_custom(persona(1, "Mia", Some("mia_v1")), "Be playful.");
        let snapshot = build_snapshot(ConfigSource {
            prompt_rows: vec![],
            custom_prompt_personas: vec![mia.clone()],
        });

        let by_id = snapshot.resolve(&mia.id.to_string());
        for key in ["Mia", "mia", "mia_v1"] {
            assert_eq!(snapshot.resolve(key), by_id);
        }
        assert_eq!(
            by_id.prompt,
            PromptText::Configured("Be playful.".to_string())
        );
    }

    #[test]
    fn custom_prompt_overrides_prompt_row() {
        let mia = with_custom(persona(1, "Mia", None), "Be playful.");
        let row = row_for(&mia, 10, "Be formal.", Some("openai/gpt-4o"));
        let snapshot = build_snapshot(ConfigSource {
            prompt_rows: vec![PromptRowWithPersona {
                row,
                persona: mia.clone(),
            }],
            custom_prompt_personas: vec![mia],
        });

        let resolved = snapshot.resolve("mia");
        assert_eq!(resolved.prompt, PromptText::Configured("Be playful.".to_string()));
        // Settings still come from the row even when the prompt is custom.
        assert_eq!(resolved.model, "openai/gpt-4o");
    }

    #[test]
    fn custom_only_persona_gets_default_model() {
        let mia = with_custom(persona(1, "Mia", None), "Be playful.");
        let snapshot = build_snapshot(ConfigSource {
            prompt_rows: vec![],
            custom_prompt_personas: vec![mia],
        });
        assert_eq!(snapshot.resolve("mia").model, DEFAULT_MODEL);
    }

    #[test]
    fn unknown_key_is_unconfigured() {
        let snapshot = build_snapshot(ConfigSource::default());
        assert_eq!(snapshot.resolve("unknown"), ResolvedConfig::unconfigured());
    }

    #[test]
    fn most_recent_row_wins_on_invariant_violation() {
        let jon = persona(2, "Jon", None);
        let older = {
            let mut row = row_for(&jon, 20, "old", None);
            row.created_at -= Duration::hours(1);
            row
        };
        let newer = row_for(&jon, 21, "new", None);
        let snapshot = build_snapshot(ConfigSource {
            prompt_rows: vec![
                PromptRowWithPersona {
                    row: older,
                    persona: jon.clone(),
                },
                PromptRowWithPersona {
                    row: newer,
                    persona: jon,
                },
            ],
            custom_prompt_personas: vec![],
        });
        assert_eq!(
            snapshot.resolve("jon").prompt,
            PromptText::Configured("new".to_string())
        );
    }

    #[test]
    fn key_conflicts_resolve_by_persona_id_regardless_of_order() {
        let first = with_custom(persona(1, "Twin", None), "first");
        let second = with_custom(persona(2, "Twin", None), "second");

        for personas in [
            vec![first.clone(), second.clone()],
            vec![second.clone(), first.clone()],
        ] {
            let snapshot = build_snapshot(ConfigSource {
                prompt_rows: vec![],
                custom_prompt_personas: personas,
            });
            assert_eq!(
                snapshot.resolve("Twin").prompt,
                PromptText::Configured("first".to_string()),
                "lower persona id must win independent of read order"
            );
            // Non-conflicting id keys still resolve individually.
            assert_eq!(
                snapshot.resolve(&second.id.to_string()).prompt,
                PromptText::Configured("second".to_string())
            );
        }
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let mia = persona(1, "Mia", None);
        let blank_row = row_for(&mia, 10, "   ", None);
        let nameless = persona(3, "  ", None);
        let snapshot = build_snapshot(ConfigSource {
            prompt_rows: vec![PromptRowWithPersona {
                row: blank_row,
                persona: mia,
            }],
            custom_prompt_personas: vec![with_custom(nameless, "hi")],
        });

        assert_eq!(snapshot.skipped_rows, 2);
        assert!(snapshot.prompts.is_empty());
        assert!(snapshot.settings.is_empty());
    }

    #[test]
    fn prompt_and_settings_maps_cover_the_same_keys() {
        let mia = with_custom(persona(1, "Mia", Some("mia_v1")), "Be playful.");
        let jon = persona(2, "Jon", None);
        let row = row_for(&jon, 20, "Be formal.", None);
        let snapshot = build_snapshot(ConfigSource {
            prompt_rows: vec![PromptRowWithPersona {
                row,
                persona: jon,
            }],
            custom_prompt_personas: vec![mia],
        });

        let mut prompt_keys: Vec<_> = snapshot.prompts.keys().collect();
        let mut settings_keys: Vec<_> = snapshot.settings.keys().collect();
        prompt_keys.sort();
        settings_keys.sort();
        assert_eq!(prompt_keys, settings_keys);
    }
}
