//! Repository traits describing the configuration backing store.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{PersonaRecord, PromptRow};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// An active prompt row joined with its owning active persona.
#[derive(Debug, Clone)]
pub struct PromptRowWithPersona {
    pub row: PromptRow,
    pub persona: PersonaRecord,
}

/// One consistent read of both configuration sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    pub prompt_rows: Vec<PromptRowWithPersona>,
    pub custom_prompt_personas: Vec<PersonaRecord>,
}

/// Read access to the persona configuration sources.
///
/// Reads are treated as black-box and retryable; the cache layer turns any
/// failure into a stale-serve, never into a caller-facing error.
#[async_trait]
pub trait ConfigSourceRepo: Send + Sync {
    /// All active prompt rows whose persona is also active.
    async fn list_active_prompt_rows(&self) -> Result<Vec<PromptRowWithPersona>, RepoError>;

    /// All active personas that opted into a custom prompt.
    async fn list_custom_prompt_personas(&self) -> Result<Vec<PersonaRecord>, RepoError>;

    /// Both reads as of a single consistent point in time.
    ///
    /// The default runs the two reads back to back; stores that support
    /// snapshot isolation override this with one transaction.
    async fn load_config_source(&self) -> Result<ConfigSource, RepoError> {
        Ok(ConfigSource {
            prompt_rows: self.list_active_prompt_rows().await?,
            custom_prompt_personas: self.list_custom_prompt_personas().await?,
        })
    }
}
