use async_trait::async_trait;
use sqlx::{Executor, Postgres};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ConfigSource, ConfigSourceRepo, PromptRowWithPersona, RepoError},
    domain::entities::{PersonaRecord, PromptRow},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PersonaRow {
    id: Uuid,
    display_name: String,
    alias_id: Option<String>,
    active: bool,
    custom_prompt: Option<String>,
    use_custom_prompt: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PersonaRow> for PersonaRecord {
    fn from(row: PersonaRow) -> Self {
        Self {
            id: row.id,
            display_name: row.display_name,
            alias_id: row.alias_id,
            active: row.active,
            custom_prompt: row.custom_prompt,
            use_custom_prompt: row.use_custom_prompt,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PromptRowJoined {
    row_id: Uuid,
    persona_id: Uuid,
    prompt_text: String,
    model_identifier: Option<String>,
    row_active: bool,
    version: i32,
    row_created_at: OffsetDateTime,
    display_name: String,
    alias_id: Option<String>,
    custom_prompt: Option<String>,
    use_custom_prompt: bool,
    persona_active: bool,
    persona_created_at: OffsetDateTime,
    persona_updated_at: OffsetDateTime,
}

impl From<PromptRowJoined> for PromptRowWithPersona {
    fn from(row: PromptRowJoined) -> Self {
        Self {
            row: PromptRow {
                id: row.row_id,
                persona_id: row.persona_id,
                prompt_text: row.prompt_text,
                model_identifier: row.model_identifier,
                active: row.row_active,
                version: row.version,
                created_at: row.row_created_at,
            },
            persona: PersonaRecord {
                id: row.persona_id,
                display_name: row.display_name,
                alias_id: row.alias_id,
                active: row.persona_active,
                custom_prompt: row.custom_prompt,
                use_custom_prompt: row.use_custom_prompt,
                created_at: row.persona_created_at,
                updated_at: row.persona_updated_at,
            },
        }
    }
}

const ACTIVE_PROMPT_ROWS_SQL: &str = r#"
SELECT r.id AS row_id,
       r.persona_id,
       r.prompt_text,
       r.model_identifier,
       r.active AS row_active,
       r.version,
       r.created_at AS row_created_at,
       p.display_name,
       p.alias_id,
       p.custom_prompt,
       p.use_custom_prompt,
       p.active AS persona_active,
       p.created_at AS persona_created_at,
       p.updated_at AS persona_updated_at
FROM prompt_rows r
INNER JOIN personas p ON p.id = r.persona_id
WHERE r.active AND p.active
ORDER BY r.created_at
"#;

const CUSTOM_PROMPT_PERSONAS_SQL: &str = r#"
SELECT id,
       display_name,
       alias_id,
       active,
       custom_prompt,
       use_custom_prompt,
       created_at,
       updated_at
FROM personas
WHERE active AND use_custom_prompt
ORDER BY created_at
"#;

async fn fetch_active_prompt_rows<'c, E>(executor: E) -> Result<Vec<PromptRowWithPersona>, RepoError>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, PromptRowJoined>(ACTIVE_PROMPT_ROWS_SQL)
        .fetch_all(executor)
        .await
        .map_err(map_sqlx_error)?;
    Ok(rows.into_iter().map(Into::into).collect())
}

async fn fetch_custom_prompt_personas<'c, E>(executor: E) -> Result<Vec<PersonaRecord>, RepoError>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, PersonaRow>(CUSTOM_PROMPT_PERSONAS_SQL)
        .fetch_all(executor)
        .await
        .map_err(map_sqlx_error)?;
    Ok(rows.into_iter().map(Into::into).collect())
}

#[async_trait]
impl ConfigSourceRepo for PostgresRepositories {
    async fn list_active_prompt_rows(&self) -> Result<Vec<PromptRowWithPersona>, RepoError> {
        fetch_active_prompt_rows(self.pool()).await
    }

    async fn list_custom_prompt_personas(&self) -> Result<Vec<PersonaRecord>, RepoError> {
        fetch_custom_prompt_personas(self.pool()).await
    }

    /// Both reads inside one repeatable-read transaction, so a snapshot never
    /// mixes configuration from two different write points.
    async fn load_config_source(&self) -> Result<ConfigSource, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let prompt_rows = fetch_active_prompt_rows(&mut *tx).await?;
        let custom_prompt_personas = fetch_custom_prompt_personas(&mut *tx).await?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(ConfigSource {
            prompt_rows,
            custom_prompt_personas,
        })
    }
}
