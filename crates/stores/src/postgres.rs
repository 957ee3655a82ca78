//! PostgreSQL prompt settings.
//!
//! Reads the per-knowledge-base `system_prompt` row of the `settings` table.
//! The row's `value` column holds JSON:
//!
//! ```json
//! { "content": "...", "summary_content": "..." }
//! ```
//!
//! A missing row, or a blank field, reads as "not configured" (the empty
//! string); the engine substitutes its defaults.
//!
//! # Feature gate
//!
//! ```toml
//! ragloom-stores = { workspace = true, features = ["postgres"] }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use ragloom_core::error::StoreError;
use ragloom_core::store::PromptStore;

const SYSTEM_PROMPT_KEY: &str = "system_prompt";

#[derive(Debug, Default, Deserialize)]
struct PromptSetting {
    #[serde(default)]
    content: String,
    #[serde(default)]
    summary_content: String,
}

/// Parse the JSON stored in a `system_prompt` settings row.
fn parse_prompt_setting(raw: &str) -> Result<PromptSetting, StoreError> {
    serde_json::from_str(raw)
        .map_err(|e| StoreError::Corrupt(format!("system_prompt setting: {e}")))
}

/// [`PromptStore`] backed by the `settings` table.
pub struct PgPromptStore {
    pool: PgPool,
}

impl PgPromptStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("PostgreSQL connection failed: {e}")))?;

        info!("Connected to PostgreSQL for prompt settings");
        Ok(Self { pool })
    }

    /// Create from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, kb_id: &str) -> Result<PromptSetting, StoreError> {
        let row = sqlx::query(
            "SELECT value::text AS value FROM settings WHERE kb_id = $1 AND key = $2 LIMIT 1",
        )
        .bind(kb_id)
        .bind(SYSTEM_PROMPT_KEY)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let Some(row) = row else {
            debug!(kb_id, "no prompt setting");
            return Ok(PromptSetting::default());
        };

        let raw: String = row
            .try_get("value")
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        parse_prompt_setting(&raw)
    }
}

#[async_trait]
impl PromptStore for PgPromptStore {
    async fn get_system_prompt(&self, kb_id: &str) -> Result<String, StoreError> {
        Ok(self.load(kb_id).await?.content)
    }

    async fn get_summary_prompt(&self, kb_id: &str) -> Result<String, StoreError> {
        let setting = self.load(kb_id).await?;
        if setting.summary_content.trim().is_empty() {
            return Ok(String::new());
        }
        Ok(setting.summary_content)
    }
}
