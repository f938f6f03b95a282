//! Postgres-backed stores.
//!
//! The engine reads the host system's `spurgo_content` view and owns a small
//! `spurgo_settings` key/value table. The content schema belongs to the host;
//! it is never created or migrated here.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::warn;

use crate::application::repos::{ContentRepo, RepoError, SettingsRepo};
use crate::domain::content::{ContentId, ContentItem, ContentKind};

use super::error::InfraError;

/// Shared Postgres handle implementing the engine's store seams.
#[derive(Clone)]
pub struct PostgresStores {
    pool: PgPool,
}

impl PostgresStores {
    /// Connect a pool against the configured database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, InfraError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;
        Ok(Self { pool })
    }

    /// Create the settings table when missing.
    pub async fn ensure_settings_schema(&self) -> Result<(), InfraError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS spurgo_settings (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct ContentRow {
    id: i64,
    parent_id: Option<i64>,
    kind: String,
    modified_at: Option<String>,
    permalink: String,
}

impl From<ContentRow> for ContentItem {
    fn from(row: ContentRow) -> Self {
        Self {
            id: ContentId::new(row.id),
            // Hosts exporting legacy schemas use 0 for "no parent".
            parent_id: row.parent_id.filter(|&raw| raw != 0).map(ContentId::new),
            kind: ContentKind::new(row.kind),
            modified_at: row.modified_at.as_deref().and_then(parse_modified_at),
            permalink: row.permalink,
        }
    }
}

/// Parse the host system's modification timestamp.
///
/// Accepts RFC 3339 or the bare `YYYY-MM-DD HH:MM:SS` form (assumed UTC).
/// Anything else maps to `None`: the item is treated as unchanged rather
/// than failing the scan.
fn parse_modified_at(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed);
    }

    let bare = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(parsed) = PrimitiveDateTime::parse(raw, bare) {
        return Some(parsed.assume_utc());
    }

    warn!(value = %raw, "unparsable modification timestamp, item treated as unchanged");
    None
}

fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

const CONTENT_COLUMNS: &str = "id, parent_id, kind, modified_at, permalink";

#[async_trait]
impl ContentRepo for PostgresStores {
    async fn list_kinds(&self) -> Result<Vec<ContentKind>, RepoError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT kind FROM spurgo_content ORDER BY kind")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|(kind,)| ContentKind::new(kind)).collect())
    }

    async fn list_items(&self, kind: &ContentKind) -> Result<Vec<ContentItem>, RepoError> {
        let rows: Vec<ContentRow> = sqlx::query_as(&format!(
            "SELECT {CONTENT_COLUMNS} FROM spurgo_content WHERE kind = $1"
        ))
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ContentItem::from).collect())
    }

    async fn find_item(&self, id: ContentId) -> Result<Option<ContentItem>, RepoError> {
        let row: Option<ContentRow> = sqlx::query_as(&format!(
            "SELECT {CONTENT_COLUMNS} FROM spurgo_content WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(ContentItem::from))
    }
}

#[async_trait]
impl SettingsRepo for PostgresStores {
    async fn get(&self, key: &str) -> Result<Option<String>, RepoError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM spurgo_settings WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO spurgo_settings (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
