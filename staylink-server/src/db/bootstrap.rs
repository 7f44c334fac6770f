use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

/// Idempotent schema for the messaging core.
///
/// `users` is a read-only projection maintained by the marketplace
/// application; the messaging core only joins it for display names.
/// `conversation_unread` models `unread_by` as a membership table so that
/// unread transitions are atomic set inserts/deletes rather than
/// read-modify-write of a whole document.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT
    )",
    "CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        participant_lo TEXT NOT NULL,
        participant_hi TEXT NOT NULL,
        last_message TEXT,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS conversations_participant_pair
        ON conversations (participant_lo, participant_hi)",
    "CREATE TABLE IF NOT EXISTS conversation_unread (
        conversation_id TEXT NOT NULL REFERENCES conversations (id),
        user_id TEXT NOT NULL,
        PRIMARY KEY (conversation_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL REFERENCES conversations (id),
        sender_id TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS messages_conversation_created
        ON messages (conversation_id, created_at, id)",
];

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database error executing bootstrap statement {index}: {source}")]
    Sql {
        index: usize,
        #[source]
        source: sqlx::Error,
    },
}

/// Execute the schema statements in order.
pub async fn run(pool: &PgPool) -> Result<(), BootstrapError> {
    info!(statements = SCHEMA.len(), "running database bootstrap");

    for (index, statement) in SCHEMA.iter().enumerate() {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|source| BootstrapError::Sql { index, source })?;
    }

    Ok(())
}

#[cfg(test)]
static READINESS_OVERRIDE: std::sync::Mutex<Option<Result<(), ()>>> = std::sync::Mutex::new(None);

/// Test hook so probe handlers can be exercised without a live database.
#[cfg(test)]
pub fn set_readiness_override(value: Option<Result<(), ()>>) {
    if let Ok(mut guard) = READINESS_OVERRIDE.lock() {
        *guard = value;
    }
}

/// Simple liveness check used during startup and by the readiness probe.
pub async fn ensure_liveness(pool: &PgPool) -> Result<(), sqlx::Error> {
    #[cfg(test)]
    {
        let override_value = READINESS_OVERRIDE.lock().ok().and_then(|guard| *guard);
        if let Some(result) = override_value {
            return result.map_err(|()| sqlx::Error::PoolClosed);
        }
    }

    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}
