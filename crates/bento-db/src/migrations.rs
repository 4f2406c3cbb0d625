use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE user_profiles (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name                TEXT NOT NULL,
                icon_name           TEXT NOT NULL,
                color               TEXT NOT NULL,
                description         TEXT NOT NULL,
                is_active           INTEGER NOT NULL DEFAULT 0,
                redact_email        INTEGER NOT NULL DEFAULT 1,
                redact_phone        INTEGER NOT NULL DEFAULT 1,
                redact_names        INTEGER NOT NULL DEFAULT 1,
                redact_payment      INTEGER NOT NULL DEFAULT 1,
                redact_location     INTEGER NOT NULL DEFAULT 1,
                redact_credentials  INTEGER NOT NULL DEFAULT 1,
                custom_keywords     TEXT NOT NULL DEFAULT '[]',
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_profiles_user ON user_profiles(user_id, created_at);

            -- At most one active profile per user
            CREATE UNIQUE INDEX idx_profiles_one_active
                ON user_profiles(user_id) WHERE is_active = 1;

            CREATE TABLE audit_logs (
                id                  TEXT PRIMARY KEY,
                created_at          TEXT NOT NULL,
                payload_raw         TEXT NOT NULL,
                payload_redacted    TEXT,
                verdict             TEXT NOT NULL,
                compliance_score    REAL NOT NULL DEFAULT 0,
                ai_reasoning        TEXT,
                has_pii             INTEGER NOT NULL DEFAULT 0,
                source              TEXT NOT NULL,
                request_id          TEXT,
                token_count         INTEGER NOT NULL DEFAULT 0,
                bypass_used         INTEGER NOT NULL DEFAULT 0,
                conversation_id     TEXT,
                metadata            TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX idx_audit_created ON audit_logs(created_at);
            CREATE INDEX idx_audit_conversation ON audit_logs(conversation_id, created_at);

            CREATE TABLE conversations (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                model       TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE chat_messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                status          TEXT NOT NULL,
                latency_ms      REAL NOT NULL DEFAULT 0,
                scrubbed_count  INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation
                ON chat_messages(conversation_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
