use crate::models::{
    AuditCounts, AuditLogRow, ChatMessageRow, ConversationRow, NewAuditLog, NewChatMessage,
    NewProfile, ProfileRow, UserRow,
};
use crate::{Database, now_timestamp};
use anyhow::Result;
use bento_types::api::ProfileUpdateRequest;
use bento_types::models::ProfileToggles;
use rusqlite::{Connection, Row};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

const PROFILE_COLUMNS: &str = "id, user_id, name, icon_name, color, description, is_active,
    redact_email, redact_phone, redact_names, redact_payment, redact_location, redact_credentials,
    custom_keywords, created_at, updated_at";

const AUDIT_COLUMNS: &str = "id, created_at, payload_raw, payload_redacted, verdict, compliance_score,
    ai_reasoning, has_pii, source, request_id, token_count, bypass_used, conversation_id, metadata";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, role, content, status, latency_ms, scrubbed_count, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Profiles --

    pub fn list_profiles(&self, user_id: &str) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| query_profiles(conn, user_id))
    }

    pub fn get_profile(&self, user_id: &str, profile_id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, user_id, profile_id))
    }

    pub fn get_active_profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM user_profiles WHERE user_id = ?1 AND is_active = 1",
                PROFILE_COLUMNS
            );
            conn.query_row(&sql, [user_id], profile_from_row).optional()
        })
    }

    /// Insert a profile. The first profile a user creates becomes active.
    pub fn create_profile(&self, new: &NewProfile<'_>) -> Result<ProfileRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM user_profiles WHERE user_id = ?1",
                [new.user_id],
                |r| r.get(0),
            )?;

            let id = Uuid::new_v4().to_string();
            let now = now_timestamp();
            let keywords = serde_json::to_string(new.custom_keywords)?;

            tx.execute(
                "INSERT INTO user_profiles (id, user_id, name, icon_name, color, description, is_active,
                    redact_email, redact_phone, redact_names, redact_payment, redact_location,
                    redact_credentials, custom_keywords, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
                rusqlite::params![
                    id,
                    new.user_id,
                    new.name,
                    new.icon_name,
                    new.color,
                    new.description,
                    existing == 0,
                    new.toggles.email,
                    new.toggles.phone,
                    new.toggles.names,
                    new.toggles.payment,
                    new.toggles.location,
                    new.toggles.credentials,
                    keywords,
                    now,
                ],
            )?;

            let row = query_profile(&tx, new.user_id, &id)?
                .ok_or_else(|| anyhow::anyhow!("Profile {} vanished after insert", id))?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Apply a partial update. Returns `None` if the profile does not belong to the user.
    pub fn update_profile(
        &self,
        user_id: &str,
        profile_id: &str,
        update: &ProfileUpdateRequest,
    ) -> Result<Option<ProfileRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(mut row) = query_profile(&tx, user_id, profile_id)? else {
                return Ok(None);
            };

            if let Some(name) = &update.name {
                row.name = name.clone();
            }
            if let Some(icon_name) = &update.icon_name {
                row.icon_name = icon_name.clone();
            }
            if let Some(color) = &update.color {
                row.color = color.clone();
            }
            if let Some(description) = &update.description {
                row.description = description.clone();
            }
            if let Some(toggles) = update.toggles {
                row.toggles = toggles;
            }
            if let Some(keywords) = &update.custom_keywords {
                row.custom_keywords = keywords.clone();
            }
            if let Some(active) = update.is_active {
                if active && !row.is_active {
                    tx.execute(
                        "UPDATE user_profiles SET is_active = 0 WHERE user_id = ?1",
                        [user_id],
                    )?;
                }
                row.is_active = active;
            }

            tx.execute(
                "UPDATE user_profiles SET name = ?1, icon_name = ?2, color = ?3, description = ?4,
                    is_active = ?5, redact_email = ?6, redact_phone = ?7, redact_names = ?8,
                    redact_payment = ?9, redact_location = ?10, redact_credentials = ?11,
                    custom_keywords = ?12, updated_at = ?13
                 WHERE id = ?14 AND user_id = ?15",
                rusqlite::params![
                    row.name,
                    row.icon_name,
                    row.color,
                    row.description,
                    row.is_active,
                    row.toggles.email,
                    row.toggles.phone,
                    row.toggles.names,
                    row.toggles.payment,
                    row.toggles.location,
                    row.toggles.credentials,
                    serde_json::to_string(&row.custom_keywords)?,
                    now_timestamp(),
                    profile_id,
                    user_id,
                ],
            )?;

            let updated = query_profile(&tx, user_id, profile_id)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Delete a profile. If it was active, the oldest remaining profile takes over.
    /// Returns false if the profile was not found.
    pub fn delete_profile(&self, user_id: &str, profile_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(row) = query_profile(&tx, user_id, profile_id)? else {
                return Ok(false);
            };

            tx.execute(
                "DELETE FROM user_profiles WHERE id = ?1 AND user_id = ?2",
                [profile_id, user_id],
            )?;

            if row.is_active {
                tx.execute(
                    "UPDATE user_profiles SET is_active = 1, updated_at = ?2
                     WHERE id = (SELECT id FROM user_profiles WHERE user_id = ?1
                                 ORDER BY created_at ASC, rowid ASC LIMIT 1)",
                    rusqlite::params![user_id, now_timestamp()],
                )?;
            }

            tx.commit()?;
            Ok(true)
        })
    }

    /// Make `profile_id` the single active profile for the user.
    pub fn activate_profile(&self, user_id: &str, profile_id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if query_profile(&tx, user_id, profile_id)?.is_none() {
                return Ok(None);
            }

            tx.execute(
                "UPDATE user_profiles SET is_active = 0 WHERE user_id = ?1 AND id != ?2",
                [user_id, profile_id],
            )?;
            tx.execute(
                "UPDATE user_profiles SET is_active = 1, updated_at = ?3 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![profile_id, user_id, now_timestamp()],
            )?;

            let row = query_profile(&tx, user_id, profile_id)?;
            tx.commit()?;
            Ok(row)
        })
    }

    // -- Audit logs --

    pub fn insert_audit_log(&self, log: &NewAuditLog) -> Result<AuditLogRow> {
        let id = Uuid::new_v4().to_string();
        let created_at = now_timestamp();

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO audit_logs (id, created_at, payload_raw, payload_redacted, verdict,
                    compliance_score, ai_reasoning, has_pii, source, request_id, token_count,
                    bypass_used, conversation_id, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                rusqlite::params![
                    id,
                    created_at,
                    serde_json::to_string(&log.payload_raw)?,
                    log.payload_redacted.as_ref().map(serde_json::to_string).transpose()?,
                    log.verdict.as_str(),
                    log.compliance_score,
                    log.ai_reasoning,
                    log.has_pii,
                    log.source,
                    log.request_id,
                    log.token_count,
                    log.bypass_used,
                    log.conversation_id,
                    serde_json::to_string(&log.metadata)?,
                ],
            )?;
            Ok(())
        })?;

        Ok(AuditLogRow {
            id,
            created_at,
            payload_raw: log.payload_raw.clone(),
            payload_redacted: log.payload_redacted.clone(),
            verdict: log.verdict.as_str().to_string(),
            compliance_score: log.compliance_score,
            ai_reasoning: log.ai_reasoning.clone(),
            has_pii: log.has_pii,
            source: log.source.clone(),
            request_id: log.request_id.clone(),
            token_count: log.token_count,
            bypass_used: log.bypass_used,
            conversation_id: log.conversation_id.clone(),
            metadata: log.metadata.clone(),
        })
    }

    /// Logs created at or after `since`, newest first.
    pub fn audit_logs_since(&self, since: &str, limit: u32) -> Result<Vec<AuditLogRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM audit_logs WHERE created_at >= ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                AUDIT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![since, limit], audit_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_audit_logs_since(&self, since: &str) -> Result<AuditCounts> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN has_pii = 1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN verdict != 'VALID' THEN 1 ELSE 0 END), 0)
                 FROM audit_logs WHERE created_at >= ?1",
                [since],
                |r| {
                    Ok(AuditCounts {
                        total: r.get::<_, i64>(0)? as u64,
                        with_pii: r.get::<_, i64>(1)? as u64,
                        violations: r.get::<_, i64>(2)? as u64,
                    })
                },
            )?;
            Ok(counts)
        })
    }

    /// Most recent logs regardless of age, newest first.
    pub fn recent_audit_logs(&self, limit: u32) -> Result<Vec<AuditLogRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM audit_logs ORDER BY created_at DESC, rowid DESC LIMIT ?1",
                AUDIT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], audit_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Logs for one conversation, oldest first, limited to the newest `limit` rows.
    pub fn audit_logs_for_conversation(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> Result<Vec<AuditLogRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT * FROM (
                    SELECT {}, rowid AS rid FROM audit_logs WHERE conversation_id = ?1
                    ORDER BY created_at DESC, rowid DESC LIMIT ?2
                 ) ORDER BY created_at ASC, rid ASC",
                AUDIT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![conversation_id, limit], audit_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_audit_log(&self, id: &str) -> Result<Option<AuditLogRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM audit_logs WHERE id = ?1", AUDIT_COLUMNS);
            conn.query_row(&sql, [id], audit_from_row).optional()
        })
    }

    pub fn delete_audit_logs_for_conversation(&self, conversation_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM audit_logs WHERE conversation_id = ?1",
                [conversation_id],
            )?;
            Ok(n)
        })
    }

    /// Cheap round trip used by the health checks.
    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
    }

    // -- Conversations --

    /// Append a chat message, creating the conversation on first use and
    /// bumping its `updated_at` otherwise.
    pub fn add_chat_message(&self, msg: &NewChatMessage<'_>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO conversations (id, title, model, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
                rusqlite::params![
                    msg.conversation_id,
                    msg.title.unwrap_or("New Conversation"),
                    msg.model.unwrap_or("Gemini 3 Flash"),
                    now,
                ],
            )?;

            tx.execute(
                "INSERT INTO chat_messages (id, conversation_id, role, content, status,
                    latency_ms, scrubbed_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id,
                    msg.conversation_id,
                    msg.role,
                    msg.content,
                    msg.status,
                    msg.latency_ms,
                    msg.scrubbed_count,
                    now,
                ],
            )?;

            tx.commit()?;
            Ok(())
        })?;

        Ok(id)
    }

    pub fn list_conversations(&self, limit: u32) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, model, created_at, updated_at FROM conversations
                 ORDER BY updated_at DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        model: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_chat_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM chat_messages WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([conversation_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch messages for a set of conversations, oldest first.
    pub fn get_messages_for_conversations(
        &self,
        conversation_ids: &[String],
    ) -> Result<Vec<ChatMessageRow>> {
        if conversation_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=conversation_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {} FROM chat_messages WHERE conversation_id IN ({})
                 ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS,
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = conversation_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Move the newest message in `old_status` to `new_status`.
    /// Returns whether a message was updated.
    pub fn update_last_message_status(
        &self,
        conversation_id: &str,
        old_status: &str,
        new_status: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE chat_messages SET status = ?3
                 WHERE id = (SELECT id FROM chat_messages
                             WHERE conversation_id = ?1 AND status = ?2
                             ORDER BY created_at DESC, rowid DESC LIMIT 1)",
                [conversation_id, old_status, new_status],
            )?;
            Ok(n > 0)
        })
    }

    /// Delete a conversation and, through the foreign key, its messages.
    pub fn delete_conversation(&self, conversation_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM conversations WHERE id = ?1", [conversation_id])?;
            Ok(n > 0)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_profiles(conn: &Connection, user_id: &str) -> Result<Vec<ProfileRow>> {
    let sql = format!(
        "SELECT {} FROM user_profiles WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
        PROFILE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id], profile_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_profile(conn: &Connection, user_id: &str, profile_id: &str) -> Result<Option<ProfileRow>> {
    let sql = format!(
        "SELECT {} FROM user_profiles WHERE id = ?1 AND user_id = ?2",
        PROFILE_COLUMNS
    );
    conn.query_row(&sql, [profile_id, user_id], profile_from_row).optional()
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileRow> {
    let id: String = row.get(0)?;
    let keywords_raw: String = row.get(13)?;
    let custom_keywords = serde_json::from_str(&keywords_raw).unwrap_or_else(|e| {
        warn!("Corrupt custom_keywords on profile '{}': {}", id, e);
        Vec::new()
    });

    Ok(ProfileRow {
        user_id: row.get(1)?,
        name: row.get(2)?,
        icon_name: row.get(3)?,
        color: row.get(4)?,
        description: row.get(5)?,
        is_active: row.get(6)?,
        toggles: ProfileToggles {
            email: row.get(7)?,
            phone: row.get(8)?,
            names: row.get(9)?,
            payment: row.get(10)?,
            location: row.get(11)?,
            credentials: row.get(12)?,
        },
        custom_keywords,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
        id,
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditLogRow> {
    let id: String = row.get(0)?;
    let parse = |raw: &str, column: &str| -> Value {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!("Corrupt {} on audit log '{}': {}", column, id, e);
            Value::Null
        })
    };

    let payload_raw = parse(&row.get::<_, String>(2)?, "payload_raw");
    let payload_redacted = row
        .get::<_, Option<String>>(3)?
        .map(|raw| parse(&raw, "payload_redacted"));
    let metadata = parse(&row.get::<_, String>(13)?, "metadata");

    Ok(AuditLogRow {
        created_at: row.get(1)?,
        payload_raw,
        payload_redacted,
        verdict: row.get(4)?,
        compliance_score: row.get(5)?,
        ai_reasoning: row.get(6)?,
        has_pii: row.get(7)?,
        source: row.get(8)?,
        request_id: row.get(9)?,
        token_count: row.get(10)?,
        bypass_used: row.get(11)?,
        conversation_id: row.get(12)?,
        metadata,
        id,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessageRow> {
    Ok(ChatMessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        status: row.get(4)?,
        latency_ms: row.get(5)?,
        scrubbed_count: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bento_types::models::Verdict;
    use serde_json::json;

    fn db_with_user() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let user_id = Uuid::new_v4().to_string();
        db.create_user(&user_id, "alice", "hash").unwrap();
        (db, user_id)
    }

    fn new_profile<'a>(user_id: &'a str, name: &'a str) -> NewProfile<'a> {
        NewProfile {
            user_id,
            name,
            icon_name: "Shield",
            color: "text-sky-400",
            description: "test",
            toggles: ProfileToggles::default(),
            custom_keywords: &[],
        }
    }

    fn audit(verdict: Verdict, has_pii: bool, conversation: Option<&str>) -> NewAuditLog {
        NewAuditLog {
            payload_raw: json!({"input": "hello"}),
            payload_redacted: None,
            verdict,
            compliance_score: 1.0,
            ai_reasoning: Some("ok".into()),
            has_pii,
            source: "web-dashboard".into(),
            request_id: None,
            token_count: 4,
            bypass_used: false,
            conversation_id: conversation.map(str::to_string),
            metadata: json!({}),
        }
    }

    #[test]
    fn first_profile_is_auto_activated() {
        let (db, user) = db_with_user();
        let first = db.create_profile(&new_profile(&user, "Work")).unwrap();
        let second = db.create_profile(&new_profile(&user, "Home")).unwrap();

        assert!(first.is_active);
        assert!(!second.is_active);
        assert_eq!(db.get_active_profile(&user).unwrap().unwrap().id, first.id);
    }

    #[test]
    fn activation_keeps_exactly_one_active() {
        let (db, user) = db_with_user();
        let a = db.create_profile(&new_profile(&user, "A")).unwrap();
        let b = db.create_profile(&new_profile(&user, "B")).unwrap();

        let activated = db.activate_profile(&user, &b.id).unwrap().unwrap();
        assert!(activated.is_active);

        let active: Vec<_> = db
            .list_profiles(&user)
            .unwrap()
            .into_iter()
            .filter(|p| p.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);
        assert!(!db.get_profile(&user, &a.id).unwrap().unwrap().is_active);
    }

    #[test]
    fn activating_unknown_profile_returns_none() {
        let (db, user) = db_with_user();
        db.create_profile(&new_profile(&user, "A")).unwrap();
        assert!(db.activate_profile(&user, "missing").unwrap().is_none());
    }

    #[test]
    fn deleting_active_profile_promotes_oldest_remaining() {
        let (db, user) = db_with_user();
        let a = db.create_profile(&new_profile(&user, "A")).unwrap();
        let b = db.create_profile(&new_profile(&user, "B")).unwrap();
        let _c = db.create_profile(&new_profile(&user, "C")).unwrap();

        assert!(db.delete_profile(&user, &a.id).unwrap());
        assert_eq!(db.get_active_profile(&user).unwrap().unwrap().id, b.id);
        assert!(!db.delete_profile(&user, &a.id).unwrap());
    }

    #[test]
    fn partial_update_only_touches_given_fields() {
        let (db, user) = db_with_user();
        let p = db.create_profile(&new_profile(&user, "Work")).unwrap();

        let update = ProfileUpdateRequest {
            custom_keywords: Some(vec!["Project Falcon".into()]),
            ..Default::default()
        };
        let updated = db.update_profile(&user, &p.id, &update).unwrap().unwrap();
        assert_eq!(updated.name, "Work");
        assert_eq!(updated.custom_keywords, vec!["Project Falcon".to_string()]);
        assert_eq!(updated.toggles, ProfileToggles::default());

        let update = ProfileUpdateRequest {
            toggles: Some(ProfileToggles { email: false, ..Default::default() }),
            ..Default::default()
        };
        let updated = db.update_profile(&user, &p.id, &update).unwrap().unwrap();
        assert!(!updated.toggles.email);
        assert_eq!(updated.custom_keywords.len(), 1);
    }

    #[test]
    fn update_is_scoped_to_owner() {
        let (db, user) = db_with_user();
        let other = Uuid::new_v4().to_string();
        db.create_user(&other, "mallory", "hash").unwrap();
        let p = db.create_profile(&new_profile(&user, "Work")).unwrap();

        let update = ProfileUpdateRequest { name: Some("pwned".into()), ..Default::default() };
        assert!(db.update_profile(&other, &p.id, &update).unwrap().is_none());
    }

    #[test]
    fn audit_counts_split_pii_and_violations() {
        let db = Database::open_in_memory().unwrap();
        db.insert_audit_log(&audit(Verdict::Valid, false, None)).unwrap();
        db.insert_audit_log(&audit(Verdict::Flagged, true, None)).unwrap();
        db.insert_audit_log(&audit(Verdict::Canceled, true, None)).unwrap();

        let counts = db.count_audit_logs_since("1970-01-01T00:00:00.000000Z").unwrap();
        assert_eq!(counts, AuditCounts { total: 3, with_pii: 2, violations: 2 });

        let recent = db.recent_audit_logs(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].verdict, "CANCELED");
    }

    #[test]
    fn conversation_logs_come_back_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        for _ in 0..3 {
            db.insert_audit_log(&audit(Verdict::Valid, false, Some("c1"))).unwrap();
        }
        let last = db.insert_audit_log(&audit(Verdict::Flagged, false, Some("c1"))).unwrap();
        db.insert_audit_log(&audit(Verdict::Valid, false, Some("c2"))).unwrap();

        let logs = db.audit_logs_for_conversation("c1", 2).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].id, last.id);

        assert_eq!(db.delete_audit_logs_for_conversation("c1").unwrap(), 4);
    }

    #[test]
    fn last_message_status_update_targets_newest_match() {
        let db = Database::open_in_memory().unwrap();
        let msg = |content: &'static str, status: &'static str| NewChatMessage {
            conversation_id: "conv",
            role: "user",
            content,
            status,
            latency_ms: 0.0,
            scrubbed_count: 0,
            title: Some("first"),
            model: None,
        };

        db.add_chat_message(&msg("one", "warning")).unwrap();
        db.add_chat_message(&msg("two", "warning")).unwrap();

        assert!(db.update_last_message_status("conv", "warning", "canceled").unwrap());
        let messages = db.get_chat_messages("conv").unwrap();
        assert_eq!(messages[0].status, "warning");
        assert_eq!(messages[1].status, "canceled");

        assert!(!db.update_last_message_status("other", "warning", "canceled").unwrap());
    }

    #[test]
    fn deleting_conversation_cascades_to_messages() {
        let db = Database::open_in_memory().unwrap();
        db.add_chat_message(&NewChatMessage {
            conversation_id: "conv",
            role: "user",
            content: "hi",
            status: "verified",
            latency_ms: 0.0,
            scrubbed_count: 0,
            title: None,
            model: None,
        })
        .unwrap();

        let convs = db.list_conversations(10).unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].title, "New Conversation");

        assert!(db.delete_conversation("conv").unwrap());
        assert!(db.get_chat_messages("conv").unwrap().is_empty());
        assert!(!db.delete_conversation("conv").unwrap());
    }
}
