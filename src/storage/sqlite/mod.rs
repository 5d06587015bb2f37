//! `SQLite` webhook store.
//!
//! A single database file holds both the subscription table and the attempt
//! log. Timestamps are stored as unix milliseconds; the subscription event
//! list is stored as a JSON array.

mod connection;

pub use connection::{BUSY_TIMEOUT_MS, acquire_lock, configure_connection};

use crate::models::{
    AttemptId, AttemptStats, AttemptStatus, AttemptUpdate, AttemptWithSubscription,
    DeliveryAttempt, EventPayload, NewSubscription, Subscription, SubscriptionId, TenantId,
};
use crate::storage::traits::{AttemptStore, SubscriptionStore};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

const SUBSCRIPTION_COLUMNS: &str =
    "s.id, s.tenant_id, s.url, s.secret, s.events, s.is_active, s.last_triggered_at, s.created_at";

const ATTEMPT_COLUMNS: &str = "a.id, a.webhook_id, a.event, a.payload, a.status, a.status_code, \
     a.response, a.error, a.tries, a.attempted_at";

/// Number of columns in [`ATTEMPT_COLUMNS`].
const ATTEMPT_COLUMN_COUNT: usize = 10;

/// `SQLite`-backed subscription and attempt store.
pub struct SqliteWebhookStore {
    conn: Mutex<Connection>,
}

impl SqliteWebhookStore {
    /// Opens (or creates) the store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or database cannot be created.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_webhook_db_dir".to_string(),
                cause: e.to_string(),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| Error::OperationFailed {
            operation: "open_webhook_db".to_string(),
            cause: e.to_string(),
        })?;
        configure_connection(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::debug!(path = %db_path.display(), "Opened webhook store");
        Ok(store)
    }

    /// Creates a store backed by an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_webhook_db_memory".to_string(),
            cause: e.to_string(),
        })?;
        configure_connection(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS webhook_subscriptions (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                url TEXT NOT NULL,
                secret TEXT NOT NULL,
                events TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_triggered_at INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_webhook_subscriptions_tenant
                ON webhook_subscriptions(tenant_id, is_active);

            CREATE TABLE IF NOT EXISTS webhook_attempts (
                id TEXT PRIMARY KEY,
                webhook_id TEXT NOT NULL REFERENCES webhook_subscriptions(id),
                event TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                status_code INTEGER,
                response TEXT,
                error TEXT,
                tries INTEGER NOT NULL DEFAULT 0,
                attempted_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_webhook_attempts_webhook
                ON webhook_attempts(webhook_id, attempted_at DESC);

            CREATE INDEX IF NOT EXISTS idx_webhook_attempts_status
                ON webhook_attempts(status, attempted_at DESC);
            ",
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_webhook_schema".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }
}

impl SubscriptionStore for SqliteWebhookStore {
    fn find_active_subscriptions(
        &self,
        tenant_id: &TenantId,
        event: &str,
    ) -> Result<Vec<Subscription>> {
        let conn = acquire_lock(&self.conn);

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions s
                 WHERE s.tenant_id = ?1 AND s.is_active = 1
                 ORDER BY s.created_at, s.rowid"
            ))
            .map_err(|e| Error::operation("prepare_find_subscriptions", e))?;

        let subscriptions = stmt
            .query_map(params![tenant_id.as_str()], |row| subscription_from_row(row, 0))
            .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
            .map_err(|e| Error::operation("query_find_subscriptions", e))?;

        Ok(subscriptions
            .into_iter()
            .filter(|s| s.matches(tenant_id, event))
            .collect())
    }

    fn touch_last_triggered(&self, id: &SubscriptionId, at: DateTime<Utc>) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        let updated = conn
            .execute(
                "UPDATE webhook_subscriptions SET last_triggered_at = ?1 WHERE id = ?2",
                params![at.timestamp_millis(), id.as_str()],
            )
            .map_err(|e| Error::operation("touch_last_triggered", e))?;

        if updated == 0 {
            return Err(Error::NotFound(format!("webhook subscription {id}")));
        }
        Ok(())
    }

    fn insert_subscription(&self, new: NewSubscription) -> Result<Subscription> {
        new.validate()?;

        let events: BTreeSet<String> = new.events.into_iter().collect();
        let events_json =
            serde_json::to_string(&events).map_err(|e| Error::operation("encode_events", e))?;
        let created_at = millis_to_datetime(crate::current_timestamp_millis());

        let subscription = Subscription {
            id: SubscriptionId::generate(),
            tenant_id: new.tenant_id,
            url: new.url,
            secret: new.secret,
            events,
            is_active: true,
            last_triggered_at: None,
            created_at,
        };

        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO webhook_subscriptions
                (id, tenant_id, url, secret, events, is_active, last_triggered_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, NULL, ?6)",
            params![
                subscription.id.as_str(),
                subscription.tenant_id.as_str(),
                subscription.url,
                subscription.secret.expose_secret(),
                events_json,
                created_at.timestamp_millis(),
            ],
        )
        .map_err(|e| Error::operation("insert_subscription", e))?;

        Ok(subscription)
    }

    fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        let conn = acquire_lock(&self.conn);

        conn.query_row(
            &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions s WHERE s.id = ?1"),
            params![id.as_str()],
            |row| subscription_from_row(row, 0),
        )
        .optional()
        .map_err(|e| Error::operation("get_subscription", e))
    }

    fn list_subscriptions(&self, tenant_id: &TenantId) -> Result<Vec<Subscription>> {
        let conn = acquire_lock(&self.conn);

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM webhook_subscriptions s
                 WHERE s.tenant_id = ?1
                 ORDER BY s.created_at, s.rowid"
            ))
            .map_err(|e| Error::operation("prepare_list_subscriptions", e))?;

        stmt.query_map(params![tenant_id.as_str()], |row| subscription_from_row(row, 0))
            .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
            .map_err(|e| Error::operation("query_list_subscriptions", e))
    }

    fn set_active(&self, id: &SubscriptionId, active: bool) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        let updated = conn
            .execute(
                "UPDATE webhook_subscriptions SET is_active = ?1 WHERE id = ?2",
                params![active, id.as_str()],
            )
            .map_err(|e| Error::operation("set_subscription_active", e))?;

        if updated == 0 {
            return Err(Error::NotFound(format!("webhook subscription {id}")));
        }
        Ok(())
    }
}

impl AttemptStore for SqliteWebhookStore {
    fn create_attempt(
        &self,
        webhook_id: &SubscriptionId,
        event: &str,
        payload: &EventPayload,
    ) -> Result<AttemptId> {
        let id = AttemptId::generate();
        let conn = acquire_lock(&self.conn);

        conn.execute(
            "INSERT INTO webhook_attempts
                (id, webhook_id, event, payload, status, status_code, response, error, tries, attempted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, NULL, 0, ?6)",
            params![
                id.as_str(),
                webhook_id.as_str(),
                event,
                payload.as_str(),
                AttemptStatus::Pending.as_str(),
                crate::current_timestamp_millis(),
            ],
        )
        .map_err(|e| Error::operation("create_attempt", e))?;

        Ok(id)
    }

    fn update_attempt(&self, id: &AttemptId, update: &AttemptUpdate) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        // Terminal rows are never reopened
        let updated = conn
            .execute(
                "UPDATE webhook_attempts
                 SET status = ?1, status_code = ?2, response = ?3, error = ?4, tries = ?5
                 WHERE id = ?6 AND status = 'pending'",
                params![
                    update.status.as_str(),
                    update.status_code,
                    update.response,
                    update.error,
                    update.tries,
                    id.as_str(),
                ],
            )
            .map_err(|e| Error::operation("update_attempt", e))?;

        if updated > 0 {
            return Ok(());
        }

        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM webhook_attempts WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::operation("update_attempt", e))?;

        match status {
            None => Err(Error::NotFound(format!("delivery attempt {id}"))),
            Some(status) => Err(Error::OperationFailed {
                operation: "update_attempt".to_string(),
                cause: format!("attempt {id} is already {status}"),
            }),
        }
    }

    fn find_failed_attempts(
        &self,
        tenant_id: &TenantId,
        limit: usize,
    ) -> Result<Vec<AttemptWithSubscription>> {
        let conn = acquire_lock(&self.conn);
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ATTEMPT_COLUMNS}, {SUBSCRIPTION_COLUMNS}
                 FROM webhook_attempts a
                 JOIN webhook_subscriptions s ON s.id = a.webhook_id
                 WHERE a.status = 'failed' AND s.tenant_id = ?1 AND s.is_active = 1
                 ORDER BY a.attempted_at DESC, a.rowid DESC
                 LIMIT ?2"
            ))
            .map_err(|e| Error::operation("prepare_failed_attempts", e))?;

        stmt.query_map(params![tenant_id.as_str(), limit_i64], |row| {
            Ok(AttemptWithSubscription {
                attempt: attempt_from_row(row)?,
                subscription: subscription_from_row(row, ATTEMPT_COLUMN_COUNT)?,
            })
        })
        .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
        .map_err(|e| Error::operation("query_failed_attempts", e))
    }

    fn get_attempt(&self, id: &AttemptId) -> Result<Option<DeliveryAttempt>> {
        let conn = acquire_lock(&self.conn);

        conn.query_row(
            &format!("SELECT {ATTEMPT_COLUMNS} FROM webhook_attempts a WHERE a.id = ?1"),
            params![id.as_str()],
            attempt_from_row,
        )
        .optional()
        .map_err(|e| Error::operation("get_attempt", e))
    }

    fn attempt_history(
        &self,
        webhook_id: &SubscriptionId,
        limit: usize,
    ) -> Result<Vec<DeliveryAttempt>> {
        let conn = acquire_lock(&self.conn);
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ATTEMPT_COLUMNS} FROM webhook_attempts a
                 WHERE a.webhook_id = ?1
                 ORDER BY a.attempted_at DESC, a.rowid DESC
                 LIMIT ?2"
            ))
            .map_err(|e| Error::operation("prepare_attempt_history", e))?;

        stmt.query_map(params![webhook_id.as_str(), limit_i64], attempt_from_row)
            .and_then(Iterator::collect::<rusqlite::Result<Vec<_>>>)
            .map_err(|e| Error::operation("query_attempt_history", e))
    }

    fn attempt_stats(&self, webhook_id: &SubscriptionId) -> Result<AttemptStats> {
        let conn = acquire_lock(&self.conn);

        conn.query_row(
            r"
            SELECT
                COUNT(*),
                SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END)
            FROM webhook_attempts
            WHERE webhook_id = ?1
            ",
            params![webhook_id.as_str()],
            |row| {
                let count = |idx: usize| -> rusqlite::Result<usize> {
                    let value: Option<i64> = row.get(idx)?;
                    Ok(usize::try_from(value.unwrap_or(0)).unwrap_or(0))
                };
                Ok(AttemptStats {
                    total: count(0)?,
                    success: count(1)?,
                    failed: count(2)?,
                    pending: count(3)?,
                })
            },
        )
        .map_err(|e| Error::operation("query_attempt_stats", e))
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn subscription_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Subscription> {
    let events_json: String = row.get(offset + 4)?;
    let events: BTreeSet<String> =
        serde_json::from_str(&events_json).map_err(|e| conversion_error(offset + 4, e))?;
    let last_triggered_at: Option<i64> = row.get(offset + 6)?;

    Ok(Subscription {
        id: SubscriptionId::new(row.get::<_, String>(offset)?),
        tenant_id: TenantId::new(row.get::<_, String>(offset + 1)?),
        url: row.get(offset + 2)?,
        secret: SecretString::from(row.get::<_, String>(offset + 3)?),
        events,
        is_active: row.get(offset + 5)?,
        last_triggered_at: last_triggered_at.map(millis_to_datetime),
        created_at: millis_to_datetime(row.get(offset + 7)?),
    })
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<DeliveryAttempt> {
    let payload_json: String = row.get(3)?;
    let payload = EventPayload::from_json_str(&payload_json).map_err(|e| conversion_error(3, e))?;
    let status_text: String = row.get(4)?;
    let status: AttemptStatus = status_text.parse().map_err(|e| conversion_error(4, e))?;
    let status_code: Option<i64> = row.get(5)?;
    let tries: i64 = row.get(8)?;

    Ok(DeliveryAttempt {
        id: AttemptId::new(row.get::<_, String>(0)?),
        webhook_id: SubscriptionId::new(row.get::<_, String>(1)?),
        event: row.get(2)?,
        payload,
        status,
        status_code: status_code.and_then(|c| u16::try_from(c).ok()),
        response: row.get(6)?,
        error: row.get(7)?,
        tries: u32::try_from(tries).unwrap_or(0),
        attempted_at: millis_to_datetime(row.get(9)?),
    })
}
