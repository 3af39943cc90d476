//! SQLite persistence gateway.
//!
//! Every DB call is dispatched via `tokio::task::spawn_blocking` so the
//! Tokio worker threads are never stalled by synchronous SQLite I/O. The
//! connection lives behind an `Arc<Mutex<_>>` so it can move into blocking
//! tasks without lifetime issues.
//!
//! Timestamps are stored as epoch milliseconds, schema mappings and
//! counter snapshots as JSON text columns.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use common::{datetime_to_ms, ms_to_datetime};
use eventshape_core::{
    EventIdentity, EventModel, FlushBatch, FrequencyCounter, PrivateData,
    SchemaVersion,
};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{StoreError, StoreResult};
use crate::SchemaStore;

/// Spawn a blocking closure that receives the locked `&mut Connection`.
/// Returns `StoreResult<T>` where `T: Send + 'static`.
macro_rules! db {
    ($conn:expr, $body:expr) => {{
        let conn = Arc::clone(&$conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            ($body)(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Database(format!("spawn_blocking panic: {e}")))?
    }};
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

const UPSERT_MODEL_SQL: &str = "\
    INSERT INTO event_models \
        (uuid, producer_id, event_category, event_identifier, \
         created_at, last_seen, private_data) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
    ON CONFLICT(uuid) DO UPDATE SET \
        last_seen = excluded.last_seen, \
        private_data = excluded.private_data";

const UPSERT_VERSION_SQL: &str = "\
    INSERT INTO schema_versions \
        (uuid, model_uuid, schema_hash, schema_json, \
         first_seen, last_seen, total_count) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
    ON CONFLICT(uuid) DO UPDATE SET \
        last_seen = excluded.last_seen, \
        total_count = excluded.total_count";

const SELECT_MODELS_SQL: &str = "\
    SELECT uuid, producer_id, event_category, event_identifier, \
           created_at, last_seen \
    FROM event_models \
    ORDER BY producer_id, event_category, event_identifier";

const SELECT_VERSIONS_SQL: &str = "\
    SELECT uuid, model_uuid, schema_hash, schema_json, \
           first_seen, last_seen, total_count \
    FROM schema_versions \
    ORDER BY model_uuid, first_seen";

const SELECT_COUNTERS_SQL: &str =
    "SELECT private_data FROM event_models WHERE uuid = ?1";

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct SqliteSchemaStore {
    conn: Arc<Mutex<Connection>>,
    log_query_plans: bool,
}

impl SqliteSchemaStore {
    /// Open (or create) the store at `path`. With `log_query_plans` on,
    /// every statement's `EXPLAIN QUERY PLAN` output is logged at debug
    /// level before it runs.
    pub fn open(
        path: impl AsRef<Path>,
        log_query_plans: bool,
    ) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            log_query_plans,
        })
    }

    /// In-memory store (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            log_query_plans: false,
        })
    }

    fn init(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=5000;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS event_models (
                uuid             TEXT PRIMARY KEY,
                producer_id      TEXT    NOT NULL,
                event_category   TEXT    NOT NULL,
                event_identifier TEXT    NOT NULL,
                created_at       INTEGER NOT NULL,
                last_seen        INTEGER NOT NULL,
                private_data     TEXT    NOT NULL,
                UNIQUE(producer_id, event_category, event_identifier)
            );

            CREATE TABLE IF NOT EXISTS schema_versions (
                uuid        TEXT PRIMARY KEY,
                model_uuid  TEXT    NOT NULL REFERENCES event_models(uuid),
                schema_hash TEXT    NOT NULL,
                schema_json TEXT    NOT NULL,
                first_seen  INTEGER NOT NULL,
                last_seen   INTEGER NOT NULL,
                total_count INTEGER NOT NULL,
                UNIQUE(model_uuid, schema_hash)
            );
            CREATE INDEX IF NOT EXISTS idx_schema_versions_model
                ON schema_versions(model_uuid, last_seen DESC);
            "#,
        )
        .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SchemaStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl SchemaStore for SqliteSchemaStore {
    async fn flush(&self, batch: &FlushBatch) -> StoreResult<()> {
        let model_rows: Vec<ModelRow> = batch
            .models
            .iter()
            .map(ModelRow::try_from_snapshot)
            .collect::<StoreResult<_>>()?;
        let version_rows: Vec<VersionRow> = batch
            .versions
            .iter()
            .map(VersionRow::try_from_version)
            .collect::<StoreResult<_>>()?;

        let explain = self.log_query_plans;
        db!(self.conn, move |conn: &mut Connection| {
            let tx = conn.transaction().map_err(db_err)?;

            if explain {
                log_query_plan(&tx, "upsert event_models", UPSERT_MODEL_SQL);
                log_query_plan(&tx, "upsert schema_versions", UPSERT_VERSION_SQL);
            }

            for row in &model_rows {
                tx.execute(
                    UPSERT_MODEL_SQL,
                    params![
                        row.uuid,
                        row.producer_id,
                        row.category,
                        row.identifier,
                        row.created_at,
                        row.last_seen,
                        row.private_data,
                    ],
                )
                .map_err(db_err)?;
            }
            for row in &version_rows {
                tx.execute(
                    UPSERT_VERSION_SQL,
                    params![
                        row.uuid,
                        row.model_uuid,
                        row.schema_hash,
                        row.schema_json,
                        row.first_seen,
                        row.last_seen,
                        row.total_count,
                    ],
                )
                .map_err(db_err)?;
            }
            tx.commit().map_err(db_err)
        })
    }

    async fn load_models(&self) -> StoreResult<Vec<EventModel>> {
        let explain = self.log_query_plans;
        let raw: Vec<RawModel> = db!(self.conn, move |conn: &mut Connection| {
            if explain {
                log_query_plan(conn, "load event_models", SELECT_MODELS_SQL);
            }
            let mut stmt = conn.prepare(SELECT_MODELS_SQL).map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RawModel {
                        uuid: row.get(0)?,
                        producer_id: row.get(1)?,
                        category: row.get(2)?,
                        identifier: row.get(3)?,
                        created_at: row.get(4)?,
                        last_seen: row.get(5)?,
                    })
                })
                .map_err(db_err)?;
            rows.map(|r| r.map_err(db_err)).collect()
        })?;

        raw.into_iter().map(RawModel::into_model).collect()
    }

    async fn load_versions(&self) -> StoreResult<Vec<SchemaVersion>> {
        let explain = self.log_query_plans;
        let raw: Vec<RawVersion> = db!(self.conn, move |conn: &mut Connection| {
            if explain {
                log_query_plan(conn, "load schema_versions", SELECT_VERSIONS_SQL);
            }
            let mut stmt = conn.prepare(SELECT_VERSIONS_SQL).map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RawVersion {
                        uuid: row.get(0)?,
                        model_uuid: row.get(1)?,
                        schema_hash: row.get(2)?,
                        schema_json: row.get(3)?,
                        first_seen: row.get(4)?,
                        last_seen: row.get(5)?,
                        total_count: row.get(6)?,
                    })
                })
                .map_err(db_err)?;
            rows.map(|r| r.map_err(db_err)).collect()
        })?;

        raw.into_iter().map(RawVersion::into_version).collect()
    }

    async fn load_counters(
        &self,
        model_uuid: Uuid,
    ) -> StoreResult<Vec<FrequencyCounter>> {
        let key = model_uuid.to_string();
        let explain = self.log_query_plans;
        let blob: Option<String> = db!(self.conn, move |conn: &mut Connection| {
            if explain {
                log_query_plan(conn, "load private_data", SELECT_COUNTERS_SQL);
            }
            conn.query_row(SELECT_COUNTERS_SQL, params![key], |row| row.get(0))
                .optional()
                .map_err(db_err)
        })?;

        match blob {
            Some(json) => {
                let private: PrivateData = serde_json::from_str(&json)?;
                Ok(private.frequency_counters)
            }
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

struct ModelRow {
    uuid: String,
    producer_id: String,
    category: String,
    identifier: String,
    created_at: i64,
    last_seen: i64,
    private_data: String,
}

impl ModelRow {
    fn try_from_snapshot(
        snapshot: &eventshape_core::ModelSnapshot,
    ) -> StoreResult<Self> {
        Ok(Self {
            uuid: snapshot.model.uuid.to_string(),
            producer_id: snapshot.model.identity.producer_id.clone(),
            category: snapshot.model.identity.category.clone(),
            identifier: snapshot.model.identity.identifier.clone(),
            created_at: datetime_to_ms(snapshot.model.created_at),
            last_seen: datetime_to_ms(snapshot.model.last_seen),
            private_data: serde_json::to_string(&snapshot.private_data)?,
        })
    }
}

struct VersionRow {
    uuid: String,
    model_uuid: String,
    schema_hash: String,
    schema_json: String,
    first_seen: i64,
    last_seen: i64,
    total_count: i64,
}

impl VersionRow {
    fn try_from_version(version: &SchemaVersion) -> StoreResult<Self> {
        Ok(Self {
            uuid: version.uuid.to_string(),
            model_uuid: version.model_uuid.to_string(),
            schema_hash: version.schema_hash.clone(),
            schema_json: serde_json::to_string(&version.shape)?,
            first_seen: datetime_to_ms(version.first_seen),
            last_seen: datetime_to_ms(version.last_seen),
            total_count: version.total_count as i64,
        })
    }
}

struct RawModel {
    uuid: String,
    producer_id: String,
    category: String,
    identifier: String,
    created_at: i64,
    last_seen: i64,
}

impl RawModel {
    fn into_model(self) -> StoreResult<EventModel> {
        Ok(EventModel {
            uuid: parse_uuid(&self.uuid)?,
            identity: EventIdentity::new(
                self.producer_id,
                self.category,
                self.identifier,
            ),
            created_at: ms_to_datetime(self.created_at),
            last_seen: ms_to_datetime(self.last_seen),
            latest_schema_hash: None,
        })
    }
}

struct RawVersion {
    uuid: String,
    model_uuid: String,
    schema_hash: String,
    schema_json: String,
    first_seen: i64,
    last_seen: i64,
    total_count: i64,
}

impl RawVersion {
    fn into_version(self) -> StoreResult<SchemaVersion> {
        Ok(SchemaVersion {
            uuid: parse_uuid(&self.uuid)?,
            model_uuid: parse_uuid(&self.model_uuid)?,
            schema_hash: self.schema_hash,
            shape: serde_json::from_str(&self.schema_json)?,
            first_seen: ms_to_datetime(self.first_seen),
            last_seen: ms_to_datetime(self.last_seen),
            total_count: self.total_count.max(0) as u64,
        })
    }
}

fn parse_uuid(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| StoreError::Data(format!("bad uuid '{raw}': {e}")))
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Log the plan SQLite chose for `sql`. Diagnostic only; a failure here
/// never fails the calling operation.
fn log_query_plan(conn: &Connection, label: &str, sql: &str) {
    let mut stmt = match conn.prepare(&format!("EXPLAIN QUERY PLAN {sql}")) {
        Ok(stmt) => stmt,
        Err(err) => {
            debug!(statement = label, error = %err, "query plan unavailable");
            return;
        }
    };
    let rows = match stmt.query_map([], |row| row.get::<_, String>(3)) {
        Ok(rows) => rows,
        Err(err) => {
            debug!(statement = label, error = %err, "query plan unavailable");
            return;
        }
    };
    for step in rows.flatten() {
        debug!(statement = label, step = %step, "query plan");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
