// crates/partial-state-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Partial State Store
// Description: Durable partial and target record storage backed by SQLite.
// Purpose: Persist drafts, promoted rows and the atomic promotion boundary.
// Dependencies: partial-state-core, rusqlite, serde, serde_json, thiserror, log
// ============================================================================

//! ## Overview
//! This module implements [`PartialRecordStore`], [`TargetStore`] and
//! [`TransactionalStore`] over one `SQLite` database. The target table keeps
//! every declared constraint (`NOT NULL`, `UNIQUE`, length checks); the shadow
//! table relaxes them all. Every write runs in a `BEGIN IMMEDIATE`
//! transaction, so the database write lock is held before the first read and
//! concurrent promotions of one draft serialize, even across processes.
//!
//! Security posture: database contents are untrusted. Opening a store verifies
//! the recorded shadow fingerprint and the live column layouts and fails
//! closed on drift.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use log::debug;
use log::info;
use log::warn;
use partial_state_core::Clock;
use partial_state_core::EntityName;
use partial_state_core::ErrorKind;
use partial_state_core::FieldDef;
use partial_state_core::FieldName;
use partial_state_core::FieldType;
use partial_state_core::FieldValue;
use partial_state_core::FieldValues;
use partial_state_core::HashDigest;
use partial_state_core::MirrorOptions;
use partial_state_core::PartialRecord;
use partial_state_core::PartialRecordPage;
use partial_state_core::PartialRecordStore;
use partial_state_core::PartialStateId;
use partial_state_core::SchemaBound;
use partial_state_core::SchemaError;
use partial_state_core::ShadowSchema;
use partial_state_core::StoreError;
use partial_state_core::SystemClock;
use partial_state_core::TargetRecord;
use partial_state_core::TargetLookup;
use partial_state_core::TargetRecordId;
use partial_state_core::TargetRow;
use partial_state_core::TargetSchema;
use partial_state_core::TargetStore;
use partial_state_core::Timestamp;
use partial_state_core::TransactionalStore;
use partial_state_core::UnitOfWork;
use partial_state_core::core::hash_canonical_json;
use partial_state_core::core::identifiers::PARTIAL_STATE_EXPIRY_COLUMN;
use partial_state_core::core::identifiers::PARTIAL_STATE_ID_COLUMN;
use partial_state_core::core::identifiers::TARGET_ID_COLUMN;
use partial_state_core::mirror;
use partial_state_core::validate_target;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store bookkeeping tables.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` partial state store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `read_pool_size` must be greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of read-only connections used for read path isolation.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Builds a configuration for `path` with default tuning.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: default_read_pool_size(),
        }
    }

    /// Validates configured limits and the store path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a limit is out of range or
    /// the path is unsafe.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)?;
        if self.read_pool_size == 0 {
            return Err(SqliteStoreError::Invalid(
                "read_pool_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    4
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages name tables and columns, never stored values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Database is locked by another writer past the busy timeout.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// A table constraint rejected the write.
    #[error("sqlite store constraint violation: {0}")]
    Constraint(String),
    /// Invalid configuration or stored data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Stored tables disagree with the declared schemas.
    #[error("sqlite store schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Store bookkeeping version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
}

impl SqliteStoreError {
    /// Returns the error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        StoreError::from(self.clone()).kind()
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Busy(message) => Self::Busy {
                message,
                retry_after_ms: None,
            },
            SqliteStoreError::Constraint(message) => Self::Constraint(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::SchemaMismatch(message)
            | SqliteStoreError::VersionMismatch(message) => Self::SchemaMismatch(message),
        }
    }
}

impl From<SchemaError> for SqliteStoreError {
    fn from(error: SchemaError) -> Self {
        match error {
            SchemaError::Mismatch(message) => Self::SchemaMismatch(message),
            SchemaError::Invalid(message) | SchemaError::Unsupported(message) => {
                Self::Invalid(message)
            }
        }
    }
}

/// Classifies a `rusqlite` error by its extended result code.
fn classify_db_error(error: &rusqlite::Error) -> SqliteStoreError {
    match error {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                SqliteStoreError::Busy(error.to_string())
            }
            ErrorCode::ConstraintViolation => SqliteStoreError::Constraint(error.to_string()),
            _ => SqliteStoreError::Db(error.to_string()),
        },
        _ => SqliteStoreError::Db(error.to_string()),
    }
}

/// Maps a `rusqlite` error to a store error.
fn db_error(error: &rusqlite::Error) -> StoreError {
    classify_db_error(error).into()
}

// ============================================================================
// SECTION: Table Layout
// ============================================================================

/// Expected shape of one table column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnShape {
    /// Column name.
    name: String,
    /// Declared column type.
    decl_type: String,
    /// Whether the column is declared `NOT NULL`.
    not_null: bool,
}

/// Structural part of a shadow schema that determines its stored layout.
#[derive(Serialize)]
struct ShadowLayout<'a> {
    /// Mirrored target entity.
    target_entity: &'a EntityName,
    /// Mirrored columns.
    fields: &'a [FieldDef],
    /// Shadow-only columns.
    extra_fields: &'a [FieldDef],
    /// Natural key column.
    natural_key: Option<&'a FieldName>,
    /// Whether the table carries an expiry column.
    expires: bool,
}

/// Raw shadow row read from the database.
struct RawPartial {
    /// Shadow primary key.
    id: i64,
    /// Positional column values.
    values: Vec<Value>,
    /// Expiry timestamp in unix milliseconds.
    expires_at: Option<i64>,
}

/// SQL text and schemas for one target/shadow table pair.
///
/// # Invariants
/// - Statement text is derived from the schemas once at open.
struct TableLayout {
    /// Target schema.
    target: Arc<TargetSchema>,
    /// Shadow schema.
    shadow: Arc<ShadowSchema>,
    /// Quoted shadow table name.
    shadow_table: String,
    /// Quoted target table name.
    target_table: String,
    /// `SELECT` prefix returning id, shadow columns and expiry.
    select_partial: String,
    /// `SELECT` prefix returning id and target columns.
    select_target: String,
    /// `INSERT` statement for shadow rows.
    insert_partial: String,
    /// `INSERT` statement for target rows.
    insert_target: String,
}

impl TableLayout {
    /// Derives statement text for a schema pair.
    fn new(target: Arc<TargetSchema>, shadow: Arc<ShadowSchema>) -> Self {
        let shadow_table = quote(shadow.table());
        let target_table = quote(target.table());
        let shadow_columns: Vec<String> =
            shadow.columns().map(|field| quote(field.name.as_str())).collect();
        let target_columns: Vec<String> =
            target.fields().iter().map(|field| quote(field.name.as_str())).collect();
        let expiry = if shadow.expires() {
            quote(PARTIAL_STATE_EXPIRY_COLUMN)
        } else {
            "NULL".to_string()
        };

        let mut partial_select = vec![quote(PARTIAL_STATE_ID_COLUMN)];
        partial_select.extend(shadow_columns.iter().cloned());
        partial_select.push(expiry);
        let mut target_select = vec![quote(TARGET_ID_COLUMN)];
        target_select.extend(target_columns.iter().cloned());

        let mut partial_insert = shadow_columns;
        if shadow.expires() {
            partial_insert.push(quote(PARTIAL_STATE_EXPIRY_COLUMN));
        }

        Self {
            select_partial: format!("SELECT {} FROM {shadow_table}", partial_select.join(", ")),
            select_target: format!("SELECT {} FROM {target_table}", target_select.join(", ")),
            insert_partial: insert_sql(&shadow_table, &partial_insert),
            insert_target: insert_sql(&target_table, &target_columns),
            shadow_table,
            target_table,
            target,
            shadow,
        }
    }

    /// Appends the liveness condition, binding `now` when the shadow expires.
    fn live_filter(&self, params: &mut Vec<Value>, now: Timestamp) -> String {
        if self.shadow.expires() {
            params.push(Value::Integer(now.as_unix_millis()));
            format!("{} >= ?{}", quote(PARTIAL_STATE_EXPIRY_COLUMN), params.len())
        } else {
            "1 = 1".to_string()
        }
    }

    /// Runs a shadow query and decodes every row.
    fn query_partials(
        &self,
        connection: &Connection,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<PartialRecord>, StoreError> {
        let column_count = self.shadow.column_count();
        let mut stmt = connection.prepare_cached(sql).map_err(|err| db_error(&err))?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| read_partial_row(row, column_count))
            .map_err(|err| db_error(&err))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| db_error(&err))?;
        rows.into_iter().map(|raw| self.decode_partial(raw)).collect()
    }

    /// Fetches a live shadow row.
    fn fetch_partial(
        &self,
        connection: &Connection,
        id: PartialStateId,
        now: Timestamp,
    ) -> Result<PartialRecord, StoreError> {
        let mut params = vec![Value::Integer(to_sql_id(id.get())?)];
        let live = self.live_filter(&mut params, now);
        let sql = format!(
            "{} WHERE {} = ?1 AND {live}",
            self.select_partial,
            quote(PARTIAL_STATE_ID_COLUMN)
        );
        self.query_partials(connection, &sql, params)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::missing(id))
    }

    /// Inserts a shadow row and returns its id.
    fn insert_partial(
        &self,
        connection: &Connection,
        mut row: Vec<Value>,
        expires_at: Option<Timestamp>,
    ) -> Result<PartialStateId, StoreError> {
        if let Some(expires_at) = expires_at {
            row.push(Value::Integer(expires_at.as_unix_millis()));
        }
        let mut stmt =
            connection.prepare_cached(&self.insert_partial).map_err(|err| db_error(&err))?;
        stmt.execute(params_from_iter(row)).map_err(|err| db_error(&err))?;
        let raw = connection.last_insert_rowid();
        from_sql_id(raw)
            .and_then(PartialStateId::from_raw)
            .ok_or_else(|| StoreError::Store(format!("invalid partial record id {raw}")))
    }

    /// Writes resolved columns into a live shadow row.
    fn update_partial(
        &self,
        connection: &Connection,
        id: PartialStateId,
        resolved: &[(usize, &FieldValue)],
        now: Timestamp,
    ) -> Result<(), StoreError> {
        if resolved.is_empty() {
            return self.fetch_partial(connection, id, now).map(|_| ());
        }
        let columns: Vec<&FieldDef> = self.shadow.columns().collect();
        let mut params = Vec::with_capacity(resolved.len() + 2);
        let mut assignments = Vec::with_capacity(resolved.len());
        for (index, value) in resolved {
            let column = columns.get(*index).ok_or_else(|| {
                StoreError::SchemaMismatch(format!("shadow column {index} is missing"))
            })?;
            params.push(encode_value(value));
            assignments.push(format!("{} = ?{}", quote(column.name.as_str()), params.len()));
        }
        params.push(Value::Integer(to_sql_id(id.get())?));
        let id_param = params.len();
        let live = self.live_filter(&mut params, now);
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{id_param} AND {live}",
            self.shadow_table,
            assignments.join(", "),
            quote(PARTIAL_STATE_ID_COLUMN)
        );
        let changed = connection
            .execute(&sql, params_from_iter(params))
            .map_err(|err| db_error(&err))?;
        if changed == 0 {
            return Err(StoreError::missing(id));
        }
        Ok(())
    }

    /// Deletes a live shadow row.
    fn delete_partial(
        &self,
        connection: &Connection,
        id: PartialStateId,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        let mut params = vec![Value::Integer(to_sql_id(id.get())?)];
        let live = self.live_filter(&mut params, now);
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1 AND {live}",
            self.shadow_table,
            quote(PARTIAL_STATE_ID_COLUMN)
        );
        let changed = connection
            .execute(&sql, params_from_iter(params))
            .map_err(|err| db_error(&err))?;
        if changed == 0 {
            return Err(StoreError::missing(id));
        }
        Ok(())
    }

    /// Validates and inserts a target row.
    fn insert_target(
        &self,
        connection: &Connection,
        row: &TargetRow,
    ) -> Result<TargetRecord, StoreError> {
        if let Some(violation) = validate_target(row).first() {
            return Err(StoreError::Constraint(violation.to_string()));
        }
        let values: Vec<Value> = row.values().iter().map(encode_value).collect();
        let mut stmt =
            connection.prepare_cached(&self.insert_target).map_err(|err| db_error(&err))?;
        stmt.execute(params_from_iter(values)).map_err(|err| db_error(&err))?;
        let raw = connection.last_insert_rowid();
        let id = from_sql_id(raw)
            .and_then(TargetRecordId::from_raw)
            .ok_or_else(|| StoreError::Store(format!("invalid target record id {raw}")))?;
        Ok(TargetRecord {
            id,
            row: row.clone(),
        })
    }

    /// Fetches a target row.
    fn fetch_target(
        &self,
        connection: &Connection,
        id: TargetRecordId,
    ) -> Result<TargetRecord, StoreError> {
        let column_count = self.target.fields().len();
        let sql = format!("{} WHERE {} = ?1", self.select_target, quote(TARGET_ID_COLUMN));
        let mut stmt = connection.prepare_cached(&sql).map_err(|err| db_error(&err))?;
        let raw = stmt
            .query_row(params![to_sql_id(id.get())?], |row| read_target_row(row, column_count))
            .optional()
            .map_err(|err| db_error(&err))?
            .ok_or(StoreError::TargetNotFound(id))?;
        let values = decode_values(self.target.fields().iter(), raw)?;
        Ok(TargetRecord {
            id,
            row: TargetRow::from_parts(Arc::clone(&self.target), values),
        })
    }

    /// Counts target rows.
    fn count_targets(&self, connection: &Connection) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.target_table);
        let count: i64 =
            connection.query_row(&sql, [], |row| row.get(0)).map_err(|err| db_error(&err))?;
        u64::try_from(count).map_err(|_| StoreError::Store("negative target count".to_string()))
    }

    /// Returns the lowest-id target row whose `field` equals `value`.
    fn find_target(
        &self,
        connection: &Connection,
        field: &FieldName,
        value: &FieldValue,
    ) -> Result<Option<TargetRecord>, StoreError> {
        if self.target.field(field.as_str()).is_none() {
            return Err(StoreError::Invalid(format!(
                "{} has no field {field}",
                self.target.entity()
            )));
        }
        let column_count = self.target.fields().len();
        let sql = format!(
            "{} WHERE {} IS ?1 ORDER BY {} LIMIT 1",
            self.select_target,
            quote(field.as_str()),
            quote(TARGET_ID_COLUMN)
        );
        let mut stmt = connection.prepare_cached(&sql).map_err(|err| db_error(&err))?;
        let found = stmt
            .query_row(params![encode_value(value)], |row| {
                Ok((row.get::<_, i64>(0)?, read_target_row(row, column_count)?))
            })
            .optional()
            .map_err(|err| db_error(&err))?;
        let Some((raw_id, raw)) = found else {
            return Ok(None);
        };
        let id = from_sql_id(raw_id)
            .and_then(TargetRecordId::from_raw)
            .ok_or_else(|| StoreError::Store(format!("invalid target record id {raw_id}")))?;
        let values = decode_values(self.target.fields().iter(), raw)?;
        Ok(Some(TargetRecord {
            id,
            row: TargetRow::from_parts(Arc::clone(&self.target), values),
        }))
    }

    /// Decodes a raw shadow row.
    fn decode_partial(&self, raw: RawPartial) -> Result<PartialRecord, StoreError> {
        let id = from_sql_id(raw.id)
            .and_then(PartialStateId::from_raw)
            .ok_or_else(|| StoreError::Store(format!("invalid partial record id {}", raw.id)))?;
        let values = decode_values(self.shadow.columns(), raw.values)?;
        Ok(PartialRecord::from_parts(
            id,
            Arc::clone(&self.shadow),
            values,
            raw.expires_at.map(Timestamp::from_unix_millis),
        ))
    }

    /// Returns the expected target table columns.
    fn target_shape(&self) -> Result<Vec<ColumnShape>, SqliteStoreError> {
        let mut shape = vec![ColumnShape {
            name: TARGET_ID_COLUMN.to_string(),
            decl_type: "INTEGER".to_string(),
            not_null: false,
        }];
        for field in self.target.fields() {
            shape.push(ColumnShape {
                name: field.name.as_str().to_string(),
                decl_type: column_affinity(field)?.to_string(),
                not_null: !field.nullable,
            });
        }
        Ok(shape)
    }

    /// Returns the expected shadow table columns.
    fn shadow_shape(&self) -> Result<Vec<ColumnShape>, SqliteStoreError> {
        let mut shape = vec![ColumnShape {
            name: PARTIAL_STATE_ID_COLUMN.to_string(),
            decl_type: "INTEGER".to_string(),
            not_null: false,
        }];
        for field in self.shadow.columns() {
            shape.push(ColumnShape {
                name: field.name.as_str().to_string(),
                decl_type: column_affinity(field)?.to_string(),
                not_null: false,
            });
        }
        if self.shadow.expires() {
            shape.push(ColumnShape {
                name: PARTIAL_STATE_EXPIRY_COLUMN.to_string(),
                decl_type: "INTEGER".to_string(),
                not_null: true,
            });
        }
        Ok(shape)
    }

    /// Returns `CREATE TABLE` plus index statements for the target table.
    fn target_ddl(&self) -> Result<Vec<String>, SqliteStoreError> {
        let mut columns =
            vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(TARGET_ID_COLUMN))];
        let mut statements = Vec::new();
        for field in self.target.fields() {
            let name = quote(field.name.as_str());
            let mut column = format!("{name} {}", column_affinity(field)?);
            if !field.nullable {
                column.push_str(" NOT NULL");
            }
            if field.unique || field.natural_key {
                column.push_str(" UNIQUE");
            } else if field.indexed {
                statements.push(index_sql(self.target.table(), field.name.as_str()));
            }
            if let Some(max_length) = field.max_length {
                column.push_str(&format!(" CHECK (length({name}) <= {max_length})"));
            }
            columns.push(column);
        }
        let create = format!("CREATE TABLE {} ({})", self.target_table, columns.join(", "));
        statements.insert(0, create);
        Ok(statements)
    }

    /// Returns `CREATE TABLE` plus index statements for the shadow table.
    fn shadow_ddl(&self) -> Result<Vec<String>, SqliteStoreError> {
        let mut columns =
            vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(PARTIAL_STATE_ID_COLUMN))];
        let mut statements = Vec::new();
        for field in self.shadow.columns() {
            columns.push(format!("{} {}", quote(field.name.as_str()), column_affinity(field)?));
            if field.indexed {
                statements.push(index_sql(self.shadow.table(), field.name.as_str()));
            }
        }
        if self.shadow.expires() {
            columns.push(format!("{} INTEGER NOT NULL", quote(PARTIAL_STATE_EXPIRY_COLUMN)));
            statements.push(index_sql(self.shadow.table(), PARTIAL_STATE_EXPIRY_COLUMN));
        }
        let create = format!("CREATE TABLE {} ({})", self.shadow_table, columns.join(", "));
        statements.insert(0, create);
        Ok(statements)
    }

    /// Returns the fingerprint of the stored shadow layout.
    fn shadow_fingerprint(&self) -> Result<HashDigest, SqliteStoreError> {
        let layout = ShadowLayout {
            target_entity: self.shadow.target_entity(),
            fields: self.shadow.mirrored_fields(),
            extra_fields: self.shadow.extra_fields(),
            natural_key: self.shadow.natural_key(),
            expires: self.shadow.expires(),
        };
        hash_canonical_json(&layout).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed partial state store with WAL support.
///
/// # Invariants
/// - All writes go through one mutex-guarded connection inside `BEGIN IMMEDIATE`.
/// - Reads use a round-robin pool of separate connections.
/// - Row ids come from `AUTOINCREMENT` and are never reused.
#[derive(Clone)]
pub struct SqlitePartialStateStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Schemas and statement text.
    layout: Arc<TableLayout>,
    /// Time source for expiry.
    clock: Arc<dyn Clock>,
    /// Shared writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Read connection pool used for read path isolation under WAL.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
}

impl SqlitePartialStateStore {
    /// Opens the store for a verified schema pair, creating missing tables.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::SchemaMismatch`] when the schemas disagree
    /// with each other or with the stored tables, and other
    /// [`SqliteStoreError`] variants when the database cannot be opened.
    pub fn open(
        config: SqliteStoreConfig,
        target: impl Into<Arc<TargetSchema>>,
        shadow: impl Into<Arc<ShadowSchema>>,
    ) -> Result<Self, SqliteStoreError> {
        let target = target.into();
        let shadow = shadow.into();
        shadow.verify_against(&target)?;
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let layout = TableLayout::new(target, shadow);
        let mut write_connection = open_connection(&config)?;
        initialize_schema(&mut write_connection)?;
        bind_tables(&mut write_connection, &layout)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_connection(&config)?));
        }
        debug!(
            "opened sqlite partial state store for {} at {}",
            layout.shadow.table(),
            config.path.display()
        );
        Ok(Self {
            config,
            layout: Arc::new(layout),
            clock: Arc::new(SystemClock),
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Mirrors `target` with `options` and opens the store for the pair.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when mirroring fails, otherwise as
    /// [`SqlitePartialStateStore::open`].
    pub fn open_for_target(
        config: SqliteStoreConfig,
        target: TargetSchema,
        options: &MirrorOptions,
    ) -> Result<Self, SqliteStoreError> {
        let shadow = mirror(&target, options)?;
        Self::open(config, target, shadow)
    }

    /// Replaces the clock used for expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Locks the writer connection.
    fn lock_writer(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.write_connection
            .lock()
            .map_err(|_| StoreError::Io("sqlite write mutex poisoned".to_string()))
    }

    /// Returns the next read connection using round-robin selection.
    fn read_connection(&self) -> &Mutex<Connection> {
        let len = self.read_connections.len();
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % len;
        &self.read_connections[index]
    }

    /// Runs `op` on a pooled read connection.
    fn read<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self
            .read_connection()
            .lock()
            .map_err(|_| StoreError::Io("sqlite read mutex poisoned".to_string()))?;
        op(&guard)
    }

    /// Runs `op` inside an immediate write transaction.
    fn write<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.lock_writer()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| db_error(&err))?;
        let value = op(&tx)?;
        tx.commit().map_err(|err| db_error(&err))?;
        Ok(value)
    }
}

impl SchemaBound for SqlitePartialStateStore {
    fn target_schema(&self) -> &Arc<TargetSchema> {
        &self.layout.target
    }

    fn shadow_schema(&self) -> &Arc<ShadowSchema> {
        &self.layout.shadow
    }
}

impl PartialRecordStore for SqlitePartialStateStore {
    fn create(&self, values: &FieldValues) -> Result<PartialStateId, StoreError> {
        let shadow = &self.layout.shadow;
        let resolved = values.resolve_columns(shadow)?;
        let mut row = vec![Value::Null; shadow.column_count()];
        for (index, value) in resolved {
            row[index] = encode_value(value);
        }
        let expires_at =
            shadow.state_lifetime_ms().map(|ms| self.clock.now().saturating_add_millis(ms));
        let id = self.write(|connection| self.layout.insert_partial(connection, row, expires_at))?;
        debug!("created partial record {id} in {}", shadow.table());
        Ok(id)
    }

    fn fetch(&self, id: PartialStateId) -> Result<PartialRecord, StoreError> {
        let now = self.clock.now();
        self.read(|connection| self.layout.fetch_partial(connection, id, now))
    }

    fn update(&self, id: PartialStateId, values: &FieldValues) -> Result<(), StoreError> {
        let resolved = values.resolve_columns(&self.layout.shadow)?;
        let now = self.clock.now();
        self.write(|connection| self.layout.update_partial(connection, id, &resolved, now))?;
        debug!("updated {} column(s) of partial record {id}", values.len());
        Ok(())
    }

    fn delete(&self, id: PartialStateId) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.write(|connection| self.layout.delete_partial(connection, id, now))?;
        debug!("deleted partial record {id}");
        Ok(())
    }

    fn latest_by_natural_key(&self, key: &FieldValue) -> Result<PartialRecord, StoreError> {
        let shadow = &self.layout.shadow;
        let name = shadow.natural_key().ok_or_else(|| {
            StoreError::Invalid(format!("{} declares no natural key", self.layout.target.entity()))
        })?;
        let column = shadow.column(name.as_str()).ok_or_else(|| {
            StoreError::SchemaMismatch(format!("natural key column {name} is missing"))
        })?;
        if key.is_null() || !key.conforms_to(&column.field_type) {
            return Err(StoreError::NotFound(format!("natural key {name}")));
        }
        let now = self.clock.now();
        let mut params = vec![encode_value(key)];
        let live = self.layout.live_filter(&mut params, now);
        let sql = format!(
            "{} WHERE {} = ?1 AND {live} ORDER BY {} DESC LIMIT 1",
            self.layout.select_partial,
            quote(name.as_str()),
            quote(PARTIAL_STATE_ID_COLUMN)
        );
        self.read(|connection| self.layout.query_partials(connection, &sql, params))?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("natural key {name}")))
    }

    fn list(
        &self,
        cursor: Option<PartialStateId>,
        limit: usize,
    ) -> Result<PartialRecordPage, StoreError> {
        if limit == 0 {
            return Err(StoreError::Invalid("list limit must be greater than zero".to_string()));
        }
        let below = match cursor {
            Some(cursor) => to_sql_id(cursor.get())?,
            None => i64::MAX,
        };
        let now = self.clock.now();
        let mut params = vec![Value::Integer(below)];
        let live = self.layout.live_filter(&mut params, now);
        params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        let sql = format!(
            "{} WHERE {id} < ?1 AND {live} ORDER BY {id} DESC LIMIT ?{}",
            self.layout.select_partial,
            params.len(),
            id = quote(PARTIAL_STATE_ID_COLUMN)
        );
        let items = self.read(|connection| self.layout.query_partials(connection, &sql, params))?;
        let next_cursor =
            if items.len() == limit { items.last().map(PartialRecord::id) } else { None };
        Ok(PartialRecordPage {
            items,
            next_cursor,
        })
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let shadow = &self.layout.shadow;
        if !shadow.expires() {
            return Err(StoreError::Invalid(format!(
                "{} does not use expiry timestamps",
                shadow.entity()
            )));
        }
        let now = self.clock.now();
        let sql = format!(
            "DELETE FROM {} WHERE {} < ?1",
            self.layout.shadow_table,
            quote(PARTIAL_STATE_EXPIRY_COLUMN)
        );
        let purged = self.write(|connection| {
            connection.execute(&sql, params![now.as_unix_millis()]).map_err(|err| db_error(&err))
        })?;
        info!("purged {purged} expired partial record(s) from {}", shadow.table());
        Ok(purged)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.read(|connection| {
            connection
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|err| db_error(&err))
        })?;
        self.lock_writer().map(|_| ())
    }
}

impl TargetStore for SqlitePartialStateStore {
    fn insert_target(&self, values: &FieldValues) -> Result<TargetRecord, StoreError> {
        let target = &self.layout.target;
        let row = TargetRow::from_values(Arc::clone(target), values).map_err(|unknown| {
            let names: Vec<&str> = unknown.iter().map(FieldName::as_str).collect();
            StoreError::Invalid(format!("{} has no field(s) {}", target.entity(), names.join(", ")))
        })?;
        let record = self.write(|connection| self.layout.insert_target(connection, &row))?;
        debug!("inserted target record {} into {}", record.id, target.table());
        Ok(record)
    }

    fn fetch_target(&self, id: TargetRecordId) -> Result<TargetRecord, StoreError> {
        self.read(|connection| self.layout.fetch_target(connection, id))
    }

    fn count_targets(&self) -> Result<u64, StoreError> {
        self.read(|connection| self.layout.count_targets(connection))
    }
}

// ============================================================================
// SECTION: Units of Work
// ============================================================================

/// Unit of work bound to an open immediate transaction.
struct SqliteUnit<'a> {
    /// Connection inside the open transaction.
    connection: &'a Connection,
    /// Schemas and statement text.
    layout: &'a TableLayout,
    /// Time the unit started.
    now: Timestamp,
}

impl TargetLookup for SqliteUnit<'_> {
    fn fetch_target(&self, id: TargetRecordId) -> Result<TargetRecord, StoreError> {
        self.layout.fetch_target(self.connection, id)
    }

    fn count_targets(&self) -> Result<u64, StoreError> {
        self.layout.count_targets(self.connection)
    }

    fn find_target(
        &self,
        field: &FieldName,
        value: &FieldValue,
    ) -> Result<Option<TargetRecord>, StoreError> {
        self.layout.find_target(self.connection, field, value)
    }
}

impl UnitOfWork for SqliteUnit<'_> {
    fn targets(&self) -> &dyn TargetLookup {
        self
    }

    fn fetch_partial_for_update(
        &mut self,
        id: PartialStateId,
    ) -> Result<PartialRecord, StoreError> {
        self.layout.fetch_partial(self.connection, id, self.now)
    }

    fn insert_target(&mut self, row: &TargetRow) -> Result<TargetRecord, StoreError> {
        self.layout.insert_target(self.connection, row)
    }

    fn delete_partial(&mut self, id: PartialStateId) -> Result<(), StoreError> {
        self.layout.delete_partial(self.connection, id, self.now)
    }
}

impl TransactionalStore for SqlitePartialStateStore {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self.lock_writer()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| db_error(&err))?;
        debug!("unit of work started on {}", self.layout.shadow.table());
        let mut unit = SqliteUnit {
            connection: &tx,
            layout: &self.layout,
            now: self.clock.now(),
        };
        match work(&mut unit) {
            Ok(value) => {
                tx.commit().map_err(|err| db_error(&err))?;
                debug!("unit of work committed on {}", self.layout.shadow.table());
                Ok(value)
            }
            Err(error) => {
                // Dropping an uncommitted transaction rolls it back.
                drop(tx);
                debug!("unit of work rolled back on {}", self.layout.shadow.table());
                Err(error)
            }
        }
    }
}

// ============================================================================
// SECTION: Value Conversion
// ============================================================================

/// Converts a field value into an `SQLite` value.
fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Integer(value) => Value::Integer(*value),
        FieldValue::Real(value) => Value::Real(*value),
        FieldValue::Boolean(value) => Value::Integer(i64::from(*value)),
        FieldValue::Text(value) => Value::Text(value.clone()),
        FieldValue::Blob(value) => Value::Blob(value.clone()),
    }
}

/// Converts a stored value back into a field value of the column's type.
fn decode_value(field: &FieldDef, value: Value) -> Result<FieldValue, StoreError> {
    let decoded = match (&field.field_type, value) {
        (_, Value::Null) => FieldValue::Null,
        (FieldType::Boolean, Value::Integer(raw)) => FieldValue::Boolean(raw != 0),
        (
            FieldType::Integer
            | FieldType::Reference {
                ..
            },
            Value::Integer(raw),
        ) => FieldValue::Integer(raw),
        (FieldType::Real, Value::Real(raw)) => FieldValue::Real(raw),
        (FieldType::Text, Value::Text(raw)) => FieldValue::Text(raw),
        (FieldType::Blob, Value::Blob(raw)) => FieldValue::Blob(raw),
        (field_type, other) => {
            return Err(StoreError::Store(format!(
                "column {} is {field_type} but holds {}",
                field.name,
                storage_class(&other)
            )));
        }
    };
    Ok(decoded)
}

/// Decodes positional values against their column definitions.
fn decode_values<'a>(
    fields: impl Iterator<Item = &'a FieldDef>,
    values: Vec<Value>,
) -> Result<Vec<FieldValue>, StoreError> {
    fields.zip(values).map(|(field, value)| decode_value(field, value)).collect()
}

/// Returns the `SQLite` storage class name of a value.
const fn storage_class(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Integer(_) => "integer",
        Value::Real(_) => "real",
        Value::Text(_) => "text",
        Value::Blob(_) => "blob",
    }
}

/// Reads id, shadow columns and expiry from a row.
fn read_partial_row(row: &Row<'_>, column_count: usize) -> rusqlite::Result<RawPartial> {
    let id: i64 = row.get(0)?;
    let mut values = Vec::with_capacity(column_count);
    for index in 0 .. column_count {
        values.push(row.get::<_, Value>(index + 1)?);
    }
    let expires_at: Option<i64> = row.get(column_count + 1)?;
    Ok(RawPartial {
        id,
        values,
        expires_at,
    })
}

/// Reads the target columns that follow the id column.
fn read_target_row(row: &Row<'_>, column_count: usize) -> rusqlite::Result<Vec<Value>> {
    let mut values = Vec::with_capacity(column_count);
    for index in 0 .. column_count {
        values.push(row.get::<_, Value>(index + 1)?);
    }
    Ok(values)
}

/// Converts an id into an `SQLite` integer.
fn to_sql_id(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::Invalid(format!("record id {id} out of range")))
}

/// Converts an `SQLite` integer into an id value.
fn from_sql_id(raw: i64) -> Option<u64> {
    u64::try_from(raw).ok()
}

// ============================================================================
// SECTION: DDL Helpers
// ============================================================================

/// Quotes an identifier for SQL text.
fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds an `INSERT` statement for `columns`.
fn insert_sql(table: &str, columns: &[String]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {table} DEFAULT VALUES");
    }
    let placeholders: Vec<String> =
        (1 ..= columns.len()).map(|index| format!("?{index}")).collect();
    format!("INSERT INTO {table} ({}) VALUES ({})", columns.join(", "), placeholders.join(", "))
}

/// Builds a `CREATE INDEX` statement for one column.
fn index_sql(table: &str, column: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote(&format!("idx_{table}_{column}")),
        quote(table),
        quote(column)
    )
}

/// Returns the declared column type for a field.
fn column_affinity(field: &FieldDef) -> Result<&'static str, SqliteStoreError> {
    match &field.field_type {
        FieldType::Integer
        | FieldType::Boolean
        | FieldType::Reference {
            ..
        } => Ok("INTEGER"),
        FieldType::Real => Ok("REAL"),
        FieldType::Text => Ok("TEXT"),
        FieldType::Blob => Ok("BLOB"),
        FieldType::ManyToMany {
            ..
        } => Err(SqliteStoreError::Invalid(format!(
            "many-to-many field {} cannot be stored as a column",
            field.name
        ))),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| classify_db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| classify_db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| classify_db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| classify_db_error(&err))?;
    Ok(())
}

/// Initializes the bookkeeping tables or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| classify_db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| classify_db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| classify_db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| classify_db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS partial_state_meta (
                    shadow_table TEXT NOT NULL PRIMARY KEY,
                    target_table TEXT NOT NULL,
                    layout_fingerprint TEXT NOT NULL
                );",
            )
            .map_err(|err| classify_db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| classify_db_error(&err))?;
    Ok(())
}

/// Creates missing tables for a schema pair and verifies existing ones.
fn bind_tables(connection: &mut Connection, layout: &TableLayout) -> Result<(), SqliteStoreError> {
    let fingerprint = layout.shadow_fingerprint()?;
    let fingerprint_json = serde_json::to_string(&fingerprint)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| classify_db_error(&err))?;
    let recorded: Option<(String, String)> = tx
        .query_row(
            "SELECT target_table, layout_fingerprint FROM partial_state_meta WHERE shadow_table = \
             ?1",
            params![layout.shadow.table()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|err| classify_db_error(&err))?;
    match recorded {
        Some((target_table, stored)) => {
            let stored: HashDigest = serde_json::from_str(&stored).map_err(|_| {
                SqliteStoreError::Invalid(format!(
                    "corrupt layout fingerprint for {}",
                    layout.shadow.table()
                ))
            })?;
            if target_table != layout.target.table() {
                return Err(drift(format!(
                    "{} was created for target table {target_table}",
                    layout.shadow.table()
                )));
            }
            if stored != fingerprint {
                return Err(drift(format!(
                    "{} layout fingerprint differs from the declared schemas",
                    layout.shadow.table()
                )));
            }
        }
        None => {
            tx.execute(
                "INSERT INTO partial_state_meta (shadow_table, target_table, layout_fingerprint) \
                 VALUES (?1, ?2, ?3)",
                params![layout.shadow.table(), layout.target.table(), fingerprint_json],
            )
            .map_err(|err| classify_db_error(&err))?;
        }
    }
    ensure_table(&tx, layout.target.table(), &layout.target_shape()?, &layout.target_ddl()?)?;
    ensure_table(&tx, layout.shadow.table(), &layout.shadow_shape()?, &layout.shadow_ddl()?)?;
    tx.commit().map_err(|err| classify_db_error(&err))?;
    Ok(())
}

/// Creates `table` when absent, otherwise compares its columns to `expected`.
fn ensure_table(
    connection: &Connection,
    table: &str,
    expected: &[ColumnShape],
    ddl: &[String],
) -> Result<(), SqliteStoreError> {
    let actual = table_shape(connection, table)?;
    if actual.is_empty() {
        for statement in ddl {
            connection.execute_batch(statement).map_err(|err| classify_db_error(&err))?;
        }
        debug!("created table {table}");
        return Ok(());
    }
    if actual.len() != expected.len() {
        return Err(drift(format!(
            "table {table} has {} columns, expected {}",
            actual.len(),
            expected.len()
        )));
    }
    for (found, wanted) in actual.iter().zip(expected) {
        if found.name != wanted.name
            || !found.decl_type.eq_ignore_ascii_case(&wanted.decl_type)
            || found.not_null != wanted.not_null
        {
            return Err(drift(format!(
                "table {table} column {} does not match declared column {}",
                found.name, wanted.name
            )));
        }
    }
    Ok(())
}

/// Reads the live column layout of `table`; empty when the table is absent.
fn table_shape(connection: &Connection, table: &str) -> Result<Vec<ColumnShape>, SqliteStoreError> {
    let mut stmt = connection
        .prepare("SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid")
        .map_err(|err| classify_db_error(&err))?;
    let shape = stmt
        .query_map(params![table], |row| {
            Ok(ColumnShape {
                name: row.get(0)?,
                decl_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
            })
        })
        .map_err(|err| classify_db_error(&err))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| classify_db_error(&err))?;
    Ok(shape)
}

/// Logs and builds a schema drift error.
fn drift(message: String) -> SqliteStoreError {
    warn!("schema drift detected: {message}");
    SqliteStoreError::SchemaMismatch(message)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::panic,
        reason = "Test-only assertions are permitted."
    )]

    use super::insert_sql;
    use super::quote;

    #[test]
    fn quote_escapes_embedded_quotes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn insert_sql_numbers_placeholders() {
        let columns = vec![quote("a"), quote("b")];
        assert_eq!(
            insert_sql("\"t\"", &columns),
            "INSERT INTO \"t\" (\"a\", \"b\") VALUES (?1, ?2)"
        );
        assert_eq!(insert_sql("\"t\"", &[]), "INSERT INTO \"t\" DEFAULT VALUES");
    }
}
