// 🗄️ Attribute Store - families, values and their join in SQLite
//
// The store handle owns the connection pool. Every unit of work runs in a
// Session: open → zero or more queries → commit → close. A session is used by
// one resolution at a time; concurrent resolutions open their own.

use crate::catalog::{
    AttributeCatalog, AttributeFamily, DataType, FamilyId, Multiplicity, RejectedFamily,
};
use crate::config::ResolverConfig;
use crate::error::{StoreError, StoreResult};
use crate::pool::{ConnectionFactory, ConnectionPool, FileFactory, MemoryFactory, PooledConnection};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, error, warn};
use uuid::Uuid;

// ============================================================================
// FALLBACK POLICIES
// ============================================================================

/// Declared type reported for an external id the catalog does not know, so
/// unresolvable attributes still round-trip as opaque strings.
pub const UNKNOWN_FAMILY_TYPE: DataType = DataType::String;

/// Declared type of the empty result returned when the entity id is not a
/// numeric store key.
pub const MALFORMED_ENTITY_TYPE: DataType = DataType::String;

// ============================================================================
// RAW RESULT
// ============================================================================

/// Raw values for one (entity, family) pair.
///
/// `declared_type` is `None` when the family is unknown. A known family with
/// no values for the entity has an empty `values` set and `Some` type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawAttributeResult {
    pub values: BTreeSet<String>,
    pub declared_type: Option<DataType>,
}

impl RawAttributeResult {
    pub fn new(values: BTreeSet<String>, declared_type: Option<DataType>) -> Self {
        RawAttributeResult { values, declared_type }
    }

    /// The family is not defined in the catalog.
    pub fn unknown_family() -> Self {
        Self::default()
    }

    /// Empty-but-typed result for an entity id that is not a store key.
    pub fn malformed_entity() -> Self {
        RawAttributeResult {
            values: BTreeSet::new(),
            declared_type: Some(MALFORMED_ENTITY_TYPE),
        }
    }

    pub fn has_type(&self) -> bool {
        self.declared_type.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// SCHEMA BOOTSTRAP
// ============================================================================

/// Create the family, value and joined-entry relations if they are missing.
pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // ==========================================================================
    // Attribute families (external_id is NOT unique: duplicates are tolerated)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attribute_families (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT NOT NULL,
            data_type TEXT NOT NULL,
            multiplicity TEXT NOT NULL DEFAULT 'Single'
        )",
        [],
    )?;

    // ==========================================================================
    // Attribute values, keyed by family + numeric entity id
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attribute_values (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            family_id INTEGER NOT NULL REFERENCES attribute_families(id),
            entity_id INTEGER NOT NULL,
            value TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE VIEW IF NOT EXISTS attribute_entries AS
         SELECT f.id AS family_id, f.external_id, f.data_type, v.entity_id, v.value
         FROM attribute_families f
         INNER JOIN attribute_values v ON v.family_id = f.id",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_families_external ON attribute_families(external_id, id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_values_family_entity ON attribute_values(family_id, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// STORE HANDLE
// ============================================================================

/// AttributeStore - explicit handle constructed once at process start
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct AttributeStore {
    pool: ConnectionPool,
}

impl AttributeStore {
    pub fn new(factory: impl ConnectionFactory, config: &ResolverConfig) -> StoreResult<Self> {
        Ok(AttributeStore {
            pool: ConnectionPool::new(factory, config)?,
        })
    }

    /// Store backed by the database file named in the config.
    pub fn from_config(config: &ResolverConfig) -> StoreResult<Self> {
        Self::new(FileFactory::new(&config.database_path), config)
    }

    /// Private in-memory store with the schema already created.
    pub fn in_memory(config: &ResolverConfig) -> StoreResult<Self> {
        let store = Self::new(MemoryFactory::new(), config)?;
        let conn = store.pool.checkout()?;
        setup_database(&conn)?;
        Ok(store)
    }

    /// Check out a connection and start a manual-commit, read-committed session.
    pub fn open(&self, read_only: bool) -> StoreResult<Session> {
        let mut conn = self.pool.checkout()?;

        if let Err(e) = configure_session(&conn, read_only) {
            error!("Cannot open connection: {}", e);
            conn.mark_broken();
            return Err(StoreError::Connection { message: e.to_string() });
        }

        let session = Session {
            id: Uuid::new_v4(),
            conn,
            read_only,
            closed: false,
        };
        debug!(session = %session.id, read_only, "Session opened");
        Ok(session)
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

fn configure_session(conn: &Connection, read_only: bool) -> rusqlite::Result<()> {
    conn.pragma_update(None, "query_only", read_only)?;
    conn.pragma_update(None, "read_uncommitted", false)?;
    conn.execute_batch("BEGIN DEFERRED")?;
    Ok(())
}

// ============================================================================
// SESSION
// ============================================================================

/// One checked-out connection plus its cached prepared statements.
///
/// Closing is idempotent and also happens on drop, so the connection is
/// released on every exit path.
pub struct Session {
    id: Uuid,
    conn: PooledConnection,
    read_only: bool,
    closed: bool,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Every external attribute identifier known to the catalog.
    pub fn supported_identifiers(&self) -> StoreResult<BTreeSet<String>> {
        self.conn.arm_query_deadline();
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT external_id FROM attribute_families")?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(|e| {
                error!("Could not fetch attribute identifiers: {}", e);
                StoreError::from(e)
            })?;

        Ok(ids)
    }

    /// Internal family key; the lowest id wins when several rows share the name.
    pub fn resolve_family_id(&self, external_id: &str) -> StoreResult<Option<FamilyId>> {
        Ok(self
            .lookup_family(external_id)?
            .map(|(family_id, _)| family_id))
    }

    /// Declared data type, or [`UNKNOWN_FAMILY_TYPE`] for an unknown id.
    pub fn resolve_data_type(&self, external_id: &str) -> StoreResult<DataType> {
        match self.lookup_family(external_id)? {
            Some((_, raw_type)) => parse_data_type(external_id, &raw_type),
            None => {
                debug!(
                    "Unknown attribute family [{}], defaulting to {}",
                    external_id, UNKNOWN_FAMILY_TYPE
                );
                Ok(UNKNOWN_FAMILY_TYPE)
            }
        }
    }

    fn lookup_family(&self, external_id: &str) -> StoreResult<Option<(FamilyId, String)>> {
        self.conn.arm_query_deadline();
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, data_type FROM attribute_families WHERE external_id = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![external_id], |row| {
                Ok((row.get::<_, FamilyId>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if rows.len() > 1 {
            warn_duplicate_family(external_id, rows.len());
        }

        Ok(rows.into_iter().next())
    }

    /// Raw values of `external_id` for `entity_id`, with the family's declared
    /// type, in a single joined round trip.
    pub fn fetch_raw_values(
        &self,
        entity_id: &str,
        external_id: &str,
    ) -> StoreResult<RawAttributeResult> {
        let entity_key: i64 = match entity_id.parse() {
            Ok(key) => key,
            Err(_) => {
                let err = StoreError::MalformedEntityId {
                    entity_id: entity_id.to_string(),
                };
                warn!(
                    "Cannot look up [{}]: {} - returning no value",
                    external_id, err
                );
                return Ok(RawAttributeResult::malformed_entity());
            }
        };

        debug!(
            "Fetching attribute with family [{}] and entity id [{}]...",
            external_id, entity_key
        );
        self.conn.arm_query_deadline();

        let mut stmt = self.conn.prepare_cached(
            "SELECT f.data_type, v.value,
                    (SELECT COUNT(*) FROM attribute_families d WHERE d.external_id = f.external_id)
             FROM attribute_families f
             LEFT JOIN attribute_values v ON v.family_id = f.id AND v.entity_id = ?2
             WHERE f.id = (SELECT MIN(id) FROM attribute_families WHERE external_id = ?1)",
        )?;

        let rows = stmt
            .query_map(params![external_id, entity_key], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                error!("Cannot execute query: {}", e);
                StoreError::from(e)
            })?;

        let Some((raw_type, _, definitions)) = rows.first() else {
            return Ok(RawAttributeResult::unknown_family());
        };

        if *definitions > 1 {
            warn_duplicate_family(external_id, *definitions as usize);
        }

        let declared_type = parse_data_type(external_id, raw_type)?;
        let values = rows
            .into_iter()
            .filter_map(|(_, value, _)| value)
            .collect::<BTreeSet<_>>();

        Ok(RawAttributeResult::new(values, Some(declared_type)))
    }

    /// Snapshot of every family; rows with unknown types or malformed names
    /// are rejected individually.
    pub fn load_catalog(&self) -> StoreResult<AttributeCatalog> {
        self.conn.arm_query_deadline();
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, external_id, data_type, multiplicity FROM attribute_families ORDER BY id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, FamilyId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut catalog = AttributeCatalog::new();
        for (id, external_id, raw_type, raw_multiplicity) in rows {
            match build_family(id, &external_id, &raw_type, &raw_multiplicity) {
                Ok(family) => catalog.register(family),
                Err(e) => {
                    warn!("Skipping attribute family #{}: {}", id, e);
                    catalog.reject(RejectedFamily {
                        id,
                        external_name: external_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        for name in catalog.duplicates() {
            warn!("Attribute family [{}] is defined more than once", name);
        }

        Ok(catalog)
    }

    // ========================================================================
    // WRITES (import and tests)
    // ========================================================================

    pub fn insert_family(
        &self,
        external_id: &str,
        data_type: DataType,
        multiplicity: Multiplicity,
    ) -> StoreResult<FamilyId> {
        self.conn.arm_query_deadline();
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO attribute_families (external_id, data_type, multiplicity)
             VALUES (?1, ?2, ?3)",
        )?;
        stmt.execute(params![external_id, data_type.name(), multiplicity.name()])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_value(&self, family_id: FamilyId, entity_id: i64, value: &str) -> StoreResult<()> {
        self.conn.arm_query_deadline();
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO attribute_values (family_id, entity_id, value) VALUES (?1, ?2, ?3)",
        )?;
        stmt.execute(params![family_id, entity_id, value])?;
        Ok(())
    }

    /// Family id for `external_id`, creating the family if it is missing.
    pub fn ensure_family(
        &self,
        external_id: &str,
        data_type: DataType,
        multiplicity: Multiplicity,
    ) -> StoreResult<FamilyId> {
        self.conn.arm_query_deadline();
        let existing: Option<FamilyId> = self
            .conn
            .query_row(
                "SELECT MIN(id) FROM attribute_families WHERE external_id = ?1",
                params![external_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        match existing {
            Some(id) => Ok(id),
            None => self.insert_family(external_id, data_type, multiplicity),
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Commit pending writes and stay in manual-commit mode.
    pub fn commit(&mut self) -> StoreResult<()> {
        self.conn.arm_query_deadline();
        self.conn.execute_batch("COMMIT; BEGIN DEFERRED").map_err(|e| {
            error!("Cannot commit: {}", e);
            StoreError::from(e)
        })
    }

    /// Release the connection. Cleanup errors are logged and returned, never
    /// raised; a connection that failed cleanup is discarded.
    #[must_use = "cleanup errors are logged; bind to `_` to ignore them"]
    pub fn close(mut self) -> Vec<StoreError> {
        self.cleanup()
    }

    fn cleanup(&mut self) -> Vec<StoreError> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        self.conn.disarm_query_deadline();

        let mut errors = Vec::new();
        if !self.conn.is_autocommit() {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                errors.push(StoreError::from(e));
            }
        }
        if let Err(e) = self.conn.pragma_update(None, "query_only", false) {
            errors.push(StoreError::from(e));
        }

        for e in &errors {
            error!(session = %self.id, "Error when closing connection to the database: {}", e);
        }
        if !errors.is_empty() {
            self.conn.mark_broken();
        }

        debug!(session = %self.id, "Session closed");
        errors
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn warn_duplicate_family(external_id: &str, definitions: usize) {
    warn!(
        "Attribute family [{}] is defined {} times, using the lowest id",
        external_id, definitions
    );
}

fn parse_data_type(external_id: &str, raw: &str) -> StoreResult<DataType> {
    raw.parse().map_err(|value| {
        let err = StoreError::UnknownDataType {
            external_id: external_id.to_string(),
            value,
        };
        error!("{}", err);
        err
    })
}

fn build_family(
    id: FamilyId,
    external_id: &str,
    raw_type: &str,
    raw_multiplicity: &str,
) -> StoreResult<AttributeFamily> {
    let data_type: DataType = raw_type.parse().map_err(|value| StoreError::UnknownDataType {
        external_id: external_id.to_string(),
        value,
    })?;
    let multiplicity: Multiplicity =
        raw_multiplicity
            .parse()
            .map_err(|value| StoreError::UnknownMultiplicity {
                external_id: external_id.to_string(),
                value,
            })?;
    Ok(AttributeFamily::new(id, multiplicity, data_type, external_id)?)
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("read_only", &self.read_only)
            .field("closed", &self.closed)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AttributeStore {
        AttributeStore::in_memory(&ResolverConfig {
            max_pool_size: 4,
            checkout_timeout_ms: 100,
            ..ResolverConfig::default()
        })
        .unwrap()
    }

    fn seed(store: &AttributeStore) {
        let mut s = store.open(false).unwrap();
        let dept = s.insert_family("subject:department", DataType::String, Multiplicity::Multi).unwrap();
        let age = s.insert_family("subject:age", DataType::Integer, Multiplicity::Single).unwrap();
        s.insert_family("subject:clearance", DataType::Boolean, Multiplicity::Single).unwrap();
        s.insert_value(dept, 1, "sales").unwrap();
        s.insert_value(dept, 1, "legal").unwrap();
        s.insert_value(dept, 1, "sales").unwrap();
        s.insert_value(dept, 2, "it").unwrap();
        s.insert_value(age, 1, "42").unwrap();
        s.commit().unwrap();
        assert!(s.close().is_empty());
    }

    #[test]
    fn test_supported_identifiers() {
        let store = store();
        let s = store.open(true).unwrap();
        assert!(s.supported_identifiers().unwrap().is_empty());
        drop(s);

        seed(&store);
        let s = store.open(true).unwrap();
        let ids = s.supported_identifiers().unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("subject:department"));
    }

    #[test]
    fn test_fetch_collapses_duplicates() {
        let store = store();
        seed(&store);
        let s = store.open(true).unwrap();

        let raw = s.fetch_raw_values("1", "subject:department").unwrap();
        assert_eq!(raw.declared_type, Some(DataType::String));
        assert_eq!(
            raw.values.into_iter().collect::<Vec<_>>(),
            vec!["legal".to_string(), "sales".to_string()]
        );
    }

    #[test]
    fn test_known_family_without_values_is_typed_and_empty() {
        let store = store();
        seed(&store);
        let s = store.open(true).unwrap();

        let raw = s.fetch_raw_values("99", "subject:age").unwrap();
        assert!(raw.is_empty());
        assert_eq!(raw.declared_type, Some(DataType::Integer));
    }

    #[test]
    fn test_unknown_family_has_no_type() {
        let store = store();
        seed(&store);
        let s = store.open(true).unwrap();

        let raw = s.fetch_raw_values("1", "subject:nope").unwrap();
        assert_eq!(raw, RawAttributeResult::unknown_family());
        assert!(!raw.has_type());
    }

    #[test]
    fn test_malformed_entity_id_is_empty_string_typed() {
        let store = store();
        seed(&store);
        let s = store.open(true).unwrap();

        for bad in ["environment", "", "12abc", "1.5", "99999999999999999999"] {
            let raw = s.fetch_raw_values(bad, "subject:department").unwrap();
            assert!(raw.is_empty(), "{bad}");
            assert_eq!(raw.declared_type, Some(MALFORMED_ENTITY_TYPE));
        }
    }

    #[test]
    fn test_resolve_data_type_is_stable_and_defaults_to_string() {
        let store = store();
        seed(&store);
        let s = store.open(true).unwrap();

        for _ in 0..3 {
            assert_eq!(s.resolve_data_type("subject:age").unwrap(), DataType::Integer);
            assert_eq!(s.resolve_data_type("subject:clearance").unwrap(), DataType::Boolean);
        }
        assert_eq!(s.resolve_data_type("subject:nope").unwrap(), UNKNOWN_FAMILY_TYPE);
        assert_eq!(s.resolve_family_id("subject:nope").unwrap(), None);
    }

    #[test]
    fn test_duplicate_family_picks_lowest_id() {
        let store = store();
        let mut s = store.open(false).unwrap();
        let first = s.insert_family("object:owner", DataType::Integer, Multiplicity::Single).unwrap();
        let second = s.insert_family("object:owner", DataType::String, Multiplicity::Single).unwrap();
        s.insert_value(first, 5, "7").unwrap();
        s.insert_value(second, 5, "bob").unwrap();
        s.commit().unwrap();

        assert_eq!(s.resolve_family_id("object:owner").unwrap(), Some(first));
        assert_eq!(s.resolve_data_type("object:owner").unwrap(), DataType::Integer);

        let raw = s.fetch_raw_values("5", "object:owner").unwrap();
        assert_eq!(raw.declared_type, Some(DataType::Integer));
        assert_eq!(raw.values.into_iter().collect::<Vec<_>>(), vec!["7".to_string()]);
    }

    #[test]
    fn test_unknown_data_type_fails_only_that_family() {
        let store = store();
        seed(&store);
        let mut s = store.open(false).unwrap();
        s.connection()
            .execute(
                "INSERT INTO attribute_families (external_id, data_type) VALUES ('subject:height', 'Float')",
                [],
            )
            .unwrap();
        s.commit().unwrap();

        let err = s.fetch_raw_values("1", "subject:height").unwrap_err();
        assert!(matches!(err, StoreError::UnknownDataType { .. }));
        assert!(s.fetch_raw_values("1", "subject:age").is_ok());

        let catalog = s.load_catalog().unwrap();
        assert_eq!(catalog.count(), 3);
        assert_eq!(catalog.rejected().len(), 1);
        assert_eq!(catalog.rejected()[0].external_name, "subject:height");
    }

    #[test]
    fn test_catalog_rejects_unknown_multiplicity() {
        let store = store();
        seed(&store);
        let s = store.open(false).unwrap();
        s.connection()
            .execute(
                "INSERT INTO attribute_families (external_id, data_type, multiplicity)
                 VALUES ('subject:alias', 'String', 'Many')",
                [],
            )
            .unwrap();

        assert!(matches!(
            build_family(99, "subject:alias", "String", "Many"),
            Err(StoreError::UnknownMultiplicity { .. })
        ));
        assert!(matches!(
            build_family(99, "alias", "String", "Single"),
            Err(StoreError::InvalidFamily(_))
        ));

        let catalog = s.load_catalog().unwrap();
        assert_eq!(catalog.count(), 3);
        assert_eq!(catalog.rejected().len(), 1);
        assert!(catalog.rejected()[0].reason.contains("Many"));
    }

    #[test]
    fn test_read_only_session_rejects_writes() {
        let store = store();
        let s = store.open(true).unwrap();
        assert!(s.is_read_only());
        assert!(s
            .insert_family("subject:x", DataType::String, Multiplicity::Single)
            .is_err());
    }

    #[test]
    fn test_close_without_commit_rolls_back() {
        let store = store();
        let s = store.open(false).unwrap();
        s.insert_family("subject:temp", DataType::String, Multiplicity::Single).unwrap();
        assert!(s.close().is_empty());

        let s = store.open(true).unwrap();
        assert!(s.supported_identifiers().unwrap().is_empty());
    }

    #[test]
    fn test_failed_cleanup_discards_connection() {
        use rusqlite::hooks::{AuthContext, Authorization};

        let store = store();
        let _other = store.open(true).unwrap();
        let s = store.open(false).unwrap();
        assert_eq!(store.pool().live(), 2);

        // Deny every statement so ROLLBACK and the pragma reset both fail
        s.connection()
            .authorizer(Some(|_: AuthContext<'_>| Authorization::Deny));

        let errors = s.close();
        assert_eq!(errors.len(), 2);
        assert_eq!(store.pool().live(), 1);
        assert_eq!(store.pool().idle(), 0);
    }

    #[test]
    fn test_long_query_fails_as_unavailable() {
        let store = AttributeStore::in_memory(&ResolverConfig {
            query_timeout_ms: 50,
            ..ResolverConfig::default()
        })
        .unwrap();
        let s = store.open(false).unwrap();
        let family = s.insert_family("subject:n", DataType::Integer, Multiplicity::Multi).unwrap();
        for n in 0..200 {
            s.insert_value(family, n, &n.to_string()).unwrap();
        }

        // A four-way self join runs far beyond the deadline
        s.conn.arm_query_deadline();
        let err = s
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM attribute_values a, attribute_values b,
                                      attribute_values c, attribute_values d",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(StoreError::from)
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));

        // The session is still usable for the next, bounded query
        assert_eq!(s.resolve_family_id("subject:n").unwrap(), Some(family));
    }

    #[test]
    fn test_session_returns_connection_on_drop() {
        let store = store();
        let idle_before = store.pool().idle();
        {
            let _s = store.open(true).unwrap();
            assert_eq!(store.pool().idle(), idle_before - 1);
        }
        assert_eq!(store.pool().idle(), idle_before);
    }

    #[test]
    fn test_ensure_family_reuses_existing() {
        let store = store();
        let s = store.open(false).unwrap();
        let a = s.ensure_family("subject:role", DataType::String, Multiplicity::Multi).unwrap();
        let b = s.ensure_family("subject:role", DataType::String, Multiplicity::Multi).unwrap();
        assert_eq!(a, b);
    }
}
