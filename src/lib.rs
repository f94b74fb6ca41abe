// Attribute Resolver - Core Library
// Resolves subject, resource and environment attributes for a policy engine
// from a relational attribute store. Used by the CLI, the API server and tests.

pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod import;
pub mod materialize;
pub mod pool;
pub mod resolver;
pub mod store;

// Re-export commonly used types
pub use catalog::{
    AttributeCatalog, AttributeFamily, DataType, FamilyId, Multiplicity, RejectedFamily,
};
pub use config::{ConfigError, ResolverConfig};
pub use error::{
    AttributeError, AttributeResult, CatalogError, FailureClass, Status, StoreError, StoreResult,
    STATUS_MISSING_ATTRIBUTE, STATUS_PROCESSING_ERROR,
};
pub use identity::{
    resolve_entity_id, DesignatorKind, EvaluationContext, StaticContext, ENVIRONMENT_ENTITY_ID,
    RESOURCE_ID_ATTRIBUTE, SUBJECT_ID_ATTRIBUTE,
};
pub use import::{import_files, import_records, ImportSummary};
pub use materialize::{materialize, TypedAttributeValue};
pub use pool::{ConnectionFactory, ConnectionPool, FileFactory, MemoryFactory};
pub use resolver::{AttributeResolver, EvaluationResult, FindAttributeRequest};
pub use store::{
    setup_database, AttributeStore, RawAttributeResult, Session, MALFORMED_ENTITY_TYPE,
    UNKNOWN_FAMILY_TYPE,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
