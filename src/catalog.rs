// 🏛️ Attribute Catalog - Family Model
// An attribute family is the storage-side definition of an external attribute id:
// its declared data type and cardinality.

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Internal key of an attribute family row.
pub type FamilyId = i64;

// ============================================================================
// DATA TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Boolean,
    Integer,
    DateTime,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::String => "String",
            DataType::Boolean => "Boolean",
            DataType::Integer => "Integer",
            DataType::DateTime => "DateTime",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage strings are matched exactly; anything else is unknown.
impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "String" => Ok(DataType::String),
            "Boolean" => Ok(DataType::Boolean),
            "Integer" => Ok(DataType::Integer),
            "DateTime" => Ok(DataType::DateTime),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    Single,
    Multi,
}

impl Multiplicity {
    pub fn name(&self) -> &'static str {
        match self {
            Multiplicity::Single => "Single",
            Multiplicity::Multi => "Multi",
        }
    }
}

impl FromStr for Multiplicity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Single" => Ok(Multiplicity::Single),
            "Multi" => Ok(Multiplicity::Multi),
            other => Err(other.to_string()),
        }
    }
}

// ============================================================================
// ATTRIBUTE FAMILY
// ============================================================================

/// AttributeFamily - immutable once constructed
///
/// `short_name` is the part of `external_name` after its namespace prefix,
/// e.g. `subject:department` → `department`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFamily {
    id: FamilyId,
    multiplicity: Multiplicity,
    data_type: DataType,
    external_name: String,
    short_name: String,
}

impl AttributeFamily {
    pub fn new(
        id: FamilyId,
        multiplicity: Multiplicity,
        data_type: DataType,
        external_name: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        let external_name = external_name.into();
        let short_name = derive_short_name(&external_name)?.to_string();
        Ok(AttributeFamily {
            id,
            multiplicity,
            data_type,
            external_name,
            short_name,
        })
    }

    pub fn id(&self) -> FamilyId {
        self.id
    }

    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn external_name(&self) -> &str {
        &self.external_name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }
}

/// Strips the namespace prefix (everything up to and including the first ':').
pub fn derive_short_name(external_name: &str) -> Result<&str, CatalogError> {
    match external_name.split_once(':') {
        Some((namespace, rest)) if !namespace.is_empty() => {
            if rest.is_empty() {
                Err(CatalogError::EmptyShortName(external_name.to_string()))
            } else {
                Ok(rest)
            }
        }
        _ => Err(CatalogError::MissingNamespace(external_name.to_string())),
    }
}

// ============================================================================
// CATALOG SNAPSHOT
// ============================================================================

/// A family row that could not be turned into an [`AttributeFamily`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedFamily {
    pub id: FamilyId,
    pub external_name: String,
    pub reason: String,
}

/// AttributeCatalog - snapshot of every family known to the store
///
/// Several rows may carry the same external name (a data-quality anomaly);
/// lookups by name always pick the lowest internal id.
#[derive(Debug, Clone, Default)]
pub struct AttributeCatalog {
    by_name: BTreeMap<String, Vec<AttributeFamily>>,
    rejected: Vec<RejectedFamily>,
}

impl AttributeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a family; keeps each name's definitions sorted by id.
    pub fn register(&mut self, family: AttributeFamily) {
        let entries = self.by_name.entry(family.external_name.clone()).or_default();
        let pos = entries.partition_point(|f| f.id < family.id);
        entries.insert(pos, family);
    }

    pub fn reject(&mut self, rejected: RejectedFamily) {
        self.rejected.push(rejected);
    }

    /// Family for an external name; lowest id wins on duplicates.
    pub fn get(&self, external_name: &str) -> Option<&AttributeFamily> {
        self.by_name.get(external_name).and_then(|v| v.first())
    }

    pub fn get_by_short_name(&self, short_name: &str) -> Option<&AttributeFamily> {
        self.by_name
            .values()
            .filter_map(|v| v.first())
            .find(|f| f.short_name == short_name)
    }

    /// External names defined by more than one family row.
    pub fn duplicates(&self) -> Vec<&str> {
        self.by_name
            .iter()
            .filter(|(_, v)| v.len() > 1)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    pub fn list_all(&self) -> Vec<&AttributeFamily> {
        self.by_name.values().filter_map(|v| v.first()).collect()
    }

    pub fn rejected(&self) -> &[RejectedFamily] {
        &self.rejected
    }

    pub fn count(&self) -> usize {
        self.by_name.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn family(id: FamilyId, name: &str, data_type: DataType) -> AttributeFamily {
        AttributeFamily::new(id, Multiplicity::Single, data_type, name).unwrap()
    }

    #[test]
    fn test_short_name_is_strict_suffix() {
        let f = family(1, "subject:department", DataType::String);
        assert_eq!(f.short_name(), "department");
        assert!(f.external_name().ends_with(f.short_name()));
        assert_ne!(f.external_name(), f.short_name());
    }

    #[test]
    fn test_short_name_keeps_nested_segments() {
        let f = family(1, "object:owner:id", DataType::Integer);
        assert_eq!(f.short_name(), "owner:id");
    }

    #[test]
    fn test_rejects_names_without_namespace() {
        let err = AttributeFamily::new(1, Multiplicity::Single, DataType::String, "department");
        assert_eq!(err.unwrap_err(), CatalogError::MissingNamespace("department".into()));

        let err = AttributeFamily::new(1, Multiplicity::Single, DataType::String, ":x");
        assert!(matches!(err, Err(CatalogError::MissingNamespace(_))));

        let err = AttributeFamily::new(1, Multiplicity::Single, DataType::String, "subject:");
        assert!(matches!(err, Err(CatalogError::EmptyShortName(_))));
    }

    #[test]
    fn test_data_type_parsing_is_exact() {
        assert_eq!("Integer".parse::<DataType>(), Ok(DataType::Integer));
        assert_eq!("DateTime".parse::<DataType>(), Ok(DataType::DateTime));
        assert!("integer".parse::<DataType>().is_err());
        assert!("Float".parse::<DataType>().is_err());
    }

    #[test]
    fn test_duplicate_names_pick_lowest_id() {
        let mut catalog = AttributeCatalog::new();
        catalog.register(family(9, "subject:role", DataType::Integer));
        catalog.register(family(3, "subject:role", DataType::String));
        catalog.register(family(5, "subject:role", DataType::Boolean));

        let chosen = catalog.get("subject:role").unwrap();
        assert_eq!(chosen.id(), 3);
        assert_eq!(chosen.data_type(), DataType::String);
        assert_eq!(catalog.duplicates(), vec!["subject:role"]);
        assert_eq!(catalog.count(), 1);
    }

    #[test]
    fn test_lookup_by_short_name() {
        let mut catalog = AttributeCatalog::new();
        catalog.register(family(1, "subject:age", DataType::Integer));
        catalog.register(family(2, "object:owner", DataType::String));

        assert_eq!(catalog.get_by_short_name("owner").unwrap().id(), 2);
        assert!(catalog.get_by_short_name("missing").is_none());
        assert_eq!(catalog.list_ids(), vec!["object:owner", "subject:age"]);
    }
}
