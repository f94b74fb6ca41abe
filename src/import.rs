// 📥 CSV Import - seed attribute families and values
//
// families.csv: external_id,data_type,multiplicity
// values.csv:   external_id,entity_id,value

use crate::catalog::{DataType, Multiplicity};
use crate::store::{setup_database, AttributeStore, Session};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct FamilyRecord {
    pub external_id: String,
    pub data_type: String,
    #[serde(default = "default_multiplicity")]
    pub multiplicity: String,
}

fn default_multiplicity() -> String {
    Multiplicity::Single.name().to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValueRecord {
    pub external_id: String,
    pub entity_id: i64,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub families: usize,
    pub values: usize,
    pub skipped_values: usize,
}

pub fn load_families<R: Read>(reader: R) -> Result<Vec<FamilyRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: FamilyRecord = result.context("Failed to deserialize attribute family")?;
        records.push(record);
    }
    Ok(records)
}

pub fn load_values<R: Read>(reader: R) -> Result<Vec<ValueRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: ValueRecord = result.context("Failed to deserialize attribute value")?;
        records.push(record);
    }
    Ok(records)
}

/// Write families then values in one session and commit.
///
/// Families are reused when their external id already exists. Values whose
/// family is unknown are skipped with a warning.
pub fn import_records(
    session: &mut Session,
    families: &[FamilyRecord],
    values: &[ValueRecord],
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let mut family_ids = HashMap::new();

    for record in families {
        let data_type: DataType = record
            .data_type
            .parse()
            .map_err(|v| anyhow!("Unknown data type '{}' for {}", v, record.external_id))?;
        let multiplicity: Multiplicity = record
            .multiplicity
            .parse()
            .map_err(|v| anyhow!("Unknown multiplicity '{}' for {}", v, record.external_id))?;

        let id = session.ensure_family(&record.external_id, data_type, multiplicity)?;
        family_ids.insert(record.external_id.clone(), id);
        summary.families += 1;
    }

    for record in values {
        let family_id = match family_ids.get(&record.external_id) {
            Some(id) => Some(*id),
            None => session.resolve_family_id(&record.external_id)?,
        };
        match family_id {
            Some(id) => {
                session.insert_value(id, record.entity_id, &record.value)?;
                summary.values += 1;
            }
            None => {
                warn!("Skipping value for unknown attribute family [{}]", record.external_id);
                summary.skipped_values += 1;
            }
        }
    }

    session.commit().context("Failed to commit import")?;
    info!(
        "Imported {} families, {} values ({} skipped)",
        summary.families, summary.values, summary.skipped_values
    );
    Ok(summary)
}

/// Import both CSV files into a store, creating the schema first.
pub fn import_files(
    store: &AttributeStore,
    families_csv: &Path,
    values_csv: &Path,
) -> Result<ImportSummary> {
    let families = load_families(
        std::fs::File::open(families_csv)
            .with_context(|| format!("Failed to open {}", families_csv.display()))?,
    )?;
    let values = load_values(
        std::fs::File::open(values_csv)
            .with_context(|| format!("Failed to open {}", values_csv.display()))?,
    )?;

    {
        let conn = store.pool().checkout()?;
        setup_database(&conn)?;
    }

    let mut session = store.open(false)?;
    let summary = import_records(&mut session, &families, &values)?;
    let _cleanup = session.close();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;

    const FAMILIES: &str = "external_id,data_type,multiplicity
subject:department,String,Multi
subject:age,Integer,Single
object:created,DateTime,Single
";

    const VALUES: &str = "external_id,entity_id,value
subject:department,1,sales
subject:department,1,legal
subject:age,1,42
object:created,10,\"March 4, 2014\"
subject:unknown,1,x
";

    #[test]
    fn test_parse_csv_records() {
        let families = load_families(FAMILIES.as_bytes()).unwrap();
        assert_eq!(families.len(), 3);
        assert_eq!(families[2].data_type, "DateTime");

        let values = load_values(VALUES.as_bytes()).unwrap();
        assert_eq!(values.len(), 5);
        assert_eq!(values[3].value, "March 4, 2014");
    }

    #[test]
    fn test_multiplicity_defaults_to_single() {
        let families = load_families("external_id,data_type\nsubject:x,String\n".as_bytes()).unwrap();
        assert_eq!(families[0].multiplicity, "Single");
    }

    #[test]
    fn test_import_into_store() {
        let store = AttributeStore::in_memory(&ResolverConfig::default()).unwrap();
        let families = load_families(FAMILIES.as_bytes()).unwrap();
        let values = load_values(VALUES.as_bytes()).unwrap();

        let mut session = store.open(false).unwrap();
        let summary = import_records(&mut session, &families, &values).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                families: 3,
                values: 4,
                skipped_values: 1
            }
        );

        let raw = session.fetch_raw_values("1", "subject:department").unwrap();
        assert_eq!(raw.values.len(), 2);
    }

    #[test]
    fn test_import_rejects_unknown_data_type() {
        let store = AttributeStore::in_memory(&ResolverConfig::default()).unwrap();
        let families = load_families("external_id,data_type\nsubject:x,Float\n".as_bytes()).unwrap();
        let mut session = store.open(false).unwrap();
        assert!(import_records(&mut session, &families, &[]).is_err());
    }
}
