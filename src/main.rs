use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use attr_resolver::{
    import_files, AttributeResolver, AttributeStore, DesignatorKind, ResolverConfig,
    StaticContext,
};

const USAGE: &str = "Usage:
  attr-resolver import <families.csv> <values.csv>
  attr-resolver resolve <attribute-id> <subject|resource|environment> [entity-id]
  attr-resolver supported
  attr-resolver catalog

Options:
  --config <file.json>   load settings from a JSON file instead of ATTR_DB_* variables";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let config = load_config(&mut args)?;

    match args.first().map(String::as_str) {
        Some("import") => run_import(&config, &args[1..]),
        Some("resolve") => run_resolve(&config, &args[1..]),
        Some("supported") => run_supported(&config),
        Some("catalog") => run_catalog(&config),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

/// Pops `--config <file>` out of the argument list if present.
fn load_config(args: &mut Vec<String>) -> Result<ResolverConfig> {
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if pos + 1 >= args.len() {
            bail!("--config needs a file path");
        }
        let path = PathBuf::from(args.remove(pos + 1));
        args.remove(pos);
        return ResolverConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }
    ResolverConfig::from_env().context("Invalid ATTR_DB_* configuration")
}

fn open_store(config: &ResolverConfig) -> Result<AttributeStore> {
    AttributeStore::from_config(config)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))
}

fn run_import(config: &ResolverConfig, args: &[String]) -> Result<()> {
    let [families, values] = args else {
        bail!("import needs <families.csv> <values.csv>\n\n{}", USAGE);
    };

    println!("🗄️  Attribute import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = open_store(config)?;
    let summary = import_files(&store, Path::new(families), Path::new(values))?;

    println!("✓ Families: {}", summary.families);
    println!("✓ Values:   {}", summary.values);
    if summary.skipped_values > 0 {
        println!("⚠️  Skipped {} values with unknown families", summary.skipped_values);
    }
    Ok(())
}

fn run_resolve(config: &ResolverConfig, args: &[String]) -> Result<()> {
    let (attribute_id, kind, entity_id) = match args {
        [attribute_id, kind] => (attribute_id, kind, None),
        [attribute_id, kind, entity_id] => (attribute_id, kind, Some(entity_id)),
        _ => bail!("resolve needs <attribute-id> <kind> [entity-id]\n\n{}", USAGE),
    };
    let kind: DesignatorKind = kind.parse()?;

    let mut context = StaticContext::new();
    if let Some(id) = entity_id {
        context = match kind {
            DesignatorKind::Subject => context.with_subject(id.as_str()),
            DesignatorKind::Resource => context.with_resource(id.as_str()),
            DesignatorKind::Environment => context,
        };
    }

    let resolver = AttributeResolver::new(open_store(config)?);
    let values = resolver.resolve(attribute_id, kind, &context)?;

    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}

fn run_supported(config: &ResolverConfig) -> Result<()> {
    let resolver = AttributeResolver::new(open_store(config)?);
    for id in resolver.supported_identifiers()? {
        println!("{}", id);
    }
    Ok(())
}

fn run_catalog(config: &ResolverConfig) -> Result<()> {
    let store = open_store(config)?;
    let session = store.open(true)?;
    let catalog = session.load_catalog()?;
    let _cleanup = session.close();

    println!("📚 {} attribute families", catalog.count());
    for family in catalog.list_all() {
        println!(
            "  #{:<4} {:<40} {:<9} {}",
            family.id(),
            family.external_name(),
            family.data_type(),
            family.multiplicity().name()
        );
    }
    for rejected in catalog.rejected() {
        println!("  ❌ #{} {}: {}", rejected.id, rejected.external_name, rejected.reason);
    }
    for name in catalog.duplicates() {
        println!("  ⚠️  {} is defined more than once", name);
    }
    Ok(())
}
