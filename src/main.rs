// profile-schema - print the merged field schema an administrator has configured

use std::sync::Arc;

use profile_fields::{
    config::Config,
    schema::{FileBaseSchemaProvider, FileSchemaSource},
    EntityKind, ProfileService, SchemaCache,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let kind: EntityKind = match args.next() {
        Some(raw) => raw.parse()?,
        None => {
            eprintln!("usage: profile-schema <user|group> [request-schema]");
            std::process::exit(2);
        }
    };
    let operation = args.next();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Reading profile schemas from {}", config.schema.dir.display());

    // schema output never touches stored attributes, so no database is opened
    let cache = Arc::new(SchemaCache::new(Arc::new(FileSchemaSource::new(
        &config.schema.dir,
    ))));
    let service = ProfileService::schema_only(
        cache,
        Arc::new(FileBaseSchemaProvider::new(&config.schema.dir)),
    )
    .with_overrides(config.validator_overrides());

    let merged = service.fields_schema(kind, operation.as_deref()).await?;
    println!("{}", serde_json::to_string_pretty(&merged.to_json())?);

    Ok(())
}
