use clap::Parser;
use ludex_backend::documents::JobType;
use ludex_backend::jobs::{store_sync, Registry};
use ludex_backend::library::store::{jobs, labels};
use ludex_backend::library::Database;
use ludex_backend::Tracing;
use std::sync::Arc;

/// One-shot catalog sync for a single storefront from the command line.
#[derive(Parser)]
struct Opts {
    /// Storefront to sync (steam, epic, gog, itch, humble, battlenet,
    /// amazon, ea).
    store: String,

    /// Path to the library database.
    #[clap(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    Tracing::setup("utils/sync_library")?;

    let opts: Opts = Opts::parse();

    let db_path = match &opts.database {
        Some(path) => std::path::PathBuf::from(path),
        None => Database::default_path(),
    };
    let db = Database::open(&db_path).await?;
    labels::ensure_system_labels(db.pool()).await?;

    let registry = Arc::new(Registry::new(db));
    let job_id = jobs::create(
        registry.db.pool(),
        JobType::StoreSync,
        &format!("Syncing {} library", opts.store),
    )
    .await?;

    store_sync::run(Arc::clone(&registry), job_id.clone(), opts.store).await?;

    let job = jobs::read(registry.db.pool(), &job_id).await?;
    println!(
        "{}: {}",
        job.status,
        job.message.unwrap_or_else(|| String::from("(no message)"))
    );

    Ok(())
}
