#![recursion_limit = "256"]

use clap::Parser;
use ludex_backend::jobs::{self, Registry};
use ludex_backend::library::store::labels;
use ludex_backend::library::Database;
use ludex_backend::{http, Status, Tracing};
use std::{env, process::ExitCode, sync::Arc};
use tracing::{error, info};
use warp::{self, Filter};

#[derive(Parser)]
struct Opts {
    /// Port number for the HTTP surface. Binding it also enforces the
    /// single-instance rule.
    #[clap(short, long, default_value = "5050")]
    port: u16,

    /// Path to the library database. Defaults to the platform data dir (or
    /// the project dir when run from source).
    #[clap(long)]
    database: Option<String>,

    #[clap(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts: Opts = Opts::parse();

    let tracing = match opts.debug || env::var("DEBUG").map(|v| v == "true").unwrap_or(false) {
        true => Tracing::setup_debug("ludex-httpserver"),
        false => Tracing::setup("ludex-httpserver"),
    };
    if let Err(e) = tracing {
        eprintln!("{e}");
        return ExitCode::from(1);
    }

    match run(opts).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("startup failed: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(opts: Opts) -> Result<(), Status> {
    // Let ENV VAR override flag.
    let port: u16 = match env::var("PORT") {
        Ok(port) => port.parse::<u16>().unwrap_or(opts.port),
        Err(_) => opts.port,
    };

    let db_path = match &opts.database {
        Some(path) => std::path::PathBuf::from(path),
        None => Database::default_path(),
    };
    info!("opening library at {}", db_path.display());
    let db = Database::open(&db_path).await?;

    labels::ensure_system_labels(db.pool()).await?;

    let registry = Arc::new(Registry::new(db));
    jobs::resume_orphaned_jobs(Arc::clone(&registry)).await?;

    // Bind explicitly so port exhaustion surfaces as exit code 1 instead of
    // a panic inside warp.
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = std::net::TcpListener::bind(addr)
        .map_err(|e| Status::internal(format!("failed to bind port {port}: {e}")))?;
    listener
        .set_nonblocking(true)
        .map_err(|e| Status::new("failed to configure listener", e))?;
    let listener = tokio::net::TcpListener::from_std(listener)
        .map_err(|e| Status::new("failed to adopt listener", e))?;

    info!("serving on http://0.0.0.0:{port}");
    let routes = http::routes::routes(registry).with(
        warp::cors()
            .allow_methods(vec!["GET", "POST", "DELETE"])
            .allow_headers(vec!["Content-Type", "Authorization"])
            .allow_any_origin(),
    );

    let server = warp::serve(routes).run_incoming(tokio_stream(listener));
    tokio::select! {
        _ = server => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
    }

    Ok(())
}

fn tokio_stream(
    listener: tokio::net::TcpListener,
) -> impl futures::Stream<Item = std::io::Result<tokio::net::TcpStream>> {
    futures::stream::unfold(listener, |listener| async move {
        let accepted = listener.accept().await.map(|(stream, _)| stream);
        Some((accepted, listener))
    })
}
