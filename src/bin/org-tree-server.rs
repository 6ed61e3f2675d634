//! Org-tree HTTP server.
//!
//! Usage:
//!   POSTGRES_HOST=db POSTGRES_SCHEMA=org_tree org-tree-server --bind 0.0.0.0:8080
//!
//! Or without a database:
//!   org-tree-server --memory
//!
//! Database settings come from `POSTGRES_USER`, `POSTGRES_PASS`,
//! `POSTGRES_DB`, `POSTGRES_SCHEMA`, `POSTGRES_HOST` and `POSTGRES_PORT`.
//! `RUST_LOG` controls logging (default `info`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use org_tree::{http, DatabaseSettings, MemoryNodeStore, OrgTreeRepository, PgNodeStore};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "org-tree-server", version, about = "HTTP API for the organization tree")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "ORG_TREE_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Extra connection attempts while the database comes up, one second apart.
    #[arg(long, env = "ORG_TREE_CONNECT_RETRIES", default_value_t = 10)]
    connect_retries: u32,

    /// Keep the tree in process memory instead of PostgreSQL.
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let app = if args.memory {
        tracing::info!("using in-memory store");
        http::router(Arc::new(OrgTreeRepository::new(MemoryNodeStore::new())))
    } else {
        let settings = DatabaseSettings::from_env()?;
        tracing::info!(host = %settings.host, port = settings.port, schema = %settings.schema, "using PostgreSQL store");
        let store = connect_with_retry(&settings, args.connect_retries).await?;
        http::router(Arc::new(OrgTreeRepository::new(store)))
    };

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(addr = %args.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

async fn connect_with_retry(
    settings: &DatabaseSettings,
    retries: u32,
) -> anyhow::Result<PgNodeStore> {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut attempt = 0;
    loop {
        ticker.tick().await;
        match PgNodeStore::connect(settings).await {
            Ok(store) => return Ok(store),
            Err(err) if attempt < retries => {
                attempt += 1;
                tracing::warn!(attempt, error = %err, "database not ready, retrying");
            }
            Err(err) => return Err(err).context("could not connect to PostgreSQL"),
        }
    }
}
