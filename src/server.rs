//! MCP server initialization for stdio and Streamable HTTP transports.
//!
//! [`setup_shared_state`] wires the database, storage backend, event sink,
//! updater, queue and summarizer runner; the CLI reuses it for one-shot
//! commands.

use std::sync::Arc;

use anyhow::Result;
use rmcp::ServiceExt;

use mdmemory::config::MemoryConfig;
use mdmemory::db;
use mdmemory::memory::{PendingQueue, SnapshotUpdater, SqliteEventSink};
use mdmemory::storage::{self, StorageAdapter};
use mdmemory::summarizer::{self, UpdateRunner};

use crate::tools::MemoryTools;

/// Everything a tool call or CLI command needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageAdapter>,
    pub events: SqliteEventSink,
    pub updater: SnapshotUpdater,
    pub queue: PendingQueue,
    pub runner: UpdateRunner,
}

pub fn setup_shared_state(config: MemoryConfig) -> Result<AppState> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");
    let db = db::shared(conn);

    let storage = storage::create_adapter(&config)?;
    tracing::info!(backend = storage.backend(), "storage ready");

    let events = SqliteEventSink::new(db.clone());
    let updater = SnapshotUpdater::new(storage.clone(), Arc::new(events.clone()));
    let queue = PendingQueue::new(db.clone());

    let generator = summarizer::create_summarizer(&config.summarizer);
    if generator.is_none() {
        tracing::warn!("summarizer disabled; pending updates will not be digested");
    }
    let runner = UpdateRunner::new(
        queue.clone(),
        updater.clone(),
        generator,
        config.summarizer.batch_limit,
    );

    Ok(AppState {
        storage,
        events,
        updater,
        queue,
        runner,
    })
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: MemoryConfig) -> Result<()> {
    tracing::info!("starting mdmemory MCP server on stdio");

    let state = setup_shared_state(config)?;
    let tools = MemoryTools::new(state);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP transport.
pub async fn serve_http(config: MemoryConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    tracing::info!(addr = %bind_addr, "starting mdmemory MCP server on HTTP");

    let state = setup_shared_state(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(MemoryTools::new(state.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
