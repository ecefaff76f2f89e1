//! Binary entry point: parse arguments, wire up the context, and run
//! whichever transport was selected, exactly once. Everything else lives in
//! the library crate.

use clap::Parser;
use sf_context_mcp::cli::{Cli, TransportKind};
use sf_context_mcp::config::Config;
use sf_context_mcp::context::ServerContext;
use sf_context_mcp::init::{HttpRootsProvider, StdioRootsProvider};
use sf_context_mcp::jsonrpc::Protocol;
use sf_context_mcp::notify::{HttpElicitor, HttpNotifier, StdioElicitor, StdioNotifier};
use sf_context_mcp::rpc::RpcRouter;
use sf_context_mcp::transport::http::{self, HttpState};
use sf_context_mcp::transport::stdio::StdioTransport;
use sf_context_mcp::transport::Transport;
use sf_context_mcp::{logging, Result};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::from_cli(&cli);
    let logging_handle = Arc::new(logging::init(config.log_level));

    if let Err(e) = run(config, logging_handle).await {
        tracing::error!(error = %e, "server exited with an error");
        std::process::exit(1);
    }
}

async fn run(config: Config, logging_handle: Arc<logging::LoggingHandle>) -> Result<()> {
    match config.transport {
        TransportKind::Stdio => run_stdio(config, logging_handle).await,
        TransportKind::Http => run_http(config, logging_handle).await,
    }
}

async fn run_stdio(config: Config, logging_handle: Arc<logging::LoggingHandle>) -> Result<()> {
    let transport = Arc::new(StdioTransport::new());
    let notifier = Arc::new(StdioNotifier::new(transport.clone()));
    let protocol = Arc::new(Protocol::new());
    let elicitor = Arc::new(StdioElicitor::new(transport.clone(), protocol.clone()));
    let roots = Arc::new(StdioRootsProvider::new(transport.clone(), protocol.clone()));
    let ctx = ServerContext::new(config, notifier, protocol, elicitor, roots)?;
    let router = RpcRouter::new(ctx.clone(), logging_handle);

    install_shutdown_handler(ctx.clone());
    install_cache_sweep(ctx.clone());

    tracing::info!("sf-context-mcp listening on stdio");
    loop {
        if ctx.shutting_down.load(std::sync::atomic::Ordering::Acquire) {
            break;
        }
        match transport.receive().await {
            Ok(Some(message)) if !message.is_null() => {
                if sf_context_mcp::jsonrpc::is_response(&message) {
                    if let Ok(response) = serde_json::from_value(message) {
                        ctx.protocol.complete(sf_context_mcp::jsonrpc::transport_id_for_session(None), response);
                    }
                    continue;
                }
                if let Some(response) = router.handle(None, message).await {
                    if let Err(e) = transport.send(serde_json::to_value(&response)?).await {
                        tracing::warn!(error = %e, "failed to write response to stdout");
                    }
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "error reading from stdio transport");
                break;
            }
        }
    }

    ctx.begin_shutdown().await;
    Ok(())
}

async fn run_http(config: Config, logging_handle: Arc<logging::LoggingHandle>) -> Result<()> {
    let port = config.port;
    let http_state_slot: Arc<tokio::sync::OnceCell<HttpState>> = Arc::new(tokio::sync::OnceCell::new());
    let slot_for_notifier = http_state_slot.clone();

    // The notifier needs the HttpState to broadcast over, but HttpState needs
    // the router (which needs the context the notifier is built into) first;
    // a `OnceCell` breaks the cycle without reaching back into a global.
    struct DeferredHttpNotifier {
        slot: Arc<tokio::sync::OnceCell<HttpState>>,
    }
    impl sf_context_mcp::notify::Notifier for DeferredHttpNotifier {
        fn tools_list_changed(&self) {
            if let Some(state) = self.slot.get() {
                HttpNotifier::new(state.clone()).tools_list_changed();
            }
        }
        fn resources_list_changed(&self) {
            if let Some(state) = self.slot.get() {
                HttpNotifier::new(state.clone()).resources_list_changed();
            }
        }
        fn prompts_list_changed(&self) {
            if let Some(state) = self.slot.get() {
                HttpNotifier::new(state.clone()).prompts_list_changed();
            }
        }
        fn log(&self, level: sf_context_mcp::notify::LogLevel, logger: &str, data: serde_json::Value) {
            if let Some(state) = self.slot.get() {
                HttpNotifier::new(state.clone()).log(level, logger, data);
            }
        }
        fn progress(&self, token: sf_context_mcp::notify::ProgressToken, progress: f64, total: Option<f64>) {
            if let Some(state) = self.slot.get() {
                HttpNotifier::new(state.clone()).progress(token, progress, total);
            }
        }
    }

    let protocol = Arc::new(Protocol::new());
    let elicitor = Arc::new(HttpElicitor::new(http_state_slot.clone(), protocol.clone()));
    let roots = Arc::new(HttpRootsProvider::new(http_state_slot.clone(), protocol.clone()));
    let ctx = ServerContext::new(
        config,
        Arc::new(DeferredHttpNotifier { slot: slot_for_notifier }),
        protocol,
        elicitor,
        roots,
    )?;
    let router = Arc::new(RpcRouter::new(ctx.clone(), logging_handle));
    let http_state = HttpState::new(router.clone());
    let _ = http_state_slot.set(http_state.clone());

    install_shutdown_handler(ctx.clone());
    install_cache_sweep(ctx.clone());

    let listener = http::bind_with_port_probe("0.0.0.0", port).await?;
    let bound_port = listener
        .local_addr()
        .map(|a| a.port())
        .unwrap_or(port);
    tracing::info!(port = bound_port, "sf-context-mcp listening on streamable-http");

    let app = http::router(http_state);
    axum::serve(listener, app)
        .await
        .map_err(|e| sf_context_mcp::Error::internal(format!("http server error: {e}")))?;

    ctx.begin_shutdown().await;
    Ok(())
}

/// SIGINT/SIGTERM both begin graceful shutdown: stop the org watcher and
/// refuse further resource-store notifications.
fn install_shutdown_handler(ctx: ServerContext) {
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }
        ctx.begin_shutdown().await;
    });
}

/// Hourly background sweep: prunes the API cache once it has overgrown its
/// configured capacity, rather than waiting for per-call eviction alone.
fn install_cache_sweep(ctx: ServerContext) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        interval.tick().await; // first tick fires immediately, skip it
        loop {
            interval.tick().await;
            if ctx.shutting_down.load(std::sync::atomic::Ordering::Acquire) {
                break;
            }
            ctx.gateway.sweep_cache();
        }
    });
}
