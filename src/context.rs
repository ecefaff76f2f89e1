//! The injected `ServerContext`: one instance constructed in `main`, cloned cheaply
//! (every field is `Arc`-wrapped) into the transport, dispatcher, and every
//! tool handler.

use crate::cli_exec::CliExecutor;
use crate::config::Config;
use crate::gateway::{CliTokenRefresher, SfGateway};
use crate::init::RootsProvider;
use crate::jsonrpc::{Elicitor, Protocol};
use crate::notify::Notifier;
use crate::resources::ResourceStore;
use crate::state::{ClientDescriptor, OrgIdentity, ServerState};
use crate::watcher::OrgWatcherHandle;
use parking_lot::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct ServerContext {
    pub state: Arc<RwLock<ServerState>>,
    pub client: Arc<RwLock<Option<ClientDescriptor>>>,
    pub resources: Arc<ResourceStore>,
    pub gateway: Arc<SfGateway>,
    pub cli: Arc<CliExecutor>,
    pub watcher_handle: Arc<Mutex<Option<OrgWatcherHandle>>>,
    pub notifier: Arc<dyn Notifier>,
    pub protocol: Arc<Protocol>,
    pub elicitor: Arc<dyn Elicitor>,
    pub roots: Arc<dyn RootsProvider>,
    pub config: Arc<Config>,
    pub shutting_down: Arc<AtomicBool>,
    pub org: Arc<RwLock<OrgIdentity>>,
    pub target_org: Arc<RwLock<Option<String>>>,
    pub workspace: Arc<RwLock<String>>,
}

impl ServerContext {
    pub fn new(
        config: Config,
        notifier: Arc<dyn Notifier>,
        protocol: Arc<Protocol>,
        elicitor: Arc<dyn Elicitor>,
        roots: Arc<dyn RootsProvider>,
    ) -> crate::error::Result<Self> {
        let shutting_down = Arc::new(AtomicBool::new(false));
        let org = Arc::new(RwLock::new(OrgIdentity::default()));
        let workspace = Arc::new(RwLock::new(
            std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string()),
        ));
        let target_org = Arc::new(RwLock::new(None));
        let cli = Arc::new(CliExecutor::new(config.sf_cli_path.clone()));

        let refresher = Arc::new(CliTokenRefresher {
            cli: cli.clone(),
            workspace: workspace.clone(),
            target_org: target_org.clone(),
        });

        let gateway = Arc::new(SfGateway::new(
            config.cache_ttl_ms,
            config.cache_max_entries,
            config.allow_insecure_tls,
            org.clone(),
            refresher,
        )?);

        let resources = Arc::new(ResourceStore::new(
            config.resource_store_capacity,
            shutting_down.clone(),
            notifier.clone(),
        ));

        Ok(Self {
            state: Arc::new(RwLock::new(ServerState::new(config.log_level))),
            client: Arc::new(RwLock::new(None)),
            resources,
            gateway,
            cli,
            watcher_handle: Arc::new(Mutex::new(None)),
            notifier,
            protocol,
            elicitor,
            roots,
            config: Arc::new(config),
            shutting_down,
            org,
            target_org,
            workspace,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().is_ready()
    }

    pub async fn begin_shutdown(&self) {
        self.shutting_down.store(true, std::sync::atomic::Ordering::Release);
        if let Some(handle) = self.watcher_handle.lock().await.take() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{LogLevel, TransportKind};
    use crate::notify::NullNotifier;

    fn test_config() -> Config {
        Config {
            transport: TransportKind::Stdio,
            port: 3000,
            log_level: LogLevel::Info,
            workspace_paths: vec![],
            bypass_permission_check: false,
            allow_insecure_tls: false,
            cache_ttl_ms: 10_000,
            cache_max_entries: 200,
            resource_store_capacity: 30,
            sf_cli_path: "sf".into(),
        }
    }

    #[test]
    fn fresh_context_is_not_ready() {
        let ctx = ServerContext::new(
            test_config(),
            Arc::new(NullNotifier),
            Arc::new(Protocol::new()),
            Arc::new(crate::jsonrpc::NullElicitor),
            Arc::new(crate::init::NoRoots),
        )
        .unwrap();
        assert!(!ctx.is_ready());
    }

    #[tokio::test]
    async fn begin_shutdown_sets_flag() {
        let ctx = ServerContext::new(
            test_config(),
            Arc::new(NullNotifier),
            Arc::new(Protocol::new()),
            Arc::new(crate::jsonrpc::NullElicitor),
            Arc::new(crate::init::NoRoots),
        )
        .unwrap();
        ctx.begin_shutdown().await;
        assert!(ctx.shutting_down.load(std::sync::atomic::Ordering::Acquire));
    }
}
