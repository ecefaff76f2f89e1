//! Runtime configuration, assembled once in `main` from [`crate::cli::Cli`].

use crate::cli::{Cli, LogLevel, TransportKind};

#[derive(Debug, Clone)]
pub struct Config {
    pub transport: TransportKind,
    pub port: u16,
    pub log_level: LogLevel,
    pub workspace_paths: Vec<String>,
    pub bypass_permission_check: bool,
    pub allow_insecure_tls: bool,
    pub cache_ttl_ms: u64,
    pub cache_max_entries: usize,
    pub resource_store_capacity: usize,
    pub sf_cli_path: String,
}

impl Config {
    pub const DEFAULT_CACHE_TTL_MS: u64 = 10_000;
    pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 200;
    pub const DEFAULT_RESOURCE_STORE_CAPACITY: usize = 30;

    pub fn from_cli(cli: &Cli) -> Self {
        let cache_ttl_ms = std::env::var("SF_MCP_CACHE_TTL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_CACHE_TTL_MS);
        let cache_max_entries = std::env::var("SF_MCP_CACHE_MAX_ENTRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_CACHE_MAX_ENTRIES);
        let resource_store_capacity = std::env::var("SF_MCP_RESOURCE_STORE_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_RESOURCE_STORE_CAPACITY);

        Self {
            transport: cli.transport,
            port: cli.port,
            log_level: cli.log_level,
            workspace_paths: cli.workspace_paths(),
            bypass_permission_check: cli.bypass_permission_check,
            allow_insecure_tls: cli.allow_insecure_tls,
            cache_ttl_ms,
            cache_max_entries,
            resource_store_capacity,
            sf_cli_path: cli.sf_cli_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_match_spec_constants() {
        let cli = Cli::parse_from(["sf-context-mcp"]);
        let config = Config::from_cli(&cli);
        assert_eq!(config.cache_ttl_ms, 10_000);
        assert_eq!(config.cache_max_entries, 200);
        assert_eq!(config.resource_store_capacity, 30);
    }
}
