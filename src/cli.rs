//! Startup command-line interface.
//!
//! `clap`'s derive API with `env` fallback gives CLI > env > default
//! priority for free, over hand-rolled `std::env::args()` parsing.

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "lower")]
pub enum TransportKind {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
#[clap(rename_all = "lower")]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    /// Maps the syslog-style levels this server's wire protocol uses onto
    /// `tracing`'s five-level scheme.
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical | LogLevel::Error => {
                tracing::Level::ERROR
            }
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Notice | LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "sf-context-mcp", version, about = "Salesforce context MCP server")]
pub struct Cli {
    #[arg(long, env = "MCP_TRANSPORT", default_value = "stdio")]
    pub transport: TransportKind,

    #[arg(long, env = "MCP_HTTP_PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Comma-separated list of candidate workspace roots; the first wins.
    #[arg(long, env = "WORKSPACE_FOLDER_PATHS")]
    pub workspace: Option<String>,

    #[arg(long, env = "SF_MCP_BYPASS_PERMISSION_CHECK", default_value_t = false)]
    pub bypass_permission_check: bool,

    #[arg(long, env = "SF_MCP_ALLOW_INSECURE_TLS", default_value_t = false)]
    pub allow_insecure_tls: bool,

    #[arg(long, env = "SF_MCP_CLI_PATH", default_value = "sf")]
    pub sf_cli_path: String,
}

impl Cli {
    pub fn workspace_paths(&self) -> Vec<String> {
        match &self.workspace {
            Some(raw) => raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_overrides_default() {
        let cli = Cli::parse_from(["sf-context-mcp", "--transport", "http", "--port", "4100"]);
        assert_eq!(cli.transport, TransportKind::Http);
        assert_eq!(cli.port, 4100);
    }

    #[test]
    fn workspace_splits_on_comma_first_wins() {
        let cli = Cli::parse_from(["sf-context-mcp", "--workspace", "/a,/b,/c"]);
        assert_eq!(cli.workspace_paths(), vec!["/a".to_string(), "/b".to_string(), "/c".to_string()]);
    }

    #[test]
    fn default_transport_is_stdio() {
        let cli = Cli::parse_from(["sf-context-mcp"]);
        assert_eq!(cli.transport, TransportKind::Stdio);
        assert_eq!(cli.port, 3000);
    }
}
