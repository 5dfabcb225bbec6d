//! Command-line entry point (spec.md §6 "CLI exit codes: 0 success,
//! non-zero on unrecoverable startup failure").
//!
//! Narrower than `turbomcp-proxy::cli`: one subcommand, no output-format
//! switch, no colored-terminal detection — the gateway speaks HTTP, not a
//! human-facing inspector.

use crate::error::{CliError, CliResult};
use crate::seed::GatewaySeed;
use crate::state::AppState;
use clap::{Parser, Subcommand};
use mcpgw_proxy::balancer::CircuitBreaker;
use mcpgw_proxy::config::GatewayConfig;
use mcpgw_proxy::filter::FilterChain;
use mcpgw_proxy::model::NamespaceId;
use mcpgw_proxy::pool::ConnectionPool;
use mcpgw_proxy::ratelimit::{InMemoryRateLimitStore, RateLimiter};
use mcpgw_proxy::router::Router;
use mcpgw_proxy::session::SessionRegistry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "mcpgw", version, about = "MCP Gateway: namespace-aggregating proxy over multiple MCP backends")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway's HTTP server
    Serve(ServeCommand),
}

impl Cli {
    pub async fn execute(self) -> CliResult<()> {
        self.init_tracing();
        match self.command {
            Command::Serve(cmd) => cmd.execute().await,
        }
    }

    fn init_tracing(&self) {
        let level = if self.quiet {
            Level::ERROR
        } else {
            match self.verbose {
                0 => Level::INFO,
                1 => Level::DEBUG,
                _ => Level::TRACE,
            }
        };
        tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
    }
}

#[derive(Parser, Debug)]
pub struct ServeCommand {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1:8787")]
    pub bind: String,

    /// Path to a TOML gateway config (falls back to defaults if omitted)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to a TOML seed file of backends/namespaces/virtual servers
    #[arg(long)]
    pub seed: Option<PathBuf>,
}

impl ServeCommand {
    pub async fn execute(self) -> CliResult<()> {
        let config = match &self.config {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path).await?;
                GatewayConfig::from_toml_str(&raw).map_err(|e| CliError::configuration(e.to_string()))?
            }
            None => GatewayConfig::default(),
        };

        let router = Arc::new(Router::new(
            ConnectionPool::new(Duration::from_secs(config.websocket_timeout_secs), config.session.request_timeout),
            CircuitBreaker::new(
                config.circuit_breaker.failure_threshold,
                config.circuit_breaker.success_threshold,
                config.circuit_breaker.open_duration,
            ),
            config.load_balancer.algorithm,
            config.backend_validation.clone(),
        ));

        let (default_namespace, rate_limit_policies) = if let Some(seed_path) = &self.seed {
            let seed = GatewaySeed::load(seed_path).await?;
            let first_namespace = seed.namespaces.first().map(|n| n.id);
            seed.apply(&router);
            (first_namespace.unwrap_or_default(), seed.rate_limit_policies)
        } else {
            (NamespaceId::new(), Vec::new())
        };

        let sessions = Arc::new(SessionRegistry::new(config.session.max_sessions));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.algorithm,
            Arc::new(InMemoryRateLimitStore::new(Duration::from_secs(300))),
        ));

        let state = AppState {
            router: router.clone(),
            sessions: sessions.clone(),
            rate_limiter,
            rate_limit_policies: Arc::new(rate_limit_policies),
            filters: Arc::new(FilterChain::new(Vec::new())),
            config: Arc::new(config.clone()),
            default_namespace,
        };

        let bind: SocketAddr = self.bind.parse().map_err(|_| CliError::InvalidBindAddr(self.bind.clone()))?;

        tokio::spawn(crate::health::run(
            router.clone(),
            config.circuit_breaker.failure_threshold,
            config.circuit_breaker.success_threshold,
            Duration::from_secs(30),
            config.session.request_timeout,
        ));
        tokio::spawn(crate::reaper::run(router.clone(), sessions.clone(), config.session.idle_timeout, Duration::from_secs(60)));

        let app = crate::http::build_router(state);
        let listener = tokio::net::TcpListener::bind(bind).await?;
        info!(%bind, "mcp gateway listening");
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_with_defaults() {
        let cli = Cli::try_parse_from(["mcpgw", "serve"]).unwrap();
        match cli.command {
            Command::Serve(cmd) => assert_eq!(cmd.bind, "127.0.0.1:8787"),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["mcpgw", "-v", "--quiet", "serve"]).is_err());
    }

    #[test]
    fn accepts_custom_bind_address() {
        let cli = Cli::try_parse_from(["mcpgw", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        match cli.command {
            Command::Serve(cmd) => assert_eq!(cmd.bind, "0.0.0.0:9000"),
        }
    }
}
