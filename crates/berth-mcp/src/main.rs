//! Berth MCP server binary.
//!
//! Serves the session tools over stdio. Sessions live as long as this
//! process; on exit the configured shutdown policy destroys or disowns them.
//!
//! Usage:
//!   cargo run -p berth-mcp
//!   cargo run -p berth-mcp -- --image my-agent:dev --shutdown disown
//!
//! Test with MCP inspector:
//!   npx @modelcontextprotocol/inspector cargo run -p berth-mcp

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::{ServiceExt, transport::stdio};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use berth_kernel::{BerthConfig, CredentialResolver, DockerEngine, SessionRegistry, ShutdownPolicy};
use berth_mcp::BerthMcp;

/// MCP server running agent sessions in isolated containers.
#[derive(Parser, Debug)]
#[command(name = "berth-mcp")]
#[command(about = "MCP server for agent sessions in isolated containers")]
struct Args {
    /// Config file (default: ~/.config/berth/config.ron)
    #[arg(long, env = "BERTH_CONFIG")]
    config: Option<PathBuf>,

    /// Image for session containers
    #[arg(long, env = "BERTH_IMAGE")]
    image: Option<String>,

    /// Container name prefix
    #[arg(long, env = "BERTH_CONTAINER_PREFIX")]
    container_prefix: Option<String>,

    /// Docker endpoint (unix:///var/run/docker.sock, tcp://host:2375)
    #[arg(long, env = "BERTH_DOCKER_HOST")]
    docker_host: Option<String>,

    /// What to do with live sessions on exit: destroy or disown
    #[arg(long, env = "BERTH_SHUTDOWN")]
    shutdown: Option<ShutdownPolicy>,

    /// Remove berth containers left behind by earlier runs
    #[arg(
        long,
        env = "BERTH_REAP_ORPHANS",
        action = clap::ArgAction::SetTrue,
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    reap_orphans: bool,
}

impl Args {
    fn apply(&self, config: &mut BerthConfig) {
        if let Some(image) = &self.image {
            config.image = image.clone();
        }
        if let Some(prefix) = &self.container_prefix {
            config.container_prefix = prefix.clone();
        }
        if let Some(host) = &self.docker_host {
            config.docker_host = Some(host.clone());
        }
        if let Some(policy) = self.shutdown {
            config.shutdown = policy;
        }
        if self.reap_orphans {
            config.reap_orphans = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing to stderr (MCP uses stdout for protocol)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false));

    #[cfg(feature = "telemetry")]
    let _otel_guard = if berth_telemetry::otel_enabled() {
        match berth_telemetry::otel_layer("berth-mcp") {
            Ok((otel_layer, guard)) => {
                registry.with(otel_layer).init();
                Some(guard)
            }
            Err(e) => {
                registry.init();
                tracing::warn!(error = %e, "OTel export disabled");
                None
            }
        }
    } else {
        registry.init();
        None
    };

    #[cfg(not(feature = "telemetry"))]
    {
        registry.init();
        if berth_telemetry::otel_enabled() {
            tracing::info!("OTEL_* set but berth-mcp was built without the telemetry feature");
        }
    }

    let args = Args::parse();
    let mut config = BerthConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    let config = Arc::new(config);

    let engine = DockerEngine::connect(config.docker_host.as_deref())
        .context("failed to set up Docker client")?;
    if let Err(e) = engine.ping().await {
        tracing::warn!(error = %e, "Docker daemon not reachable; session tools will fail until it is");
    }

    let registry = Arc::new(SessionRegistry::new(
        Arc::new(engine),
        CredentialResolver::default(),
        config.clone(),
    ));
    match registry.startup().await {
        Ok(report) if report.found > 0 => {
            tracing::info!(found = report.found, reaped = report.reaped, "Orphan reconciliation done");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Skipped orphan reconciliation"),
    }

    let service = BerthMcp::new(registry.clone())
        .serve(stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("MCP server error: {:?}", e);
        })?;

    tracing::info!(image = %config.image, "berth-mcp server ready");

    tokio::select! {
        result = service.waiting() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "MCP service ended with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
        }
    }

    let policy = config.shutdown;
    let removed = registry.shutdown(policy).await;
    tracing::info!(%policy, removed, "berth-mcp server shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test: it mutates the process environment clap reads from.
    #[test]
    fn test_cli_and_env_override_config() {
        let args = Args::try_parse_from([
            "berth-mcp",
            "--image",
            "agent:dev",
            "--shutdown",
            "disown",
            "--reap-orphans",
        ])
        .unwrap();
        let mut config = BerthConfig::default();
        args.apply(&mut config);
        assert_eq!(config.image, "agent:dev");
        assert_eq!(config.shutdown, ShutdownPolicy::Disown);
        assert!(config.reap_orphans);

        // SAFETY: no other test reads or writes the environment
        unsafe { std::env::set_var("BERTH_REAP_ORPHANS", "1") };
        assert!(Args::try_parse_from(["berth-mcp"]).unwrap().reap_orphans);

        unsafe { std::env::set_var("BERTH_REAP_ORPHANS", "off") };
        assert!(!Args::try_parse_from(["berth-mcp"]).unwrap().reap_orphans);

        unsafe { std::env::remove_var("BERTH_REAP_ORPHANS") };
        assert!(!Args::try_parse_from(["berth-mcp"]).unwrap().reap_orphans);
    }
}
