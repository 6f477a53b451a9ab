use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use govbroker_config::{Config, LogConfig, LogFormat};
use govbroker_dispatch::Dispatcher;
use govbroker_proxy::AppState;
use govbroker_types::{Clock as _, SystemClock};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

#[derive(Parser, Debug)]
#[command(
    name = "govbroker",
    about = "govbroker — mTLS + OAuth2 broker for government APIs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the broker server.
    Serve {
        /// Path to the YAML configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Override the listening port (default: 8020).
        #[arg(short, long)]
        port: Option<u16>,
        /// Override the listening address (default: 127.0.0.1).
        #[arg(long)]
        host: Option<String>,
    },
    /// Print the configured endpoint policies.
    Policies {
        /// Path to the YAML configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Fetch one OAuth token to verify the client credentials.
    Token {
        /// Path to the YAML configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port, host } => cmd_serve(config, port, host).await,
        Commands::Policies { config } => cmd_policies(config.as_deref()),
        Commands::Token { config } => cmd_token(config.as_deref()).await,
    }
}

async fn cmd_serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    host: Option<String>,
) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if let Some(p) = port {
        config.port = p;
    }
    if let Some(h) = host {
        config.host = h;
    }
    let _guard = init_logging(&config.log)?;

    let dispatcher = Dispatcher::from_config(&config).context("cannot start dispatcher")?;
    let app = govbroker_proxy::make_router(AppState::new(Arc::new(dispatcher)));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    tracing::info!(%addr, "govbroker listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("govbroker stopped");
    Ok(())
}

fn cmd_policies(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let table = config.policy_table().context("invalid policy table")?;
    if table.is_empty() {
        println!("no endpoint policies configured");
        return Ok(());
    }
    for (id, policy) in table.iter() {
        let fallback = policy
            .fallback_auth
            .map_or_else(|| "-".to_string(), |k| k.to_string());
        let json_errors = if policy.supports_json_error_body {
            ""
        } else {
            "  (non-JSON errors)"
        };
        println!(
            "{id}: primary={} fallback={fallback} api_version={}{json_errors}",
            policy.primary_auth, policy.api_version
        );
    }
    Ok(())
}

async fn cmd_token(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let _guard = init_logging(&config.log)?;

    let dispatcher = Dispatcher::from_config(&config).context("cannot start dispatcher")?;
    let tokens = dispatcher.tokens();
    tokens
        .get_access_token()
        .await
        .context("token request failed")?;
    let cached = tokens
        .cached()
        .context("token endpoint returned no cacheable token")?;
    let remaining = cached.expires_at.saturating_sub(SystemClock.now_millis()) / 1000;
    println!(
        "token acquired from {} (value redacted), expires in {remaining}s",
        config.token_url()
    );
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).map_err(|e| anyhow::anyhow!("config error: {e}"))
}

/// Installs the global subscriber. The returned guard flushes the file writer
/// on drop and must live until shutdown.
fn init_logging(log: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .with_context(|| format!("invalid log level {:?}", log.level))?;

    let (writer, guard) = match &log.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log.file {} has no file name", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(log.file.is_none());
    let layer = match log.format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty => layer.with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;
    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_overrides_parse() {
        let cli = Cli::try_parse_from([
            "govbroker", "serve", "-c", "broker.yaml", "-p", "9100", "--host", "0.0.0.0",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve { config, port, host } => {
                assert_eq!(config, Some(PathBuf::from("broker.yaml")));
                assert_eq!(port, Some(9100));
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_token_command_parses() {
        let cli = Cli::try_parse_from(["govbroker", "token"]).unwrap();
        assert!(matches!(cli.command, Commands::Token { config: None }));
    }
}
