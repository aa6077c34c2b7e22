//! Utility functions for the ideal CLI.

use anyhow::{Context, Result};
use ideal_config::{Config, DecodeFailurePolicy};
use ideal_stream::{ChatTransport, HttpTransport, MockTransport};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli_args::Cli;

/// Load configuration with CLI argument overrides applied.
pub fn load_config_with_cli_overrides(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_with_overrides(cli.config.as_deref(), cli.server.clone())?;

    if cli.literal_decode_failures {
        config.stream.decode_failures = DecodeFailurePolicy::Literal;
    }

    if let Some(buffering) = cli.buffering {
        config.stream.buffering = buffering.into();
    }

    if let Some(ref image_dir) = cli.image_dir {
        config.ui.image_dir = Some(image_dir.clone());
    }

    Ok(config)
}

/// The offline demo assistant with `--mock`, otherwise the HTTP endpoint.
pub fn build_transport(cli: &Cli, config: &Config) -> Result<Arc<dyn ChatTransport>> {
    if cli.mock {
        return Ok(Arc::new(MockTransport::demo()));
    }
    let transport = HttpTransport::new(&config.server)
        .context("Failed to build HTTP client")?;
    Ok(Arc::new(transport))
}

/// Creates the configured image directory, if any.
pub fn prepare_image_dir(config: &Config) -> Result<Option<PathBuf>> {
    let Some(dir) = config.ui.image_dir_path() else {
        return Ok(None);
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create image directory {}", dir.display()))?;
    Ok(Some(dir))
}

/// Writes the default configuration to the per-user location.
pub fn write_default_config() -> Result<PathBuf> {
    let path = Config::default_user_path();
    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Config::default().save(&path.to_string_lossy())?;
    Ok(path)
}

/// Initialize logging based on CLI verbosity settings.
///
/// `RUST_LOG` takes precedence when set. Logs go to stderr so they never
/// interleave with the streamed reply on stdout.
pub fn initialize_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            ["ideal", "ideal_cli", "ideal_stream", "ideal_config"]
                .iter()
                .map(|target| format!("{}={}", target, level))
                .collect::<Vec<_>>()
                .join(","),
        )
    });

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
