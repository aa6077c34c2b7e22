//! ideal CLI - terminal front end for the IDEAL assistant.

pub mod conversation;
pub mod render;
pub mod turn;

mod cli_args;
mod interactive;
mod status;
mod utils;

use anyhow::Result;
use clap::Parser;
use ideal_stream::{ChatClient, StreamSettings};
use tracing::debug;

pub use cli_args::{BufferingArg, Cli};

use conversation::Conversation;
use interactive::run_interactive;
use render::TerminalRenderer;
use status::Status;
use turn::run_turn;
use utils::{
    build_transport, initialize_logging, load_config_with_cli_overrides, prepare_image_dir,
    write_default_config,
};

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    initialize_logging(cli.verbose);

    if cli.init_config {
        let path = write_default_config()?;
        Status::info(&format!("wrote default configuration to {}", path.display()));
        return Ok(());
    }

    // Load configuration with CLI overrides
    let config = load_config_with_cli_overrides(&cli)?;
    let image_dir = prepare_image_dir(&config)?;
    debug!(
        server = %config.server.base_url,
        buffering = ?config.stream.buffering,
        mock = cli.mock,
        "Configuration loaded"
    );

    let transport = build_transport(&cli, &config)?;
    let client = ChatClient::new(transport, StreamSettings::from(&config.stream));
    let mut conversation = Conversation::new(client, cli.session.clone());

    match cli.message {
        Some(ref message) => run_single_shot(&mut conversation, message, image_dir).await,
        None => run_interactive(conversation, image_dir).await,
    }
}

async fn run_single_shot(
    conversation: &mut Conversation,
    message: &str,
    image_dir: Option<std::path::PathBuf>,
) -> Result<()> {
    let mut renderer = TerminalRenderer::new(std::io::stdout(), image_dir);

    match run_turn(conversation, &mut renderer, message).await? {
        Some(outcome) if outcome.failed => anyhow::bail!("The assistant could not be reached"),
        Some(_) => Ok(()),
        None => anyhow::bail!("Nothing to send: the message is empty"),
    }
}
