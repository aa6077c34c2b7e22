//! CLI argument parsing for ideal.

use clap::{Parser, ValueEnum};
use ideal_config::BufferingStrategy;

#[derive(Parser, Clone, Debug)]
#[command(name = "ideal")]
#[command(about = "Terminal chat client for the IDEAL assistant")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the server base URL (e.g. http://localhost:8000)
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Continue an existing session instead of creating one
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,

    /// Talk to the built-in offline assistant instead of a server
    #[arg(long)]
    pub mock: bool,

    /// Append undecodable stream lines to the reply instead of dropping them
    #[arg(long)]
    pub literal_decode_failures: bool,

    /// How streamed text is buffered before it is shown
    #[arg(long, value_enum, value_name = "STRATEGY")]
    pub buffering: Option<BufferingArg>,

    /// Save received images into this directory
    #[arg(long, value_name = "DIR")]
    pub image_dir: Option<String>,

    /// Write the default configuration to ~/.config/ideal/config.toml and exit
    #[arg(long)]
    pub init_config: bool,

    /// Message to send (if provided, runs in single-shot mode instead of interactive)
    pub message: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferingArg {
    /// Rate-limited, waits for balanced markdown
    MarkdownSafe,
    /// Cuts at sentence ends and closed code fences
    Sentence,
    /// Shows every fragment as it arrives
    Immediate,
}

impl From<BufferingArg> for BufferingStrategy {
    fn from(arg: BufferingArg) -> Self {
        match arg {
            BufferingArg::MarkdownSafe => BufferingStrategy::MarkdownSafe,
            BufferingArg::Sentence => BufferingStrategy::Sentence,
            BufferingArg::Immediate => BufferingStrategy::Immediate,
        }
    }
}
