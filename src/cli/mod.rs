//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod serve;
pub mod session;
pub mod tool_list;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::ask::run_ask;
use crate::cli::chat::run_chat;
use crate::cli::config_cmd::{run_config, ConfigAction};
use crate::cli::serve::run_serve;
use crate::cli::session::LaunchOverrides;
use crate::cli::tool_list::list_tools;
use crate::core::config::Config;
use crate::utils::diagnostics::init_tracing;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ", built ",
    env!("VERGEN_BUILD_DATE"),
    " for ",
    env!("VERGEN_CARGO_TARGET_TRIPLE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "nso-chat")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Chat with an LLM about Cisco NSO managed devices")]
#[command(
    long_about = "nso-chat answers natural-language questions about devices managed by Cisco NSO. \
Queries go to an OpenAI-compatible chat API; when the model needs data it calls read-only \
tools served over the Model Context Protocol by `nso-chat serve`, which talks to NSO's \
RESTCONF API.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    API key for the chat endpoint (required for chat and ask)\n\
  OPENAI_BASE_URL   Chat API base URL (defaults to https://api.openai.com/v1)\n\
  NSO_SCHEME, NSO_ADDRESS, NSO_PORT, NSO_USERNAME, NSO_PASSWORD\n\
                    NSO RESTCONF connection (defaults to http://localhost:8080, admin/admin)\n\
  RUST_LOG          Log filter for diagnostics written to stderr"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Chat model to use, overriding the configuration
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Append the conversation to this file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<String>,

    /// Command that starts the MCP server (defaults to this binary with `serve`)
    #[arg(long, global = true, value_name = "COMMAND")]
    pub server_command: Option<String>,

    /// Argument for the MCP server command; repeat for several
    #[arg(long = "server-arg", global = true, value_name = "ARG", allow_hyphen_values = true)]
    pub server_args: Vec<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Answer a single prompt and exit
    Ask {
        /// Prompt text; several words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List the tools the MCP server advertises
    Tools,
    /// Run the NSO MCP server on stdin/stdout
    Serve,
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

impl Args {
    fn launch_overrides(&self) -> LaunchOverrides {
        LaunchOverrides {
            command: self.server_command.clone(),
            args: self.server_args.clone(),
            config_path: self.config.clone(),
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let default_level = match args.command {
        Some(Commands::Serve) => "info",
        _ => "warn",
    };
    init_tracing(default_level);

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let command = args.command.clone().unwrap_or(Commands::Chat);
    if let Commands::Config { action } = command {
        return run_config(action, args.config.as_deref());
    }

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    let overrides = args.launch_overrides();

    match command {
        Commands::Chat => run_chat(&config, &overrides, args.log).await,
        Commands::Ask { prompt } => run_ask(prompt, &config, &overrides, args.log).await,
        Commands::Tools => list_tools(&config, &overrides).await,
        Commands::Serve => run_serve(&config).await,
        Commands::Config { .. } => Ok(()),
    }
}
