//! One-shot query: stream a single answer to stdout and exit.

use std::error::Error;
use std::io::{self, Write};

use tokio_util::sync::CancellationToken;

use crate::cli::session::{open_session, LaunchOverrides};
use crate::core::assistant::Assistant;
use crate::core::config::Config;
use crate::utils::logging::LoggingState;

pub async fn run_ask(
    prompt: Vec<String>,
    config: &Config,
    overrides: &LaunchOverrides,
    log_file: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        return Err("Usage: nso-chat ask <prompt>".into());
    }

    let logging = LoggingState::new(log_file)?;
    let mut session = open_session(config, overrides).await?;

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let mut stdout = io::stdout();
    let result = ask_once(&mut session.assistant, &prompt, &cancel, &mut stdout, &logging).await;
    watcher.abort();
    session.tools.shutdown().await;
    result
}

/// The user turn is logged before the query runs, as `chat` does.
pub(crate) async fn ask_once<W: Write>(
    assistant: &mut Assistant,
    prompt: &str,
    cancel: &CancellationToken,
    out: &mut W,
    logging: &LoggingState,
) -> Result<(), Box<dyn Error>> {
    logging.log_user_message(prompt)?;
    let answer = assistant
        .process_query(prompt, cancel, |chunk| {
            let _ = write!(out, "{chunk}");
            let _ = out.flush();
        })
        .await?;
    writeln!(out)?;
    logging.log_message(&answer)?;
    Ok(())
}
