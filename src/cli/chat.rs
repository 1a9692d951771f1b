//! Line-oriented interactive chat.

use std::error::Error;
use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::session::{open_session, LaunchOverrides};
use crate::core::assistant::Assistant;
use crate::core::config::Config;
use crate::utils::logging::LoggingState;

pub async fn run_chat(
    config: &Config,
    overrides: &LaunchOverrides,
    log_file: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let logging = LoggingState::new(log_file)?;
    let mut session = open_session(config, overrides).await?;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let result = chat_loop(&mut session.assistant, stdin, &mut stdout, &logging).await;
    session.tools.shutdown().await;
    result
}

/// Read queries from `input` until `quit` or EOF. Query failures are printed
/// and the loop carries on. Ctrl+C cancels a running query, or exits at the
/// prompt.
pub async fn chat_loop<R, W>(
    assistant: &mut Assistant,
    input: R,
    out: &mut W,
    logging: &LoggingState,
) -> Result<(), Box<dyn Error>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "\nMCP Client Started!")?;
    writeln!(out, "Type your queries or 'quit' to exit.")?;
    if logging.is_active() {
        writeln!(out, "Chat log: {}", logging.get_status_string())?;
    }

    let mut lines = input.lines();
    loop {
        write!(out, "\nQuery: ")?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                writeln!(out)?;
                break;
            }
        };
        let Some(line) = line else {
            writeln!(out)?;
            break;
        };
        let query = line.trim();
        if query.eq_ignore_ascii_case("quit") {
            break;
        }
        if query.is_empty() {
            continue;
        }

        if let Err(err) = logging.log_user_message(query) {
            warn!(error = %err, "Failed to write chat log");
        }

        let cancel = CancellationToken::new();
        let watcher = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            }
        });

        writeln!(out)?;
        let result = assistant
            .process_query(query, &cancel, |chunk| {
                let _ = write!(out, "{chunk}");
                let _ = out.flush();
            })
            .await;
        watcher.abort();

        match result {
            Ok(answer) => {
                writeln!(out)?;
                if let Err(err) = logging.log_message(&answer) {
                    warn!(error = %err, "Failed to write chat log");
                }
            }
            Err(err) => writeln!(out, "\nError: {err}")?,
        }
    }
    Ok(())
}
