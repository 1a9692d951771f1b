//! Plain-text chat transcript written alongside the terminal session.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

const USER_PREFIX: &str = "You";

pub struct LoggingState {
    file_path: Option<String>,
}

impl LoggingState {
    /// Transcript writer for `log_file`, or a no-op when `None`. The file is
    /// opened once up front so a bad path fails at startup.
    pub fn new(log_file: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(path) = &log_file {
            test_file_access(path)
                .map_err(|err| format!("Cannot write chat log '{path}': {err}"))?;
        }
        Ok(LoggingState {
            file_path: log_file,
        })
    }

    pub fn is_active(&self) -> bool {
        self.file_path.is_some()
    }

    pub fn get_status_string(&self) -> String {
        match &self.file_path {
            None => "disabled".to_string(),
            Some(path) => format!(
                "active ({})",
                Path::new(path)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
            ),
        }
    }

    pub fn log_user_message(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.log_message(&format!("{USER_PREFIX}: {content}"))
    }

    /// Append `content` followed by a blank separator line.
    pub fn log_message(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = &self.file_path else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);
        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn test_file_access(path: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.flush()
}
