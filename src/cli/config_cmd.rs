use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Subcommand;

use crate::core::config::data::path_display;
use crate::core::config::Config;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Print the effective configuration (file plus environment overrides)
    Show,
    /// Write a configuration file populated with defaults
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print where the configuration file is read from
    Path,
}

pub fn run_config(action: ConfigAction, explicit_path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    match action {
        ConfigAction::Show => {
            Config::load(explicit_path)?.print_all();
        }
        ConfigAction::Init { force } => {
            let path = resolve_path(explicit_path)?;
            let message = init_config(&path, force)?;
            println!("{message}");
        }
        ConfigAction::Path => {
            println!("{}", resolve_path(explicit_path)?.display());
        }
    }
    Ok(())
}

fn resolve_path(explicit_path: Option<&Path>) -> Result<PathBuf, Box<dyn Error>> {
    match explicit_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(Config::get_config_path()?),
    }
}

fn init_config(path: &Path, force: bool) -> Result<String, Box<dyn Error>> {
    if path.exists() && !force {
        return Err(format!(
            "Config file already exists at {} (use --force to overwrite)",
            path_display(path)
        )
        .into());
    }
    Config::default().save_to_path(path)?;
    Ok(format!("Wrote default configuration to {}", path_display(path)))
}
