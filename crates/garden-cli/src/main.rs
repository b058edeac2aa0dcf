//! # garden
//!
//! Inspect and maintain a garden store from the shell.

#![deny(unsafe_code)]

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use garden_settings::GardenSettings;
use garden_store::{BinKind, Garden, Identifier, SortOrder, SqliteProvider};

/// Garden store maintenance tool.
#[derive(Parser, Debug)]
#[command(name = "garden", about = "Inspect and maintain a garden store")]
struct Cli {
    /// Path to the `SQLite` database (overrides settings).
    #[arg(long, global = true, conflicts_with = "memory")]
    db: Option<PathBuf>,

    /// Use a throwaway in-memory database.
    #[arg(long, global = true)]
    memory: bool,

    /// Log level filter (overrides settings; `RUST_LOG` wins over both).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// List sessions in a bin.
    List {
        /// Bin to list.
        #[arg(long, default_value = "home")]
        bin: BinKind,
        /// created, created-desc, updated, updated-desc, accessed, accessed-desc or title.
        #[arg(long, default_value = "updated-desc")]
        order: SortOrder,
        /// Only sessions with this topic; an empty string selects untagged ones.
        #[arg(long)]
        topic: Option<String>,
    },
    /// List the topics used in a bin.
    Topics {
        /// Bin to inspect.
        #[arg(long, default_value = "home")]
        bin: BinKind,
    },
    /// Print a session and its leaves.
    Show {
        /// Session identifier.
        id: Identifier,
    },
    /// Create a session and print its identifier.
    New {
        /// Session title.
        #[arg(long)]
        title: Option<String>,
        /// Topic tag.
        #[arg(long)]
        topic: Option<String>,
        /// Default model for assistant leaves.
        #[arg(long)]
        model: Option<String>,
        /// File under Archive instead of Home.
        #[arg(long)]
        archive: bool,
    },
    /// Append a leaf to a session.
    Say {
        /// Session identifier.
        id: Identifier,
        /// Message text.
        text: String,
        /// Record as an assistant leaf instead of a user leaf.
        #[arg(long)]
        assistant: bool,
    },
    /// Retag every session in a bin from one topic to another.
    RenameTopic {
        /// Bin to retag.
        #[arg(long, default_value = "home")]
        bin: BinKind,
        /// Current topic.
        old: String,
        /// New topic.
        new: String,
    },
    /// Remove a topic from every session in a bin.
    DeleteTopic {
        /// Bin to retag.
        #[arg(long, default_value = "home")]
        bin: BinKind,
        /// Topic to clear.
        topic: String,
    },
    /// Demote idle sessions to Waste and delete expired waste.
    Prune,
    /// Delete every session.
    Purge {
        /// Confirm deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Move a session out of Waste.
    Restore {
        /// Session identifier.
        id: Identifier,
    },
    /// Delete one session.
    Delete {
        /// Session identifier.
        id: Identifier,
    },
    /// Print occupancy statistics as JSON.
    Stats,
}

impl Cli {
    /// Fold command-line overrides into loaded settings.
    fn apply(&self, settings: &mut GardenSettings) {
        if let Some(path) = &self.db {
            settings.storage.path = Some(path.display().to_string());
            settings.storage.in_memory = false;
        }
        if self.memory {
            settings.storage.in_memory = true;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = garden_settings::load_settings().context("Failed to load settings")?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    if garden_settings::init_settings(settings).is_err() {
        anyhow::bail!("settings were initialized twice");
    }
    let settings = garden_settings::get_settings();
    garden_core::logging::init_subscriber(&settings.logging.level);

    let provider =
        SqliteProvider::from_settings(&settings.storage).context("Failed to open storage")?;
    if provider.is_in_memory() {
        tracing::warn!("using an in-memory store; nothing is kept after exit");
    }
    let provider = provider.shared();
    let mut garden = Garden::new(provider, settings);
    let result = garden.open().context("Failed to open garden")?;
    tracing::debug!(?result, "garden ready");

    let mut out = std::io::stdout().lock();
    commands::run(&mut garden, cli.command, &mut out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_list_with_order() {
        let cli = Cli::parse_from(["garden", "list", "--bin", "archive", "--order", "title"]);
        assert!(matches!(
            cli.command,
            Command::List {
                bin: BinKind::Archive,
                order: SortOrder::Title,
                topic: None
            }
        ));
    }

    #[test]
    fn db_flag_overrides_memory_setting() {
        let cli = Cli::parse_from(["garden", "--db", "/tmp/x.db", "stats"]);
        let mut settings = GardenSettings::default();
        settings.storage.in_memory = true;
        cli.apply(&mut settings);
        assert!(!settings.storage.in_memory);
        assert_eq!(settings.storage.path.as_deref(), Some("/tmp/x.db"));
    }

    #[test]
    fn db_and_memory_conflict() {
        assert!(Cli::try_parse_from(["garden", "--db", "a.db", "--memory", "stats"]).is_err());
    }

    #[test]
    fn identifiers_parse_as_hex() {
        let cli = Cli::parse_from(["garden", "show", "00000000000000ff"]);
        assert!(matches!(cli.command, Command::Show { id } if id.as_u64() == 255));
    }
}
