use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{dictionary::DEFAULT_RANDOM_COUNT, settings::SettingKey};

#[derive(Debug, Parser)]
#[command(
    name = "wordbank",
    about = "A bilingual dictionary with ranked search"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search headwords and definitions
    Search(SearchArgs),
    /// Show a full entry by slug
    Get {
        /// Entry slug, e.g. "akoro" or "ba-2"
        slug: String,
    },
    /// Count top-level entries per letter
    Letters,
    /// Show the word of the day
    Wotd {
        /// Pick a new word immediately
        #[arg(long)]
        refresh: bool,
    },
    /// Create an entry from a JSON file
    Add {
        /// JSON file with the term fields plus definitions, examples and
        /// relations
        file: PathBuf,
    },
    /// Apply a JSON patch to a term's fields
    Update {
        /// Slug of the term to change
        slug: String,
        /// JSON file with the fields to change; null clears a field
        patch: PathBuf,
    },
    /// Delete a term and all of its sub-entries
    Delete {
        /// Slug of the term to delete
        slug: String,
    },
    /// Import entries from converter JSON
    Import(ImportArgs),
    /// Link cross-references to the terms they name
    Resolve,
    /// Rebuild the definition index from stored entries
    Rebuild,
    /// Show random entries
    Random(RandomArgs),
    /// Show dictionary status and statistics
    Status,
    /// Manage settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query; omit to browse alphabetically
    #[arg(default_value = "")]
    pub query: String,

    /// Only headwords starting with this letter
    #[arg(short, long, default_value = "")]
    pub letter: String,

    /// Only this part of speech
    #[arg(short, long, default_value = "")]
    pub pos: String,

    /// Page number, starting at 1
    #[arg(long)]
    pub page: Option<u32>,

    /// Results per page (1-100)
    #[arg(short = 'n', long)]
    pub per_page: Option<u32>,
}

// -- Import --

#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// Converter JSON file
    pub file: PathBuf,

    /// Remove all existing entries first
    #[arg(long)]
    pub truncate: bool,
}

// -- Random --

#[derive(Debug, Parser)]
pub struct RandomArgs {
    /// How many entries to show
    #[arg(short = 'n', long, default_value_t = DEFAULT_RANDOM_COUNT)]
    pub count: usize,

    /// Never show this slug
    #[arg(long)]
    pub exclude: Option<String>,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show effective settings
    Show,
    /// Persist a setting
    Set {
        #[arg(value_enum)]
        key: SettingKey,
        value: String,
    },
    /// Remove a stored setting (revert to default)
    Clear {
        #[arg(value_enum)]
        key: SettingKey,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "wordbank",
            &mut std::io::stdout(),
        );
    }
}
