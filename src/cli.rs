use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "snipkit",
    version = env!("CARGO_PKG_VERSION"),
    about = "Snippet libraries on a global hotkey",
)]
pub struct Snipkit {
    #[clap(long, global = true, help = "Use this config file instead of the default")]
    pub config: Option<PathBuf>,

    #[clap(long = "log-file", global = true, help = "Write logs to this file")]
    pub log_file: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run in the background: hotkey summons the palette, picks are pasted
    Run,
    /// List snippets
    List {
        #[clap(long, short, help = "Only snippets from this library")]
        library: Option<String>,
    },
    /// Search snippet names, descriptions and tags
    Search {
        #[clap(help = "Case-insensitive substring")]
        query: String,
    },
    /// Print a snippet's content
    Show {
        library: String,
        id: String,
    },
    /// Paste a snippet into the focused window
    Insert {
        library: String,
        id: String,

        #[clap(
            long = "delay-ms",
            default_value_t = 0,
            help = "Wait this long first, to switch to the target window"
        )]
        delay_ms: u64,
    },
    /// Pick a snippet interactively and copy it to the clipboard
    Pick {
        #[clap(help = "Initial filter")]
        query: Option<String>,
    },
    /// Load every library and report files that fail validation
    Check,
    /// Add a snippet to a library, or replace one with the same id
    Add {
        #[clap(long, short, help = "Library to add to")]
        library: String,

        #[clap(long, help = "Snippet id (lowercase letters, digits, underscores)")]
        id: String,

        #[clap(long, short, help = "Display name")]
        name: String,

        #[clap(long, short, help = "The snippet text")]
        content: String,

        #[clap(long, short, help = "Short description")]
        description: Option<String>,

        #[clap(long, help = "Category")]
        category: Option<String>,

        #[clap(long = "tag", short, help = "Tag (repeatable)")]
        tags: Vec<String>,
    },
    /// Delete a snippet from a library
    Delete {
        #[clap(long, short, help = "Library to delete from")]
        library: String,

        #[clap(long, help = "Id of the snippet to delete")]
        id: String,
    },
    /// Create a new library file with one snippet
    NewLibrary {
        #[clap(help = "Library name")]
        name: String,

        #[clap(long, short, help = "Library description")]
        description: Option<String>,

        #[clap(long, help = "Id of the first snippet")]
        id: String,

        #[clap(long, short = 'n', help = "Name of the first snippet")]
        snippet_name: String,

        #[clap(long, short, help = "Content of the first snippet")]
        content: String,
    },
    /// Show the effective configuration
    Config {
        #[clap(long, help = "Only print the config file path")]
        path: bool,

        #[clap(long, help = "Write the current settings (defaults if none) to the config file")]
        init: bool,
    },
}
