//! # CLI Structure and Argument Parsing
//!
//! `pagesmith` drives the page-builder core against a JSON backend fixture.
//! It is an operator tool: reproduce what an editor would see when opening
//! an organization's pages, or apply an edit and save it.
//!
//! ## Usage Patterns
//!
//! ```bash
//! # Slug preview
//! pagesmith slug "Youth Group Events"
//! pagesmith slug "Youth Group Events" --unique
//!
//! # Resolve and load a page (bootstraps a homepage if missing)
//! pagesmith open --fixture backend.json --org grace
//!
//! # Edit and save, persisting the fixture
//! pagesmith edit --fixture backend.json --org grace --title "About" --publish --write
//! ```
//!
//! ## Output
//!
//! `open` and `edit` print JSON to stdout; logs go to stderr.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure for the `pagesmith` command
#[derive(Parser, Clone, Debug)]
#[command(name = "pagesmith")]
#[command(version)]
#[command(about = "Open, edit and save site builder pages", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file (retry, timeout and auto-save settings)
    #[arg(long, global = true, env = "PAGESMITH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Derive a URL slug from a page title
    Slug {
        /// Page title
        title: String,
        /// Append a time-based suffix so the slug is unique
        #[arg(long)]
        unique: bool,
    },

    /// Load a page the way the editor would and print the final state
    Open {
        /// JSON fixture describing the backend
        #[arg(long)]
        fixture: PathBuf,
        /// Organization id (defaults to the user's primary organization)
        #[arg(long = "org")]
        organization: Option<String>,
        /// Page id (defaults to the organization's homepage)
        #[arg(long)]
        page: Option<String>,
        /// Write the fixture back (e.g. to keep a bootstrapped homepage)
        #[arg(long)]
        write: bool,
    },

    /// Apply edits to a page and save it
    Edit(EditArgs),
}

/// Arguments for `pagesmith edit`
#[derive(Args, Clone, Debug)]
pub struct EditArgs {
    /// JSON fixture describing the backend
    #[arg(long)]
    pub fixture: PathBuf,
    /// Organization id
    #[arg(long = "org")]
    pub organization: String,
    /// Page id; omit to create a new page
    #[arg(long)]
    pub page: Option<String>,
    /// New title
    #[arg(long)]
    pub title: Option<String>,
    /// New slug
    #[arg(long)]
    pub slug: Option<String>,
    /// JSON file with the editor document
    #[arg(long)]
    pub content: Option<PathBuf>,
    /// Toggle the published flag
    #[arg(long)]
    pub publish: bool,
    /// Toggle the homepage flag
    #[arg(long)]
    pub homepage: bool,
    /// Treat a new page as created from the organization's root context
    #[arg(long)]
    pub root: bool,
    /// Mark new root-context pages as homepage (overrides config)
    #[arg(long = "auto-homepage")]
    pub auto_homepage: bool,
    /// Write the fixture back after saving
    #[arg(long)]
    pub write: bool,
}
