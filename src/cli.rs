// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// We use the "derive" API: the CLI structure is described with Rust structs
// and attributes, and clap generates the parsing, --help and error messages.
//
// Rust concepts:
// - Structs: Custom data types that group related data
// - Enums: Types that can be one of several variants
// - Option<T>: A value that may be missing (an optional flag)
// =============================================================================

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// This struct represents our entire CLI application
//
// The four global flags can appear before or after the subcommand
// (`global = true`), and they override the config file and environment.
#[derive(Parser, Debug)]
#[command(
    name = "docs-harvester",
    version,
    about = "Discover, fetch and cache documentation from GitHub repositories",
    long_about = "docs-harvester finds the documentation files of a GitHub repository \
                  (docs folders, top-level markdown, code search), downloads them in \
                  parallel and caches them per ref, so repeated runs cost no API calls."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Extra TOML config file, read after ./docs-harvester.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// GitHub token (raises the API rate limit; needed for private repos)
    ///
    /// `env = "GITHUB_TOKEN"` makes clap read the variable when the flag is absent
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Log level: error, warn, info, debug or trace
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Cache backend: memory, disk or disabled
    #[arg(long, global = true, value_name = "KIND")]
    pub cache_backend: Option<String>,
}

// Each variant is one subcommand; its fields become that subcommand's arguments
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch (or refresh) the documentation of one or more repositories
    ///
    /// Example: docs-harvester fetch tokio-rs/tokio serde-rs/serde --json
    Fetch {
        /// Repositories as owner/name or GitHub URLs
        ///
        /// `required = true` on a Vec means "at least one"
        #[arg(required = true, value_name = "REPO")]
        repos: Vec<String>,

        /// Branch or commit to fetch (default: the repository's default branch)
        #[arg(long = "ref", value_name = "REF")]
        reference: Option<String>,

        /// Tag to fetch; same as --ref, spelled for readability
        ///
        /// clap rejects `--ref x --tag y` for us
        #[arg(long, value_name = "TAG", conflicts_with = "reference")]
        tag: Option<String>,

        /// Ignore the cached index and the refresh throttle
        #[arg(long)]
        force: bool,

        /// Files downloaded in parallel per repository (0 = configured pool size)
        #[arg(long, default_value_t = 0)]
        concurrency: usize,

        /// Output results in JSON format instead of a table
        #[arg(long)]
        json: bool,

        /// Repositories processed at the same time
        #[arg(long, default_value_t = 2)]
        parallel_repos: usize,
    },

    /// Ask whether an unqualified refresh is allowed right now
    ///
    /// Example: docs-harvester can-refresh rust-lang/book --min-days 7
    CanRefresh {
        /// Repository as owner/name or a GitHub URL
        repo: String,

        /// Minimum days between refreshes (default: from settings)
        #[arg(long)]
        min_days: Option<u32>,
    },

    /// Only discover documentation paths; nothing is downloaded or cached
    ///
    /// Example: docs-harvester resolve https://github.com/rust-lang/book
    Resolve {
        /// Repository as owner/name or a GitHub URL
        repo: String,

        /// Branch, tag or commit (default: the repository's default branch)
        #[arg(long = "ref", value_name = "REF")]
        reference: Option<String>,
    },
}

impl Commands {
    /// `--tag` and `--ref` end up in the same place.
    pub fn fetch_reference(reference: Option<String>, tag: Option<String>) -> Option<String> {
        reference.or(tag).filter(|r| !r.trim().is_empty())
    }
}


// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why Option<String> for flags?
//    - None means "the user did not pass it", which is different from an
//      empty string. main.rs uses that to fall back to the config file.
//
// 2. What does #[arg(long = "ref")] do?
//    - `ref` is a Rust keyword, so the field is called `reference` and the
//      attribute renames the flag back to --ref.
//
// 3. Why Vec<String> for repos?
//    - Positional arguments collected into a Vec accept any number of values:
//      `fetch a/b c/d e/f`.
//
// 4. What is try_parse_from in the tests?
//    - Cli::parse() reads std::env::args and exits on error. try_parse_from
//      takes an explicit argument list and returns a Result, which is what
//      a test wants.
// -----------------------------------------------------------------------------
