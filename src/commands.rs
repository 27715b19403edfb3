//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::generator::DEFAULT_SEED;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Auto)]
pub struct Cli {
    /// Configuration file; defaults to `<config_dir>/config.yaml` when present.
    #[arg(long, short = 'c', global = true, env = "RAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Patient record file, overriding `patient_data_path`.
    #[arg(long, short = 'r', global = true)]
    pub records: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default config and prompt template into the config directory.
    Init,

    /// Generate a synthetic patient dataset.
    #[clap(name = "generate", alias = "g")]
    Generate {
        /// Number of patients.
        #[arg(long, short = 'n', default_value_t = 100)]
        count: usize,

        /// RNG seed; the same seed yields the same dataset on a given day.
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Output file; defaults to the configured record file.
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Show the records most similar to a query, without calling the model.
    #[clap(name = "search", alias = "s")]
    Search {
        query: String,

        /// Number of results; defaults to `top_k`.
        #[arg(short = 'k')]
        k: Option<usize>,
    },

    /// Answer a single question from the records.
    #[clap(name = "ask", alias = "a")]
    Ask {
        question: String,

        /// Number of records used as context; defaults to `top_k`.
        #[arg(short = 'k')]
        k: Option<usize>,
    },

    /// Ingest once, then answer questions from stdin until `exit`.
    #[clap(name = "interactive", alias = "i")]
    Interactive {
        #[arg(short = 'k')]
        k: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_k() {
        let cli = Cli::try_parse_from(["prag", "ask", "Who has asthma?", "-k", "3"]).unwrap();
        match cli.command {
            Commands::Ask { question, k } => {
                assert_eq!(question, "Who has asthma?");
                assert_eq!(k, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_generate_defaults() {
        let cli = Cli::try_parse_from(["prag", "generate"]).unwrap();
        match cli.command {
            Commands::Generate {
                count,
                seed,
                output,
            } => {
                assert_eq!(count, 100);
                assert_eq!(seed, DEFAULT_SEED);
                assert!(output.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_records_flag() {
        let cli = Cli::try_parse_from(["prag", "s", "copd", "--records", "p.json"]).unwrap();
        assert_eq!(cli.records, Some(PathBuf::from("p.json")));
        assert!(matches!(cli.command, Commands::Search { .. }));
    }
}
