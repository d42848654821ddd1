//! Command-line argument parsing for metarag
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::EmbedderKind;

/// metarag - metadata-aware retrieval over Ollama and Qdrant
#[derive(Parser, Debug)]
#[command(name = "metarag")]
#[command(version)]
#[command(about = "Index documents with metadata and answer questions from them", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.metarag/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -v (info), -vv (debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Override the configured embedding provider (ollama, local, hashing)
    #[arg(long, global = true)]
    pub embedder: Option<EmbedderKind>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the configured index if it does not exist
    InitIndex,

    /// Chunk, embed and index text files
    Ingest {
        /// Files to ingest
        #[arg(required = true, value_name = "FILES")]
        files: Vec<PathBuf>,

        /// Run the LLM cleaning pass before embedding
        #[arg(long)]
        clean: bool,

        /// Document id (single file only; defaults to the file path)
        #[arg(long)]
        id: Option<String>,
    },

    /// Ask a question against the index
    Query {
        /// Question text
        #[arg(value_name = "TEXT")]
        text: String,

        /// Number of passages to retrieve
        #[arg(long)]
        top_k: Option<usize>,

        /// Pure semantic search, never derive a metadata filter
        #[arg(long)]
        no_filter: bool,

        /// Print retrieved passages without generating an answer
        #[arg(long)]
        no_answer: bool,
    },

    /// Check Ollama and vector store reachability
    Doctor,

    /// Display effective configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Check argument combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if let Commands::Ingest { files, id: Some(_), .. } = &self.command {
            if files.len() > 1 {
                return Err("--id can only be used when ingesting a single file".to_string());
            }
        }
        if let Commands::Query { top_k: Some(0), .. } = &self.command {
            return Err("--top-k must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Verbosity {
    /// Default tracing filter directive
    pub fn log_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "info",
            Verbosity::VeryVerbose => "debug",
        }
    }

    /// Check if should show progress bars
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(parse(&["metarag", "-q", "doctor"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["metarag", "doctor"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["metarag", "-v", "doctor"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["metarag", "doctor", "-vv"]).verbosity(), Verbosity::VeryVerbose);
    }

    #[test]
    fn test_log_directive() {
        assert_eq!(Verbosity::Quiet.log_directive(), "error");
        assert_eq!(Verbosity::Normal.log_directive(), "warn");
        assert_eq!(Verbosity::VeryVerbose.log_directive(), "debug");
    }

    #[test]
    fn test_ingest_args() {
        let args = parse(&["metarag", "ingest", "a.txt", "b.txt", "--clean"]);
        match args.command {
            Commands::Ingest { files, clean, id } => {
                assert_eq!(files.len(), 2);
                assert!(clean);
                assert!(id.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Args::try_parse_from(["metarag", "ingest"]).is_err());
    }

    #[test]
    fn test_query_args() {
        let args = parse(&["metarag", "query", "what changed?", "--top-k", "3", "--no-filter"]);
        match args.command {
            Commands::Query {
                text,
                top_k,
                no_filter,
                no_answer,
            } => {
                assert_eq!(text, "what changed?");
                assert_eq!(top_k, Some(3));
                assert!(no_filter);
                assert!(!no_answer);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_embedder_override() {
        let args = parse(&["metarag", "--embedder", "hashing", "init-index"]);
        assert_eq!(args.embedder, Some(EmbedderKind::Hashing));
        assert!(Args::try_parse_from(["metarag", "--embedder", "bogus", "init-index"]).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(parse(&["metarag", "ingest", "a.txt", "--id", "x"]).validate().is_ok());
        assert!(parse(&["metarag", "ingest", "a.txt", "b.txt", "--id", "x"]).validate().is_err());
        assert!(parse(&["metarag", "query", "q", "--top-k", "0"]).validate().is_err());
    }
}
