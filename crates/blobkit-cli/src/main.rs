//! # blobkit-cli
//!
//! Command line access to the stores defined in blobkit.toml.
//!
//! Parses arguments, sets up logging, dispatches to the command handlers and
//! renders errors with their suggestions.

use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use blobkit_core::error::{BlobError, BlobResult};

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Store, fetch and delete blobs
#[derive(Parser, Debug)]
#[command(name = "blobkit", version, about = "Store, fetch and delete blobs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: blobkit.toml in this or a parent directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Store to use (default: `default-store` from the configuration)
    #[arg(short, long, global = true, env = "BLOBKIT_STORE")]
    pub store: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show a blob's metadata
    Stat { path: Utf8PathBuf },
    /// Write a blob's data to a file or stdout
    Get {
        path: Utf8PathBuf,
        /// Output file; stdout when absent
        #[arg(short, long)]
        output: Option<Utf8PathBuf>,
        /// Skip the download if the blob's etag is one of these
        #[arg(long = "if-none-match", value_name = "ETAG")]
        if_none_match: Vec<String>,
        /// Skip the download unless the blob changed after this time (RFC 3339 or HTTP-date)
        #[arg(long, value_name = "TIME")]
        if_modified_since: Option<String>,
    },
    /// Store a file or stdin as a blob
    Put {
        path: Utf8PathBuf,
        /// Input file; stdin when absent
        #[arg(short, long)]
        file: Option<Utf8PathBuf>,
        /// Content type of the stored blob
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
        /// Fail instead of overwriting an existing blob
        #[arg(long)]
        fail_if_exists: bool,
    },
    /// Delete a blob
    Rm {
        path: Utf8PathBuf,
        /// Succeed when the blob does not exist
        #[arg(short, long)]
        force: bool,
    },
    /// List configured stores
    Stores,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    debug!("Starting blobkit v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprint!("{}", ErrorFormatter::new().format_error(&e));
            ExitCode::FAILURE
        },
    }
}

fn run_cli(cli: Cli) -> BlobResult<()> {
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| BlobError::general("Failed to create async runtime", e))?;

    rt.block_on(async {
        let ctx = CommandContext::new(cli.config, cli.store)?;
        commands::dispatch_command(cli.command, &ctx).await
    })
}

/// Log to stderr; `RUST_LOG` replaces the level chosen by `--verbose`
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "blobkit={level},blobkit_core={level},blobkit_fs={level},blobkit_gcs={level},blobkit_config={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_with_preconditions() {
        let cli = Cli::try_parse_from([
            "blobkit",
            "--store",
            "local",
            "get",
            "a/b.txt",
            "--if-none-match",
            "abc",
            "--if-none-match",
            "def",
            "-o",
            "out.txt",
        ])
        .unwrap();

        assert_eq!(cli.store.as_deref(), Some("local"));
        match cli.command {
            Commands::Get {
                path,
                output,
                if_none_match,
                if_modified_since,
            } => {
                assert_eq!(path, "a/b.txt");
                assert_eq!(output.as_deref(), Some(camino::Utf8Path::new("out.txt")));
                assert_eq!(if_none_match, vec!["abc", "def"]);
                assert!(if_modified_since.is_none());
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["blobkit", "rm", "x", "--force", "-v", "--config", "c.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some(camino::Utf8Path::new("c.toml")));
        assert!(matches!(cli.command, Commands::Rm { force: true, .. }));
    }

    #[test]
    fn test_put_defaults() {
        let cli = Cli::try_parse_from(["blobkit", "put", "x"]).unwrap();
        match cli.command {
            Commands::Put {
                file,
                content_type,
                fail_if_exists,
                ..
            } => {
                assert!(file.is_none());
                assert_eq!(content_type, "application/octet-stream");
                assert!(!fail_if_exists);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
