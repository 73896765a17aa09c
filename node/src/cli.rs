//! # CLI Interface
//!
//! Defines the command-line argument structure for `drid-node` using
//! `clap` derive. Supports five subcommands: `init`, `verify-receipt`,
//! `export-key`, `sweep`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DRID deposit-token node.
///
/// Operator tooling for a DRID deployment: initialize the data directory
/// and signing keys, re-verify issued receipts, export the public
/// verification key, and sweep expired tokens.
#[derive(Parser, Debug)]
#[command(
    name = "drid-node",
    about = "DRID deposit-token node",
    version,
    propagate_version = true
)]
pub struct DridNodeCli {
    /// Log output format: "pretty" or "json".
    #[arg(long, global = true, env = "DRID_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the DRID node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a data directory — creates the store and generates the
    /// receipt-signing key ring.
    Init(InitArgs),
    /// Re-verify a receipt's signature against its stored fields.
    VerifyReceipt(VerifyReceiptArgs),
    /// Export the signing public key (PEM) and algorithm descriptor.
    ExportKey(DataDirArgs),
    /// Stamp every token past its deadline EXPIRED and free its account.
    Sweep(DataDirArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments shared by subcommands that only need the data directory.
#[derive(Parser, Debug)]
pub struct DataDirArgs {
    /// Path to the node data directory (store and keys).
    #[arg(long, short = 'd', env = "DRID_DATA_DIR", default_value = ".drid")]
    pub data_dir: PathBuf,

    /// Secret that seals the signing private key at rest.
    ///
    /// **Never pass this flag on a shared host's command line** — use the
    /// environment variable or a secret manager.
    #[arg(long, env = "DRID_KEY_SECRET", hide_env_values = true)]
    pub key_secret: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "DRID_DATA_DIR", default_value = ".drid")]
    pub data_dir: PathBuf,

    /// Secret that will seal the signing private key at rest.
    #[arg(long, env = "DRID_KEY_SECRET", hide_env_values = true)]
    pub key_secret: String,
}

/// Arguments for the `verify-receipt` subcommand.
#[derive(Parser, Debug)]
pub struct VerifyReceiptArgs {
    /// Path to the node data directory.
    #[arg(long, short = 'd', env = "DRID_DATA_DIR", default_value = ".drid")]
    pub data_dir: PathBuf,

    /// Secret that seals the signing private key at rest.
    #[arg(long, env = "DRID_KEY_SECRET", hide_env_values = true)]
    pub key_secret: String,

    /// The receipt number to verify, e.g. RCP-20260825-1A2B3C4D.
    pub receipt_number: String,

    /// Expected payload checksum, as printed on the customer's copy.
    #[arg(long)]
    pub checksum: Option<String>,

    /// Exit non-zero unless the receipt verifies authentic.
    #[arg(long)]
    pub strict: bool,
}
