// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # DRID Node
//!
//! Entry point for the `drid-node` binary. Parses CLI arguments,
//! initializes logging, and runs operator commands against a DRID data
//! directory.
//!
//! The binary supports five subcommands:
//!
//! - `init`           — initialize the data directory and signing keys
//! - `verify-receipt` — re-verify a receipt's signature
//! - `export-key`     — print the public verification key (PEM)
//! - `sweep`          — stamp overdue tokens EXPIRED
//! - `version`        — print build version information

mod cli;
mod logging;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use drid_protocol::signing::keys::KeyRing;
use drid_protocol::{DepositEngine, MemoryDirectory, SignatureEngine, SledDepositStore};

use cli::{Commands, DataDirArgs, DridNodeCli, InitArgs, VerifyReceiptArgs};
use logging::LogFormat;

fn main() -> Result<()> {
    let cli = DridNodeCli::parse();
    logging::init_logging(
        "drid_node=info,drid_protocol=info",
        LogFormat::from_str_lossy(&cli.log_format),
    );

    match cli.command {
        Commands::Init(args) => init_node(args),
        Commands::VerifyReceipt(args) => verify_receipt(args),
        Commands::ExportKey(args) => export_key(args),
        Commands::Sweep(args) => sweep(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens (creating if needed) the store and key ring under `data_dir` and
/// wires up an engine. The CLI never issues tokens, so the directory seam
/// is left empty — deployments that stage deposits embed the library.
fn open_engine(data_dir: &Path, key_secret: &str) -> Result<DepositEngine> {
    let store = SledDepositStore::open(data_dir.join("db"))
        .with_context(|| format!("failed to open store under {}", data_dir.display()))?;
    let ring = KeyRing::load_or_generate(
        data_dir.join("keys"),
        key_secret.as_bytes(),
        chrono::Utc::now(),
    )
    .context("failed to load the signing key ring")?;

    Ok(DepositEngine::new(
        Arc::new(store),
        SignatureEngine::with_ring(ring),
        Arc::new(MemoryDirectory::new()),
    ))
}

fn init_node(args: InitArgs) -> Result<()> {
    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("failed to create {}", args.data_dir.display()))?;

    let engine = open_engine(&args.data_dir, &args.key_secret)?;
    let info = engine.signature_info();
    tracing::info!(
        data_dir = %args.data_dir.display(),
        key_id = info.key_id.as_deref().unwrap_or("-"),
        algorithm = %info.algorithm,
        "data directory initialized"
    );
    println!(
        "initialized {} (signing key {}, {})",
        args.data_dir.display(),
        info.key_id.as_deref().unwrap_or("-"),
        info.descriptor
    );
    Ok(())
}

fn verify_receipt(args: VerifyReceiptArgs) -> Result<()> {
    let engine = open_engine(&args.data_dir, &args.key_secret)?;
    let report = engine
        .verify_receipt(&args.receipt_number, args.checksum.as_deref())
        .with_context(|| format!("could not verify {}", args.receipt_number))?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.strict {
        report
            .ensure_authentic()
            .context("receipt failed strict verification")?;
    }
    Ok(())
}

fn export_key(args: DataDirArgs) -> Result<()> {
    let engine = open_engine(&args.data_dir, &args.key_secret)?;
    let info = engine.signature_info();
    tracing::info!(
        key_id = info.key_id.as_deref().unwrap_or("-"),
        algorithm = %info.algorithm,
        descriptor = %info.descriptor,
        payload_version = info.payload_version,
        "exporting public key"
    );
    // PEM on stdout, nothing else — pipe it straight to a file.
    print!("{}", engine.export_public_key()?);
    Ok(())
}

fn sweep(args: DataDirArgs) -> Result<()> {
    let engine = open_engine(&args.data_dir, &args.key_secret)?;
    let swept = engine.sweep_expired()?;
    println!("{} token(s) stamped expired", swept);
    Ok(())
}

fn print_version() {
    println!(
        "{} {} (canonical payload format v{})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        drid_protocol::config::PAYLOAD_VERSION
    );
}
