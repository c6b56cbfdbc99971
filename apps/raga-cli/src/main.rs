//! raga binary
//!
//! JSON results go to stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use compliance_engine::DeliberationError;
use raga_cli::{pipeline, RagaConfig};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Oracle exhausted its retries or refused the request
const EXIT_ORACLE_UNAVAILABLE: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "raga")]
#[command(
    version,
    about = "Cross-check reported data points against regulatory sources and seal the evidence"
)]
struct Cli {
    /// Config file (defaults to ./raga.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest the configured corpus into the embedding cache
    Ingest,

    /// Retrieve evidence for a data point and ask the oracle for a verdict
    Analyze {
        /// JSON file holding the data point
        #[arg(long)]
        data_point: PathBuf,

        /// Retrieval query (derived from the data point when omitted)
        #[arg(long)]
        query: Option<String>,

        /// Number of chunks to retrieve
        #[arg(long)]
        k: Option<usize>,

        #[arg(long, default_value = "raga/explain.json")]
        out: PathBuf,
    },

    /// Seal an analysis and supporting files into an audit package
    Seal {
        /// Analysis record written by `analyze`
        #[arg(long)]
        analysis: PathBuf,

        /// Supporting file; repeatable
        #[arg(long = "artifact")]
        artifacts: Vec<PathBuf>,

        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Check an audit package against its manifest
    Verify { package: PathBuf },

    /// Generate a P-256 key for signing manifests
    Keygen {
        #[arg(long, default_value = "keys/seal_key.hex")]
        out: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = RagaConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Ingest => {
            print_json(&pipeline::ingest(&config).await?)?;
        }
        Command::Analyze {
            data_point,
            query,
            k,
            out,
        } => {
            let data_point = pipeline::read_data_point(&data_point)?;
            let record = pipeline::analyze(&config, data_point, query, k).await?;
            pipeline::write_file(&out, &record.to_json()?)?;
            tracing::info!("Analysis written to {}", out.display());

            print_json(&serde_json::json!({
                "output": out,
                "basis": record.verdict.basis(),
                "compliance_state": record.verdict.compliance_state(),
                "evidence": record.evidence.len(),
            }))?;
        }
        Command::Seal {
            analysis,
            artifacts,
            out_dir,
        } => {
            let summary = pipeline::seal(&config, &analysis, &artifacts, out_dir.as_deref())?;
            print_json(&summary)?;
        }
        Command::Verify { package } => {
            let report = pipeline::verify(&package)?;
            print_json(&report)?;
            if !report.is_valid() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Keygen { out } => {
            let public_key = pipeline::keygen(&out)?;
            print_json(&serde_json::json!({
                "private_key_file": out,
                "public_key": public_key,
            }))?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries results, so logs must go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            match err.downcast_ref::<DeliberationError>() {
                Some(DeliberationError::OracleUnavailable { .. })
                | Some(DeliberationError::OracleRejected(_)) => {
                    ExitCode::from(EXIT_ORACLE_UNAVAILABLE)
                }
                _ => ExitCode::FAILURE,
            }
        }
    }
}
