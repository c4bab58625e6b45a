use docfuzz_core::config::{DEFAULT_CONFIG_FILE, DocfuzzConfig};
use docfuzz_core::executor::CommandEngine;
use docfuzz_core::input::Input;
use docfuzz_core::oracle::{Assessment, DivergenceReport, assess_bytes};
use docfuzz_core::testcase::decode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser, global = true)]
    config_file: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode corpus samples and report the ones that would be rejected.
    Check {
        #[clap(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Judge corpus samples against a testee process.
    Replay {
        #[clap(required = true)]
        paths: Vec<PathBuf>,
        /// Testee command, split on whitespace. Overrides `engine.command`.
        #[clap(long)]
        engine_cmd: Option<String>,
        /// Overrides `engine.timeout-ms`.
        #[clap(long)]
        timeout_ms: Option<u64>,
    },
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<DocfuzzConfig> {
    if let Some(path) = explicit {
        return DocfuzzConfig::load_from_file(path);
    }
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        DocfuzzConfig::load_from_file(default_path)
    } else {
        Ok(DocfuzzConfig::default())
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Expands each path into sample files. Directories are read one level deep.
fn collect_samples(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries = Vec::new();
            for entry in std::fs::read_dir(path)
                .with_context(|| format!("Failed to read corpus directory {path:?}"))?
            {
                let file_path = entry?.path();
                if file_path.is_file() {
                    entries.push(file_path);
                }
            }
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn read_sample(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read sample {path:?}"))
}

fn check(paths: &[PathBuf]) -> anyhow::Result<ExitCode> {
    let files = collect_samples(paths)?;
    let mut rejected = 0usize;

    for file in &files {
        let data = read_sample(file)?;
        match decode(data.as_bytes()) {
            Ok(record) => {
                debug!(sample = ?file, argc = record.argv().len(), "decoded");
                println!("ok        {}", file.display());
            }
            Err(e) => {
                rejected += 1;
                println!("{:<9} {}: {e}", e.kind(), file.display());
            }
        }
    }

    println!("Checked: {}, Rejected: {rejected}", files.len());
    Ok(if rejected == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn replay(
    mut config: DocfuzzConfig,
    paths: &[PathBuf],
    engine_cmd: Option<String>,
    timeout_ms: Option<u64>,
) -> anyhow::Result<ExitCode> {
    if let Some(cmd) = engine_cmd {
        config.engine.command = cmd.split_whitespace().map(str::to_string).collect();
    }
    if let Some(timeout_ms) = timeout_ms {
        config.engine.timeout_ms = timeout_ms;
    }
    let engine = CommandEngine::new(config.engine.to_command_config()?);
    info!(command = ?engine.config().command, "replaying corpus");

    let files = collect_samples(paths)?;
    let start_time = Instant::now();
    let (mut confirmed, mut rejected, mut divergences) = (0usize, 0usize, 0usize);

    for file in &files {
        let data = read_sample(file)?;
        match assess_bytes(data.as_bytes(), &engine) {
            Assessment::Confirmed => {
                confirmed += 1;
                println!("confirmed  {}", file.display());
            }
            Assessment::Rejected(e) => {
                rejected += 1;
                println!("rejected({}) {}", e.kind(), file.display());
            }
            Assessment::Divergence(divergence) => {
                divergences += 1;
                let report = DivergenceReport::new(data, divergence);
                println!(
                    "divergence {}: {} [{}]",
                    file.display(),
                    report.description(),
                    report.input_hash
                );
            }
        }
    }

    println!(
        "Samples: {}, Confirmed: {confirmed}, Rejected: {rejected}, Divergences: {divergences} ({:.2?})",
        files.len(),
        start_time.elapsed()
    );
    Ok(if divergences == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config_file.as_deref())?;
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Check { paths } => check(&paths),
        Commands::Replay {
            paths,
            engine_cmd,
            timeout_ms,
        } => replay(config, &paths, engine_cmd, timeout_ms),
    }
}
