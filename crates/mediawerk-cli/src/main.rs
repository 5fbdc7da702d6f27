// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mediawerk — local media transform engine.
//
// Entry point. Initialises logging, loads the engine configuration, reads
// input files, runs the requested transform and writes the outputs.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use mediawerk_core::error::{MediawerkError, Result};
use mediawerk_core::human_errors::humanize_error;
use mediawerk_core::{
    AssetFormat, CompressOptions, CompressionMode, CompressionTarget, EncodedAsset, EngineConfig,
    TransformJob, TransformSummary, format_bytes,
};
use mediawerk_transform::{Batch, BatchSummary, ItemStatus, MediaEngine};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "mediawerk")]
#[command(version, about = "Compress, cut out, scrub, convert and merge media files locally", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct CommonArgs {
    /// Directory outputs are written to.
    #[arg(long, global = true, default_value = ".")]
    out_dir: PathBuf,

    /// JSON engine configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print a JSON report on stdout instead of progress lines.
    #[arg(long, global = true)]
    json: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Shrink files towards a size target.
    Compress {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long, value_enum, default_value = "lossy")]
        mode: ModeArg,

        /// Reduce size by this percentage (clamped to 10-90).
        #[arg(long, conflicts_with = "max_kb")]
        percent: Option<u8>,

        /// Aim for at most this many kilobytes.
        #[arg(long)]
        max_kb: Option<u64>,
    },

    /// Make the background of product-style images transparent.
    RemoveBackground {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Colour distance still counted as background (5-100).
        #[arg(long)]
        tolerance: Option<u8>,
    },

    /// Strip EXIF, text chunks and document info.
    Scrub {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Convert files to another format.
    Convert {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Target format (pdf, jpg, png, webp, svg).
        #[arg(long)]
        to: AssetFormat,
    },

    /// Concatenate PDFs, in the order given, into merged.pdf.
    Merge {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Lossy,
    Lossless,
}

impl From<ModeArg> for CompressionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Lossy => CompressionMode::Lossy,
            ModeArg::Lossless => CompressionMode::Lossless,
        }
    }
}

/// One line of the `--json` report.
#[derive(Serialize)]
struct ItemReport {
    input: String,
    status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<TransformSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    written: Vec<PathBuf>,
}

#[derive(Serialize)]
struct RunReport {
    summary: BatchSummary,
    items: Vec<ItemReport>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.common.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(report) => {
            if report.summary.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            let human = humanize_error(&err);
            eprintln!("error: {} ({err})", human.message);
            eprintln!("  {}", human.suggestion);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<RunReport> {
    let common = cli.common;
    let config = match &common.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let engine = MediaEngine::new(config)?;
    fs::create_dir_all(&common.out_dir)?;

    let (inputs, job) = match cli.command {
        Commands::Merge { inputs } => return merge(&engine, &inputs, &common),
        Commands::Compress { inputs, mode, percent, max_kb } => {
            let target = match (percent, max_kb) {
                (_, Some(kb)) => CompressionTarget::max_kilobytes(kb),
                (Some(p), None) => CompressionTarget::Percentage(p),
                (None, None) => CompressionTarget::default(),
            };
            let options = CompressOptions { mode: mode.into(), target };
            (inputs, TransformJob::Compress(options))
        }
        Commands::RemoveBackground { inputs, tolerance } => {
            (inputs, TransformJob::RemoveBackground { tolerance })
        }
        Commands::Scrub { inputs } => (inputs, TransformJob::Scrub),
        Commands::Convert { inputs, to } => (inputs, TransformJob::Convert { to }),
    };

    run_batch(&engine, job, &inputs, &common)
}

fn run_batch(
    engine: &MediaEngine,
    job: TransformJob,
    inputs: &[PathBuf],
    common: &CommonArgs,
) -> Result<RunReport> {
    // Unreadable inputs fail individually, like any other batch item.
    let mut unreadable = Vec::new();
    let mut batch = Batch::new();
    let mut sources = Vec::new();
    for path in inputs {
        match read_asset(path) {
            Ok(asset) => {
                batch.push(asset);
                sources.push(path.clone());
            }
            Err(err) => unreadable.push(ItemReport {
                input: path.display().to_string(),
                status: ItemStatus::Failed,
                result: None,
                error: Some(humanize_error(&err).to_string()),
                written: Vec::new(),
            }),
        }
    }

    let show_progress = !common.json && !common.quiet;
    let names: Vec<String> = batch.items().iter().map(|i| i.asset.name().to_string()).collect();
    batch.run(engine, &job, |progress| {
        if show_progress && progress.status != ItemStatus::Processing {
            println!(
                "[{}/{}] {} ... {}",
                progress.index + 1,
                progress.total,
                names[progress.index],
                status_label(progress.status)
            );
        }
    });

    let mut items = unreadable;
    let mut claimed = HashSet::new();
    let mut write_failures = 0;
    for (item, source) in batch.items().iter().zip(&sources) {
        let mut status = item.status;
        let mut written = Vec::new();
        let mut error = item.error.as_ref().map(ToString::to_string);
        if let Some(result) = &item.result {
            for output in result.outputs() {
                match write_output(&common.out_dir, output, source, &mut claimed) {
                    Ok(Some(path)) => written.push(path),
                    Ok(None) => {}
                    Err(err) => {
                        status = ItemStatus::Failed;
                        error = Some(humanize_error(&err).to_string());
                    }
                }
            }
        }
        // An item whose outputs could not be written counts as failed, not done.
        if status != item.status {
            write_failures += 1;
        }
        items.push(ItemReport {
            input: source.display().to_string(),
            status,
            result: item.result.as_ref().map(|r| r.summary()),
            error,
            written,
        });
    }

    let unreadable_count = inputs.len() - sources.len();
    let mut summary = batch.summary();
    summary.total += unreadable_count;
    summary.done = summary.done.saturating_sub(write_failures);
    summary.failed += unreadable_count + write_failures;
    let report = RunReport { summary, items };
    print_report(&report, common)?;
    Ok(report)
}

fn merge(engine: &MediaEngine, inputs: &[PathBuf], common: &CommonArgs) -> Result<RunReport> {
    let assets = inputs.iter().map(|p| read_asset(p)).collect::<Result<Vec<_>>>()?;
    let merged = engine.merge_documents(&assets, None)?;

    let path = common.out_dir.join(merged.name());
    fs::write(&path, merged.bytes())?;

    let summary = BatchSummary {
        total: 1,
        done: 1,
        ..BatchSummary::default()
    };
    let report = RunReport {
        summary,
        items: vec![ItemReport {
            input: inputs
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            status: ItemStatus::Done,
            result: Some(mediawerk_core::TransformResult::Merged(merged).summary()),
            error: None,
            written: vec![path],
        }],
    };
    print_report(&report, common)?;
    Ok(report)
}

/// Read a file and infer its format from the extension.
fn read_asset(path: &Path) -> Result<EncodedAsset> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| MediawerkError::InvalidOptions(format!("{} is not a file", path.display())))?;
    let format = AssetFormat::from_file_name(&name).ok_or_else(|| {
        MediawerkError::InvalidOptions(format!("cannot tell the format of {name} from its extension"))
    })?;
    let bytes = fs::read(path)?;
    Ok(EncodedAsset::new(name, format, bytes))
}

/// Write `output` under `out_dir`. Returns `None` when that would overwrite
/// the input it came from. A name already written in this run gets a
/// `_2`, `_3`, ... suffix instead of replacing the earlier output.
fn write_output(
    out_dir: &Path,
    output: &EncodedAsset,
    source: &Path,
    claimed: &mut HashSet<PathBuf>,
) -> Result<Option<PathBuf>> {
    let path = unclaimed_path(out_dir, output, claimed);
    if let (Ok(a), Ok(b)) = (path.canonicalize(), source.canonicalize())
        && a == b
    {
        tracing::warn!(path = %path.display(), "Output would overwrite its input, skipped");
        return Ok(None);
    }
    fs::write(&path, output.bytes())?;
    claimed.insert(path.clone());
    Ok(Some(path))
}

fn unclaimed_path(out_dir: &Path, output: &EncodedAsset, claimed: &HashSet<PathBuf>) -> PathBuf {
    let path = out_dir.join(output.name());
    if !claimed.contains(&path) {
        return path;
    }
    let base = output.base_name();
    let ext = output.format().extension();
    let renamed = (2..)
        .map(|n| out_dir.join(format!("{base}_{n}.{ext}")))
        .find(|candidate| !claimed.contains(candidate))
        .unwrap_or(path);
    tracing::warn!(
        name = output.name(),
        renamed = %renamed.display(),
        "Output name already used in this run, renamed"
    );
    renamed
}

fn print_report(report: &RunReport, common: &CommonArgs) -> Result<()> {
    if common.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if common.quiet {
        return Ok(());
    }
    for item in &report.items {
        for path in &item.written {
            println!("  wrote {}", path.display());
        }
        if let Some(error) = &item.error {
            println!("  {}: {error}", item.input);
        }
    }
    let summary = &report.summary;
    let mut line = format!("{} done, {} failed", summary.done, summary.failed);
    if summary.bytes_saved > 0 {
        line.push_str(&format!(", {} saved", format_bytes(summary.bytes_saved as u64)));
    }
    println!("{line}");
    Ok(())
}

fn status_label(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Pending => "pending",
        ItemStatus::Processing => "working",
        ItemStatus::Done => "done",
        ItemStatus::Failed => "failed",
    }
}
