//! Sticker background removal CLI
//!
//! Removes the flat background of one or many sticker images and writes
//! `<stem>_noBG.<ext>` files next to the inputs or into an output directory.

use super::config::CliConfigBuilder;
use crate::{
    batch::output_file_name,
    config::{OutputFormat, RemovalConfig},
    processor::BackgroundRemovalProcessor,
    services::{ConsoleProgressReporter, ImageIOService, OutputFormatHandler},
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    types::{PickPoint, ReferenceColor},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, Instrument};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "tiff", "tif"];

/// Remove flat backgrounds from sticker images
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "sticker-bgremove")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<String>,

    /// Output file (single input) or directory (several inputs). Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Color distance tolerance (5-150) [default: 45]
    #[arg(short, long)]
    pub tolerance: Option<u32>,

    /// Sample the background color at X,Y instead of the top-left pixel
    #[arg(long, value_name = "X,Y")]
    pub pick: Option<PickPoint>,

    /// Use this background color (#RRGGBB) instead of sampling
    #[arg(long, value_name = "#RRGGBB")]
    pub color: Option<ReferenceColor>,

    /// Output format [default: png]
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// JPEG quality (0-100) [default: 90]
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// File name pattern for directory inputs (e.g., "*.png")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Also write the removal mask as `<stem>_noBG_mask.png`
    #[arg(long)]
    pub save_mask: bool,

    /// JSON configuration file; command-line flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Images processed concurrently (0 = available parallelism)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
    Tiff,
    Rgba8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => TracingFormat::Json,
        }
    }
}

/// Where one processed image goes
#[derive(Debug, Clone, PartialEq, Eq)]
enum OutputTarget {
    Stdout,
    File(PathBuf),
}

/// Outcome counts of one CLI run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RunSummary {
    processed: usize,
    failed: usize,
}

/// Entry point used by the `sticker-bgremove` binary
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize logging")?;

    CliConfigBuilder::validate_cli(&cli)?;
    let config = CliConfigBuilder::from_cli(&cli)?;
    debug!(config = ?config, "configuration resolved");
    OutputFormatHandler::validate_for_background_removal(config.output_format);

    let session = spans::session(&session_id, config.tolerance);
    let summary = process_inputs(&cli, &config).instrument(session).await?;

    if summary.failed > 0 {
        anyhow::bail!(
            "{} of {} input(s) failed",
            summary.failed,
            summary.failed + summary.processed
        );
    }
    Ok(())
}

async fn process_inputs(cli: &Cli, config: &RemovalConfig) -> Result<RunSummary> {
    if cli.input.len() == 1 && cli.input.first().is_some_and(|s| s == "-") {
        process_stdin(cli.output.as_deref(), config)?;
        return Ok(RunSummary {
            processed: 1,
            failed: 0,
        });
    }

    let all_files = collect_input_files(cli)?;
    if all_files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(RunSummary::default());
    }

    info!("Found {} image file(s) to process", all_files.len());

    let file_count = all_files.len();
    let output_dir = prepare_output_dir(cli.output.as_deref(), file_count)?;
    let jobs = effective_jobs(cli.jobs, file_count);
    debug!(jobs, "processing concurrency");

    let progress = if file_count > 1 {
        let pb = ProgressBar::new(file_count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let batch_start_time = Instant::now();
    let mut summary = RunSummary::default();

    let jobs_stream = stream::iter(all_files.into_iter().map(|input| {
        let target = output_target(&input, cli.output.as_deref(), output_dir.as_deref(), config);
        let config = config.clone();
        async move {
            let task_input = input.clone();
            let outcome =
                tokio::task::spawn_blocking(move || process_single_file(&config, &task_input, &target))
                    .await;
            (input, outcome)
        }
    }))
    .buffer_unordered(jobs);
    futures::pin_mut!(jobs_stream);

    let batch_span = spans::batch_processing(file_count);
    async {
        while let Some((input, outcome)) = jobs_stream.next().await {
            match outcome {
                Ok(Ok(written)) => {
                    summary.processed += 1;
                    debug!(input = %input.display(), output = ?written, "processed");
                },
                Ok(Err(e)) => {
                    summary.failed += 1;
                    error!("Failed to process {}: {:#}", input.display(), e);
                },
                Err(join_error) => {
                    summary.failed += 1;
                    error!("Worker for {} stopped: {}", input.display(), join_error);
                },
            }
            if let Some(pb) = &progress {
                pb.set_message(format!("{}", input.display()));
                pb.inc(1);
            }
        }
    }
    .instrument(batch_span)
    .await;

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "Completed! Processed: {}, Failed: {}",
            summary.processed, summary.failed
        ));
    }

    if file_count > 1 {
        let total = batch_start_time.elapsed();
        info!("Batch summary:");
        info!("  Files processed: {}", summary.processed);
        info!("  Files failed: {}", summary.failed);
        info!("  Total time: {:.2}s", total.as_secs_f64());
    }

    Ok(summary)
}

/// Expand the positional inputs into a sorted list of image files
fn collect_input_files(cli: &Cli) -> Result<Vec<PathBuf>> {
    let mut all_files = Vec::new();

    for input in &cli.input {
        let path = PathBuf::from(input);

        if path.is_file() {
            if is_image_file(&path) {
                all_files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            all_files.extend(find_image_files(&path, cli.recursive, cli.pattern.as_deref())?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    all_files.sort();
    all_files.dedup();
    Ok(all_files)
}

/// With several inputs, `--output` names a directory that is created on demand
fn prepare_output_dir(output: Option<&str>, file_count: usize) -> Result<Option<PathBuf>> {
    if file_count <= 1 {
        return Ok(None);
    }
    let Some(output) = output else {
        return Ok(None);
    };
    if output == "-" {
        anyhow::bail!("Cannot use stdout (-) as output when processing multiple files");
    }

    let output_path = PathBuf::from(output);
    if !output_path.exists() {
        std::fs::create_dir_all(&output_path).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;
    } else if output_path.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output_path.display()
        );
    }
    Ok(Some(output_path))
}

fn output_target(
    input: &Path,
    output: Option<&str>,
    output_dir: Option<&Path>,
    config: &RemovalConfig,
) -> OutputTarget {
    if let Some(dir) = output_dir {
        return OutputTarget::File(generate_output_path_with_dir(input, dir, config.output_format));
    }
    match output {
        Some("-") => OutputTarget::Stdout,
        Some(path) => OutputTarget::File(PathBuf::from(path)),
        None => OutputTarget::File(generate_output_path(input, config.output_format)),
    }
}

/// Resolve `--jobs`, never more workers than files
fn effective_jobs(requested: usize, file_count: usize) -> usize {
    let jobs = if requested == 0 {
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    } else {
        requested
    };
    jobs.min(file_count).max(1)
}

/// Processor for one input; debug runs get per-stage progress lines
fn new_processor(config: &RemovalConfig) -> Result<BackgroundRemovalProcessor> {
    let processor = BackgroundRemovalProcessor::new(config.clone())?;
    Ok(if config.debug {
        processor.with_progress_reporter(Box::new(ConsoleProgressReporter::new(true)))
    } else {
        processor
    })
}

/// Process one file; runs on a blocking worker thread
fn process_single_file(
    config: &RemovalConfig,
    input: &Path,
    target: &OutputTarget,
) -> Result<Option<PathBuf>> {
    let _span = spans::file_processing(input).entered();

    let mut processor = new_processor(config)?;
    let mut result = processor
        .process_file(input)
        .with_context(|| format!("Failed to process {}", input.display()))?;

    match target {
        OutputTarget::Stdout => {
            let bytes = result.to_bytes(config.output_format, config.jpeg_quality)?;
            write_stdout(&bytes)?;
            Ok(None)
        },
        OutputTarget::File(path) => {
            result
                .save(path, config.output_format, config.jpeg_quality)
                .with_context(|| format!("Failed to save {}", path.display()))?;
            if config.save_mask {
                let mask_path = mask_path_for(path);
                result.mask.save_png(&mask_path)?;
                debug!(mask = %mask_path.display(), "mask written");
            }
            info!(
                "{} -> {} ({} px removed, {})",
                input.display(),
                path.display(),
                result.transparent_pixel_count(),
                result.timing_summary()
            );
            Ok(Some(path.clone()))
        },
    }
}

/// Process one image read from stdin
fn process_stdin(output: Option<&str>, config: &RemovalConfig) -> Result<()> {
    info!("Reading image from stdin");
    let image_data = read_stdin()?;

    match ImageIOService::detect_format(&image_data) {
        Some(format) => info!("Detected image format: {:?}", format),
        None => warn!("Could not detect image format from stdin data"),
    }

    let mut processor = new_processor(config)?;
    let mut result = processor
        .process_bytes(&image_data)
        .context("Failed to process image from stdin")?;

    match output {
        None | Some("-") => {
            let bytes = result.to_bytes(config.output_format, config.jpeg_quality)?;
            write_stdout(&bytes)
        },
        Some(path) => {
            let path = PathBuf::from(path);
            result.save(&path, config.output_format, config.jpeg_quality)?;
            if config.save_mask {
                result.mask.save_png(mask_path_for(&path))?;
            }
            info!("Saved {}", path.display());
            Ok(())
        },
    }
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;
    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }
    Ok(buffer)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Find image files in a directory
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if is_image_file(path) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if is_image_file(&path) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Check if file is an image based on extension
fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Check if the file name matches the given glob pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            }),
        None => true,
    }
}

/// `<stem>_noBG.<ext>` next to the input
fn generate_output_path(input_path: &Path, format: OutputFormat) -> PathBuf {
    let dir = input_path.parent().unwrap_or(Path::new("."));
    generate_output_path_with_dir(input_path, dir, format)
}

/// `<stem>_noBG.<ext>` inside `output_dir`
fn generate_output_path_with_dir(input_path: &Path, output_dir: &Path, format: OutputFormat) -> PathBuf {
    let name = input_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(output_file_name(&name, format))
}

/// `<output stem>_mask.png` beside the output file
fn mask_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    output.with_file_name(format!("{}_mask.png", stem))
}
