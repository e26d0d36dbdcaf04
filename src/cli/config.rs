//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliOutputFormat};
use crate::config::{OutputFormat, RemovalConfig, RemovalConfigBuilder};
use anyhow::{Context, Result};

/// Convert CLI arguments into a validated `RemovalConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration: JSON file first, then CLI flags on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<RemovalConfig> {
        let base = match &cli.config {
            Some(path) => RemovalConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => RemovalConfig::default(),
        };

        let mut builder = RemovalConfigBuilder::from_config(base.clone());

        if let Some(tolerance) = cli.tolerance {
            builder = builder.tolerance(tolerance);
        }
        if cli.pick.is_some() {
            builder = builder.manual_pick(cli.pick);
        }
        if cli.color.is_some() {
            builder = builder.reference_color(cli.color);
        }
        if let Some(format) = cli.format {
            builder = builder.output_format(Self::output_format(format));
        }
        if let Some(quality) = cli.jpeg_quality {
            builder = builder.jpeg_quality(quality);
        }

        builder
            .save_mask(base.save_mask || cli.save_mask)
            .debug(base.debug || cli.verbose >= 2)
            .build()
            .context("Invalid configuration")
    }

    fn output_format(format: CliOutputFormat) -> OutputFormat {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            CliOutputFormat::Webp => OutputFormat::WebP,
            CliOutputFormat::Tiff => OutputFormat::Tiff,
            CliOutputFormat::Rgba8 => OutputFormat::Rgba8,
        }
    }

    /// Reject argument combinations that cannot work before touching any file
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(quality) = cli.jpeg_quality {
            if quality > 100 {
                anyhow::bail!("JPEG quality must be 0-100, got {}", quality);
            }
        }

        let stdin_inputs = cli.input.iter().filter(|i| *i == "-").count();
        if stdin_inputs > 0 && cli.input.len() > 1 {
            anyhow::bail!("stdin (-) cannot be combined with other inputs");
        }

        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid glob pattern '{}'", pattern))?;
        }

        Ok(())
    }
}
