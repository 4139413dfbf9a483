//! Config command - View and validate spsync configuration
//!
//! Provides the `spsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::Subcommand;
use spsync_core::config::Config;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};
use crate::Context;

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, ctx: &Context) -> Result<ExitCode> {
        match self {
            ConfigCommand::Show => execute_show(ctx),
            ConfigCommand::Validate => execute_validate(ctx),
        }
    }
}

fn execute_show(ctx: &Context) -> Result<ExitCode> {
    let formatter = get_formatter(ctx.format, ctx.quiet);
    let config = super::load_config(ctx)?;

    info!(config_path = %ctx.config_path.display(), "Showing configuration");

    if ctx.format == OutputFormat::Json {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
        formatter.info("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn execute_validate(ctx: &Context) -> Result<ExitCode> {
    let formatter = get_formatter(ctx.format, ctx.quiet);
    let path = &ctx.config_path;

    // Load explicitly (not load_or_default) so parse errors are reported
    let config = match Config::load(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            let message = if path.exists() {
                format!("Failed to parse configuration: {e}")
            } else {
                "Configuration file not found".to_string()
            };
            if ctx.format == OutputFormat::Json {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path.display().to_string(),
                    "errors": [message],
                }));
            } else {
                formatter.error(&message);
                formatter.info(&format!("File: {}", path.display()));
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    info!(config_path = %path.display(), "Validating configuration");

    let errors = config.validate();

    if ctx.format == OutputFormat::Json {
        let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": path.display().to_string(),
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", path.display()));
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    Ok(if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
