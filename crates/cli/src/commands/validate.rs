//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{QuirkPolicy, SyncEngineConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    reference_type: String,
    counter_bits: u32,
    modulus: u64,
    target_window: u64,
    firmware_tag: String,
    quirk_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    reference_type: config.reference_type.to_string(),
                    counter_bits: config.counter_bits,
                    modulus: config.modulus(),
                    target_window: config.target_window,
                    firmware_tag: config.firmware.tag.clone(),
                    quirk_count: config.quirks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &SyncEngineConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.quirks.is_empty() {
        warnings.push("No family quirks configured - every channel uses plain counting".to_string());
    }

    for quirk in &config.quirks {
        if quirk.policy == QuirkPolicy::None && quirk.mask_bits.is_none() {
            warnings.push(format!(
                "Quirk entry for family '{}' has neither a policy nor a mask",
                quirk.family
            ));
        }
    }

    if config.target_window >= config.modulus() {
        warnings.push(format!(
            "target_window {} spans a full counter period ({})",
            config.target_window,
            config.modulus()
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Reference channel: {}", summary.reference_type);
            println!(
                "  Counter: {} bits (modulus {})",
                summary.counter_bits, summary.modulus
            );
            println!("  Target window: {}", summary.target_window);
            println!("  Firmware tag: {}", summary.firmware_tag);
            println!("  Family quirks: {}", summary.quirk_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
