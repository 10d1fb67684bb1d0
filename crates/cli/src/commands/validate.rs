//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{split_post_link, RelayBlueprint};

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
    version: String,
    identity_count: usize,
    source_count: usize,
    destination_count: usize,
    refresh_post: Option<String>,
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

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    identity_count: blueprint.identities.len(),
                    source_count: blueprint.sources.len(),
                    destination_count: blueprint.destinations.len(),
                    refresh_post: blueprint.refresh.as_ref().map(|r| r.post.clone()),
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
fn collect_warnings(blueprint: &RelayBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.identities.is_empty() {
        warnings.push("No identities configured - every delivery will be exhausted".to_string());
    }
    if blueprint.destinations.is_empty() {
        warnings.push("No destinations configured - nothing will be sent".to_string());
    }
    if blueprint.sources.is_empty() {
        warnings.push("No sources configured - relay and batch modes have no content".to_string());
    }

    if blueprint.batch.require_marker
        && !blueprint.sources.is_empty()
        && blueprint
            .sources
            .iter()
            .flat_map(|s| s.items.iter())
            .all(|item| !item.marker)
    {
        warnings.push(
            "batch.require_marker is set but no seeded item carries the marker".to_string(),
        );
    }

    // refreshing a post from a feed that is also relayed re-sends it through both paths
    if let Some((feed, _)) = blueprint
        .refresh
        .as_ref()
        .and_then(|r| split_post_link(&r.post))
    {
        if blueprint.sources.iter().any(|s| s.feed == feed.as_str()) {
            warnings.push(format!(
                "Refresh post comes from relayed source '{feed}'"
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Identities: {}", summary.identity_count);
            println!("  Sources: {}", summary.source_count);
            println!("  Destinations: {}", summary.destination_count);
            if let Some(ref post) = summary.refresh_post {
                println!("  Refresh post: {}", post);
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn args_for(content: &str) -> (tempfile::NamedTempFile, ValidateArgs) {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        (file, args)
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let (_file, args) = args_for(
            r#"
[[sources]]
feed = "news"
items = [{ id = 1 }]

[[destinations]]
link = "chat"
"#,
        );
        let result = validate_config(&args);
        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("No identities")));
        assert!(warnings.iter().any(|w| w.contains("require_marker")));
        assert_eq!(result.summary.unwrap().destination_count, 1);
    }

    #[test]
    fn test_duplicate_destination_is_invalid() {
        let (_file, args) = args_for(
            r#"
[[destinations]]
link = "https://t.me/chat"

[[destinations]]
link = "@chat"
"#,
        );
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: PathBuf::from("/nonexistent/relay.toml"),
            json: false,
        };
        assert!(!validate_config(&args).valid);
        assert!(run_validate(&args).is_err());
    }
}
