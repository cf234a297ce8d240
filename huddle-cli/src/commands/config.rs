use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use shared::config::client::ClientConfig;

/// Renders the default client settings in `format` (`yaml`, `json` or
/// `toml`).
///
/// # Errors
/// Returns an error for unknown formats.
pub fn render_default_config(format: &str) -> Result<String> {
    let config = ClientConfig::default();
    let rendered = match format {
        "yaml" | "yml" => serde_yml::to_string(&config)?,
        "json" => serde_json::to_string_pretty(&config)?,
        "toml" => toml::to_string_pretty(&config)?,
        other => bail!("unsupported format '{other}'; use yaml, json or toml"),
    };
    Ok(rendered)
}

/// Prints the default client settings, or writes them to `output`.
///
/// # Errors
/// Returns an error for unknown formats or when the file cannot be written.
pub fn generate_config(format: &str, output: Option<&Path>) -> Result<()> {
    let rendered = render_default_config(format)?;
    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Configuration file '{}' generated.", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rendered_defaults_load_back() {
        let dir = TempDir::new().unwrap();
        for format in ["yaml", "json", "toml"] {
            let path = dir.path().join(format!("client.{format}"));
            generate_config(format, Some(&path)).unwrap();

            let loaded = ClientConfig::load(Some(&path)).unwrap();
            assert_eq!(loaded.poll_interval_ms, 1_000);
            assert_eq!(loaded.reconnect_delay_ms, 1_000);
        }
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = render_default_config("ini").unwrap_err();
        assert!(err.to_string().contains("unsupported format"));
    }
}
