mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Deepest nesting a config may ask the walkers to follow.
pub const MAX_DEPTH_LIMIT: usize = 64;

const DEFAULT_PATHS: [&str; 3] = [
    "./metascope.toml",
    "~/.config/metascope/config.toml",
    "/etc/metascope/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// First default location that exists, if any.
pub fn find_config() -> Option<PathBuf> {
    DEFAULT_PATHS.iter().find_map(|path_str| {
        let path = PathBuf::from(shellexpand::tilde(path_str).as_ref());
        path.exists().then_some(path)
    })
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    match find_config() {
        Some(path) => {
            tracing::debug!("Using config file {:?}", path);
            load_config(&path)
        }
        None => Ok(Config::default()),
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let parser = &config.parser;

    for (name, depth) in [
        ("max_box_depth", parser.max_box_depth),
        ("max_element_depth", parser.max_element_depth),
    ] {
        if depth == 0 || depth > MAX_DEPTH_LIMIT {
            anyhow::bail!(
                "parser.{} must be between 1 and {}, got {}",
                name,
                MAX_DEPTH_LIMIT,
                depth
            );
        }
    }

    if parser.max_file_size == 0 {
        anyhow::bail!("parser.max_file_size cannot be 0");
    }
    if parser.max_text_bytes == 0 {
        anyhow::bail!("parser.max_text_bytes cannot be 0");
    }

    if parser.preview_entries > parser.max_table_entries {
        tracing::warn!(
            "parser.preview_entries ({}) exceeds max_table_entries ({})",
            parser.preview_entries,
            parser.max_table_entries
        );
    }

    if config.output.indent > 16 {
        anyhow::bail!("output.indent must be at most 16");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_depth_bounds() {
        let mut config = Config::default();
        config.parser.max_box_depth = 0;
        assert!(validate_config(&config).is_err());

        config.parser.max_box_depth = MAX_DEPTH_LIMIT;
        assert!(validate_config(&config).is_ok());

        config.parser.max_element_depth = MAX_DEPTH_LIMIT + 1;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("max_element_depth"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [parser]
            max_box_depth = 12

            [parser.capabilities]
            inflate_text = false
            "#,
        )
        .unwrap();

        assert_eq!(config.parser.max_box_depth, 12);
        assert_eq!(config.parser.max_element_depth, 8);
        assert!(!config.parser.capabilities.inflate_text);
        assert!(config.parser.capabilities.codec_parameters);
        assert!(config.output.pretty);
    }
}
