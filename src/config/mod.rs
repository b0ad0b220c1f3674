mod types;

pub use types::*;

use crate::settings::{validate_bitrate, validate_passes, validate_sample_rate};
use anyhow::{Context, Result};
use std::path::Path;

/// Default locations searched when no config path is given, in order.
const DEFAULT_PATHS: [&str; 3] = [
    "./audiobook-compressor.toml",
    "./config.toml",
    "~/.config/audiobook-compressor/config.toml",
];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config).with_context(|| format!("Invalid config file: {:?}", path))?;

    tracing::debug!("Loaded config from {:?}", path);
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let encoding = &config.encoding;
    validate_bitrate(encoding.bitrate).context("[encoding] bitrate")?;
    validate_sample_rate(encoding.sample_rate).context("[encoding] sample_rate")?;
    validate_passes(encoding.passes).context("[encoding] passes")?;

    for (name, table) in [
        ("mono", config.overrides.mono.as_ref()),
        ("stereo", config.overrides.stereo.as_ref()),
    ] {
        let Some(table) = table.filter(|t| t.enabled) else {
            continue;
        };
        validate_bitrate(table.bitrate)
            .with_context(|| format!("[overrides.{name}] bitrate"))?;
        validate_sample_rate(table.sample_rate)
            .with_context(|| format!("[overrides.{name}] sample_rate"))?;
        validate_passes(table.passes).with_context(|| format!("[overrides.{name}] passes"))?;
    }

    let folder = config.output.folder_name.trim();
    if folder.is_empty() {
        anyhow::bail!("[output] folder_name cannot be empty");
    }
    if folder.contains(['/', '\\']) || folder == "." || folder == ".." {
        anyhow::bail!(
            "[output] folder_name must be a single folder name, got {:?}",
            config.output.folder_name
        );
    }

    for (name, path) in [
        ("ffmpeg_path", config.tools.ffmpeg_path.as_ref()),
        ("ffprobe_path", config.tools.ffprobe_path.as_ref()),
    ] {
        if let Some(path) = path.filter(|p| !p.exists()) {
            tracing::warn!("[tools] {} does not exist: {:?}", name, path);
        }
    }

    Ok(())
}
