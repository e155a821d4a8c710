// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load and validate mpsh serial and transfer configuration.
// Author: Lukas Bower

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use mpbridge_core::fs::DEFAULT_TEXT_EXTENSIONS;
use serde::Deserialize;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "mpsh.toml";
/// Baud rate used by stock MicroPython firmware.
pub const DEFAULT_BAUD: u32 = 115_200;
/// Quiet period after which a serial read gives up.
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;
/// Pause after each slice of program text so the board's UART buffer drains.
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 10;

/// Effective mpsh configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpshConfig {
    /// Serial link settings.
    pub serial: SerialConfig,
    /// File transfer settings.
    pub transfer: TransferConfig,
}

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path such as `/dev/ttyACM0` or `COM3`.
    pub port: Option<String>,
    /// Line speed.
    pub baud: u32,
    /// Read timeout in milliseconds.
    pub timeout_ms: u64,
    /// Soft-reset the board when first entering raw mode.
    pub soft_reset: bool,
    /// Pause in milliseconds after each slice of program text; 0 disables it.
    pub chunk_delay_ms: u64,
}

/// File transfer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Extensions downloaded as text, without the dot.
    pub text_extensions: Vec<String>,
}

impl Default for MpshConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig {
                port: None,
                baud: DEFAULT_BAUD,
                timeout_ms: DEFAULT_TIMEOUT_MS,
                soft_reset: false,
                chunk_delay_ms: DEFAULT_CHUNK_DELAY_MS,
            },
            transfer: TransferConfig {
                text_extensions: DEFAULT_TEXT_EXTENSIONS
                    .iter()
                    .map(|ext| (*ext).to_owned())
                    .collect(),
            },
        }
    }
}

impl MpshConfig {
    /// Apply overrides and return an updated configuration.
    pub fn with_overrides(self, overrides: &ConfigOverrides) -> Result<Self> {
        let mut updated = self;
        if let Some(port) = &overrides.port {
            updated.serial.port = Some(port.clone());
        }
        if let Some(baud) = overrides.baud {
            updated.serial.baud = baud;
        }
        validate_config(&updated)?;
        Ok(updated)
    }
}

/// Optional overrides layered on top of the file configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Override the serial device.
    pub port: Option<String>,
    /// Override the baud rate.
    pub baud: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    #[serde(default)]
    serial: SerialTomlSection,
    #[serde(default)]
    transfer: TransferTomlSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SerialTomlSection {
    port: Option<String>,
    baud: Option<u32>,
    timeout_ms: Option<u64>,
    soft_reset: Option<bool>,
    chunk_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransferTomlSection {
    text_extensions: Option<Vec<String>>,
}

/// Return `./mpsh.toml` when it exists.
pub fn default_config_path() -> Option<PathBuf> {
    let candidate = std::env::current_dir().ok()?.join(DEFAULT_CONFIG_FILE);
    candidate.is_file().then_some(candidate)
}

/// Load and validate a configuration file; missing keys keep their defaults.
pub fn load_config(path: &Path) -> Result<MpshConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read mpsh config {}", path.display()))?;
    parse_config(&text).with_context(|| format!("invalid mpsh config {}", path.display()))
}

/// Parse configuration text.
pub fn parse_config(text: &str) -> Result<MpshConfig> {
    let parsed: ConfigToml = toml::from_str(text).context("invalid mpsh config TOML")?;
    let mut config = MpshConfig::default();
    if let Some(port) = parsed.serial.port {
        config.serial.port = Some(port);
    }
    if let Some(baud) = parsed.serial.baud {
        config.serial.baud = baud;
    }
    if let Some(timeout_ms) = parsed.serial.timeout_ms {
        config.serial.timeout_ms = timeout_ms;
    }
    if let Some(soft_reset) = parsed.serial.soft_reset {
        config.serial.soft_reset = soft_reset;
    }
    if let Some(chunk_delay_ms) = parsed.serial.chunk_delay_ms {
        config.serial.chunk_delay_ms = chunk_delay_ms;
    }
    if let Some(extensions) = parsed.transfer.text_extensions {
        config.transfer.text_extensions = extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_owned())
            .collect();
    }
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &MpshConfig) -> Result<()> {
    if config.serial.baud == 0 {
        return Err(anyhow!("mpsh serial baud must be >= 1"));
    }
    if config.serial.timeout_ms == 0 {
        return Err(anyhow!("mpsh serial timeout_ms must be >= 1"));
    }
    if let Some(port) = &config.serial.port {
        if port.trim().is_empty() {
            return Err(anyhow!("mpsh serial port must not be empty"));
        }
    }
    if config
        .transfer
        .text_extensions
        .iter()
        .any(|ext| ext.is_empty())
    {
        return Err(anyhow!("mpsh transfer text_extensions must not contain empty entries"));
    }
    Ok(())
}
