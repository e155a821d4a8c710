// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate mpsh configuration loading from disk.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fs;

use mpsh::config::{DEFAULT_BAUD, DEFAULT_CHUNK_DELAY_MS, DEFAULT_TIMEOUT_MS};
use mpsh::{load_config, ConfigOverrides};
use tempfile::NamedTempFile;

#[test]
fn load_config_reads_all_sections() {
    let file = NamedTempFile::new().unwrap();
    fs::write(
        file.path(),
        r#"
[serial]
port = "/dev/ttyACM0"
timeout_ms = 250
soft_reset = true
chunk_delay_ms = 0

[transfer]
text_extensions = [".py", "md"]
"#,
    )
    .unwrap();
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM0"));
    assert_eq!(config.serial.baud, DEFAULT_BAUD);
    assert_eq!(config.serial.timeout_ms, 250);
    assert!(config.serial.soft_reset);
    assert_eq!(config.serial.chunk_delay_ms, 0);
    assert_eq!(config.transfer.text_extensions, ["py", "md"]);
}

#[test]
fn unknown_keys_are_rejected() {
    let file = NamedTempFile::new().unwrap();
    fs::write(file.path(), "[serial]\nspeed = 9600\n").unwrap();
    let err = load_config(file.path()).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("invalid mpsh config"), "{message}");
    assert!(message.contains("speed"), "{message}");
}

#[test]
fn missing_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn empty_port_override_is_rejected() {
    let file = NamedTempFile::new().unwrap();
    fs::write(file.path(), "").unwrap();
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.serial.timeout_ms, DEFAULT_TIMEOUT_MS);
    assert_eq!(config.serial.chunk_delay_ms, DEFAULT_CHUNK_DELAY_MS);
    let err = config
        .with_overrides(&ConfigOverrides {
            port: Some("  ".to_owned()),
            baud: None,
        })
        .unwrap_err();
    assert!(err.to_string().contains("port"));
}
