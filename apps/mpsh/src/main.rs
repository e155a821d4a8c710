// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the MicroPython board shell.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the MicroPython board shell.

use std::env;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, LevelFilter};
use mpbridge_core::raw::{LineShell, RawRepl};
use mpbridge_core::{path, BoardFs, Channel, ChannelHandle, MockBoard};

use mpsh::config::default_config_path;
use mpsh::{
    load_config, passthrough, write_id, write_listing, write_operations, write_stat, write_tree,
    ConfigOverrides, MpshConfig, SerialBoard, Shell,
};

/// mpsh command-line arguments.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "MicroPython board shell", long_about = None)]
struct Cli {
    /// Serial device the board is attached to.
    #[arg(long, global = true)]
    port: Option<String>,

    /// Serial line speed.
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Path to an mpsh TOML configuration file.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Talk to the built-in simulated board instead of a serial port.
    #[arg(long, global = true)]
    mock: bool,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive command shell (default).
    Shell {
        /// Execute commands from a script file instead of stdin.
        #[arg(long, value_name = "FILE")]
        script: Option<PathBuf>,
    },
    /// Forward lines to the board's friendly REPL.
    Repl,
    /// List a directory.
    Ls {
        /// Board directory.
        #[arg(default_value = "/")]
        path: String,
        /// Descend into subdirectories.
        #[arg(short, long)]
        recursive: bool,
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Print an indented tree with directory sizes.
    Tree {
        /// Board directory.
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show metadata for a path.
    Stat {
        /// Board path.
        path: String,
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Download a file into a host directory.
    Get {
        /// Board file.
        remote: String,
        /// Host directory.
        #[arg(default_value = ".")]
        dest: PathBuf,
    },
    /// Upload a host file.
    Put {
        /// Host file.
        local: PathBuf,
        /// Board path; defaults to the file name in `/`.
        remote: Option<String>,
    },
    /// Copy the whole board filesystem into a host directory.
    Mirror {
        /// Host directory.
        dest: PathBuf,
    },
    /// Create a directory.
    Mkdir {
        /// Board directory.
        path: String,
        /// Succeed when the directory already exists.
        #[arg(long)]
        exist_ok: bool,
    },
    /// Remove a file.
    Rm {
        /// Board file.
        path: String,
    },
    /// Remove a directory.
    Rmdir {
        /// Board directory.
        path: String,
        /// Remove the directory's contents first.
        #[arg(short, long)]
        force: bool,
    },
    /// Rename a file or directory.
    Mv {
        /// Current path.
        old: String,
        /// New path.
        new: String,
    },
    /// Show the board's `os.uname()` fields.
    Id {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// List the device-side operation catalog.
    Ops,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = resolve_config(cli.config)?.with_overrides(&ConfigOverrides {
        port: env_string(cli.port, "MPSH_PORT"),
        baud: env_override(cli.baud, "MPSH_BAUD")?,
    })?;
    let command = cli.command.unwrap_or(Command::Shell { script: None });

    if matches!(command, Command::Ops) {
        write_operations(&mut io::stdout().lock())?;
        return Ok(());
    }
    if cli.mock {
        info!("using simulated board");
        return run(MockBoard::demo(), &config, command);
    }
    let board = SerialBoard::open(&config.serial).context("failed to open board")?;
    run(board, &config, command)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn run<R: RawRepl + LineShell>(board: R, config: &MpshConfig, command: Command) -> Result<()> {
    let fs = BoardFs::new(ChannelHandle::new(Channel::new(board)))
        .with_text_extensions(config.transfer.text_extensions.iter().cloned());
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match command {
        Command::Shell { script } => {
            let mut shell = Shell::new(fs, out);
            match script {
                Some(script) => {
                    let file = File::open(&script)
                        .with_context(|| format!("failed to open script {}", script.display()))?;
                    shell.run_script(BufReader::new(file))?;
                }
                None => shell.repl()?,
            }
            return Ok(());
        }
        Command::Repl => {
            passthrough(&fs, io::stdin().lock(), &mut out)?;
        }
        Command::Ls {
            path: dir,
            recursive,
            json,
        } => {
            let nodes = fs.list_tree(&dir, recursive)?;
            if json {
                serde_json::to_writer_pretty(&mut out, &nodes)?;
                writeln!(out)?;
            } else {
                write_listing(&mut out, &nodes)?;
            }
        }
        Command::Tree { path: dir } => {
            let nodes = fs.list_tree(&dir, true)?;
            write_tree(&mut out, &nodes, 0)?;
        }
        Command::Stat { path: target, json } => {
            let stat = fs.stat(&target)?;
            if json {
                serde_json::to_writer_pretty(&mut out, &stat)?;
                writeln!(out)?;
            } else {
                write_stat(&mut out, &path::normalize(&target), &stat)?;
            }
        }
        Command::Get { remote, dest } => {
            let written = fs.copy_from_board(&remote, &dest)?;
            writeln!(out, "{remote}: {written} bytes copied")?;
        }
        Command::Put { local, remote } => {
            let remote = match remote {
                Some(remote) => remote,
                None => local
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| format!("/{name}"))
                    .ok_or_else(|| anyhow!("{} has no usable file name", local.display()))?,
            };
            fs.copy_to_board(&local, &remote)
                .with_context(|| format!("failed to upload {}", local.display()))?;
            writeln!(out, "{}: uploaded", path::normalize(&remote))?;
        }
        Command::Mirror { dest } => {
            std::fs::create_dir_all(&dest)
                .with_context(|| format!("failed to create {}", dest.display()))?;
            let copied = fs.mirror_from_board(&dest, None)?;
            writeln!(out, "{copied} files copied to {}", dest.display())?;
        }
        Command::Mkdir {
            path: dir,
            exist_ok,
        } => {
            fs.channel()
                .lock()?
                .mkdir(&path::normalize(&dir), exist_ok)?;
        }
        Command::Rm { path: target } => fs.remove(&target)?,
        Command::Rmdir { path: dir, force } => fs.rmdir(&dir, force)?,
        Command::Mv { old, new } => fs.rename(&old, &new)?,
        Command::Id { json } => {
            let id = fs.channel().lock()?.id()?;
            if json {
                let map: serde_json::Map<String, serde_json::Value> = id
                    .into_iter()
                    .map(|(key, value)| (key, serde_json::Value::String(value)))
                    .collect();
                serde_json::to_writer_pretty(&mut out, &map)?;
                writeln!(out)?;
            } else {
                write_id(&mut out, &id)?;
            }
        }
        Command::Ops => write_operations(&mut out)?,
    }
    out.flush()?;
    Ok(())
}

fn resolve_config(cli_path: Option<PathBuf>) -> Result<MpshConfig> {
    if let Some(path) = cli_path {
        return load_config(&path);
    }
    if let Ok(value) = env::var("MPSH_CONFIG") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return load_config(&PathBuf::from(trimmed));
        }
    }
    match default_config_path() {
        Some(path) => load_config(&path),
        None => Ok(MpshConfig::default()),
    }
}

fn env_string(cli_value: Option<String>, key: &str) -> Option<String> {
    cli_value.or_else(|| {
        env::var(key)
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    })
}

fn parse_env_number<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed
                    .parse::<T>()
                    .map(Some)
                    .map_err(|err| anyhow!("invalid {key} value '{trimmed}': {err}"))
            }
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(anyhow!("failed to read {key}: {err}")),
    }
}

fn env_override<T>(cli_value: Option<T>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if cli_value.is_some() {
        return Ok(cli_value);
    }
    parse_env_number(key)
}
