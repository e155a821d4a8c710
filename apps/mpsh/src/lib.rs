// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Command shell for MicroPython boards reached over the raw REPL.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! mpsh: a small shell for browsing and editing a MicroPython board's
//! filesystem over its serial raw REPL.
//!
//! The shell drives a [`BoardFs`] and can run against real hardware through
//! [`serial::SerialBoard`] or against the in-memory [`mpbridge_core::MockBoard`].

pub mod config;
pub mod serial;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use mpbridge_core::raw::{LineShell, RawRepl};
use mpbridge_core::{catalog, path, BoardFs, FileNode, StatRecord};

pub use config::{load_config, ConfigOverrides, MpshConfig};
pub use serial::SerialBoard;

/// Result of executing a single shell command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandStatus {
    /// Continue reading commands.
    Continue,
    /// Exit the shell loop.
    Quit,
}

const HELP: &str = "Available commands: help, ls [-r] [path], tree [path], stat <path>, \
cat <path>, get <remote> [local_dir], put <local> [remote], mkdir <path>, rm <path>, \
rmdir [-f] <path>, mv <old> <new>, cd <path>, id, ! <line>, quit";

/// Shell driver responsible for parsing commands and invoking the board.
pub struct Shell<R: RawRepl + LineShell, W: Write> {
    fs: BoardFs<R>,
    cwd: String,
    local_dir: PathBuf,
    writer: W,
}

impl<R: RawRepl + LineShell, W: Write> Shell<R, W> {
    /// Create a new shell given a board filesystem and output writer.
    pub fn new(fs: BoardFs<R>, writer: W) -> Self {
        Self {
            fs,
            cwd: "/".to_owned(),
            local_dir: PathBuf::from("."),
            writer,
        }
    }

    /// Host directory that `get` writes into when none is given.
    #[must_use]
    pub fn with_local_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = dir.into();
        self
    }

    /// Board directory that relative paths resolve against.
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Write a line directly to the shell output.
    pub fn write_line(&mut self, message: &str) -> Result<()> {
        writeln!(self.writer, "{message}")?;
        Ok(())
    }

    /// Execute commands from a buffered reader until EOF or `quit` is encountered.
    pub fn run_script<B: BufRead>(&mut self, reader: B) -> Result<()> {
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if self.execute(trimmed)? == CommandStatus::Quit {
                break;
            }
        }
        Ok(())
    }

    /// Run an interactive loop against stdin; command errors are reported and the loop continues.
    pub fn repl(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut reader = stdin.lock();
        let mut line = String::new();
        loop {
            write!(self.writer, "mpsh:{}> ", self.cwd)?;
            self.writer.flush()?;
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                writeln!(self.writer)?;
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match self.execute(trimmed) {
                Ok(CommandStatus::Quit) => break,
                Ok(CommandStatus::Continue) => {}
                Err(err) => writeln!(self.writer, "error: {err:#}")?,
            }
        }
        Ok(())
    }

    /// Execute a single command line.
    pub fn execute(&mut self, line: &str) -> Result<CommandStatus> {
        if let Some(passthrough) = line.strip_prefix('!') {
            let response = self.fs.channel().lock()?.send_line(passthrough.trim())?;
            if !response.is_empty() {
                writeln!(self.writer, "{response}")?;
            }
            return Ok(CommandStatus::Continue);
        }
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(CommandStatus::Continue);
        };
        let args: Vec<&str> = parts.collect();
        match cmd {
            "help" => {
                writeln!(self.writer, "{HELP}")?;
            }
            "ls" => {
                let (recursive, rest) = split_flag(&args, "-r");
                let dir = self.resolve(rest.first().copied().unwrap_or("."));
                let nodes = self.fs.list_tree(&dir, recursive)?;
                write_listing(&mut self.writer, &nodes)?;
            }
            "tree" => {
                let dir = self.resolve(args.first().copied().unwrap_or("."));
                let nodes = self.fs.list_tree(&dir, true)?;
                write_tree(&mut self.writer, &nodes, 0)?;
            }
            "stat" => {
                let target = self.resolve(required(&args, 0, "stat requires a path")?);
                let stat = self.fs.stat(&target)?;
                write_stat(&mut self.writer, &target, &stat)?;
            }
            "cat" => {
                let target = self.resolve(required(&args, 0, "cat requires a path")?);
                let content = self.fs.read_from_board(&target)?;
                let text = String::from_utf8_lossy(&content);
                write!(self.writer, "{text}")?;
                if !text.is_empty() && !text.ends_with('\n') {
                    writeln!(self.writer)?;
                }
            }
            "get" => {
                let target = self.resolve(required(&args, 0, "get requires a board path")?);
                let dest = args
                    .get(1)
                    .map_or_else(|| self.local_dir.clone(), |dir| PathBuf::from(*dir));
                let written = self
                    .fs
                    .copy_from_board(&target, &dest)
                    .with_context(|| format!("failed to copy {target}"))?;
                writeln!(self.writer, "{target}: {written} bytes copied")?;
            }
            "put" => {
                let local = Path::new(required(&args, 0, "put requires a local file")?);
                let remote = match args.get(1) {
                    Some(remote) => self.resolve(remote),
                    None => self.resolve(host_file_name(local)?),
                };
                self.fs
                    .copy_to_board(local, &remote)
                    .with_context(|| format!("failed to upload {}", local.display()))?;
                writeln!(self.writer, "{remote}: uploaded")?;
            }
            "mkdir" => {
                let target = self.resolve(required(&args, 0, "mkdir requires a path")?);
                self.fs.mkdir(&target)?;
            }
            "rm" => {
                let target = self.resolve(required(&args, 0, "rm requires a path")?);
                self.fs.remove(&target)?;
            }
            "rmdir" => {
                let (force, rest) = split_flag(&args, "-f");
                let target = self.resolve(required(&rest, 0, "rmdir requires a path")?);
                self.fs.rmdir(&target, force)?;
            }
            "mv" => {
                let old = self.resolve(required(&args, 0, "mv requires a source")?);
                let new = self.resolve(required(&args, 1, "mv requires a destination")?);
                self.fs.rename(&old, &new)?;
            }
            "cd" => {
                let target = self.resolve(args.first().copied().unwrap_or("/"));
                self.fs.chdir(&target)?;
                self.cwd = target;
            }
            "id" => {
                let id = self.fs.channel().lock()?.id()?;
                write_id(&mut self.writer, &id)?;
            }
            "quit" | "exit" => {
                writeln!(self.writer, "closing session")?;
                return Ok(CommandStatus::Quit);
            }
            unknown => return Err(anyhow!("unknown command '{unknown}'")),
        }
        Ok(CommandStatus::Continue)
    }

    /// Consume the shell and return the board filesystem and writer.
    pub fn into_parts(self) -> (BoardFs<R>, W) {
        (self.fs, self.writer)
    }

    fn resolve(&self, arg: &str) -> String {
        if arg.starts_with('/') || arg.starts_with('\\') || arg.contains(':') {
            path::normalize(arg)
        } else {
            path::normalize(&path::join(&self.cwd, arg))
        }
    }
}

fn split_flag<'a>(args: &[&'a str], flag: &str) -> (bool, Vec<&'a str>) {
    let present = args.contains(&flag);
    let rest = args.iter().copied().filter(|arg| *arg != flag).collect();
    (present, rest)
}

fn required<'a>(args: &[&'a str], idx: usize, message: &'static str) -> Result<&'a str> {
    args.get(idx).copied().ok_or_else(|| anyhow!(message))
}

fn host_file_name(local: &Path) -> Result<&str> {
    local
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", local.display()))
}

/// Write one line per node, descending into any nested children.
pub fn write_listing<W: Write>(writer: &mut W, nodes: &[FileNode]) -> io::Result<()> {
    for node in nodes.iter().flat_map(|node| node.walk()) {
        writeln!(writer, "{node}")?;
    }
    Ok(())
}

/// Write an indented tree with aggregate directory sizes.
pub fn write_tree<W: Write>(writer: &mut W, nodes: &[FileNode], depth: usize) -> io::Result<()> {
    for node in nodes {
        let indent = "  ".repeat(depth);
        if node.is_dir() {
            writeln!(writer, "{indent}{}/ ({} bytes)", node.name(), node.size())?;
            if node.has_children() {
                write_tree(writer, node.children(), depth + 1)?;
            }
        } else {
            writeln!(
                writer,
                "{indent}{} ({} bytes, {})",
                node.name(),
                node.size(),
                node.content_type()
            )?;
        }
    }
    Ok(())
}

/// Write a one-line summary of a stat record.
pub fn write_stat<W: Write>(writer: &mut W, target: &str, stat: &StatRecord) -> io::Result<()> {
    let kind = if stat.is_dir() { "directory" } else { "file" };
    writeln!(
        writer,
        "{target}: {kind} mode=0o{:o} size={} mtime={}",
        stat.mode, stat.size, stat.mtime
    )
}

/// Write `os.uname()` pairs as aligned `key: value` lines.
pub fn write_id<W: Write>(writer: &mut W, id: &[(String, String)]) -> io::Result<()> {
    for (key, value) in id {
        writeln!(writer, "{key:<9}: {value}")?;
    }
    Ok(())
}

/// Write the signatures of the device-side operation catalog.
pub fn write_operations<W: Write>(writer: &mut W) -> io::Result<()> {
    for operation in catalog::operations() {
        writeln!(writer, "{}", operation.signature())?;
    }
    Ok(())
}

/// Forward lines to the board's friendly REPL until EOF or `exit`.
pub fn passthrough<R, B, W>(fs: &BoardFs<R>, input: B, mut writer: W) -> Result<()>
where
    R: RawRepl + LineShell,
    B: BufRead,
    W: Write,
{
    writeln!(
        writer,
        "Enter your commands below.\nInsert \"exit\" to leave the application."
    )?;
    for line in input.lines() {
        let line = line.context("failed to read input")?;
        if line.trim().eq_ignore_ascii_case("exit") {
            break;
        }
        let response = fs.channel().lock()?.send_line(&line)?;
        if !response.is_empty() {
            writeln!(writer, "{response}")?;
        }
    }
    Ok(())
}
