// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Remote execution channel with response parsing and stat caching.
// Author: Lukas Bower

//! Remote execution channel.
//!
//! The channel is the single owner of a board link. It renders catalog calls,
//! runs them through the raw REPL, parses the printed result and classifies
//! failures. It is not thread-safe; share it through [`ChannelHandle`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace, warn};

use crate::catalog::{op, RemoteCall};
use crate::error::{BoardError, RemoteErrorKind};
use crate::literal::{self, Value};
use crate::raw::{LineShell, RawRepl};
use crate::stat::StatRecord;
use crate::tree::{self, ScanRecord};

/// Execution channel over a raw REPL capability.
#[derive(Debug)]
pub struct Channel<R: RawRepl> {
    repl: R,
    stat_cache: HashMap<String, StatRecord>,
}

impl<R: RawRepl> Channel<R> {
    /// Take ownership of a board link.
    pub fn new(repl: R) -> Self {
        Self {
            repl,
            stat_cache: HashMap::new(),
        }
    }

    /// Borrow the underlying link.
    pub fn repl(&self) -> &R {
        &self.repl
    }

    /// Release the underlying link.
    pub fn into_inner(self) -> R {
        self.repl
    }

    /// Run a catalog operation.
    ///
    /// With `want_result` the printed value is parsed as a literal; otherwise
    /// the call runs for its side effects and `Value::None` is returned.
    /// Arity and catalog errors are raised before anything is sent.
    pub fn execute(
        &mut self,
        name: &str,
        args: &[Value],
        want_result: bool,
    ) -> Result<Value, BoardError> {
        let call = RemoteCall::new(name, args, want_result)?;
        let source = call.render();
        debug!(
            "remote call {} ({} args, want_result={})",
            call.operation().name,
            call.args().len(),
            call.want_result()
        );
        let output = self
            .with_raw_session(|repl| Ok(repl.exec(&source)?))
            .map_err(|err| surface(err, name, args))?;
        trace!("{name} produced {} bytes of output", output.len());
        if !call.want_result() {
            if !output.is_empty() {
                debug!("{name} ignored {} bytes of output", output.len());
            }
            return Ok(Value::None);
        }
        parse_response(&output)
    }

    /// Metadata for `path`, served from the cache unless `force_refresh`.
    pub fn file_info(&mut self, path: &str, force_refresh: bool) -> Result<StatRecord, BoardError> {
        if !force_refresh {
            if let Some(stat) = self.stat_cache.get(path) {
                trace!("stat cache hit for {path}");
                return Ok(*stat);
            }
        }
        let value = self.execute(op::GET_FILE_INFO, &[Value::from(path)], true)?;
        let stat = StatRecord::from_value(&value)?;
        self.stat_cache.insert(path.to_owned(), stat);
        Ok(stat)
    }

    /// True when `path` is a directory.
    pub fn is_dir(&mut self, path: &str) -> Result<bool, BoardError> {
        Ok(self.file_info(path, false)?.is_dir())
    }

    /// Cached metadata without touching the board.
    #[must_use]
    pub fn cached_stat(&self, path: &str) -> Option<&StatRecord> {
        self.stat_cache.get(path)
    }

    /// Scan `path` and replace the stat cache with the scan's records.
    pub fn scan(&mut self, path: &str, recursive: bool) -> Result<Vec<ScanRecord>, BoardError> {
        let value = self.execute(op::SCAN_DIR, &[Value::from(path), Value::Bool(recursive)], true)?;
        let records = tree::records_from_value(&value)?;
        self.stat_cache = records
            .iter()
            .map(|record| (record.full_path(), record.stat))
            .collect();
        debug!("scan of {path} cached {} entries", self.stat_cache.len());
        Ok(records)
    }

    /// `os.uname()` fields as `(name, value)` pairs.
    pub fn id(&mut self) -> Result<Vec<(String, String)>, BoardError> {
        let value = self.execute(op::GET_ID, &[], true)?;
        let entries = value
            .as_sequence()
            .ok_or_else(|| BoardError::malformed(format!("id result is not a list: {value}")))?;
        entries
            .iter()
            .map(|entry| match entry.as_sequence() {
                Some([key, value]) => {
                    let key = key
                        .as_str()
                        .ok_or_else(|| BoardError::malformed("id key is not a string"))?;
                    let value = value
                        .as_str()
                        .map_or_else(|| value.to_string(), str::to_owned);
                    Ok((key.to_owned(), value))
                }
                _ => Err(BoardError::malformed(format!("id entry is not a pair: {entry}"))),
            })
            .collect()
    }

    /// Change the board's working directory.
    pub fn chdir(&mut self, path: &str) -> Result<(), BoardError> {
        self.execute(op::CH_DIR, &[Value::from(path)], false)
            .map(drop)
    }

    /// Create a directory; with `exist_ok` an existing directory is success.
    pub fn mkdir(&mut self, path: &str, exist_ok: bool) -> Result<(), BoardError> {
        match self.execute(op::MK_DIR, &[Value::from(path)], false) {
            Err(err) if exist_ok && err.remote_kind() == Some(RemoteErrorKind::DirectoryExists) => {
                debug!("mkdir {path}: already exists");
                Ok(())
            }
            other => other.map(drop),
        }
    }

    /// Remove a file.
    pub fn remove(&mut self, path: &str) -> Result<(), BoardError> {
        self.execute(op::DELETE_FILE, &[Value::from(path)], false)
            .map(drop)
    }

    /// Remove a directory; `force` removes its contents first.
    pub fn rmdir(&mut self, path: &str, force: bool) -> Result<(), BoardError> {
        self.execute(op::DELETE_FOLDER, &[Value::from(path), Value::Bool(force)], false)
            .map(drop)
    }

    /// Rename a file or directory.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), BoardError> {
        self.execute(op::RENAME, &[Value::from(old), Value::from(new)], false)
            .map(drop)
    }

    /// Enter raw mode, run `f`, and leave raw mode whatever `f` returned.
    pub(crate) fn with_raw_session<T>(
        &mut self,
        f: impl FnOnce(&mut R) -> Result<T, BoardError>,
    ) -> Result<T, BoardError> {
        self.repl.enter_raw_repl()?;
        let result = f(&mut self.repl);
        let exit = self.repl.exit_raw_repl();
        let value = result?;
        exit?;
        Ok(value)
    }
}

impl<R: RawRepl + LineShell> Channel<R> {
    /// Interactive passthrough, independent of the operation catalog.
    pub fn send_line(&mut self, line: &str) -> Result<String, BoardError> {
        Ok(self.repl.send_line(line)?)
    }
}

/// Rewrite a remote error with the failing call before it reaches the caller.
pub(crate) fn surface(mut err: BoardError, operation: &str, args: &[Value]) -> BoardError {
    if let BoardError::Remote(remote) = &mut err {
        remote.transmogrify(operation, args);
        if !remote.output().is_empty() {
            debug!("{operation} wrote {} bytes before failing", remote.output().len());
        }
        warn!("{remote}");
    }
    err
}

/// Interpret captured standard output: empty means `None`.
pub(crate) fn parse_response(output: &[u8]) -> Result<Value, BoardError> {
    let text = core::str::from_utf8(output)
        .map_err(|_| BoardError::malformed("response is not valid UTF-8"))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(Value::None);
    }
    literal::parse(text)
}

/// Shared, externally serialised access to one channel.
#[derive(Debug)]
pub struct ChannelHandle<R: RawRepl> {
    inner: Arc<Mutex<Channel<R>>>,
}

impl<R: RawRepl> Clone for ChannelHandle<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: RawRepl> ChannelHandle<R> {
    /// Wrap a channel for sharing between collaborators.
    pub fn new(channel: Channel<R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(channel)),
        }
    }

    /// Acquire exclusive use of the channel for one or more calls.
    pub fn lock(&self) -> Result<MutexGuard<'_, Channel<R>>, BoardError> {
        self.inner
            .lock()
            .map_err(|_| BoardError::link("channel lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_is_none() {
        assert_eq!(parse_response(b"\r\n").unwrap(), Value::None);
    }

    #[test]
    fn call_expression_is_malformed() {
        assert!(matches!(
            parse_response(b"exec('import os')\r\n"),
            Err(BoardError::MalformedResponse(_))
        ));
    }

    #[test]
    fn non_utf8_output_is_malformed() {
        assert!(matches!(
            parse_response(&[0xff, 0xfe]),
            Err(BoardError::MalformedResponse(_))
        ));
    }
}
