// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: In-memory MicroPython board used by tests and offline sessions.
// Author: Lukas Bower

//! Deterministic board simulator.
//!
//! `MockBoard` executes the programs the channel renders: catalog calls,
//! `print(...)` of their results and the `f = open(...)` / `f.write(...)` /
//! `f.close()` sequence of an upload. Output is framed exactly like the raw
//! REPL stream, so the transfer code runs unchanged against it.

use std::collections::{BTreeMap, VecDeque};

use crate::catalog::{self, op};
use crate::error::{self, EACCES, EEXIST, EISDIR, ENOENT};
use crate::literal::{self, Value};
use crate::path;
use crate::raw::{LineShell, RawRepl, RawReplError, EOT};
use crate::stat::{S_IFDIR, S_IFREG};

const ENOTDIR: i32 = 20;
const ENOSPC: i32 = 28;
const START_TIME: i64 = 1_700_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Dir { mtime: i64 },
    File { data: Vec<u8>, mtime: i64 },
}

impl Entry {
    fn stat(&self) -> Value {
        let (mode, size, mtime) = match self {
            Self::Dir { mtime } => (S_IFDIR, 0, *mtime),
            Self::File { data, mtime } => (S_IFREG, data.len(), *mtime),
        };
        Value::Tuple(vec![
            Value::Int(i64::from(mode)),
            Value::Int(0),
            Value::Int(0),
            Value::Int(0),
            Value::Int(0),
            Value::Int(0),
            Value::from(size),
            Value::Int(mtime),
            Value::Int(mtime),
            Value::Int(mtime),
        ])
    }
}

/// Failure raised while running a program; rendered as a traceback.
struct Raised {
    function: Option<&'static str>,
    exception: String,
}

impl Raised {
    fn os(function: &'static str, errno: i32) -> Self {
        let symbol = error::errno_symbol(errno).unwrap_or("EIO");
        Self {
            function: Some(function),
            exception: format!("OSError: [Errno {errno}] {symbol}"),
        }
    }

    fn plain(exception: impl Into<String>) -> Self {
        Self {
            function: None,
            exception: exception.into(),
        }
    }

    fn traceback(&self, source: &str) -> Vec<u8> {
        let line = source.lines().count().max(1);
        let mut text = String::from("Traceback (most recent call last):\r\n");
        text.push_str(&format!("  File \"<stdin>\", line {line}, in <module>\r\n"));
        if let Some(function) = self.function {
            text.push_str(&format!("  File \"<stdin>\", line 3, in {function}\r\n"));
        }
        text.push_str(&self.exception);
        text.push_str("\r\n");
        text.into_bytes()
    }
}

type Run = Result<Vec<u8>, Raised>;

/// Simulated MicroPython board with an in-memory filesystem.
#[derive(Debug, Clone)]
pub struct MockBoard {
    entries: BTreeMap<String, Entry>,
    cwd: String,
    raw_mode: bool,
    pending: VecDeque<u8>,
    open_file: Option<String>,
    executed: Vec<String>,
    clock: i64,
    write_budget: Option<usize>,
    stream_truncation: usize,
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBoard {
    /// Board with an empty root directory.
    #[must_use]
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_owned(), Entry::Dir { mtime: START_TIME });
        Self {
            entries,
            cwd: "/".to_owned(),
            raw_mode: false,
            pending: VecDeque::new(),
            open_file: None,
            executed: Vec::new(),
            clock: START_TIME,
            write_budget: None,
            stream_truncation: 0,
        }
    }

    /// Board populated with a small project tree.
    #[must_use]
    pub fn demo() -> Self {
        Self::new()
            .with_file("/boot.py", b"# boot.py -- run on boot-up\r\nimport machine\r\n")
            .with_file("/main.py", b"import app\r\napp.run()\r\n")
            .with_dir("/lib")
            .with_file("/lib/app.py", b"def run():\r\n    print('hello')\r\n")
            .with_dir("/lib/net")
            .with_file("/lib/net/wifi.py", b"SSID = 'lab'\r\n")
            .with_file("/data.bin", &[0x00, 0x04, 0xff, 0x2a])
    }

    /// Add a file, creating missing parent directories.
    #[must_use]
    pub fn with_file(mut self, file: &str, data: &[u8]) -> Self {
        let file = path::normalize(file);
        self.ensure_parents(&file);
        let mtime = self.tick();
        self.entries.insert(
            file,
            Entry::File {
                data: data.to_vec(),
                mtime,
            },
        );
        self
    }

    /// Add a directory, creating missing parents.
    #[must_use]
    pub fn with_dir(mut self, dir: &str) -> Self {
        let dir = path::normalize(dir);
        self.ensure_parents(&dir);
        let mtime = self.tick();
        self.entries.insert(dir, Entry::Dir { mtime });
        self
    }

    /// Let the next `limit` chunk writes succeed, then raise `ENOSPC`.
    #[must_use]
    pub fn with_write_budget(mut self, limit: usize) -> Self {
        self.write_budget = Some(limit);
        self
    }

    /// Drop the last `bytes` of every streamed response, as a link that goes quiet.
    #[must_use]
    pub fn with_stream_truncation(mut self, bytes: usize) -> Self {
        self.stream_truncation = bytes;
        self
    }

    /// Contents of a file.
    #[must_use]
    pub fn file(&self, file: &str) -> Option<&[u8]> {
        match self.entries.get(&path::normalize(file)) {
            Some(Entry::File { data, .. }) => Some(data),
            _ => None,
        }
    }

    /// True when `path` exists.
    #[must_use]
    pub fn contains(&self, target: &str) -> bool {
        self.entries.contains_key(&path::normalize(target))
    }

    /// Current working directory.
    #[must_use]
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Every program submitted so far, in order.
    #[must_use]
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Number of programs submitted so far.
    #[must_use]
    pub fn exec_count(&self) -> usize {
        self.executed.len()
    }

    /// True while the simulated interpreter is in raw mode.
    #[must_use]
    pub fn in_raw_mode(&self) -> bool {
        self.raw_mode
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn ensure_parents(&mut self, target: &str) {
        let mut current = String::new();
        let components: Vec<&str> = target.split('/').filter(|c| !c.is_empty()).collect();
        for component in components.iter().take(components.len().saturating_sub(1)) {
            current.push('/');
            current.push_str(component);
            if !self.entries.contains_key(&current) {
                self.entries
                    .insert(current.clone(), Entry::Dir { mtime: self.clock });
            }
        }
    }

    fn resolve(&self, target: &str) -> String {
        if target.starts_with('/') {
            path::normalize(target)
        } else {
            path::normalize(&path::join(&self.cwd, target))
        }
    }

    fn children(&self, dir: &str) -> Vec<String> {
        let prefix = path::with_trailing_slash(dir);
        self.entries
            .keys()
            .filter(|key| key.as_str() != "/")
            .filter(|key| {
                key.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .cloned()
            .collect()
    }

    fn descendants(&self, dir: &str) -> Vec<String> {
        let prefix = path::with_trailing_slash(dir);
        self.entries
            .keys()
            .filter(|key| key.as_str() != dir && key.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn require_raw(&self) -> Result<(), RawReplError> {
        if self.raw_mode {
            Ok(())
        } else {
            Err(RawReplError::Protocol("board is not in raw REPL mode".to_owned()))
        }
    }

    fn run(&mut self, source: &str) -> Run {
        self.executed.push(source.to_owned());
        let last = source.lines().last().unwrap_or_default().trim();
        if let Some(rest) = last.strip_prefix("f = open(") {
            return self.open_for_write(call_args(rest)?);
        }
        if let Some(rest) = last.strip_prefix("f.write(") {
            return self.write_chunk(call_args(rest)?);
        }
        if last == "f.close()" {
            return match self.open_file.take() {
                Some(_) => Ok(Vec::new()),
                None => Err(Raised::plain("NameError: name 'f' isn't defined")),
            };
        }
        let (call, want_result) = match last.strip_prefix("print(") {
            Some(inner) => (inner.strip_suffix(')').unwrap_or(inner), true),
            None => (last, false),
        };
        let Some((name, rest)) = call.split_once('(') else {
            return Err(Raised::plain("SyntaxError: invalid syntax"));
        };
        let operation = catalog::lookup(name)
            .map_err(|_| Raised::plain(format!("NameError: name '{name}' isn't defined")))?;
        if !source.starts_with(operation.source.trim_end()) {
            return Err(Raised::plain(format!("NameError: name '{name}' isn't defined")));
        }
        let args = call_args(rest)?;
        if args.len() != operation.arity() {
            return Err(Raised::plain(format!(
                "TypeError: function takes {} positional arguments but {} were given",
                operation.arity(),
                args.len()
            )));
        }
        let result = self.dispatch(operation.name, &args)?;
        match result {
            Response::Stream(bytes) => Ok(bytes),
            Response::Value(value) if want_result => Ok(format!("{value}\r\n").into_bytes()),
            Response::Value(_) => Ok(Vec::new()),
        }
    }

    fn dispatch(&mut self, name: &'static str, args: &[Value]) -> Result<Response, Raised> {
        match name {
            op::GET_FILE => {
                let file = self.resolve(str_arg(args, 0)?);
                let Some(Value::Bytes(terminator)) = args.get(1) else {
                    return Err(Raised::plain("TypeError: object with buffer protocol required"));
                };
                match self.entries.get(&file) {
                    Some(Entry::File { data, .. }) => {
                        let size = u32::try_from(data.len())
                            .map_err(|_| Raised::os(name, ENOSPC))?;
                        let mut stream = size.to_be_bytes().to_vec();
                        stream.extend_from_slice(data);
                        stream.extend_from_slice(terminator);
                        Ok(Response::Stream(stream))
                    }
                    Some(Entry::Dir { .. }) => Err(Raised::os(name, EISDIR)),
                    None => Err(Raised::os(name, ENOENT)),
                }
            }
            op::GET_FILE_INFO => {
                let file = self.resolve(str_arg(args, 0)?);
                self.entries
                    .get(&file)
                    .map(|entry| Response::Value(entry.stat()))
                    .ok_or_else(|| Raised::os(name, ENOENT))
            }
            op::SCAN_DIR => {
                let requested = str_arg(args, 0)?;
                let recurse = bool_arg(args, 1)?;
                let mut records = Vec::new();
                self.scan_into(name, requested, recurse, &mut records)?;
                Ok(Response::Value(Value::List(records)))
            }
            op::CH_DIR => {
                let dir = self.resolve(str_arg(args, 0)?);
                match self.entries.get(&dir) {
                    Some(Entry::Dir { .. }) => {
                        self.cwd = dir;
                        Ok(Response::Value(Value::None))
                    }
                    Some(Entry::File { .. }) => Err(Raised::os(name, ENOTDIR)),
                    None => Err(Raised::os(name, ENOENT)),
                }
            }
            op::MK_DIR => {
                let dir = self.resolve(str_arg(args, 0)?);
                if self.entries.contains_key(&dir) {
                    return Err(Raised::os(name, EEXIST));
                }
                let parent = parent_of(&dir);
                if !matches!(self.entries.get(&parent), Some(Entry::Dir { .. })) {
                    return Err(Raised::os(name, ENOENT));
                }
                let mtime = self.tick();
                self.entries.insert(dir, Entry::Dir { mtime });
                Ok(Response::Value(Value::None))
            }
            op::RENAME => {
                let old = self.resolve(str_arg(args, 0)?);
                let new = self.resolve(str_arg(args, 1)?);
                if old == "/" || !self.entries.contains_key(&old) {
                    return Err(Raised::os(name, ENOENT));
                }
                if !matches!(self.entries.get(&parent_of(&new)), Some(Entry::Dir { .. })) {
                    return Err(Raised::os(name, ENOENT));
                }
                let mut moved = self.descendants(&old);
                moved.push(old.clone());
                for key in moved {
                    if let Some(entry) = self.entries.remove(&key) {
                        let suffix = &key[old.len()..];
                        self.entries.insert(format!("{new}{suffix}"), entry);
                    }
                }
                Ok(Response::Value(Value::None))
            }
            op::DELETE_FILE => {
                let file = self.resolve(str_arg(args, 0)?);
                match self.entries.get(&file) {
                    Some(Entry::File { .. }) => {
                        self.entries.remove(&file);
                        Ok(Response::Value(Value::None))
                    }
                    Some(Entry::Dir { .. }) => Err(Raised::os(name, EISDIR)),
                    None => Err(Raised::os(name, ENOENT)),
                }
            }
            op::DELETE_FOLDER => {
                let dir = self.resolve(str_arg(args, 0)?);
                let force = bool_arg(args, 1)?;
                match self.entries.get(&dir) {
                    Some(Entry::Dir { .. }) => {}
                    Some(Entry::File { .. }) => return Err(Raised::os(name, ENOTDIR)),
                    None => return Err(Raised::os(name, ENOENT)),
                }
                let contents = self.descendants(&dir);
                if dir == "/" || (!contents.is_empty() && !force) {
                    return Err(Raised::os(name, EACCES));
                }
                for key in contents {
                    self.entries.remove(&key);
                }
                self.entries.remove(&dir);
                Ok(Response::Value(Value::None))
            }
            op::GET_ID => Ok(Response::Value(Value::List(
                [
                    ("machine", "Mock board with RP2040"),
                    ("nodename", "rp2"),
                    ("release", "1.22.0"),
                    ("sysname", "rp2"),
                    ("version", "v1.22.0 on 2024-01-01 (mock)"),
                ]
                .iter()
                .map(|(key, value)| Value::Tuple(vec![Value::from(*key), Value::from(*value)]))
                .collect(),
            ))),
            other => Err(Raised::plain(format!("NameError: name '{other}' isn't defined"))),
        }
    }

    fn scan_into(
        &self,
        name: &'static str,
        requested: &str,
        recurse: bool,
        records: &mut Vec<Value>,
    ) -> Result<(), Raised> {
        let dir = self.resolve(requested);
        match self.entries.get(&dir) {
            Some(Entry::Dir { .. }) => {}
            Some(Entry::File { .. }) => return Err(Raised::os(name, ENOTDIR)),
            None => return Err(Raised::os(name, ENOENT)),
        }
        let parent = path::with_trailing_slash(requested);
        for child in self.children(&dir) {
            let Some(entry) = self.entries.get(&child) else {
                continue;
            };
            let child_name = path::file_name(&child).to_owned();
            records.push(Value::Tuple(vec![
                Value::from(child_name.as_str()),
                Value::from(parent.as_str()),
                entry.stat(),
            ]));
            if recurse && matches!(entry, Entry::Dir { .. }) {
                self.scan_into(name, &format!("{parent}{child_name}"), recurse, records)?;
            }
        }
        Ok(())
    }

    fn open_for_write(&mut self, args: Vec<Value>) -> Run {
        let Some(Value::Str(target)) = args.first() else {
            return Err(Raised::plain("TypeError: can't convert to str implicitly"));
        };
        let file = self.resolve(target);
        match self.entries.get(&file) {
            Some(Entry::Dir { .. }) => return Err(Raised::os("open", EISDIR)),
            Some(Entry::File { .. }) => {}
            None if !matches!(self.entries.get(&parent_of(&file)), Some(Entry::Dir { .. })) => {
                return Err(Raised::os("open", ENOENT));
            }
            None => {}
        }
        let mtime = self.tick();
        self.entries.insert(
            file.clone(),
            Entry::File {
                data: Vec::new(),
                mtime,
            },
        );
        self.open_file = Some(file);
        Ok(Vec::new())
    }

    fn write_chunk(&mut self, args: Vec<Value>) -> Run {
        let Some(file) = self.open_file.clone() else {
            return Err(Raised::plain("NameError: name 'f' isn't defined"));
        };
        let Some(Value::Bytes(chunk)) = args.first() else {
            return Err(Raised::plain("TypeError: object with buffer protocol required"));
        };
        if let Some(budget) = self.write_budget.as_mut() {
            if *budget == 0 {
                return Err(Raised::os("write", ENOSPC));
            }
            *budget -= 1;
        }
        let mtime = self.tick();
        if let Some(Entry::File { data, mtime: stamp }) = self.entries.get_mut(&file) {
            data.extend_from_slice(chunk);
            *stamp = mtime;
        }
        Ok(Vec::new())
    }
}

enum Response {
    Value(Value),
    Stream(Vec<u8>),
}

fn parent_of(target: &str) -> String {
    match target.rsplit_once('/') {
        Some(("", _)) | None => "/".to_owned(),
        Some((parent, _)) => parent.to_owned(),
    }
}

fn call_args(rest: &str) -> Result<Vec<Value>, Raised> {
    let inner = rest
        .strip_suffix(')')
        .ok_or_else(|| Raised::plain("SyntaxError: invalid syntax"))?
        .trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    match literal::parse(&format!("({inner},)")) {
        Ok(Value::Tuple(items)) => Ok(items),
        _ => Err(Raised::plain("SyntaxError: invalid syntax")),
    }
}

fn str_arg(args: &[Value], idx: usize) -> Result<&str, Raised> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| Raised::plain("TypeError: can't convert to str implicitly"))
}

fn bool_arg(args: &[Value], idx: usize) -> Result<bool, Raised> {
    match args.get(idx) {
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(Value::Int(value)) => Ok(*value != 0),
        _ => Err(Raised::plain("TypeError: expected bool")),
    }
}

impl RawRepl for MockBoard {
    fn enter_raw_repl(&mut self) -> Result<(), RawReplError> {
        self.raw_mode = true;
        self.pending.clear();
        Ok(())
    }

    fn exit_raw_repl(&mut self) -> Result<(), RawReplError> {
        self.require_raw()?;
        self.raw_mode = false;
        self.pending.clear();
        Ok(())
    }

    fn exec(&mut self, source: &str) -> Result<Vec<u8>, RawReplError> {
        self.require_raw()?;
        self.run(source)
            .map_err(|raised| RawReplError::Exception {
                output: Vec::new(),
                traceback: raised.traceback(source),
            })
    }

    fn exec_no_follow(&mut self, source: &str) -> Result<(), RawReplError> {
        self.require_raw()?;
        let mut stream = match self.run(source) {
            Ok(mut output) => {
                output.push(EOT);
                output.push(EOT);
                output
            }
            Err(raised) => {
                let mut stream = vec![EOT];
                stream.extend_from_slice(&raised.traceback(source));
                stream.push(EOT);
                stream
            }
        };
        stream.truncate(stream.len().saturating_sub(self.stream_truncation));
        self.pending.extend(stream);
        Ok(())
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, RawReplError> {
        if self.pending.len() < len {
            self.pending.clear();
            return Err(RawReplError::Timeout(format!("{len} bytes")));
        }
        Ok(self.pending.drain(..len).collect())
    }

    fn read_until(&mut self, min_len: usize, ending: &[u8]) -> Result<Vec<u8>, RawReplError> {
        let mut data = Vec::new();
        while let Some(byte) = self.pending.pop_front() {
            data.push(byte);
            if data.len() >= min_len && data.ends_with(ending) {
                break;
            }
        }
        Ok(data)
    }
}

impl LineShell for MockBoard {
    fn send_line(&mut self, line: &str) -> Result<String, RawReplError> {
        if self.raw_mode {
            return Err(RawReplError::Protocol(
                "line shell unavailable in raw REPL mode".to_owned(),
            ));
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with("import ") {
            return Ok(String::new());
        }
        if let Ok(value) = literal::parse(line) {
            return Ok(value.to_string());
        }
        if let Some(inner) = line.strip_prefix("print(").and_then(|s| s.strip_suffix(')')) {
            if let Ok(value) = literal::parse(inner) {
                return Ok(match value {
                    Value::Str(text) => text,
                    other => other.to_string(),
                });
            }
        }
        let name: String = line
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        Ok(format!(
            "Traceback (most recent call last):\n  File \"<stdin>\", line 1, in <module>\nNameError: name '{name}' isn't defined"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_call(board: &mut MockBoard, name: &str, args: &[Value]) -> Result<Vec<u8>, RawReplError> {
        let source = catalog::render(name, args, true).unwrap();
        board.enter_raw_repl().unwrap();
        let result = board.exec(&source);
        board.exit_raw_repl().unwrap();
        result
    }

    #[test]
    fn stat_call_prints_tuple() {
        let mut board = MockBoard::new().with_file("/a.txt", b"abc");
        let output = run_call(&mut board, op::GET_FILE_INFO, &[Value::from("/a.txt")]).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("(32768, 0, 0, 0, 0, 0, 3, "));
    }

    #[test]
    fn missing_file_raises_enoent_traceback() {
        let mut board = MockBoard::new();
        let err = run_call(&mut board, op::GET_FILE_INFO, &[Value::from("/nope")]).unwrap_err();
        let RawReplError::Exception { traceback, .. } = err else {
            panic!("expected exception");
        };
        let text = String::from_utf8(traceback).unwrap();
        assert!(text.starts_with("Traceback (most recent call last):"));
        assert!(text.contains("OSError: [Errno 2] ENOENT"));
    }

    #[test]
    fn exec_outside_raw_mode_is_a_protocol_error() {
        let mut board = MockBoard::new();
        assert!(matches!(
            board.exec("f.close()"),
            Err(RawReplError::Protocol(_))
        ));
    }

    #[test]
    fn scan_reports_requested_parent() {
        let mut board = MockBoard::demo();
        let output = run_call(
            &mut board,
            op::SCAN_DIR,
            &[Value::from("/lib"), Value::Bool(false)],
        )
        .unwrap();
        let value = literal::parse(String::from_utf8(output).unwrap().trim()).unwrap();
        let records = value.as_sequence().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_sequence().unwrap()[1], Value::from("/lib/"));
    }

    #[test]
    fn line_shell_echoes_literals() {
        let mut board = MockBoard::new();
        let response = board.send_line("blink(3)").unwrap();
        assert!(response.ends_with("NameError: name 'blink' isn't defined"));
        assert_eq!(board.send_line("print('hi')").unwrap(), "hi");
        assert_eq!(board.send_line("[1, 2]").unwrap(), "[1, 2]");
    }
}
