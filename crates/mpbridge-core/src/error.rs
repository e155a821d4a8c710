// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Classify device-side failures into typed errors keyed by OS errno.
// Author: Lukas Bower

//! Error taxonomy for remote operations.
//!
//! Failures reported by the board arrive as free-form traceback text. The
//! translator looks for an `[Errno <N>]` marker, maps the number onto a small
//! set of typed kinds and keeps the raw text around for diagnostics.

use core::fmt;

use crate::literal::Value;
use crate::raw::RawReplError;

pub(crate) const ENOENT: i32 = 2;
pub(crate) const EACCES: i32 = 13;
pub(crate) const EEXIST: i32 = 17;
pub(crate) const EISDIR: i32 = 21;

/// Errno symbols and `strerror` texts as reported by MicroPython ports.
const ERRNO_TABLE: [(i32, &str, &str); 18] = [
    (1, "EPERM", "Operation not permitted"),
    (ENOENT, "ENOENT", "No such file or directory"),
    (5, "EIO", "Input/output error"),
    (9, "EBADF", "Bad file descriptor"),
    (11, "EAGAIN", "Resource temporarily unavailable"),
    (12, "ENOMEM", "Cannot allocate memory"),
    (EACCES, "EACCES", "Permission denied"),
    (EEXIST, "EEXIST", "File exists"),
    (19, "ENODEV", "No such device"),
    (20, "ENOTDIR", "Not a directory"),
    (EISDIR, "EISDIR", "Is a directory"),
    (22, "EINVAL", "Invalid argument"),
    (28, "ENOSPC", "No space left on device"),
    (30, "EROFS", "Read-only file system"),
    (39, "ENOTEMPTY", "Directory not empty"),
    (95, "EOPNOTSUPP", "Operation not supported"),
    (110, "ETIMEDOUT", "Connection timed out"),
    (115, "EINPROGRESS", "Operation now in progress"),
];

/// Typed classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// `ENOENT`: the path does not exist on the board.
    ResourceNotFound,
    /// `EACCES`: littlefs/FAT report this for non-empty directory removal.
    DirectoryNotEmpty,
    /// `EEXIST`: the directory (or file) already exists.
    DirectoryExists,
    /// `EISDIR`: a file was expected but a directory was found.
    FileExpected,
    /// Any other failure, with or without an errno.
    GenericRemoteError,
}

impl RemoteErrorKind {
    /// Map an OS error number to its typed kind.
    #[must_use]
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            ENOENT => Self::ResourceNotFound,
            EACCES => Self::DirectoryNotEmpty,
            EEXIST => Self::DirectoryExists,
            EISDIR => Self::FileExpected,
            _ => Self::GenericRemoteError,
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ResourceNotFound => "resource not found",
            Self::DirectoryNotEmpty => "directory not empty",
            Self::DirectoryExists => "directory exists",
            Self::FileExpected => "file expected",
            Self::GenericRemoteError => "remote error",
        };
        f.write_str(label)
    }
}

/// Failure raised on the board and recovered from its traceback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    kind: RemoteErrorKind,
    operation: String,
    args: Vec<Value>,
    errno: i32,
    error_text: String,
    message: String,
    output: String,
    traceback: String,
    transmogrified: bool,
}

impl RemoteError {
    /// Classify a failure from its message and the raw traceback bytes.
    #[must_use]
    pub fn classify(message: &str, output: &[u8], traceback: &[u8]) -> Self {
        let traceback = String::from_utf8_lossy(traceback).into_owned();
        let output = String::from_utf8_lossy(output).into_owned();
        let (kind, errno, error_text) = match find_errno(&traceback) {
            Some(errno) => (RemoteErrorKind::from_errno(errno), errno, error_text(errno)),
            None => (RemoteErrorKind::GenericRemoteError, 0, message.to_owned()),
        };
        Self {
            kind,
            operation: String::new(),
            args: Vec::new(),
            errno,
            error_text,
            message: message.to_owned(),
            output,
            traceback,
            transmogrified: false,
        }
    }

    /// Typed classification.
    #[must_use]
    pub fn kind(&self) -> RemoteErrorKind {
        self.kind
    }

    /// Name of the operation that failed, empty until [`Self::transmogrify`].
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Arguments of the failing call.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// OS error number, `0` when the traceback carried none.
    #[must_use]
    pub fn errno(&self) -> i32 {
        self.errno
    }

    /// `"<SYMBOL>: <strerror>"`, or the original message when no errno was found.
    #[must_use]
    pub fn error_text(&self) -> &str {
        &self.error_text
    }

    /// Current human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Raw traceback text captured from the board.
    #[must_use]
    pub fn traceback(&self) -> &str {
        &self.traceback
    }

    /// Standard output captured before the failure, if any.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Compose a report of error text, message, traceback and optional context.
    #[must_use]
    pub fn translate(&self, context: Option<&str>) -> String {
        let mut report = String::new();
        if self.errno != 0 {
            report.push_str(&self.error_text);
            report.push('\n');
        }
        report.push_str(&self.message);
        report.push('\n');
        report.push_str(self.traceback.trim_end());
        if let Some(context) = context {
            report.push_str("\n\n");
            report.push_str(context);
        }
        report
    }

    /// Rewrite the message as `"<error_text>: <operation>(<args>)"`.
    ///
    /// Only the first call has an effect; the return value reports whether the
    /// rewrite happened.
    pub fn transmogrify(&mut self, operation: &str, args: &[Value]) -> bool {
        if self.transmogrified {
            return false;
        }
        let params = args
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        self.message = format!("{}: {operation}({params})", self.error_text);
        self.operation = operation.to_owned();
        self.args = args.to_vec();
        self.transmogrified = true;
        true
    }
}

/// Errors surfaced by the board bridge.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// The board raised an exception while running an operation.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The serial link broke or a framing marker never arrived.
    #[error("link error: {0}")]
    Link(String),
    /// The board answered with something other than a plain literal.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// A call was rendered with the wrong number of arguments.
    #[error("operation {operation} takes {expected} parameters, {found} given")]
    ArityMismatch {
        /// Operation name.
        operation: String,
        /// Declared arity.
        expected: usize,
        /// Number of arguments supplied.
        found: usize,
    },
    /// The operation is not part of the catalog.
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),
    /// Reading or writing a host-side file failed.
    #[error("host i/o error: {0}")]
    HostIo(#[from] std::io::Error),
}

impl BoardError {
    pub(crate) fn link(message: impl Into<String>) -> Self {
        Self::Link(message.into())
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Typed kind when the error originated on the board.
    #[must_use]
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote(err) => Some(err.kind()),
            _ => None,
        }
    }

    /// True when the board reported that the path does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.remote_kind() == Some(RemoteErrorKind::ResourceNotFound)
    }
}

impl From<RawReplError> for BoardError {
    fn from(err: RawReplError) -> Self {
        match err {
            RawReplError::Exception { output, traceback } => {
                Self::Remote(RemoteError::classify("exception", &output, &traceback))
            }
            RawReplError::Timeout(what) => Self::Link(format!("timeout waiting for {what}")),
            RawReplError::Protocol(message) => Self::Link(message),
            RawReplError::Io(err) => Self::Link(err.to_string()),
        }
    }
}

/// Errno symbol for a known error number.
#[must_use]
pub fn errno_symbol(errno: i32) -> Option<&'static str> {
    ERRNO_TABLE
        .iter()
        .find(|(code, _, _)| *code == errno)
        .map(|(_, symbol, _)| *symbol)
}

/// OS-style error text, `"<SYMBOL>: <strerror>"`.
#[must_use]
pub fn error_text(errno: i32) -> String {
    match ERRNO_TABLE.iter().find(|(code, _, _)| *code == errno) {
        Some((_, symbol, text)) => format!("{symbol}: {text}"),
        None => format!("E{errno}: Unknown error {errno}"),
    }
}

/// Locate `[Errno <N>]` in traceback text.
fn find_errno(text: &str) -> Option<i32> {
    const MARKER: &str = "[Errno ";
    let mut rest = text;
    while let Some(start) = rest.find(MARKER) {
        let tail = &rest[start + MARKER.len()..];
        let digits = tail
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(tail.len());
        if digits > 0 && tail[digits..].starts_with(']') {
            if let Ok(errno) = tail[..digits].parse() {
                return Some(errno);
            }
        }
        rest = tail;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traceback(line: &str) -> Vec<u8> {
        format!(
            "Traceback (most recent call last):\r\n  File \"<stdin>\", line 4, in <module>\r\n{line}\r\n"
        )
        .into_bytes()
    }

    #[test]
    fn errno_two_is_not_found() {
        let err = RemoteError::classify("exception", b"", &traceback("OSError: [Errno 2] ENOENT"));
        assert_eq!(err.kind(), RemoteErrorKind::ResourceNotFound);
        assert_eq!(err.errno(), 2);
        assert_eq!(err.error_text(), "ENOENT: No such file or directory");
    }

    #[test]
    fn errno_seventeen_is_directory_exists() {
        let err = RemoteError::classify("exception", b"", &traceback("OSError: [Errno 17] EEXIST"));
        assert_eq!(err.kind(), RemoteErrorKind::DirectoryExists);
    }

    #[test]
    fn unlisted_errno_is_generic_and_retained() {
        let err = RemoteError::classify("exception", b"", &traceback("OSError: [Errno 5] EIO"));
        assert_eq!(err.kind(), RemoteErrorKind::GenericRemoteError);
        assert_eq!(err.errno(), 5);
        assert_eq!(err.error_text(), "EIO: Input/output error");
    }

    #[test]
    fn missing_errno_keeps_message() {
        let err = RemoteError::classify(
            "exception",
            b"",
            &traceback("NameError: name 'foo' isn't defined"),
        );
        assert_eq!(err.kind(), RemoteErrorKind::GenericRemoteError);
        assert_eq!(err.errno(), 0);
        assert_eq!(err.error_text(), "exception");
    }

    #[test]
    fn malformed_marker_is_ignored() {
        assert_eq!(find_errno("[Errno x] [Errno 21"), None);
        assert_eq!(find_errno("[Errno ] then [Errno 21]"), Some(21));
    }

    #[test]
    fn transmogrify_applies_once() {
        let mut err =
            RemoteError::classify("exception", b"", &traceback("OSError: [Errno 2] ENOENT"));
        assert!(err.transmogrify("mkDir", &[Value::from("/lib/x")]));
        assert_eq!(
            err.message(),
            "ENOENT: No such file or directory: mkDir('/lib/x')"
        );
        assert!(!err.transmogrify("other", &[]));
        assert_eq!(err.operation(), "mkDir");
        assert!(err.message().ends_with("mkDir('/lib/x')"));
    }

    #[test]
    fn translate_includes_context() {
        let err = RemoteError::classify("exception", b"", &traceback("OSError: [Errno 21] EISDIR"));
        let report = err.translate(Some("while opening /lib"));
        assert!(report.starts_with("EISDIR: Is a directory\nexception\nTraceback"));
        assert!(report.ends_with("\n\nwhile opening /lib"));
    }

    #[test]
    fn translate_without_errno_is_message_and_traceback() {
        let err = RemoteError::classify(
            "exception",
            b"partial\r\n",
            &traceback("NameError: name 'foo' isn't defined"),
        );
        let report = err.translate(None);
        assert_eq!(
            report,
            "exception\nTraceback (most recent call last):\r\n  File \"<stdin>\", line 4, in <module>\r\nNameError: name 'foo' isn't defined"
        );
        assert_eq!(err.output(), "partial\r\n");
    }
}
