// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Raw REPL and line-shell capabilities consumed by the channel.
// Author: Lukas Bower

//! Capabilities supplied by a board driver.
//!
//! The raw REPL handshake (Ctrl-A, source, Ctrl-D, `OK`, output, `0x04`,
//! traceback, `0x04`) lives behind [`RawRepl`]. Implementations strip the
//! control bytes before handing output back.

use std::io;

/// End-of-transmission byte terminating each raw REPL output section.
pub const EOT: u8 = 0x04;

/// Errors raised by a raw REPL implementation.
#[derive(Debug, thiserror::Error)]
pub enum RawReplError {
    /// The submitted source raised on the board.
    #[error("exception")]
    Exception {
        /// Standard output produced before the exception.
        output: Vec<u8>,
        /// Traceback text written to standard error.
        traceback: Vec<u8>,
    },
    /// A handshake marker or terminator did not arrive in time.
    #[error("timeout waiting for {0}")]
    Timeout(String),
    /// The board answered with an unexpected handshake.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The underlying link failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Raw execution mode of the board's interpreter.
pub trait RawRepl {
    /// Interrupt any running program and switch to raw mode.
    fn enter_raw_repl(&mut self) -> Result<(), RawReplError>;

    /// Return to the friendly REPL.
    fn exit_raw_repl(&mut self) -> Result<(), RawReplError>;

    /// Run `source` and return everything it wrote to standard output.
    fn exec(&mut self, source: &str) -> Result<Vec<u8>, RawReplError>;

    /// Submit `source` without waiting for its output; the caller reads the
    /// stream with [`RawRepl::read_exact`] and [`RawRepl::read_until`].
    fn exec_no_follow(&mut self, source: &str) -> Result<(), RawReplError>;

    /// Read exactly `len` bytes from the link.
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, RawReplError>;

    /// Read at least `min_len` bytes, then continue until the data ends with
    /// `ending` or the link goes quiet. The returned bytes may lack `ending`.
    fn read_until(&mut self, min_len: usize, ending: &[u8]) -> Result<Vec<u8>, RawReplError>;
}

/// Interactive passthrough to the friendly REPL.
pub trait LineShell {
    /// Send one line and return the board's response up to the next prompt,
    /// with the echoed command removed and line endings normalised.
    fn send_line(&mut self, line: &str) -> Result<String, RawReplError>;
}
