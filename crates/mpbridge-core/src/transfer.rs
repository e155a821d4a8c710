// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Length-prefixed file download and chunked upload over the raw REPL.
// Author: Lukas Bower

//! Binary transfer protocol.
//!
//! A download streams `size (u32, big endian) | payload | SENTINEL` on the
//! board's standard output. When `getFile` raises before writing the size, the
//! four header bytes are the end of the (empty) output section followed by the
//! start of `"Traceback"`; that prefix is detected and the traceback recovered
//! instead of being mistaken for content.
//!
//! Uploads open a remote handle and write one explicit bytes literal per
//! chunk. There is no per-chunk acknowledgement and no rollback.

use log::{debug, trace, warn};

use crate::catalog::{self, op};
use crate::channel::{surface, Channel};
use crate::error::{BoardError, RemoteError};
use crate::literal::Value;
use crate::raw::{RawRepl, EOT};

/// Bytes per transferred chunk.
pub const CHUNK_SIZE: usize = 1024;

/// Terminator appended after a downloaded payload.
pub const SENTINEL: &[u8] = b"*d*o*n*e*";

/// Size header seen when `getFile` raised: `0x04` then `"Tra"`.
pub const TRACEBACK_MAGIC: u32 = 0x0454_7261;

impl<R: RawRepl> Channel<R> {
    /// Download `path`.
    ///
    /// With `as_text` the payload must be UTF-8 and `\r\n` is normalised to
    /// `\n`; the returned bytes are the normalised text.
    pub fn get(&mut self, path: &str, as_text: bool) -> Result<Vec<u8>, BoardError> {
        let args = [
            Value::from(path),
            Value::from(SENTINEL),
            Value::from(CHUNK_SIZE),
        ];
        let source = catalog::render(op::GET_FILE, &args, false)?;
        debug!("get {path} (text={as_text})");
        let payload = self
            .with_raw_session(|repl| read_file_stream(repl, &source))
            .map_err(|err| surface(err, op::GET_FILE, &args))?;
        if !as_text {
            return Ok(payload);
        }
        Ok(normalize_text(&payload)?.into_bytes())
    }

    /// Download `path` as UTF-8 text with `\n` line endings.
    pub fn get_text(&mut self, path: &str) -> Result<String, BoardError> {
        let payload = self.get(path, false)?;
        normalize_text(&payload)
    }

    /// Create or replace `path` with `data`.
    ///
    /// A failure part way leaves a partial file on the board.
    pub fn put(&mut self, path: &str, data: &[u8]) -> Result<(), BoardError> {
        let target = Value::from(path);
        debug!("put {path} ({} bytes)", data.len());
        self.with_raw_session(|repl| {
            repl.exec(&format!("f = open({target}, 'wb')"))?;
            for (idx, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
                trace!("put {path}: chunk {idx} ({} bytes)", chunk.len());
                repl.exec(&format!("f.write({})", Value::from(chunk)))?;
            }
            repl.exec("f.close()")?;
            Ok(())
        })
        .map_err(|err| surface(err, "put", &[Value::from(path)]))
    }
}

fn read_file_stream<R: RawRepl>(repl: &mut R, source: &str) -> Result<Vec<u8>, BoardError> {
    repl.exec_no_follow(source)?;
    let header = repl.read_exact(4)?;
    let header: [u8; 4] = header
        .as_slice()
        .try_into()
        .map_err(|_| BoardError::link("short read of transfer size"))?;
    let size = u32::from_be_bytes(header);
    if size == TRACEBACK_MAGIC {
        let rest = repl.read_until(1, &[EOT])?;
        let Some(body) = rest.strip_suffix(&[EOT]) else {
            return Err(BoardError::link("timeout waiting for end of traceback"));
        };
        // Drop the output terminator; the traceback text starts at "Tra".
        let mut traceback = header[1..].to_vec();
        traceback.extend_from_slice(body);
        return Err(RemoteError::classify("exception", b"", &traceback).into());
    }

    let size = usize::try_from(size)
        .map_err(|_| BoardError::malformed(format!("transfer size {size} exceeds host limits")))?;
    let data = repl.read_until(size + SENTINEL.len(), SENTINEL)?;
    let Some(payload) = data.strip_suffix(SENTINEL) else {
        return Err(BoardError::link("timeout waiting for transfer terminator"));
    };
    if payload.len() != size {
        warn!(
            "transfer announced {size} bytes but delivered {}",
            payload.len()
        );
    }
    Ok(payload.to_vec())
}

fn normalize_text(payload: &[u8]) -> Result<String, BoardError> {
    let text = core::str::from_utf8(payload)
        .map_err(|_| BoardError::malformed("downloaded text is not valid UTF-8"))?;
    Ok(text.replace("\r\n", "\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_is_eot_followed_by_tra() {
        assert_eq!(TRACEBACK_MAGIC.to_be_bytes(), *b"\x04Tra");
    }

    #[test]
    fn text_normalisation_rewrites_crlf_only() {
        assert_eq!(normalize_text(b"a\r\nb\rc\n").unwrap(), "a\nb\rc\n");
        assert!(matches!(
            normalize_text(&[0xc3, 0x28]),
            Err(BoardError::MalformedResponse(_))
        ));
    }
}
