// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Serial raw REPL driver for MicroPython boards.
// Author: Lukas Bower

//! Raw REPL handshake over a serial link.
//!
//! Entering raw mode interrupts the running program with Ctrl-C and sends
//! Ctrl-A. A program is submitted followed by Ctrl-D, acknowledged with `OK`,
//! and answered with `stdout 0x04 stderr 0x04 >`. Ctrl-B returns to the
//! friendly REPL.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use log::{debug, trace};
use mpbridge_core::raw::{LineShell, RawRepl, RawReplError, EOT};
use serialport::{ClearBuffer, SerialPort};

use crate::config::SerialConfig;

const RAW_BANNER: &[u8] = b"raw REPL; CTRL-B to exit\r\n";
const SOFT_REBOOT: &[u8] = b"soft reboot\r\n";
const FRIENDLY_PROMPT: &[u8] = b">>>";
const WRITE_CHUNK: usize = 256;

/// Byte link the driver talks through.
pub trait SerialLink: Read + Write {
    /// Drop anything received but not yet read.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// MicroPython board attached to a serial link.
pub struct SerialBoard<L: SerialLink = Box<dyn SerialPort>> {
    link: L,
    soft_reset: bool,
    chunk_delay: Duration,
}

impl SerialBoard {
    /// Open the configured serial port.
    pub fn open(config: &SerialConfig) -> Result<Self, RawReplError> {
        let port_name = config.port.as_deref().ok_or_else(|| {
            RawReplError::Protocol("no serial port configured; pass --port".to_owned())
        })?;
        debug!("opening {port_name} at {} baud", config.baud);
        let port = serialport::new(port_name, config.baud)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open()
            .map_err(io::Error::from)?;
        Ok(Self::new(port, config.soft_reset)
            .with_chunk_delay(Duration::from_millis(config.chunk_delay_ms)))
    }
}

impl<L: SerialLink> SerialBoard<L> {
    /// Drive an already opened link; `soft_reset` reboots on the first raw entry.
    pub fn new(link: L, soft_reset: bool) -> Self {
        Self {
            link,
            soft_reset,
            chunk_delay: Duration::ZERO,
        }
    }

    /// Pause after every `WRITE_CHUNK` bytes of program text.
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Release the link.
    pub fn into_inner(self) -> L {
        self.link
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), RawReplError> {
        self.link.write_all(bytes)?;
        self.link.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, RawReplError> {
        let mut byte = [0u8; 1];
        match self.link.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => self.read_byte(),
            Err(err) => Err(err.into()),
        }
    }

    fn collect_until(&mut self, min_len: usize, ending: &[u8]) -> Result<Vec<u8>, RawReplError> {
        let mut data = Vec::new();
        while !(data.len() >= min_len && data.ends_with(ending)) {
            match self.read_byte()? {
                Some(byte) => data.push(byte),
                None => break,
            }
        }
        trace!("read {} bytes", data.len());
        Ok(data)
    }

    fn expect(&mut self, marker: &[u8], what: &str) -> Result<Vec<u8>, RawReplError> {
        let data = self.collect_until(1, marker)?;
        if data.ends_with(marker) {
            Ok(data)
        } else {
            Err(RawReplError::Timeout(what.to_owned()))
        }
    }

    fn follow(&mut self) -> Result<(Vec<u8>, Vec<u8>), RawReplError> {
        let mut output = self.expect(&[EOT], "end of output")?;
        output.pop();
        let mut traceback = self.expect(&[EOT], "end of error output")?;
        traceback.pop();
        Ok((output, traceback))
    }
}

impl<L: SerialLink> RawRepl for SerialBoard<L> {
    fn enter_raw_repl(&mut self) -> Result<(), RawReplError> {
        self.send(b"\r\x03\x03")?;
        self.link.discard_input()?;
        self.send(b"\r\x01")?;
        self.expect(RAW_BANNER, "raw REPL banner")?;
        if self.soft_reset {
            self.soft_reset = false;
            self.send(&[EOT])?;
            self.expect(SOFT_REBOOT, "soft reboot")?;
            self.expect(RAW_BANNER, "raw REPL banner after reboot")?;
        }
        Ok(())
    }

    fn exit_raw_repl(&mut self) -> Result<(), RawReplError> {
        self.link.discard_input()?;
        self.send(b"\r\x02")?;
        Ok(())
    }

    fn exec(&mut self, source: &str) -> Result<Vec<u8>, RawReplError> {
        self.exec_no_follow(source)?;
        let (output, traceback) = self.follow()?;
        if traceback.is_empty() {
            Ok(output)
        } else {
            Err(RawReplError::Exception { output, traceback })
        }
    }

    fn exec_no_follow(&mut self, source: &str) -> Result<(), RawReplError> {
        // Each program leaves its `>` prompt for the next submission.
        self.expect(b">", "raw REPL prompt")?;
        // The board's receive buffer holds only a few hundred bytes.
        for chunk in source.as_bytes().chunks(WRITE_CHUNK) {
            self.send(chunk)?;
            if !self.chunk_delay.is_zero() {
                thread::sleep(self.chunk_delay);
            }
        }
        self.send(&[EOT])?;
        let mut ack = [0u8; 2];
        self.link.read_exact(&mut ack)?;
        if &ack != b"OK" {
            return Err(RawReplError::Protocol(format!(
                "board refused program: {:?}",
                String::from_utf8_lossy(&ack)
            )));
        }
        Ok(())
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, RawReplError> {
        let mut data = vec![0u8; len];
        self.link.read_exact(&mut data).map_err(|err| {
            if err.kind() == io::ErrorKind::TimedOut || err.kind() == io::ErrorKind::UnexpectedEof {
                RawReplError::Timeout(format!("{len} bytes"))
            } else {
                err.into()
            }
        })?;
        Ok(data)
    }

    fn read_until(&mut self, min_len: usize, ending: &[u8]) -> Result<Vec<u8>, RawReplError> {
        self.collect_until(min_len, ending)
    }
}

impl<L: SerialLink> LineShell for SerialBoard<L> {
    fn send_line(&mut self, line: &str) -> Result<String, RawReplError> {
        let command = format!("{line}\r\n");
        self.send(command.as_bytes())?;
        self.collect_until(1, command.as_bytes())?;
        let response = self.collect_until(1, FRIENDLY_PROMPT)?;
        let response = response
            .strip_suffix(FRIENDLY_PROMPT)
            .unwrap_or(&response);
        Ok(String::from_utf8_lossy(response)
            .replace("\r\n", "\n")
            .trim_end()
            .to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Instant;

    #[derive(Default)]
    struct ScriptedLink {
        incoming: VecDeque<u8>,
        outgoing: Vec<u8>,
        writes: Vec<(usize, Instant)>,
        discards: usize,
    }

    impl ScriptedLink {
        fn with_incoming(bytes: &[u8]) -> Self {
            Self {
                incoming: bytes.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl Read for ScriptedLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut count = 0;
            while count < buf.len() {
                match self.incoming.pop_front() {
                    Some(byte) => {
                        buf[count] = byte;
                        count += 1;
                    }
                    None => break,
                }
            }
            Ok(count)
        }
    }

    impl Write for ScriptedLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outgoing.extend_from_slice(buf);
            self.writes.push((buf.len(), Instant::now()));
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialLink for ScriptedLink {
        fn discard_input(&mut self) -> io::Result<()> {
            self.discards += 1;
            Ok(())
        }
    }

    #[test]
    fn exec_splits_output_and_traceback() {
        let link = ScriptedLink::with_incoming(
            b"raw REPL; CTRL-B to exit\r\n>OK[1, 2]\r\n\x04\x04>OK\x04Traceback\r\nOSError: [Errno 2] ENOENT\r\n\x04>",
        );
        let mut board = SerialBoard::new(link, false);
        board.enter_raw_repl().unwrap();
        assert_eq!(board.exec("print([1, 2])").unwrap(), b"[1, 2]\r\n");
        let err = board.exec("import os; os.stat('/x')").unwrap_err();
        let RawReplError::Exception { output, traceback } = err else {
            panic!("expected exception");
        };
        assert!(output.is_empty());
        assert!(traceback.ends_with(b"[Errno 2] ENOENT\r\n"));
        let link = board.into_inner();
        assert_eq!(link.discards, 1);
        assert!(link.outgoing.starts_with(b"\r\x03\x03\r\x01print([1, 2])\x04"));
    }

    #[test]
    fn missing_banner_times_out() {
        let mut board = SerialBoard::new(ScriptedLink::with_incoming(b"MicroPython v1.22\r\n"), false);
        assert!(matches!(
            board.enter_raw_repl(),
            Err(RawReplError::Timeout(what)) if what == "raw REPL banner"
        ));
    }

    #[test]
    fn refused_program_is_a_protocol_error() {
        let mut board = SerialBoard::new(
            ScriptedLink::with_incoming(b"raw REPL; CTRL-B to exit\r\n>ER"),
            false,
        );
        board.enter_raw_repl().unwrap();
        assert!(matches!(
            board.exec_no_follow("x"),
            Err(RawReplError::Protocol(_))
        ));
    }

    #[test]
    fn send_line_strips_echo_and_prompt() {
        let mut board = SerialBoard::new(ScriptedLink::with_incoming(b"1 + 1\r\n2\r\n>>> "), false);
        assert_eq!(board.send_line("1 + 1").unwrap(), "2");
    }

    #[test]
    fn program_text_is_paced_in_slices() {
        let link = ScriptedLink::with_incoming(b">OK");
        let delay = Duration::from_millis(5);
        let mut board = SerialBoard::new(link, false).with_chunk_delay(delay);
        let source = "x".repeat(WRITE_CHUNK * 3 + 10);
        board.exec_no_follow(&source).unwrap();
        let link = board.into_inner();
        let sizes: Vec<usize> = link.writes.iter().map(|(len, _)| *len).collect();
        assert_eq!(sizes, [WRITE_CHUNK, WRITE_CHUNK, WRITE_CHUNK, 10, 1]);
        for pair in link.writes.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= delay);
        }
        assert!(link.outgoing.ends_with(&[EOT]));
    }

    #[test]
    fn zero_delay_sends_back_to_back() {
        let mut board = SerialBoard::new(ScriptedLink::with_incoming(b">OK"), false);
        board.exec_no_follow(&"y".repeat(WRITE_CHUNK + 1)).unwrap();
        let sizes: Vec<usize> = board.into_inner().writes.iter().map(|(len, _)| *len).collect();
        assert_eq!(sizes, [WRITE_CHUNK, 1, 1]);
    }
}
