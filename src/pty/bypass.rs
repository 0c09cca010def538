//! Backtick-escape framing for the bypass PTY protocol used on Windows
//! builds that predate ConPTY. The normal `portable-pty`-backed session
//! already gets a real PTY via ConPTY on current Windows, but older targets
//! go through a side channel pipe that can't transmit out-of-band signals
//! (like a resize) inline with program output -- so resize requests are
//! escaped into the byte stream instead, using a backtick as the escape
//! character.
//!
//! Grounded in the source terminal's `ui2::BypassPTY`/`tpp::BypassPTY`
//! (`send()`/`resize()`) and its counterpart decoder, `PTYEncoder::decodeCommands`
//! in the `asciienc` helper process. This module implements only the framing
//! (encode the outgoing stream, decode the incoming one); the actual named
//! pipe and child process plumbing is `#[cfg(windows)]`-only and lives
//! behind the same `PtyBackend`-shaped API the ConPTY path uses, so hosts
//! that don't need it never pull in Windows-specific code.

/// Escape character marking a command in the bypass byte stream.
const ESCAPE: u8 = b'`';

/// Double up any literal backticks in `data` so they survive the bypass
/// pipe without being mistaken for the start of an escape sequence.
/// Mirrors `BypassPTY::send`.
pub fn encode_send(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        out.push(b);
        if b == ESCAPE {
            out.push(ESCAPE);
        }
    }
    out
}

/// Build the resize command frame: `` `r<cols>:<rows>; ``. Mirrors
/// `BypassPTY::resize`.
pub fn encode_resize(cols: u16, rows: u16) -> Vec<u8> {
    format!("`r{}:{};", cols, rows).into_bytes()
}

/// A decoded unit from the bypass byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassCommand {
    /// A regular data byte to pass through to the terminal parser.
    Data(u8),
    /// A resize request carried out-of-band in the stream.
    Resize { cols: u16, rows: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Normal,
    SawEscape,
    ReadingResize,
}

/// Incremental decoder for the bypass byte stream, mirroring
/// `PTYEncoder::decodeCommands`: a backtick starts an escape; the next byte
/// picks the command (a doubled backtick is a literal backtick, `r` starts
/// a `<cols>:<rows>;` resize request).
#[derive(Debug)]
pub struct BypassDecoder {
    state: DecodeState,
    resize_buf: String,
}

impl BypassDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Normal,
            resize_buf: String::new(),
        }
    }

    /// Feed one byte, returning any commands it completed. A single byte
    /// can complete at most one command, so this returns an `Option`.
    pub fn feed(&mut self, byte: u8) -> Option<BypassCommand> {
        match self.state {
            DecodeState::Normal => {
                if byte == ESCAPE {
                    self.state = DecodeState::SawEscape;
                    None
                } else {
                    Some(BypassCommand::Data(byte))
                }
            }
            DecodeState::SawEscape => match byte {
                ESCAPE => {
                    self.state = DecodeState::Normal;
                    Some(BypassCommand::Data(ESCAPE))
                }
                b'r' => {
                    self.state = DecodeState::ReadingResize;
                    self.resize_buf.clear();
                    None
                }
                other => {
                    // Unknown escape: drop it, matching the source decoder's
                    // behavior of silently ignoring unrecognized commands.
                    self.state = DecodeState::Normal;
                    let _ = other;
                    None
                }
            },
            DecodeState::ReadingResize => {
                if byte == b';' {
                    self.state = DecodeState::Normal;
                    parse_resize(&self.resize_buf)
                } else {
                    self.resize_buf.push(byte as char);
                    None
                }
            }
        }
    }
}

fn parse_resize(spec: &str) -> Option<BypassCommand> {
    let (cols, rows) = spec.split_once(':')?;
    let cols = cols.parse().ok()?;
    let rows = rows.parse().ok()?;
    Some(BypassCommand::Resize { cols, rows })
}

#[cfg(windows)]
mod windows_backend {
    //! Named-pipe transport for the bypass protocol. Only compiled on
    //! Windows; other targets use the portable-pty/ConPTY path exclusively.

    use std::io::{self, Read, Write};

    /// A writer that frames every write through [`super::encode_send`]
    /// before handing it to the underlying pipe.
    pub struct BypassWriter<W: Write> {
        inner: W,
    }

    impl<W: Write> BypassWriter<W> {
        pub fn new(inner: W) -> Self {
            Self { inner }
        }

        pub fn resize(&mut self, cols: u16, rows: u16) -> io::Result<()> {
            self.inner.write_all(&super::encode_resize(cols, rows))
        }
    }

    impl<W: Write> Write for BypassWriter<W> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.inner.write_all(&super::encode_send(buf))?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    /// A reader that decodes the bypass stream, surfacing data bytes
    /// directly and applying resize commands via the supplied callback.
    pub struct BypassReader<R: Read> {
        inner: R,
        decoder: super::BypassDecoder,
    }

    impl<R: Read> BypassReader<R> {
        pub fn new(inner: R) -> Self {
            Self {
                inner,
                decoder: super::BypassDecoder::new(),
            }
        }

        /// Read and decode one chunk, invoking `on_resize` for any resize
        /// commands found and returning the plain data bytes.
        pub fn read_decoded(
            &mut self,
            scratch: &mut [u8],
            mut on_resize: impl FnMut(u16, u16),
        ) -> io::Result<Vec<u8>> {
            let n = self.inner.read(scratch)?;
            let mut data = Vec::with_capacity(n);
            for &b in &scratch[..n] {
                match self.decoder.feed(b) {
                    Some(super::BypassCommand::Data(byte)) => data.push(byte),
                    Some(super::BypassCommand::Resize { cols, rows }) => on_resize(cols, rows),
                    None => {}
                }
            }
            Ok(data)
        }
    }
}

#[cfg(windows)]
pub use windows_backend::{BypassReader, BypassWriter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_send_doubles_literal_backticks() {
        assert_eq!(encode_send(b"a`b"), b"a``b");
        assert_eq!(encode_send(b"no backticks"), b"no backticks");
    }

    #[test]
    fn encode_resize_matches_source_framing() {
        assert_eq!(encode_resize(80, 24), b"`r80:24;");
    }

    #[test]
    fn decoder_round_trips_plain_data() {
        let mut dec = BypassDecoder::new();
        let mut out = Vec::new();
        for &b in b"hello" {
            if let Some(BypassCommand::Data(byte)) = dec.feed(b) {
                out.push(byte);
            }
        }
        assert_eq!(out, b"hello");
    }

    #[test]
    fn decoder_unescapes_doubled_backtick() {
        let mut dec = BypassDecoder::new();
        let mut out = Vec::new();
        for &b in b"a``b" {
            if let Some(BypassCommand::Data(byte)) = dec.feed(b) {
                out.push(byte);
            }
        }
        assert_eq!(out, b"a`b");
    }

    #[test]
    fn decoder_extracts_resize_command() {
        let mut dec = BypassDecoder::new();
        let mut commands = Vec::new();
        for &b in b"`r80:24;" {
            if let Some(cmd) = dec.feed(b) {
                commands.push(cmd);
            }
        }
        assert_eq!(commands, vec![BypassCommand::Resize { cols: 80, rows: 24 }]);
    }

    #[test]
    fn decoder_handles_resize_interleaved_with_data() {
        let mut dec = BypassDecoder::new();
        let mut data = Vec::new();
        let mut resizes = Vec::new();
        for &b in b"AB`r10:5;CD" {
            match dec.feed(b) {
                Some(BypassCommand::Data(byte)) => data.push(byte),
                Some(BypassCommand::Resize { cols, rows }) => resizes.push((cols, rows)),
                None => {}
            }
        }
        assert_eq!(data, b"ABCD");
        assert_eq!(resizes, vec![(10, 5)]);
    }
}
