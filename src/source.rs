//! Frame source: the external SDR tool's text output.
//!
//! The tool emits one frame per line as `*` + 28 hex nibbles + `;`.
//! Anything else on the stream is discarded. Short (56-bit) frames are
//! still conveyed as 14 bytes; the decoder ignores the trailing bytes.

use std::io;
use std::process::Stdio;

use crossbeam_channel::Sender;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::decoder::LONG_FRAME_BYTES;

/// One frame as conveyed by the source, always 14 bytes.
pub type RawFrame = [u8; LONG_FRAME_BYTES];

/// `*` + 28 nibbles + `;`.
const FRAME_LINE_LEN: usize = 30;

/// Parse one source line into frame bytes.
///
/// Returns `None` for anything that is not exactly the expected shape.
pub fn parse_frame_line(line: &str) -> Option<RawFrame> {
    let line = line.trim();
    if line.len() != FRAME_LINE_LEN || !line.starts_with('*') || !line.ends_with(';') {
        return None;
    }

    let mut frame = [0u8; LONG_FRAME_BYTES];
    let nibbles = &line.as_bytes()[1..FRAME_LINE_LEN - 1];
    for (i, pair) in nibbles.chunks(2).enumerate() {
        frame[i] = (hex_digit(pair[0])? << 4) | hex_digit(pair[1])?;
    }
    Some(frame)
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Launch the SDR tool and feed its frames into `tx` until it exits.
///
/// The child is killed when this future is dropped.
pub async fn run_exec(path: &str, tx: Sender<RawFrame>) -> io::Result<()> {
    let mut child = Command::new(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stdout not captured"))?;

    info!("frame source started: {}", path);
    pump_lines(BufReader::new(stdout), &tx).await?;

    let status = child.wait().await?;
    info!("frame source exited: {}", status);
    Ok(())
}

/// Replay frames from a file, or from stdin when `path` is `-`.
pub async fn run_file(path: &str, tx: Sender<RawFrame>) -> io::Result<()> {
    if path == "-" {
        pump_lines(BufReader::new(tokio::io::stdin()), &tx).await
    } else {
        let file = tokio::fs::File::open(path).await?;
        pump_lines(BufReader::new(file), &tx).await
    }
}

async fn pump_lines<R>(reader: R, tx: &Sender<RawFrame>) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let Some(frame) = parse_frame_line(&line) else {
            continue;
        };
        // The decode thread owns the other end; when it falls behind,
        // shedding frames beats stalling the child's stdout.
        if tx.try_send(frame).is_err() {
            debug!("decode queue full, dropping frame");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_line() {
        let frame = parse_frame_line("*8D4840D6202CC371C32CE0576098;").unwrap();
        assert_eq!(frame[0], 0x8D);
        assert_eq!(frame[13], 0x98);
    }

    #[test]
    fn accepts_surrounding_whitespace_and_lowercase() {
        let frame = parse_frame_line("*8d4840d6202cc371c32ce0576098;\r\n").unwrap();
        assert_eq!(frame[3], 0xD6);
    }

    #[test]
    fn rejects_malformed_lines() {
        // Missing delimiters.
        assert!(parse_frame_line("8D4840D6202CC371C32CE0576098").is_none());
        assert!(parse_frame_line("*8D4840D6202CC371C32CE0576098").is_none());
        assert!(parse_frame_line("8D4840D6202CC371C32CE0576098;").is_none());
        // Wrong length.
        assert!(parse_frame_line("*8D4840D6;").is_none());
        assert!(parse_frame_line("*8D4840D6202CC371C32CE057609800;").is_none());
        assert!(parse_frame_line("").is_none());
        // Non-hex payload.
        assert!(parse_frame_line("*8G4840D6202CC371C32CE0576098;").is_none());
    }
}
