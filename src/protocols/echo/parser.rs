//! Echo protocol parser.

use bytes::BytesMut;

/// Inbound line that ends the session.
pub const SENTINEL: &[u8] = b".";

/// Parsed echo command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Echo a line back.
    Echo {
        /// Length of the line without its terminator.
        line_len: usize,
        /// Bytes consumed from the input, terminator included.
        consumed: usize,
    },
    /// Sentinel line, close the session.
    Quit,
}

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// A full line is available.
    Complete(Command),
    /// No line terminator yet.
    Incomplete,
}

/// Parse the first newline-terminated line in `input`.
///
/// A `\r` right before the `\n` is treated as part of the terminator.
pub fn parse(input: &[u8]) -> ParseResult {
    parse_from(input, 0)
}

/// Like [`parse`], but skips the first `scanned` bytes when looking for the
/// terminator. The caller guarantees they contain no `\n`.
pub fn parse_from(input: &[u8], scanned: usize) -> ParseResult {
    let start = scanned.min(input.len());
    match input[start..].iter().position(|&b| b == b'\n') {
        Some(offset) => {
            let pos = start + offset;
            ParseResult::Complete(classify(&input[..pos], pos + 1))
        }
        None => ParseResult::Incomplete,
    }
}

/// Parse what is left in the buffer once the peer has closed its side.
///
/// An unterminated final line still counts as a line.
pub fn parse_final(input: &[u8]) -> Option<Command> {
    if input.is_empty() {
        None
    } else {
        Some(classify(input, input.len()))
    }
}

fn classify(line: &[u8], consumed: usize) -> Command {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line == SENTINEL {
        Command::Quit
    } else {
        Command::Echo {
            line_len: line.len(),
            consumed,
        }
    }
}

/// Append an echoed line to the output buffer.
pub fn response(line: &[u8], output: &mut BytesMut) {
    output.reserve(line.len() + 1);
    output.extend_from_slice(line);
    output.extend_from_slice(b"\n");
}
