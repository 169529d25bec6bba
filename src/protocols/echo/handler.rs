//! Echo session handler.

use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use tracing::{debug, trace};

use super::parser::{parse_final, parse_from, response, Command, ParseResult};
use crate::pool::Task;

/// Read buffer size
const BUFFER_SIZE: usize = 4096;

/// Default limit on the length of one inbound line.
pub const DEFAULT_MAX_LINE: usize = 1024 * 1024; // 1MB

/// How a session ended without an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent the sentinel line.
    Sentinel,
    /// Client closed its side of the connection.
    Eof,
}

/// Summary of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub echoed: u64,
    pub end: SessionEnd,
}

/// One client connection, run as a pool task.
///
/// Occupies its worker until the client sends the sentinel, disconnects, or
/// the connection fails.
pub struct EchoTask {
    stream: TcpStream,
    peer: SocketAddr,
    max_line: usize,
}

impl EchoTask {
    pub fn new(stream: TcpStream, peer: SocketAddr, max_line: usize) -> Self {
        Self {
            stream,
            peer,
            max_line,
        }
    }
}

impl Task for EchoTask {
    fn execute(self: Box<Self>) {
        let EchoTask {
            mut stream,
            peer,
            max_line,
        } = *self;

        match serve(&mut stream, max_line) {
            Ok(session) => {
                debug!(peer = %peer, echoed = session.echoed, end = ?session.end, "Session closed");
            }
            Err(e) => {
                debug!(peer = %peer, error = %e, "Session error");
            }
        }

        // The peer may already be gone.
        let _ = stream.shutdown(Shutdown::Both);
    }
}

/// Run the echo loop over `stream` until the sentinel, EOF, or an I/O error.
///
/// A line longer than `max_line` bytes (terminator excluded) ends the session
/// with `InvalidData`; lines before it have already been echoed.
pub fn serve<S: Read + Write>(stream: &mut S, max_line: usize) -> io::Result<Session> {
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);
    let mut output = BytesMut::with_capacity(BUFFER_SIZE);
    let mut chunk = [0u8; BUFFER_SIZE];
    // Prefix of `buffer` already known to hold no '\n'.
    let mut scanned = 0;
    let mut echoed = 0;

    loop {
        // Answer every complete line already buffered.
        let mut quit = false;
        while let ParseResult::Complete(command) = parse_from(&buffer, scanned) {
            scanned = 0;
            match command {
                Command::Echo { line_len, consumed } => {
                    if line_len > max_line {
                        flush(stream, &mut output)?;
                        return Err(line_too_long(max_line));
                    }
                    let line = buffer.split_to(consumed);
                    trace!(len = line_len, "Echo line");
                    response(&line[..line_len], &mut output);
                    echoed += 1;
                }
                Command::Quit => {
                    quit = true;
                    break;
                }
            }
        }

        flush(stream, &mut output)?;
        if quit {
            return Ok(Session {
                echoed,
                end: SessionEnd::Sentinel,
            });
        }

        scanned = buffer.len();
        // One extra byte for a pending '\r' of a line of exactly max_line.
        if buffer.len() > max_line + 1 {
            return Err(line_too_long(max_line));
        }

        let n = match stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        if n == 0 {
            let end = match parse_final(&buffer) {
                Some(Command::Quit) => SessionEnd::Sentinel,
                Some(Command::Echo { line_len, .. }) => {
                    if line_len > max_line {
                        return Err(line_too_long(max_line));
                    }
                    response(&buffer[..line_len], &mut output);
                    echoed += 1;
                    flush(stream, &mut output)?;
                    SessionEnd::Eof
                }
                None => SessionEnd::Eof,
            };
            return Ok(Session { echoed, end });
        }

        buffer.extend_from_slice(&chunk[..n]);
    }
}

fn line_too_long(max_line: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("line exceeds {max_line} bytes"),
    )
}

fn flush<S: Write>(stream: &mut S, output: &mut BytesMut) -> io::Result<()> {
    if output.is_empty() {
        return Ok(());
    }
    stream.write_all(output)?;
    stream.flush()?;
    output.clear();
    Ok(())
}
