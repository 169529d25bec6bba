//! Interactive echo client.
//!
//! Reads lines from a console, sends each to the server and prints the
//! reply, until the user enters the sentinel.

use crate::protocols::echo::SENTINEL;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use tracing::{debug, warn};

const PROMPT: &str = "Client: ";

/// Client side of one echo session.
pub struct EchoClient<R, W> {
    reader: R,
    writer: W,
}

impl EchoClient<BufReader<TcpStream>, TcpStream> {
    /// Connect to an echo server.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        debug!(peer = %stream.peer_addr()?, "Connected");
        let writer = stream.try_clone()?;
        Ok(Self::new(BufReader::new(stream), writer))
    }

    /// Close the connection in both directions.
    pub fn close(self) -> io::Result<()> {
        self.writer.shutdown(Shutdown::Both)
    }
}

impl<R: BufRead, W: Write> EchoClient<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Send one line and wait for its echo.
    ///
    /// Returns `None` if the server closed the connection instead.
    pub fn exchange(&mut self, line: &str) -> io::Result<Option<String>> {
        self.send(line)?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Ok(None);
        }
        Ok(Some(trim_terminator(&reply).to_string()))
    }

    /// Drive the prompt loop. End of `input` counts as the sentinel.
    ///
    /// Returns the number of lines echoed by the server.
    pub fn interact<I: BufRead, O: Write>(
        &mut self,
        mut input: I,
        console: &mut O,
    ) -> io::Result<u64> {
        let mut echoed = 0;
        let mut line = String::new();

        loop {
            write!(console, "{PROMPT}")?;
            console.flush()?;

            line.clear();
            let text = if input.read_line(&mut line)? == 0 {
                writeln!(console)?;
                "."
            } else {
                trim_terminator(&line)
            };

            if text.as_bytes() == SENTINEL {
                self.send(text)?;
                return Ok(echoed);
            }

            match self.exchange(text)? {
                Some(reply) => {
                    writeln!(console, "Server: {reply}")?;
                    echoed += 1;
                }
                None => {
                    warn!("Server closed the connection");
                    return Ok(echoed);
                }
            }
        }
    }

    fn send(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

fn trim_terminator(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}
