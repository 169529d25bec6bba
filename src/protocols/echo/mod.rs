//! Echo protocol implementation.
//!
//! Newline-delimited text, one session per connection:
//! - Client sends: `<line>\n`
//! - Server echoes: `<line>\n`
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  hello\n
//! Response: hello\n
//! Request:  .\n
//! (connection closed, nothing echoed)
//! ```
//!
//! The single-character line `.` ends the session. It is only recognized
//! on the inbound side. A `\r\n` terminator is accepted as well; replies
//! always end in `\n`. Line contents are echoed byte for byte. A line longer
//! than the configured limit closes the connection.

pub mod handler;
pub mod parser;

pub use handler::{serve, EchoTask, Session, SessionEnd, DEFAULT_MAX_LINE};
pub use parser::SENTINEL;
