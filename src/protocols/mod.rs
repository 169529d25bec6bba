//! Protocol implementations.
//!
//! Each protocol provides a parser and a session handler that runs as a
//! worker pool task.
//!
//! - `echo`: newline-delimited line echo with a `.` sentinel

pub mod echo;
