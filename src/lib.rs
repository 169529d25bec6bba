//! linepool: a line echo server whose sessions run on a fixed-size worker pool.
//!
//! - [`pool`]: the worker pool and its shared blocking FIFO
//! - [`protocols`]: the echo protocol and its session task
//! - [`server`]: TCP listener submitting one task per connection
//! - [`client`]: interactive command-line client
//! - [`config`]: CLI and TOML configuration

pub mod client;
pub mod config;
pub mod pool;
pub mod protocols;
pub mod server;
