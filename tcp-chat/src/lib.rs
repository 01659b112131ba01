//! Minimal multi-client TCP chat.
//!
//! The server relays whatever bytes one client sends to every other
//! connected client. There is no framing: each read of up to
//! [`connection::READ_CHUNK_SIZE`] bytes is treated as one message, so line
//! boundaries are not preserved end to end.
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`server`] binds the listener, accepts connections and runs one receive
//!   task per client.
//! - [`registry`] keeps the mutex-guarded set of live connections.
//! - [`broadcast`] fans a message out to everyone but its sender and prunes
//!   recipients that fail.
//! - [`connection`] wraps the write half of a client stream so it is closed
//!   at most once and never written after close.
//! - [`client`] connects to a server, printing what arrives while sending
//!   typed lines.
//! - [`error`] classifies per-connection failures.

pub mod broadcast;
pub mod cli;
pub mod client;
pub mod connection;
pub mod error;
pub mod registry;
pub mod server;
