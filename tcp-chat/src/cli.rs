use std::net::SocketAddrV4;

use clap::{Args, Parser, Subcommand};

use crate::server::DEFAULT_BACKLOG;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server, relaying every client's messages to the others.
    Server(ServerArgs),
    /// Connect to a server and chat from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// IPv4 socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:12345")]
    pub listen: SocketAddrV4,

    /// Maximum number of pending connections queued by the OS.
    #[arg(long, default_value_t = DEFAULT_BACKLOG)]
    pub backlog: u32,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1:12345")]
    pub server: SocketAddrV4,
}
