use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod bench_lat;
pub mod bench_thr;
pub mod parse;
pub mod recv;
pub mod send;

/// Help footer listing the option-string grammar for every transport.
pub const CHANNEL_GRAMMAR: &str = "\
Supported channels:
  DEVICE        device,path[,iov_len=N]
  PIPE          pipe,path[,min_tx_size=N,mtu=N]
  UNIX SOCKET   unix_socket,path[,buffer_size=N]
  TCP SOCKET    tcp_socket,reader addr,reader port[,buffer_size=N,mtu=N]
  UDP SOCKET    udp_socket,reader addr,reader port[,buffer_size=N]
  SHMEM         shmem,path[,buffer_size=N]
  UDP_SHMEM     udp_shmem,path[,buffer_size=N,packet_size=N,packet_count=N]
  UIO           uio[,path][,region=N]
  SERIAL        serial,path[,baud=N,mtu=N]
  MERCURY       mercury,level,src_id,dst_id[,msg_id_1,...]
  GE_ETH        ge_eth,reader addr,reader port,msg_id[,mtu=N]
Shared keys: src=NAME dst=NAME listener=1 control=1";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a channel option string and print its canonical form.
    Parse(ParseArgs),
    /// Open a channel write-only and send one payload.
    Send(SendArgs),
    /// Open a channel read-only and receive a fixed number of bytes.
    Recv(RecvArgs),
    /// Round-trip latency harness (pairs with a peer running the same).
    BenchLat(BenchLatArgs),
    /// One-way throughput harness (reader and writer roles).
    BenchThr(BenchThrArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Parse(args) => parse::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Recv(args) => recv::run(args, format),
        Command::BenchLat(args) => bench_lat::run(args),
        Command::BenchThr(args) => bench_thr::run(args),
    }
}

#[derive(Args, Debug)]
#[command(after_help = CHANNEL_GRAMMAR)]
pub struct ParseArgs {
    /// Channel option string.
    pub config: String,
    /// Enclave names to declare, in order, for src=/dst= resolution.
    #[arg(long, value_delimiter = ',')]
    pub enclaves: Option<Vec<String>>,
}

#[derive(Args, Debug)]
#[command(after_help = CHANNEL_GRAMMAR)]
pub struct SendArgs {
    /// Channel option string.
    pub config: String,
    /// Payload string.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read the payload from a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<std::path::PathBuf>,
    /// Send the payload this many times.
    #[arg(long, default_value = "1")]
    pub repeat: usize,
}

#[derive(Args, Debug)]
#[command(after_help = CHANNEL_GRAMMAR)]
pub struct RecvArgs {
    /// Channel option string.
    pub config: String,
    /// Number of bytes to receive.
    #[arg(long, short = 'c')]
    pub count: usize,
}

#[derive(Args, Debug)]
#[command(after_help = CHANNEL_GRAMMAR)]
pub struct BenchLatArgs {
    /// Outbound test channel (opened write-only).
    pub channel_out: String,
    /// Inbound test channel (opened read-only).
    pub channel_in: String,
    /// Startup synchronization channel (opened read-only).
    pub sync: String,
    /// Bytes per message.
    #[arg(long, default_value = "64")]
    pub message_len: usize,
    /// Total bytes to move in each direction.
    #[arg(long, default_value = "1048576")]
    pub nbytes: u64,
}

#[derive(Args, Debug)]
#[command(after_help = CHANNEL_GRAMMAR)]
pub struct BenchThrArgs {
    /// Which end of the transfer this process is.
    #[arg(long, value_enum)]
    pub role: bench_thr::Role,
    /// Test channel carrying the payload.
    pub channel: String,
    /// Startup synchronization channel (flows reader -> writer).
    pub sync: String,
    /// Bytes per message.
    #[arg(long, default_value = "65536")]
    pub message_len: usize,
    /// Total bytes to move.
    #[arg(long, default_value = "134217728")]
    pub nbytes: u64,
}
