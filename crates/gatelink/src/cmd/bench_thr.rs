use std::time::Instant;

use clap::ValueEnum;
use gatelink_runtime::{Direction, Registry};
use tracing::info;

use crate::cmd::BenchThrArgs;
use crate::exit::{channel_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, USAGE};

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Role {
    Reader,
    Writer,
}

/// One-way throughput harness. The reader announces readiness on the sync
/// channel, the writer floods the test channel, and the reader reports the
/// measured rate.
pub fn run(args: BenchThrArgs) -> CliResult<i32> {
    if args.message_len == 0 || args.nbytes == 0 {
        return Err(CliError::new(USAGE, "message-len and nbytes must be nonzero"));
    }
    match args.role {
        Role::Reader => run_reader(&args),
        Role::Writer => run_writer(&args),
    }
}

fn run_reader(args: &BenchThrArgs) -> CliResult<i32> {
    let registry = Registry::new();
    let test_cd = registry
        .open_parse(&args.channel, Direction::Read)
        .map_err(|err| channel_error("test channel open failed", err))?;
    let sync_cd = registry
        .open_parse(&args.sync, Direction::Write)
        .map_err(|err| channel_error("sync channel open failed", err))?;

    let nbytes = args.nbytes as usize;
    let mut buffer = vec![0u8; nbytes];

    sync_signal(&registry, sync_cd)?;
    read_exact(&registry, test_cd, &mut [0u8; 1])?;

    let iterations = nbytes / args.message_len;
    let start = Instant::now();
    let mut received = 0usize;
    for _ in 0..iterations {
        let upper = (received + args.message_len).min(nbytes);
        read_exact(&registry, test_cd, &mut buffer[received..upper])?;
        received = upper;
    }
    let elapsed = start.elapsed();

    sync_signal(&registry, sync_cd)?;

    for (position, &got) in buffer[..received].iter().enumerate() {
        let want = (position % 255) as u8;
        if got != want {
            return Err(CliError::new(
                DATA_INVALID,
                format!("at position {position} expected {want} and read {got}"),
            ));
        }
    }

    let seconds = elapsed.as_secs_f64();
    let mb_per_s = (received as f64 / 1e6) / seconds;
    info!(received, ?elapsed, "throughput run complete");
    println!("average throughput: {mb_per_s:.3} MB/s");
    Ok(SUCCESS)
}

fn run_writer(args: &BenchThrArgs) -> CliResult<i32> {
    let registry = Registry::new();
    let test_cd = registry
        .open_parse(&args.channel, Direction::Write)
        .map_err(|err| channel_error("test channel open failed", err))?;
    let sync_cd = registry
        .open_parse(&args.sync, Direction::Read)
        .map_err(|err| channel_error("sync channel open failed", err))?;

    let nbytes = args.nbytes as usize;
    let payload: Vec<u8> = (0..nbytes).map(|i| (i % 255) as u8).collect();

    // Wait for the reader, then send the start signal in-band.
    read_exact(&registry, sync_cd, &mut [0u8; 1])?;
    registry
        .write(test_cd, &[1u8])
        .map_err(|err| channel_error("start signal failed", err))?;

    let iterations = nbytes / args.message_len;
    let mut sent = 0usize;
    for _ in 0..iterations {
        let upper = (sent + args.message_len).min(nbytes);
        registry
            .write(test_cd, &payload[sent..upper])
            .map_err(|err| channel_error("bench write failed", err))?;
        sent = upper;
    }

    // Reader confirms it drained everything.
    read_exact(&registry, sync_cd, &mut [0u8; 1])?;
    info!(sent, "writer side complete");
    Ok(SUCCESS)
}

fn sync_signal(registry: &Registry, cd: usize) -> CliResult<()> {
    registry
        .write(cd, &[1u8])
        .map_err(|err| channel_error("sync write failed", err))?;
    Ok(())
}

fn read_exact(registry: &Registry, cd: usize, buf: &mut [u8]) -> CliResult<()> {
    let mut got = 0usize;
    while got < buf.len() {
        let n = registry
            .read(cd, &mut buf[got..])
            .map_err(|err| channel_error("bench read failed", err))?;
        if n == 0 {
            return Err(CliError::new(FAILURE, "peer closed the channel mid-run"));
        }
        got += n;
    }
    Ok(())
}
