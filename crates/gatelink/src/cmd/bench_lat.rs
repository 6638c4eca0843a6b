use std::time::Instant;

use gatelink_runtime::{Direction, Registry};
use tracing::info;

use crate::cmd::BenchLatArgs;
use crate::exit::{channel_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};

/// Round-trip latency harness. The peer process runs the mirrored command
/// with its in/out channels swapped and the sync channel opened write-only;
/// each side echoes the other's messages until `nbytes` have moved.
pub fn run(args: BenchLatArgs) -> CliResult<i32> {
    if args.message_len == 0 || args.nbytes == 0 {
        return Err(CliError::new(USAGE, "message-len and nbytes must be nonzero"));
    }

    let registry = Registry::new();
    let out_cd = registry
        .open_parse(&args.channel_out, Direction::Write)
        .map_err(|err| channel_error("outbound channel open failed", err))?;
    let in_cd = registry
        .open_parse(&args.channel_in, Direction::Read)
        .map_err(|err| channel_error("inbound channel open failed", err))?;
    let sync_cd = registry
        .open_parse(&args.sync, Direction::Read)
        .map_err(|err| channel_error("sync channel open failed", err))?;

    let nbytes = args.nbytes as usize;
    let outbound: Vec<u8> = (0..nbytes).map(|i| (i % 255) as u8).collect();
    let mut inbound = vec![0u8; nbytes];

    // The peer signals readiness, then we prime the loop with the first
    // message.
    read_exact(&registry, sync_cd, &mut [0u8; 1])?;
    write_all(&registry, out_cd, &outbound[..args.message_len])?;

    let iterations = nbytes / args.message_len;
    let start = Instant::now();
    let mut sent = args.message_len;
    let mut received = 0usize;
    for _ in 0..iterations {
        let upper = (received + args.message_len).min(nbytes);
        read_exact(&registry, in_cd, &mut inbound[received..upper])?;
        received = upper;

        if sent < nbytes {
            let upper = (sent + args.message_len).min(nbytes);
            write_all(&registry, out_cd, &outbound[sent..upper])?;
            sent = upper;
        }
    }
    let elapsed = start.elapsed();

    // Terminal sync keeps the peer alive until both directions drained.
    read_exact(&registry, sync_cd, &mut [0u8; 1])?;

    for (position, (&got, &want)) in inbound.iter().zip(outbound.iter()).enumerate() {
        if got != want {
            return Err(CliError::new(
                DATA_INVALID,
                format!("at position {position} expected {want} and read {got}"),
            ));
        }
    }

    let avg_us = elapsed.as_micros() as f64 / iterations as f64;
    info!(iterations, ?elapsed, "latency run complete");
    println!("average round-trip latency: {avg_us:.3} us over {iterations} iterations");
    Ok(SUCCESS)
}

fn read_exact(registry: &Registry, cd: usize, buf: &mut [u8]) -> CliResult<()> {
    let mut got = 0usize;
    while got < buf.len() {
        let n = registry
            .read(cd, &mut buf[got..])
            .map_err(|err| channel_error("bench read failed", err))?;
        if n == 0 {
            return Err(CliError::new(
                crate::exit::FAILURE,
                "peer closed the channel mid-run",
            ));
        }
        got += n;
    }
    Ok(())
}

fn write_all(registry: &Registry, cd: usize, buf: &[u8]) -> CliResult<()> {
    registry
        .write(cd, buf)
        .map_err(|err| channel_error("bench write failed", err))?;
    Ok(())
}
