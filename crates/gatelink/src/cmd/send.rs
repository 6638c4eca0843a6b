use gatelink_runtime::{Direction, Registry};
use tracing::info;

use crate::cmd::SendArgs;
use crate::exit::{channel_error, io_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: SendArgs, _format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;

    let registry = Registry::new();
    let cd = registry
        .open_parse(&args.config, Direction::Write)
        .map_err(|err| channel_error("open failed", err))?;

    for _ in 0..args.repeat {
        registry
            .write(cd, &payload)
            .map_err(|err| channel_error("write failed", err))?;
    }
    info!(bytes = payload.len(), repeat = args.repeat, "payload sent");

    registry
        .close(cd, Direction::Write)
        .map_err(|err| channel_error("close failed", err))?;
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return std::fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
