use gatelink_runtime::{Direction, Registry};
use tracing::info;

use crate::cmd::RecvArgs;
use crate::exit::{channel_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_raw, OutputFormat};

pub fn run(args: RecvArgs, _format: OutputFormat) -> CliResult<i32> {
    let registry = Registry::new();
    let cd = registry
        .open_parse(&args.config, Direction::Read)
        .map_err(|err| channel_error("open failed", err))?;

    let mut buf = vec![0u8; args.count];
    let mut got = 0usize;
    while got < buf.len() {
        let n = registry
            .read(cd, &mut buf[got..])
            .map_err(|err| channel_error("read failed", err))?;
        if n == 0 {
            return Err(CliError::new(
                FAILURE,
                format!("channel closed after {got} of {} bytes", args.count),
            ));
        }
        got += n;
    }
    info!(bytes = got, "payload received");

    print_raw(&buf);
    Ok(SUCCESS)
}
