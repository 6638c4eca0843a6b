mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "gatelink", version, about = "Cross-domain channel runtime CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parse_subcommand() {
        let cli = Cli::try_parse_from(["gatelink", "parse", "pipe,/tmp/x"])
            .expect("parse args should parse");
        assert!(matches!(cli.command, Command::Parse(_)));
    }

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from(["gatelink", "send", "pipe,/tmp/x", "--data", "hello"])
            .expect("send args should parse");
        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "gatelink",
            "send",
            "pipe,/tmp/x",
            "--data",
            "hello",
            "--file",
            "/tmp/payload",
        ])
        .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_bench_thr_role() {
        let cli = Cli::try_parse_from([
            "gatelink",
            "bench-thr",
            "--role",
            "reader",
            "pipe,/tmp/t",
            "pipe,/tmp/s",
        ])
        .expect("bench-thr args should parse");
        assert!(matches!(cli.command, Command::BenchThr(_)));
    }
}
