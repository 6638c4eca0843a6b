use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use gatelink_config::ChannelParams;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct DescriptionOutput<'a> {
    kind: String,
    canonical: &'a str,
    params: &'a ChannelParams,
}

/// Print a parsed channel description in the selected format.
pub fn print_description(params: &ChannelParams, canonical: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DescriptionOutput {
                kind: params.kind().to_string(),
                canonical,
                params,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "CANONICAL", "SRC", "DST", "FLAGS"])
                .add_row(vec![
                    params.kind().to_string(),
                    canonical.to_string(),
                    enclave_cell(params.src_enclave),
                    enclave_cell(params.dst_enclave),
                    flags_cell(params),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("{canonical}");
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn enclave_cell(index: usize) -> String {
    if index == 0 {
        "-".to_string()
    } else {
        format!("#{index}")
    }
}

fn flags_cell(params: &ChannelParams) -> String {
    let mut flags = Vec::new();
    if params.listener {
        flags.push("listener");
    }
    if params.control {
        flags.push("control");
    }
    if flags.is_empty() {
        "-".to_string()
    } else {
        flags.join(",")
    }
}
