use gatelink_config::{parse_channel_params, unparse_channel_params, EnclaveTable};

use crate::cmd::ParseArgs;
use crate::exit::{config_error, CliResult, SUCCESS};
use crate::output::{print_description, OutputFormat};

pub fn run(args: ParseArgs, format: OutputFormat) -> CliResult<i32> {
    let mut enclaves = EnclaveTable::new();
    if let Some(names) = &args.enclaves {
        enclaves
            .declare(names)
            .map_err(|err| config_error("bad --enclaves list", err))?;
    }

    let params = parse_channel_params(&args.config, &enclaves)
        .map_err(|err| config_error("bad channel config", err))?;
    let canonical = unparse_channel_params(&params, &enclaves);
    print_description(&params, &canonical, format);

    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config_succeeds() {
        let args = ParseArgs {
            config: "pipe,/tmp/x,mtu=128".to_string(),
            enclaves: None,
        };
        assert_eq!(run(args, OutputFormat::Pretty).unwrap(), SUCCESS);
    }

    #[test]
    fn unknown_key_maps_to_usage_error() {
        let args = ParseArgs {
            config: "pipe,/tmp/x,color=red".to_string(),
            enclaves: None,
        };
        let err = run(args, OutputFormat::Pretty).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }

    #[test]
    fn enclaves_resolve_in_declared_order() {
        let args = ParseArgs {
            config: "pipe,/tmp/x,src=foo,dst=bar".to_string(),
            enclaves: Some(vec!["foo".to_string(), "bar".to_string()]),
        };
        assert_eq!(run(args, OutputFormat::Pretty).unwrap(), SUCCESS);
    }
}
