use std::str::FromStr;

use crate::enclave::EnclaveTable;
use crate::error::{ConfigError, Result};
use crate::param::{
    ChannelParams, TransportKind, TransportParams, MERCURY_MESSAGE_TABLE_LEN,
};

/// Parse a channel option string.
///
/// The grammar is `<kind>,<positional>*(,<key>=<value>)*`. The first token
/// selects the transport kind, the next tokens are that transport's
/// positional fields, and the remainder are key/value options. The shared
/// keys `src`, `dst`, `listener` and `control` are accepted on every
/// transport; `src`/`dst` are resolved against the supplied enclave table.
/// Any field not mentioned keeps its zero (default) value.
pub fn parse_channel_params(input: &str, enclaves: &EnclaveTable) -> Result<ChannelParams> {
    let mut tokens = input.split(',').peekable();
    let kind_token = tokens.next().unwrap_or("");
    let kind = TransportKind::from_token(kind_token)
        .ok_or_else(|| ConfigError::UnknownTransport(kind_token.to_string()))?;

    let mut params = ChannelParams::new(kind);

    match &mut params.transport {
        TransportParams::Invalid => unreachable!("from_token never yields Invalid"),
        TransportParams::Device(p) => {
            p.path = positional(&mut tokens, "device", "path")?;
        }
        TransportParams::Pipe(p) => {
            p.path = positional(&mut tokens, "pipe", "path")?;
        }
        TransportParams::UnixSocket(p) => {
            p.path = positional(&mut tokens, "unix_socket", "path")?;
        }
        TransportParams::TcpSocket(p) => {
            p.addr = positional(&mut tokens, "tcp_socket", "addr")?;
            p.port = numeric("port", &positional(&mut tokens, "tcp_socket", "port")?)?;
        }
        TransportParams::UdpSocket(p) => {
            p.addr = positional(&mut tokens, "udp_socket", "addr")?;
            p.port = numeric("port", &positional(&mut tokens, "udp_socket", "port")?)?;
        }
        TransportParams::Shmem(p) => {
            p.path = positional(&mut tokens, "shmem", "path")?;
        }
        TransportParams::UdpShmem(p) => {
            p.path = positional(&mut tokens, "udp_shmem", "path")?;
        }
        TransportParams::Uio(p) => {
            // The device path is optional: `uio` alone selects /dev/uio0.
            if let Some(tok) = tokens.peek() {
                if !tok.contains('=') {
                    p.path = tokens.next().expect("peeked").to_string();
                }
            }
        }
        TransportParams::Serial(p) => {
            p.path = positional(&mut tokens, "serial", "path")?;
        }
        TransportParams::Mercury(p) => {
            p.level = numeric("level", &positional(&mut tokens, "mercury", "level")?)?;
            p.source_id = numeric("src_id", &positional(&mut tokens, "mercury", "src_id")?)?;
            p.destination_id =
                numeric("dst_id", &positional(&mut tokens, "mercury", "dst_id")?)?;
            // Optional message ids are positional tokens up to the first
            // key=value option.
            while let Some(tok) = tokens.peek() {
                if tok.contains('=') {
                    break;
                }
                let tok = tokens.next().expect("peeked");
                if p.message_ids.len() == MERCURY_MESSAGE_TABLE_LEN {
                    return Err(ConfigError::TooManyMessageIds {
                        count: p.message_ids.len() + 1,
                        capacity: MERCURY_MESSAGE_TABLE_LEN,
                    });
                }
                p.message_ids.push(numeric("msg_id", tok)?);
            }
        }
        TransportParams::GeEth(p) => {
            p.addr = positional(&mut tokens, "ge_eth", "addr")?;
            p.port = numeric("port", &positional(&mut tokens, "ge_eth", "port")?)?;
            p.message_id = numeric("msg_id", &positional(&mut tokens, "ge_eth", "msg_id")?)?;
        }
    }

    for token in tokens {
        let (key, value) = split_key_value(token)?;
        if apply_shared_key(&mut params, enclaves, key, value)? {
            continue;
        }
        apply_transport_key(&mut params.transport, key, value)?;
    }

    Ok(params)
}

fn positional<'a, I: Iterator<Item = &'a str>>(
    tokens: &mut I,
    kind: &'static str,
    field: &'static str,
) -> Result<String> {
    tokens
        .next()
        .map(str::to_string)
        .ok_or(ConfigError::MissingField { kind, field })
}

fn split_key_value(token: &str) -> Result<(&str, &str)> {
    match token.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(ConfigError::UnknownKey(token.to_string())),
    }
}

fn numeric<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn resolve_enclave(enclaves: &EnclaveTable, name: &str) -> Result<usize> {
    enclaves
        .resolve(name)
        .ok_or_else(|| ConfigError::UnknownEnclave(name.to_string()))
}

/// Handle a key shared by every transport; returns false if the key is
/// transport-specific.
fn apply_shared_key(
    params: &mut ChannelParams,
    enclaves: &EnclaveTable,
    key: &str,
    value: &str,
) -> Result<bool> {
    match key {
        "src" => params.src_enclave = resolve_enclave(enclaves, value)?,
        "dst" => params.dst_enclave = resolve_enclave(enclaves, value)?,
        "listener" => params.listener = flag(key, value)?,
        "control" => params.control = flag(key, value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn apply_transport_key(transport: &mut TransportParams, key: &str, value: &str) -> Result<()> {
    match transport {
        TransportParams::Invalid => {}
        TransportParams::Device(p) => match key {
            "iov_len" => p.iov_len = numeric(key, value)?,
            "min_tx_size" => p.min_tx = numeric(key, value)?,
            "mtu" => p.mtu = numeric(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        TransportParams::Pipe(p) => match key {
            "min_tx_size" => p.min_tx = numeric(key, value)?,
            "mtu" => p.mtu = numeric(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        TransportParams::UnixSocket(p) => match key {
            "buffer_size" => p.buffer_size = numeric(key, value)?,
            "min_tx_size" => p.min_tx = numeric(key, value)?,
            "mtu" => p.mtu = numeric(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        TransportParams::TcpSocket(p) => match key {
            "buffer_size" => p.buffer_size = numeric(key, value)?,
            "min_tx_size" => p.min_tx = numeric(key, value)?,
            "mtu" => p.mtu = numeric(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        TransportParams::UdpSocket(p) => match key {
            "buffer_size" => p.buffer_size = numeric(key, value)?,
            "mtu" => p.mtu = numeric(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        TransportParams::Shmem(p) => match key {
            "buffer_size" => p.buffer_size = numeric(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        TransportParams::UdpShmem(p) => match key {
            "buffer_size" => p.buffer_size = numeric(key, value)?,
            "packet_size" => p.packet_size = numeric(key, value)?,
            "packet_count" => p.packet_count = numeric(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        TransportParams::Uio(p) => match key {
            "region" => p.region = numeric(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        TransportParams::Serial(p) => match key {
            "baud" => p.baud = numeric(key, value)?,
            "mtu" => p.mtu = numeric(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        TransportParams::Mercury(p) => match key {
            "mtu" => p.mtu = numeric(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
        TransportParams::GeEth(p) => match key {
            "mtu" => p.mtu = numeric(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_enclaves() -> EnclaveTable {
        EnclaveTable::new()
    }

    #[test]
    fn parses_device_with_iov_len() {
        let params = parse_channel_params("device,/dev/null,iov_len=0", &no_enclaves()).unwrap();
        assert_eq!(params.kind(), TransportKind::Device);
        match &params.transport {
            TransportParams::Device(p) => {
                assert_eq!(p.path, "/dev/null");
                assert_eq!(p.iov_len, 0);
                assert_eq!(p.min_tx, 0);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn parses_pipe_options() {
        let params =
            parse_channel_params("pipe,/tmp/gl,min_tx_size=64,mtu=128", &no_enclaves()).unwrap();
        match &params.transport {
            TransportParams::Pipe(p) => {
                assert_eq!(p.path, "/tmp/gl");
                assert_eq!(p.min_tx, 64);
                assert_eq!(p.mtu, 128);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn parses_tcp_socket() {
        let params =
            parse_channel_params("tcp_socket,127.0.0.1,5555,buffer_size=4096", &no_enclaves())
                .unwrap();
        match &params.transport {
            TransportParams::TcpSocket(p) => {
                assert_eq!(p.addr, "127.0.0.1");
                assert_eq!(p.port, 5555);
                assert_eq!(p.buffer_size, 4096);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn tcp_socket_allows_empty_addr() {
        let params = parse_channel_params("tcp_socket,,5555", &no_enclaves()).unwrap();
        match &params.transport {
            TransportParams::TcpSocket(p) => {
                assert!(p.addr.is_empty());
                assert_eq!(p.port, 5555);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_port() {
        let err = parse_channel_params("tcp_socket,127.0.0.1,not-a-port", &no_enclaves())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_missing_positional() {
        let err = parse_channel_params("tcp_socket,127.0.0.1", &no_enclaves()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField { field: "port", .. }
        ));
    }

    #[test]
    fn rejects_unknown_transport() {
        let err = parse_channel_params("telegraph,/dev/key", &no_enclaves()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTransport(_)));
    }

    #[test]
    fn rejects_unknown_key() {
        let err = parse_channel_params("pipe,/tmp/gl,color=red", &no_enclaves()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));
    }

    #[test]
    fn rejects_prefixed_kind_token() {
        // Token matching is exact, not prefix.
        let err = parse_channel_params("pipeline,/tmp/gl", &no_enclaves()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTransport(_)));
    }

    #[test]
    fn parses_uio_without_path() {
        let params = parse_channel_params("uio", &no_enclaves()).unwrap();
        match &params.transport {
            TransportParams::Uio(p) => {
                assert!(p.path.is_empty());
                assert_eq!(p.region, 0);
            }
            other => panic!("unexpected record: {other:?}"),
        }

        let params = parse_channel_params("uio,region=2", &no_enclaves()).unwrap();
        match &params.transport {
            TransportParams::Uio(p) => {
                assert!(p.path.is_empty());
                assert_eq!(p.region, 2);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn parses_mercury_message_ids() {
        let params = parse_channel_params("mercury,1,2,3,10,11,12,mtu=64", &no_enclaves()).unwrap();
        match &params.transport {
            TransportParams::Mercury(p) => {
                assert_eq!(p.level, 1);
                assert_eq!(p.source_id, 2);
                assert_eq!(p.destination_id, 3);
                assert_eq!(p.message_ids, vec![10, 11, 12]);
                assert_eq!(p.mtu, 64);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn mercury_message_table_is_bounded() {
        let ids: Vec<String> = (0..MERCURY_MESSAGE_TABLE_LEN + 1)
            .map(|i| i.to_string())
            .collect();
        let input = format!("mercury,1,2,3,{}", ids.join(","));
        let err = parse_channel_params(&input, &no_enclaves()).unwrap_err();
        assert!(matches!(err, ConfigError::TooManyMessageIds { .. }));
    }

    #[test]
    fn parses_ge_eth() {
        let params = parse_channel_params("ge_eth,10.0.0.2,6000,42,mtu=1000", &no_enclaves())
            .unwrap();
        match &params.transport {
            TransportParams::GeEth(p) => {
                assert_eq!(p.addr, "10.0.0.2");
                assert_eq!(p.port, 6000);
                assert_eq!(p.message_id, 42);
                assert_eq!(p.mtu, 1000);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }

    #[test]
    fn resolves_enclave_names_by_position() {
        let mut enclaves = EnclaveTable::new();
        enclaves.declare(&["foo", "baz", "bar"]).unwrap();

        let params =
            parse_channel_params("device,/dev/null,src=foo,dst=bar", &enclaves).unwrap();
        assert_eq!(params.src_enclave, 1);
        assert_eq!(params.dst_enclave, 3);
    }

    #[test]
    fn rejects_unknown_enclave() {
        let mut enclaves = EnclaveTable::new();
        enclaves.declare(&["foo"]).unwrap();

        let err = parse_channel_params("pipe,/tmp/gl,src=quux", &enclaves).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEnclave(_)));
    }

    #[test]
    fn parses_listener_and_control_flags() {
        let mut enclaves = EnclaveTable::new();
        enclaves.declare(&["foo", "bar"]).unwrap();

        let params =
            parse_channel_params("pipe,/tmp/gl,src=foo,dst=bar,listener=1", &enclaves).unwrap();
        assert!(params.listener);
        assert!(!params.control);

        let params =
            parse_channel_params("pipe,/tmp/gl,src=foo,dst=bar,control=1", &enclaves).unwrap();
        assert!(params.control);

        let err = parse_channel_params("pipe,/tmp/gl,listener=yes", &enclaves).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
