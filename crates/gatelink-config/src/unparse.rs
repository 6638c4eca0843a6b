use std::fmt::Write as _;

use crate::enclave::EnclaveTable;
use crate::param::{
    ChannelParams, TransportParams, DEFAULT_MIN_TX, DEFAULT_SHMEM_BUFFER,
    DEFAULT_UDP_SHMEM_PACKET_COUNT, DEFAULT_UDP_SHMEM_PACKET_SIZE, GE_ETH_DEFAULT_MTU,
    MERCURY_DEFAULT_MTU, SERIAL_DEFAULT_BAUD, SERIAL_DEFAULT_MTU,
};

/// Render channel parameters back into the option-string grammar.
///
/// This is the left inverse of the parser modulo default elision: fields
/// holding their zero value or the documented concrete default are omitted.
/// The one exception is the device transport's `iov_len`, which is always
/// printed. Shared attributes follow the transport fields in the order
/// `src`, `dst`, `listener`, `control`.
pub fn unparse_channel_params(params: &ChannelParams, enclaves: &EnclaveTable) -> String {
    let mut out = String::new();
    match &params.transport {
        TransportParams::Invalid => out.push_str("invalid"),
        TransportParams::Device(p) => {
            let _ = write!(out, "device,{},iov_len={}", p.path, p.iov_len);
            push_nonzero(&mut out, "mtu", p.mtu, 0);
            push_nonzero(&mut out, "min_tx_size", p.min_tx, DEFAULT_MIN_TX);
        }
        TransportParams::Pipe(p) => {
            let _ = write!(out, "pipe,{}", p.path);
            push_nonzero(&mut out, "mtu", p.mtu, 0);
            push_nonzero(&mut out, "min_tx_size", p.min_tx, DEFAULT_MIN_TX);
        }
        TransportParams::UnixSocket(p) => {
            let _ = write!(out, "unix_socket,{}", p.path);
            push_nonzero(&mut out, "buffer_size", p.buffer_size, 0);
            push_nonzero(&mut out, "mtu", p.mtu, 0);
            push_nonzero(&mut out, "min_tx_size", p.min_tx, DEFAULT_MIN_TX);
        }
        TransportParams::TcpSocket(p) => {
            let _ = write!(out, "tcp_socket,{},{}", p.addr, p.port);
            push_nonzero(&mut out, "buffer_size", p.buffer_size, 0);
            push_nonzero(&mut out, "mtu", p.mtu, 0);
            push_nonzero(&mut out, "min_tx_size", p.min_tx, DEFAULT_MIN_TX);
        }
        TransportParams::UdpSocket(p) => {
            let _ = write!(out, "udp_socket,{},{}", p.addr, p.port);
            push_nonzero(&mut out, "buffer_size", p.buffer_size, 0);
            push_nonzero(&mut out, "mtu", p.mtu, 0);
        }
        TransportParams::Shmem(p) => {
            let _ = write!(out, "shmem,{}", p.path);
            push_nonzero(&mut out, "buffer_size", p.buffer_size, DEFAULT_SHMEM_BUFFER);
        }
        TransportParams::UdpShmem(p) => {
            let _ = write!(out, "udp_shmem,{}", p.path);
            push_nonzero(&mut out, "buffer_size", p.buffer_size, DEFAULT_SHMEM_BUFFER);
            push_nonzero(
                &mut out,
                "packet_size",
                p.packet_size,
                DEFAULT_UDP_SHMEM_PACKET_SIZE,
            );
            push_nonzero(
                &mut out,
                "packet_count",
                p.packet_count,
                DEFAULT_UDP_SHMEM_PACKET_COUNT,
            );
        }
        TransportParams::Uio(p) => {
            out.push_str("uio");
            if !p.path.is_empty() {
                let _ = write!(out, ",{}", p.path);
            }
            push_nonzero(&mut out, "region", u32::from(p.region), 0);
        }
        TransportParams::Serial(p) => {
            let _ = write!(out, "serial,{}", p.path);
            push_nonzero(&mut out, "baud", p.baud, SERIAL_DEFAULT_BAUD);
            push_nonzero(&mut out, "mtu", p.mtu, SERIAL_DEFAULT_MTU);
        }
        TransportParams::Mercury(p) => {
            let _ = write!(
                out,
                "mercury,{},{},{}",
                p.level, p.source_id, p.destination_id
            );
            for id in &p.message_ids {
                let _ = write!(out, ",{id}");
            }
            push_nonzero(&mut out, "mtu", p.mtu, MERCURY_DEFAULT_MTU);
        }
        TransportParams::GeEth(p) => {
            let _ = write!(out, "ge_eth,{},{},{}", p.addr, p.port, p.message_id);
            push_nonzero(&mut out, "mtu", p.mtu, GE_ETH_DEFAULT_MTU);
        }
    }

    if let Some(name) = enclaves.name(params.src_enclave) {
        let _ = write!(out, ",src={name}");
    }
    if let Some(name) = enclaves.name(params.dst_enclave) {
        let _ = write!(out, ",dst={name}");
    }
    if params.listener {
        out.push_str(",listener=1");
    }
    if params.control {
        out.push_str(",control=1");
    }

    out
}

/// Write the channel description into a caller-supplied buffer.
///
/// Follows the snprintf contract: at most `buf.len() - 1` bytes are written,
/// followed by a NUL terminator, and the return value is the number of bytes
/// the full description occupies (excluding the terminator). A return value
/// of `buf.len()` or more means the output was truncated and the caller may
/// retry with a larger buffer.
pub fn write_description(
    params: &ChannelParams,
    enclaves: &EnclaveTable,
    buf: &mut [u8],
) -> usize {
    let rendered = unparse_channel_params(params, enclaves);
    let total = rendered.len();
    if buf.is_empty() {
        return total;
    }
    let copied = total.min(buf.len() - 1);
    buf[..copied].copy_from_slice(&rendered.as_bytes()[..copied]);
    buf[copied] = 0;
    total
}

fn push_nonzero(out: &mut String, key: &str, value: u32, default: u32) {
    if value != 0 && value != default {
        let _ = write!(out, ",{key}={value}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::apply_defaults;
    use crate::parse::parse_channel_params;

    fn no_enclaves() -> EnclaveTable {
        EnclaveTable::new()
    }

    fn cstr(buf: &[u8]) -> &str {
        let end = buf.iter().position(|&b| b == 0).expect("terminator");
        std::str::from_utf8(&buf[..end]).expect("utf-8")
    }

    #[test]
    fn device_description_with_truncation() {
        let params = parse_channel_params("device,/dev/null,iov_len=0", &no_enclaves()).unwrap();

        let mut buf = [0xFFu8; 80];
        let n = write_description(&params, &no_enclaves(), &mut buf);
        assert_eq!(n, 26);
        assert_eq!(cstr(&buf), "device,/dev/null,iov_len=0");

        let mut buf = [0xFFu8; 26];
        let n = write_description(&params, &no_enclaves(), &mut buf);
        assert_eq!(n, 26);
        assert_eq!(cstr(&buf), "device,/dev/null,iov_len=");

        let mut buf = [0xFFu8; 25];
        let n = write_description(&params, &no_enclaves(), &mut buf);
        assert_eq!(n, 26);
        assert_eq!(cstr(&buf), "device,/dev/null,iov_len");
    }

    #[test]
    fn canonical_strings_roundtrip() {
        // unparse(parse(s)) == s for canonical inputs (no defaults spelled
        // out, no unknown keys).
        let canonical = [
            "device,/dev/null,iov_len=0",
            "device,/dev/zero,iov_len=4,mtu=512",
            "pipe,/tmp/gl.fifo",
            "pipe,/tmp/gl.fifo,mtu=128,min_tx_size=64",
            "unix_socket,/tmp/gl.sock,buffer_size=4096",
            "tcp_socket,127.0.0.1,5555",
            "tcp_socket,10.0.0.1,5555,buffer_size=65536,mtu=512",
            "udp_socket,127.0.0.1,5556,buffer_size=8192",
            "shmem,/glshm,buffer_size=1024",
            "udp_shmem,/glshm,buffer_size=4096,packet_size=512,packet_count=8",
            "uio",
            "uio,/dev/uio1,region=1",
            "serial,/dev/ttyUSB0,baud=115200,mtu=256",
            "mercury,1,2,3",
            "mercury,2,10,11,100,101,mtu=512",
            "ge_eth,192.168.0.7,6000,33",
            "ge_eth,192.168.0.7,6000,33,mtu=1000",
        ];
        for input in canonical {
            let params = parse_channel_params(input, &no_enclaves()).unwrap();
            assert_eq!(unparse_channel_params(&params, &no_enclaves()), input);
        }
    }

    #[test]
    fn parsed_values_roundtrip() {
        // parse(unparse(p)) == p for well-formed non-default field values.
        let inputs = [
            "pipe,/tmp/a,mtu=200,min_tx_size=100",
            "tcp_socket,10.1.1.1,7000,buffer_size=1000,mtu=700,min_tx_size=600",
            "serial,/dev/ttyS1,baud=9600,mtu=2048",
        ];
        for input in inputs {
            let params = parse_channel_params(input, &no_enclaves()).unwrap();
            let rendered = unparse_channel_params(&params, &no_enclaves());
            let reparsed = parse_channel_params(&rendered, &no_enclaves()).unwrap();
            assert_eq!(reparsed, params);
        }
    }

    #[test]
    fn shared_attributes_roundtrip() {
        let mut enclaves = EnclaveTable::new();
        enclaves.declare(&["foo", "bar"]).unwrap();

        let input = "pipe,/tmp/gl,src=foo,dst=bar,listener=1";
        let params = parse_channel_params(input, &enclaves).unwrap();
        assert_eq!(unparse_channel_params(&params, &enclaves), input);

        let input = "tcp_socket,127.0.0.1,5555,src=bar,dst=foo,control=1";
        let params = parse_channel_params(input, &enclaves).unwrap();
        assert_eq!(unparse_channel_params(&params, &enclaves), input);
    }

    #[test]
    fn applied_defaults_are_elided() {
        let mut params = parse_channel_params("tcp_socket,,5555", &no_enclaves()).unwrap();
        apply_defaults(&mut params);
        // addr was defaulted to loopback, min_tx to 512; only the address
        // shows because it is a positional field.
        assert_eq!(
            unparse_channel_params(&params, &no_enclaves()),
            "tcp_socket,127.0.0.1,5555"
        );

        let mut params = parse_channel_params("serial,/dev/ttyS0", &no_enclaves()).unwrap();
        apply_defaults(&mut params);
        assert_eq!(
            unparse_channel_params(&params, &no_enclaves()),
            "serial,/dev/ttyS0"
        );
    }

    #[test]
    fn empty_buffer_reports_required_size() {
        let params = parse_channel_params("pipe,/tmp/gl", &no_enclaves()).unwrap();
        let n = write_description(&params, &no_enclaves(), &mut []);
        assert_eq!(n, "pipe,/tmp/gl".len());
    }
}
