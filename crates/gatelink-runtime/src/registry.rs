use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use gatelink_config::{
    apply_defaults, parse_channel_params, unparse_channel_params, write_description,
    ChannelParams, EnclaveTable, TransportKind,
};
use gatelink_transport::{Direction, TransportCtx};
use tracing::{debug, info};

use crate::coop::CoopState;
use crate::error::{ChannelError, Result};

/// Registry capacity: channels a process may hold open at once.
pub const NUM_CHANNELS: usize = 16;

/// Caller-facing channel name: a small index into the registry.
pub type ChannelDesc = usize;

struct Channel {
    params: ChannelParams,
    ctx: Option<TransportCtx>,
}

#[derive(Default)]
struct Slot {
    reader: Option<Channel>,
    writer: Option<Channel>,
}

impl Slot {
    fn half_mut(&mut self, dir: Direction) -> Option<&mut Option<Channel>> {
        match dir {
            Direction::Read => Some(&mut self.reader),
            Direction::Write => Some(&mut self.writer),
            Direction::ReadWrite => None,
        }
    }
}

/// The channel table and everything that hangs off it.
///
/// One `Registry` per process in normal use: cooperating processes must
/// open their shared channels in the same order so that equal descriptors
/// name the same transport on both sides. Descriptors come from a single
/// monotonic counter and are never reused.
pub struct Registry {
    slots: [Mutex<Slot>; NUM_CHANNELS],
    next_cd: AtomicUsize,
    enclaves: Mutex<EnclaveTable>,
    pub(crate) coop: CoopState,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new(Slot::default())),
            next_cd: AtomicUsize::new(0),
            enclaves: Mutex::new(EnclaveTable::new()),
            coop: CoopState::new(),
        }
    }

    /// Register the ordered enclave names. Must happen before parsing any
    /// option string that uses `src=`/`dst=`.
    pub fn declare_enclaves<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        lock(&self.enclaves).declare(names)?;
        Ok(())
    }

    /// Resolve an enclave name to its 1-based index.
    pub fn resolve_enclave(&self, name: &str) -> Option<usize> {
        lock(&self.enclaves).resolve(name)
    }

    /// Parse an option string against this registry's enclave table.
    pub fn parse(&self, input: &str) -> Result<ChannelParams> {
        Ok(parse_channel_params(input, &lock(&self.enclaves))?)
    }

    /// Render parameters back into the option grammar.
    pub fn unparse(&self, params: &ChannelParams) -> String {
        unparse_channel_params(params, &lock(&self.enclaves))
    }

    /// Write the description of an open channel into `buf` using the
    /// snprintf truncation contract.
    pub fn describe(&self, cd: ChannelDesc, buf: &mut [u8]) -> Result<usize> {
        let params = self.params_any_half(cd)?;
        Ok(write_description(&params, &lock(&self.enclaves), buf))
    }

    /// Open one endpoint described by `params`. Returns the next descriptor.
    pub fn open_param(&self, params: &ChannelParams, dir: Direction) -> Result<ChannelDesc> {
        if matches!(dir, Direction::ReadWrite) {
            return Err(ChannelError::InvalidDirection);
        }
        let prepared = self.prepare(params)?;

        if self.next_cd.load(Ordering::Relaxed) >= NUM_CHANNELS {
            return Err(ChannelError::TooManyChannels {
                capacity: NUM_CHANNELS,
            });
        }

        let ctx = TransportCtx::open(&prepared, dir)?;
        let cd = match self.allocate() {
            Ok(cd) => cd,
            Err(err) => {
                // The table filled up between the early check and
                // allocation; release the freshly opened endpoint.
                let mut ctx = ctx;
                let _ = ctx.close();
                return Err(err);
            }
        };

        {
            let mut slot = lock(&self.slots[cd]);
            let channel = Channel {
                params: prepared.clone(),
                ctx: Some(ctx),
            };
            match dir {
                Direction::Read => slot.reader = Some(channel),
                Direction::Write => slot.writer = Some(channel),
                Direction::ReadWrite => unreachable!("direction validated above"),
            }
        }

        self.register_coop(cd, dir, &prepared);
        info!(cd, kind = %prepared.kind(), %dir, "opened channel");
        Ok(cd)
    }

    /// Convenience: parse then open.
    pub fn open_parse(&self, input: &str, dir: Direction) -> Result<ChannelDesc> {
        let params = self.parse(input)?;
        self.open_param(&params, dir)
    }

    /// Open both halves of a channel in this process, sharing one
    /// descriptor. Only transports whose symmetric open cannot deadlock
    /// support this; others answer `not-implemented`.
    pub fn open_pair(&self, params: &ChannelParams, dir: Direction) -> Result<ChannelDesc> {
        if !matches!(dir, Direction::ReadWrite) {
            return Err(ChannelError::InvalidDirection);
        }
        let kind = params.kind();
        if !supports_pair_open(kind) {
            return Err(ChannelError::Transport(
                gatelink_transport::TransportError::NotImplemented { kind },
            ));
        }
        let mut prepared = self.prepare(params)?;
        prepared.pipe = true;

        if self.next_cd.load(Ordering::Relaxed) >= NUM_CHANNELS {
            return Err(ChannelError::TooManyChannels {
                capacity: NUM_CHANNELS,
            });
        }

        let (reader_ctx, writer_ctx) = if kind == TransportKind::Pipe {
            TransportCtx::open_anonymous_pair(&prepared)?
        } else {
            // Rendezvous transports need both sides in flight at once.
            let reader_params = prepared.clone();
            let writer_params = prepared.clone();
            std::thread::scope(|scope| {
                let reader = scope.spawn(|| TransportCtx::open(&reader_params, Direction::Read));
                let writer = scope.spawn(|| TransportCtx::open(&writer_params, Direction::Write));
                let reader = reader.join().expect("reader open thread panicked");
                let writer = writer.join().expect("writer open thread panicked");
                match (reader, writer) {
                    (Ok(r), Ok(w)) => Ok((r, w)),
                    (Err(e), Ok(mut w)) => {
                        let _ = w.close();
                        Err(e)
                    }
                    (Ok(mut r), Err(e)) => {
                        let _ = r.close();
                        Err(e)
                    }
                    (Err(e), Err(_)) => Err(e),
                }
            })?
        };

        let cd = match self.allocate() {
            Ok(cd) => cd,
            Err(err) => {
                let mut reader_ctx = reader_ctx;
                let mut writer_ctx = writer_ctx;
                let _ = reader_ctx.close();
                let _ = writer_ctx.close();
                return Err(err);
            }
        };

        {
            let mut slot = lock(&self.slots[cd]);
            slot.reader = Some(Channel {
                params: prepared.clone(),
                ctx: Some(reader_ctx),
            });
            slot.writer = Some(Channel {
                params: prepared.clone(),
                ctx: Some(writer_ctx),
            });
        }

        self.register_coop(cd, Direction::Read, &prepared);
        self.register_coop(cd, Direction::Write, &prepared);
        info!(cd, kind = %prepared.kind(), "opened channel pair");
        Ok(cd)
    }

    /// Copy of the stored parameters for one half of a channel.
    pub fn channel_params(&self, cd: ChannelDesc, dir: Direction) -> Result<ChannelParams> {
        let mut slot = self.slot(cd)?;
        let half = slot.half_mut(dir).ok_or(ChannelError::InvalidDirection)?;
        half.as_ref()
            .map(|ch| ch.params.clone())
            .ok_or(ChannelError::NoDevice)
    }

    /// Underlying file descriptor, when the transport has one. The read
    /// half is preferred when both halves share the slot.
    pub fn raw_fd(&self, cd: ChannelDesc) -> Result<RawFd> {
        let slot = self.slot(cd)?;
        let channel = slot
            .reader
            .as_ref()
            .or(slot.writer.as_ref())
            .ok_or(ChannelError::NoDevice)?;
        let ctx = channel.ctx.as_ref().ok_or(ChannelError::NoDevice)?;
        Ok(ctx.raw_fd()?)
    }

    /// Read up to `buf.len()` bytes from the channel's read half.
    pub fn read(&self, cd: ChannelDesc, buf: &mut [u8]) -> Result<usize> {
        let mut slot = self.slot(cd)?;
        let channel = slot.reader.as_mut().ok_or(ChannelError::NoDevice)?;
        let ctx = channel.ctx.as_mut().ok_or(ChannelError::NoDevice)?;
        Ok(ctx.read(buf)?)
    }

    /// Write `buf` to the channel's write half.
    pub fn write(&self, cd: ChannelDesc, buf: &[u8]) -> Result<usize> {
        let mut slot = self.slot(cd)?;
        let channel = slot.writer.as_mut().ok_or(ChannelError::NoDevice)?;
        let ctx = channel.ctx.as_mut().ok_or(ChannelError::NoDevice)?;
        Ok(ctx.write(buf)?)
    }

    /// Close one half of a channel. Descriptors are never reused; a second
    /// close reports `no-device` and leaves neighbors untouched.
    pub fn close(&self, cd: ChannelDesc, dir: Direction) -> Result<()> {
        let mut slot = self.slot(cd)?;
        let half = slot.half_mut(dir).ok_or(ChannelError::InvalidDirection)?;
        let channel = half.as_mut().ok_or(ChannelError::NoDevice)?;
        match channel.ctx.take() {
            Some(mut ctx) => {
                ctx.close()?;
                debug!(cd, %dir, "closed channel");
                Ok(())
            }
            None => Err(ChannelError::NoDevice),
        }
    }

    /// Number of descriptors handed out so far.
    pub fn open_count(&self) -> usize {
        self.next_cd.load(Ordering::Relaxed).min(NUM_CHANNELS)
    }

    fn slot(&self, cd: ChannelDesc) -> Result<MutexGuard<'_, Slot>> {
        let mutex = self
            .slots
            .get(cd)
            .ok_or(ChannelError::BadDescriptor(cd))?;
        Ok(lock(mutex))
    }

    fn params_any_half(&self, cd: ChannelDesc) -> Result<ChannelParams> {
        let slot = self.slot(cd)?;
        slot.reader
            .as_ref()
            .or(slot.writer.as_ref())
            .map(|ch| ch.params.clone())
            .ok_or(ChannelError::NoDevice)
    }

    /// Validate shared attributes and stamp driver defaults.
    fn prepare(&self, params: &ChannelParams) -> Result<ChannelParams> {
        if params.listener && params.control {
            return Err(ChannelError::InvalidArgument(
                "listener and control flags are mutually exclusive",
            ));
        }
        if (params.listener || params.control)
            && (params.src_enclave == 0 || params.dst_enclave == 0)
        {
            return Err(ChannelError::InvalidArgument(
                "listener and control channels require src and dst enclaves",
            ));
        }
        let mut prepared = params.clone();
        apply_defaults(&mut prepared);
        Ok(prepared)
    }

    fn allocate(&self) -> Result<ChannelDesc> {
        let cd = self.next_cd.fetch_add(1, Ordering::Relaxed);
        if cd >= NUM_CHANNELS {
            return Err(ChannelError::TooManyChannels {
                capacity: NUM_CHANNELS,
            });
        }
        Ok(cd)
    }

    fn register_coop(&self, cd: ChannelDesc, dir: Direction, params: &ChannelParams) {
        match dir {
            Direction::Read if params.listener || params.control => {
                self.coop.add_reader(cd);
            }
            Direction::Write if params.control => {
                self.coop.add_control_writer(params.dst_enclave, cd);
            }
            _ => {}
        }
    }
}

/// Whether a transport kind supports `open_pair` (its symmetric open is
/// deadlock-free).
pub fn supports_pair_open(kind: TransportKind) -> bool {
    TransportCtx::pair_supported(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn null_writer_params(registry: &Registry) -> ChannelParams {
        registry.parse("device,/dev/null,iov_len=0").expect("parse")
    }

    #[test]
    fn descriptors_are_allocated_monotonically() {
        let registry = Registry::new();
        let params = null_writer_params(&registry);
        for expected in 0..4usize {
            let cd = registry.open_param(&params, Direction::Write).expect("open");
            assert_eq!(cd, expected);
        }
    }

    #[test]
    fn exhaustion_fails_last_open_and_keeps_the_rest_usable() {
        let registry = Registry::new();
        let params = null_writer_params(&registry);
        let mut opened = Vec::new();
        for _ in 0..NUM_CHANNELS {
            opened.push(registry.open_param(&params, Direction::Write).expect("open"));
        }

        let err = registry.open_param(&params, Direction::Write).unwrap_err();
        assert!(matches!(err, ChannelError::TooManyChannels { .. }));

        for cd in opened {
            assert_eq!(registry.write(cd, b"still usable").expect("write"), 12);
        }
    }

    #[test]
    fn double_close_reports_no_device_without_corrupting_neighbors() {
        let registry = Registry::new();
        let params = null_writer_params(&registry);
        let first = registry.open_param(&params, Direction::Write).expect("open");
        let second = registry.open_param(&params, Direction::Write).expect("open");

        registry.close(first, Direction::Write).expect("first close");
        let err = registry.close(first, Direction::Write).unwrap_err();
        assert!(matches!(err, ChannelError::NoDevice));

        assert_eq!(registry.write(second, b"ok").expect("write"), 2);
    }

    #[test]
    fn read_write_direction_is_invalid_for_plain_open() {
        let registry = Registry::new();
        let params = null_writer_params(&registry);
        let err = registry
            .open_param(&params, Direction::ReadWrite)
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidDirection));
    }

    #[test]
    fn pair_open_is_not_implemented_for_asymmetric_transports() {
        let registry = Registry::new();
        let params = null_writer_params(&registry);
        let err = registry
            .open_pair(&params, Direction::ReadWrite)
            .unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Transport(gatelink_transport::TransportError::NotImplemented { .. })
        ));
    }

    #[test]
    fn pair_open_requires_read_write() {
        let registry = Registry::new();
        let params = registry.parse("pipe,/tmp/never-touched").expect("parse");
        let err = registry.open_pair(&params, Direction::Read).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidDirection));
    }

    #[test]
    fn listener_without_enclaves_is_rejected() {
        let registry = Registry::new();
        let mut params = null_writer_params(&registry);
        params.listener = true;
        let err = registry.open_param(&params, Direction::Read).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidArgument(_)));
    }

    #[test]
    fn listener_and_control_are_mutually_exclusive() {
        let registry = Registry::new();
        registry.declare_enclaves(&["a", "b"]).expect("declare");
        let mut params = null_writer_params(&registry);
        params.listener = true;
        params.control = true;
        params.src_enclave = 1;
        params.dst_enclave = 2;
        let err = registry.open_param(&params, Direction::Read).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidArgument(_)));
    }

    #[test]
    fn operations_on_unopened_descriptors_fail() {
        let registry = Registry::new();
        let mut buf = [0u8; 4];
        assert!(matches!(
            registry.read(0, &mut buf).unwrap_err(),
            ChannelError::NoDevice
        ));
        assert!(matches!(
            registry.write(0, &buf).unwrap_err(),
            ChannelError::NoDevice
        ));
        assert!(matches!(
            registry.close(0, Direction::Read).unwrap_err(),
            ChannelError::NoDevice
        ));
        assert!(matches!(
            registry.read(NUM_CHANNELS, &mut buf).unwrap_err(),
            ChannelError::BadDescriptor(_)
        ));
    }

    #[test]
    fn failed_open_leaves_no_descriptor_allocated() {
        let registry = Registry::new();
        let params = registry
            .parse("device,/dev/gatelink-missing,iov_len=0")
            .expect("parse");
        assert!(registry.open_param(&params, Direction::Read).is_err());
        assert_eq!(registry.open_count(), 0);

        let ok = registry
            .open_param(&null_writer_params(&registry), Direction::Write)
            .expect("open");
        assert_eq!(ok, 0);
    }

    #[test]
    fn description_matches_canonical_form() {
        let registry = Registry::new();
        let cd = registry
            .open_parse("device,/dev/null,iov_len=0", Direction::Write)
            .expect("open");

        let mut buf = [0u8; 256];
        let n = registry.describe(cd, &mut buf).expect("describe");
        assert_eq!(n, 26);
        assert_eq!(&buf[..n], b"device,/dev/null,iov_len=0");
    }

    #[test]
    fn stored_params_reflect_applied_defaults() {
        let registry = Registry::new();
        let cd = registry
            .open_parse("device,/dev/null,iov_len=0", Direction::Write)
            .expect("open");
        let params = registry
            .channel_params(cd, Direction::Write)
            .expect("params");
        match &params.transport {
            gatelink_config::TransportParams::Device(p) => {
                assert_eq!(p.min_tx, gatelink_config::DEFAULT_MIN_TX);
            }
            other => panic!("unexpected record: {other:?}"),
        }
        // The reader half was never opened.
        assert!(matches!(
            registry.channel_params(cd, Direction::Read).unwrap_err(),
            ChannelError::NoDevice
        ));
    }

    #[test]
    fn enclave_declaration_is_bounded_and_single_shot() {
        let registry = Registry::new();
        let too_many: Vec<String> = (0..EnclaveTable::CAPACITY + 1)
            .map(|i| format!("e{i}"))
            .collect();
        let err = registry.declare_enclaves(&too_many).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Config(gatelink_config::ConfigError::TooManyEnclaves { .. })
        ));

        registry.declare_enclaves(&["foo", "baz", "bar"]).expect("declare");
        let params = registry
            .parse("device,/dev/null,src=foo,dst=bar")
            .expect("parse");
        assert_eq!(params.src_enclave, 1);
        assert_eq!(params.dst_enclave, 3);
    }
}
