use std::os::fd::RawFd;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::error::{ChannelError, Result};
use crate::registry::{ChannelDesc, Registry, NUM_CHANNELS};

/// A callback bound to a listener channel, with the payload size every
/// listener on that channel agreed on at registration.
struct Listener {
    func: Box<dyn FnMut(&[u8]) + Send>,
    payload_len: usize,
}

/// Scheduler state hanging off the registry: per-channel listener lists,
/// the read-side channels `listen` polls, and the write-side control
/// channels `yield_to` routes over.
pub(crate) struct CoopState {
    listeners: [Mutex<Vec<Listener>>; NUM_CHANNELS],
    readers: Mutex<Vec<ChannelDesc>>,
    control_writers: Mutex<Vec<(usize, ChannelDesc)>>,
    poll_set: Mutex<Option<Vec<(ChannelDesc, RawFd)>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CoopState {
    pub(crate) fn new() -> Self {
        Self {
            listeners: std::array::from_fn(|_| Mutex::new(Vec::new())),
            readers: Mutex::new(Vec::new()),
            control_writers: Mutex::new(Vec::new()),
            poll_set: Mutex::new(None),
        }
    }

    pub(crate) fn add_reader(&self, cd: ChannelDesc) {
        lock(&self.readers).push(cd);
        // Channels open during startup, before the first listen; a late
        // open still lands in the next poll set build.
        *lock(&self.poll_set) = None;
    }

    pub(crate) fn add_control_writer(&self, dst_enclave: usize, cd: ChannelDesc) {
        lock(&self.control_writers).push((dst_enclave, cd));
    }
}

impl Registry {
    /// Bind a callback to a listener channel. All listeners registered on
    /// one channel must declare the same payload size.
    pub fn register_listener<F>(&self, cd: ChannelDesc, payload_len: usize, func: F) -> Result<()>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        if cd >= NUM_CHANNELS {
            return Err(ChannelError::BadDescriptor(cd));
        }
        let mut listeners = lock(&self.coop.listeners[cd]);
        if let Some(first) = listeners.first() {
            if first.payload_len != payload_len {
                return Err(ChannelError::ListenerSizeMismatch {
                    registered: first.payload_len,
                    new: payload_len,
                });
            }
        }
        listeners.push(Listener {
            func: Box::new(func),
            payload_len,
        });
        Ok(())
    }

    /// Wait for traffic on the listener and control channels.
    ///
    /// Returns once a control byte hands execution to this process, or once
    /// a pipe-flagged listener channel (both halves local) has dispatched.
    /// Traffic on ordinary listener channels is dispatched to the registered
    /// callbacks and then yielded back to the sending enclave without
    /// returning here.
    pub fn listen(&self) -> Result<()> {
        let poll_set = self.build_poll_set()?;
        if poll_set.is_empty() {
            return Ok(());
        }

        loop {
            let ready = match poll_ready(&poll_set)? {
                Some(index) => index,
                None => continue,
            };
            let (cd, _fd) = poll_set[ready];
            let params = self.channel_params(cd, gatelink_transport::Direction::Read)?;

            if params.control {
                // Consume the handoff token; execution is ours now.
                let mut token = [0u8; 1];
                let got = self.read(cd, &mut token)?;
                if got == 0 {
                    // Peer closed its control writer; surface it so the
                    // cooperative loop can unwind.
                    return Err(ChannelError::NoMessage {
                        expected: 1,
                        got: 0,
                    });
                }
                trace!(cd, "consumed control byte");
                return Ok(());
            }

            let payload_len = {
                let listeners = lock(&self.coop.listeners[cd]);
                match listeners.first() {
                    Some(first) => first.payload_len,
                    None => {
                        return Err(ChannelError::InvalidArgument(
                            "listener channel has no registered listeners",
                        ))
                    }
                }
            };

            let mut payload = vec![0u8; payload_len];
            let got = self.read(cd, &mut payload)?;
            if got != payload_len {
                return Err(ChannelError::NoMessage {
                    expected: payload_len,
                    got,
                });
            }

            {
                let mut listeners = lock(&self.coop.listeners[cd]);
                for listener in listeners.iter_mut() {
                    (listener.func)(&payload);
                }
            }
            debug!(cd, payload_len, "dispatched listeners");

            if params.pipe {
                // Both halves live here; execution stays with the caller.
                return Ok(());
            }
            self.yield_to_index(params.src_enclave)?;
        }
    }

    /// Pass execution to the named enclave by writing the one-byte handoff
    /// on the control channel targeting it.
    pub fn yield_to(&self, enclave: &str) -> Result<()> {
        let index = self
            .resolve_enclave(enclave)
            .ok_or_else(|| ChannelError::NoControlChannel {
                enclave: enclave.to_string(),
            })?;
        self.yield_to_index(index)
    }

    fn yield_to_index(&self, enclave: usize) -> Result<()> {
        let cd = {
            let writers = lock(&self.coop.control_writers);
            match writers.iter().find(|(dst, _)| *dst == enclave) {
                Some(&(_, cd)) => cd,
                // With a single control writer the destination is
                // unambiguous regardless of its label.
                None if writers.len() == 1 => writers[0].1,
                None => {
                    return Err(ChannelError::NoControlChannel {
                        enclave: format!("#{enclave}"),
                    })
                }
            }
        };
        let written = self.write(cd, &[0u8])?;
        if written != 1 {
            return Err(ChannelError::Transport(
                gatelink_transport::TransportError::Closed,
            ));
        }
        trace!(cd, enclave, "yielded control");
        Ok(())
    }

    fn build_poll_set(&self) -> Result<Vec<(ChannelDesc, RawFd)>> {
        let mut cached = lock(&self.coop.poll_set);
        if let Some(set) = cached.as_ref() {
            return Ok(set.clone());
        }
        let readers = lock(&self.coop.readers).clone();
        let mut set = Vec::with_capacity(readers.len());
        for cd in readers {
            set.push((cd, self.raw_fd(cd)?));
        }
        *cached = Some(set.clone());
        Ok(set)
    }
}

/// Block in poll(2) until a descriptor is readable; return the lowest ready
/// index. `None` means a spurious wakeup with nothing consumable.
fn poll_ready(poll_set: &[(ChannelDesc, RawFd)]) -> Result<Option<usize>> {
    let mut fds: Vec<libc::pollfd> = poll_set
        .iter()
        .map(|&(_, fd)| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    // SAFETY: `fds` is a valid array of initialized pollfd for its length;
    // an infinite timeout blocks until at least one descriptor is ready.
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
    if rc < 0 {
        return Err(ChannelError::from(std::io::Error::last_os_error()));
    }
    // A hangup counts as readable so that a closed peer surfaces as a short
    // read instead of a silent spin.
    Ok(fds
        .iter()
        .position(|fd| fd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::registry::Registry;
    use gatelink_transport::Direction;

    #[test]
    fn listener_size_mismatch_is_rejected() {
        let registry = Registry::new();
        registry.register_listener(0, 4, |_| {}).unwrap();
        registry.register_listener(0, 4, |_| {}).unwrap();
        let err = registry.register_listener(0, 8, |_| {}).unwrap_err();
        assert!(matches!(
            err,
            ChannelError::ListenerSizeMismatch {
                registered: 4,
                new: 8
            }
        ));
    }

    #[test]
    fn out_of_range_descriptor_is_rejected() {
        let registry = Registry::new();
        let err = registry.register_listener(NUM_CHANNELS, 4, |_| {}).unwrap_err();
        assert!(matches!(err, ChannelError::BadDescriptor(_)));
    }

    #[test]
    fn listen_without_channels_returns_immediately() {
        let registry = Registry::new();
        registry.listen().unwrap();
    }

    #[test]
    fn pipe_flagged_listener_keeps_execution() {
        let registry = Registry::new();
        registry.declare_enclaves(&["solo"]).unwrap();

        let params = registry
            .parse("pipe,unused,src=solo,dst=solo,listener=1,min_tx_size=1")
            .unwrap();
        let cd = registry.open_pair(&params, Direction::ReadWrite).unwrap();

        let seen = Arc::new(AtomicU32::new(0));
        let sink = Arc::clone(&seen);
        registry
            .register_listener(cd, 4, move |payload| {
                let value = u32::from_le_bytes(payload.try_into().expect("4 bytes"));
                sink.store(value, Ordering::SeqCst);
            })
            .unwrap();

        registry.write(cd, &0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        registry.listen().unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 0xDEAD_BEEF);
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let registry = Registry::new();
        registry.declare_enclaves(&["solo"]).unwrap();

        let params = registry
            .parse("pipe,unused,src=solo,dst=solo,listener=1,min_tx_size=1")
            .unwrap();
        let cd = registry.open_pair(&params, Direction::ReadWrite).unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry
                .register_listener(cd, 4, move |_| {
                    order.lock().unwrap().push(tag);
                })
                .unwrap();
        }

        registry.write(cd, &1u32.to_le_bytes()).unwrap();
        registry.listen().unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn yield_without_control_channel_fails() {
        let registry = Registry::new();
        registry.declare_enclaves(&["foo", "bar"]).unwrap();
        let err = registry.yield_to("bar").unwrap_err();
        assert!(matches!(err, ChannelError::NoControlChannel { .. }));
    }

    #[test]
    fn yield_to_unknown_enclave_fails() {
        let registry = Registry::new();
        registry.declare_enclaves(&["foo"]).unwrap();
        let err = registry.yield_to("nobody").unwrap_err();
        assert!(matches!(err, ChannelError::NoControlChannel { .. }));
    }
}
