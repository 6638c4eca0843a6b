//! Process-shared single-producer single-consumer byte ring.
//!
//! Overlaid on a shared mapping (POSIX shared memory or a userspace-I/O
//! region). Exactly one reader and one writer may be attached; positions are
//! free-running 64-bit counters so wraparound arithmetic stays simple.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Stamp written once the header is initialized.
const RING_MAGIC: u32 = 0x6c_69_6e_6b; // "link"

/// Backoff while the ring is empty (reader) or full (writer).
const SPIN_SLEEP: Duration = Duration::from_micros(100);

#[repr(C)]
struct RingHeader {
    magic: AtomicU32,
    writer_closed: AtomicU32,
    capacity: AtomicU64,
    write_pos: AtomicU64,
    read_pos: AtomicU64,
}

/// Bytes the header occupies at the front of the mapping.
pub const HEADER_SIZE: usize = std::mem::size_of::<RingHeader>();

/// A view over a shared mapping laid out as `RingHeader` + data bytes.
///
/// The mapping is owned by the transport context that created it; `Ring`
/// itself never maps or unmaps.
pub struct Ring {
    base: *mut u8,
    capacity: usize,
}

// One half (reader or writer) lives in each channel context and contexts may
// move between threads; the shared state is only touched through atomics.
unsafe impl Send for Ring {}

impl Ring {
    /// Attach to a mapping of `map_len` bytes at `base`.
    ///
    /// The first attacher initializes the header; later attachers validate
    /// the capacity against their own view of the mapping.
    ///
    /// # Safety
    ///
    /// `base` must point to a live shared mapping of at least `map_len`
    /// bytes that outlives the returned `Ring`, and at most one reader and
    /// one writer may attach to the same mapping.
    pub unsafe fn attach(base: *mut u8, map_len: usize) -> std::io::Result<Self> {
        if map_len <= HEADER_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "mapping too small for ring header",
            ));
        }
        let capacity = map_len - HEADER_SIZE;
        let ring = Ring {
            base: base.cast::<u8>(),
            capacity,
        };
        let header = ring.header();
        if header
            .magic
            .compare_exchange(0, RING_MAGIC, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            header.capacity.store(capacity as u64, Ordering::Release);
            header.write_pos.store(0, Ordering::Release);
            header.read_pos.store(0, Ordering::Release);
            header.writer_closed.store(0, Ordering::Release);
        } else {
            // Another attacher won the race; wait for its initialization.
            while header.capacity.load(Ordering::Acquire) == 0 {
                std::thread::sleep(SPIN_SLEEP);
            }
            if header.capacity.load(Ordering::Acquire) != capacity as u64 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "ring capacity mismatch between attachers",
                ));
            }
        }
        Ok(ring)
    }

    fn header(&self) -> &RingHeader {
        // SAFETY: `base` points to a mapping at least HEADER_SIZE bytes long
        // (checked in attach) and the header is only accessed via atomics.
        unsafe { &*self.base.cast::<RingHeader>() }
    }

    fn data_ptr(&self) -> *mut u8 {
        // SAFETY: in-bounds offset within the mapping.
        unsafe { self.base.add(HEADER_SIZE) }
    }

    /// Blocking read of up to `buf.len()` bytes. Returns 0 once the writer
    /// has closed and the ring is drained.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let header = self.header();
        loop {
            let write = header.write_pos.load(Ordering::Acquire);
            let read = header.read_pos.load(Ordering::Acquire);
            let available = (write - read) as usize;
            if available == 0 {
                if header.writer_closed.load(Ordering::Acquire) != 0 {
                    return 0;
                }
                std::thread::sleep(SPIN_SLEEP);
                continue;
            }
            let count = available.min(buf.len());
            self.copy_out(read, &mut buf[..count]);
            header.read_pos.store(read + count as u64, Ordering::Release);
            return count;
        }
    }

    /// Blocking write of all of `buf`.
    pub fn write(&self, buf: &[u8]) -> usize {
        let header = self.header();
        let mut offset = 0usize;
        while offset < buf.len() {
            let write = header.write_pos.load(Ordering::Acquire);
            let read = header.read_pos.load(Ordering::Acquire);
            let space = self.capacity - (write - read) as usize;
            if space == 0 {
                std::thread::sleep(SPIN_SLEEP);
                continue;
            }
            let count = space.min(buf.len() - offset);
            self.copy_in(write, &buf[offset..offset + count]);
            header.write_pos.store(write + count as u64, Ordering::Release);
            offset += count;
        }
        buf.len()
    }

    /// Signal EOF to the reader.
    pub fn close_writer(&self) {
        self.header().writer_closed.store(1, Ordering::Release);
    }

    fn copy_in(&self, pos: u64, src: &[u8]) {
        let start = (pos as usize) % self.capacity;
        let first = src.len().min(self.capacity - start);
        // SAFETY: both ranges are within the data area; the SPSC discipline
        // guarantees the writer owns [write_pos, write_pos + space).
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.data_ptr().add(start), first);
            if first < src.len() {
                std::ptr::copy_nonoverlapping(
                    src.as_ptr().add(first),
                    self.data_ptr(),
                    src.len() - first,
                );
            }
        }
    }

    fn copy_out(&self, pos: u64, dst: &mut [u8]) {
        let start = (pos as usize) % self.capacity;
        let first = dst.len().min(self.capacity - start);
        // SAFETY: both ranges are within the data area; the SPSC discipline
        // guarantees the reader owns [read_pos, read_pos + available).
        unsafe {
            std::ptr::copy_nonoverlapping(self.data_ptr().add(start), dst.as_mut_ptr(), first);
            if first < dst.len() {
                std::ptr::copy_nonoverlapping(
                    self.data_ptr(),
                    dst.as_mut_ptr().add(first),
                    dst.len() - first,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mapping {
        buf: Vec<u8>,
    }

    impl Mapping {
        fn new(len: usize) -> Self {
            Self { buf: vec![0; len] }
        }

        fn ring(&mut self) -> Ring {
            // SAFETY: the vec outlives the rings in each test and each test
            // attaches one reader and one writer view.
            unsafe { Ring::attach(self.buf.as_mut_ptr(), self.buf.len()).unwrap() }
        }
    }

    #[test]
    fn roundtrip_within_capacity() {
        let mut mapping = Mapping::new(HEADER_SIZE + 64);
        let writer = mapping.ring();
        let reader = unsafe {
            Ring::attach(mapping.buf.as_mut_ptr(), mapping.buf.len()).unwrap()
        };

        assert_eq!(writer.write(b"ring data"), 9);
        let mut buf = [0u8; 9];
        assert_eq!(reader.read(&mut buf), 9);
        assert_eq!(&buf, b"ring data");
    }

    #[test]
    fn wraparound_preserves_bytes() {
        let mut mapping = Mapping::new(HEADER_SIZE + 16);
        let writer = mapping.ring();
        let reader = unsafe {
            Ring::attach(mapping.buf.as_mut_ptr(), mapping.buf.len()).unwrap()
        };

        // Drive the positions past the capacity boundary repeatedly; an
        // 11-byte message in a 16-byte ring wraps on most rounds.
        for round in 0u8..10 {
            let payload = [round; 11];
            assert_eq!(writer.write(&payload), 11);
            let mut buf = [0u8; 11];
            let mut got = 0;
            while got < buf.len() {
                got += reader.read(&mut buf[got..]);
            }
            assert_eq!(buf, payload);
        }
    }

    #[test]
    fn closed_writer_yields_eof_after_drain() {
        let mut mapping = Mapping::new(HEADER_SIZE + 32);
        let writer = mapping.ring();
        let reader = unsafe {
            Ring::attach(mapping.buf.as_mut_ptr(), mapping.buf.len()).unwrap()
        };

        writer.write(b"tail");
        writer.close_writer();

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf), 4);
        assert_eq!(reader.read(&mut buf), 0);
    }

    #[test]
    fn undersized_mapping_is_rejected() {
        let mut buf = vec![0u8; HEADER_SIZE];
        let err = unsafe { Ring::attach(buf.as_mut_ptr(), buf.len()) }.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}
