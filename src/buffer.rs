//! Double-buffered BCM signal store.
//!
//! Two equally sized word buffers and a single flip flag. The encoder
//! thread owns the [`BcmWriter`] half: it fills whichever buffer the flag
//! does *not* point at, then publishes by flipping the flag. The render
//! thread owns the [`BcmReader`] half: it keeps reading its local buffer
//! and re-checks the flag only when asked, which the render loop does at
//! bit-plane boundaries. That is the entire synchronization protocol — no
//! mutex, no blocking, no allocation after construction.
//!
//! # Safety
//! The writer only dereferences the back buffer and the reader only the
//! buffer it last observed as front. A publish hands the old back buffer to
//! the reader and reclaims the buffer the reader is migrating off of; the
//! reader is expected to observe the flip within one bit plane, before the
//! encoder can finish producing another whole frame into that buffer.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Shared {
    buffers: [UnsafeCell<Box<[u32]>>; 2],
    /// Index of the buffer the render loop should display.
    front: AtomicBool,
}

// Manual split of responsibilities between exactly one writer and one
// reader; see module docs.
unsafe impl Sync for Shared {}
unsafe impl Send for Shared {}

/// Allocate both signal buffers (zeroed) and split them into the
/// single-producer / single-consumer handle pair.
pub fn bcm_buffers(len: usize) -> (BcmWriter, BcmReader) {
    let shared = Arc::new(Shared {
        buffers: [
            UnsafeCell::new(vec![0u32; len].into_boxed_slice()),
            UnsafeCell::new(vec![0u32; len].into_boxed_slice()),
        ],
        front: AtomicBool::new(false),
    });
    (
        BcmWriter {
            shared: Arc::clone(&shared),
        },
        BcmReader {
            shared,
            current: false,
        },
    )
}

/// Encoder-side handle: fill the back buffer, then publish.
pub struct BcmWriter {
    shared: Arc<Shared>,
}

impl BcmWriter {
    /// The buffer not currently on display. The `&mut self` borrow keeps
    /// the slice from outliving a publish.
    pub fn back(&mut self) -> &mut [u32] {
        let front = self.shared.front.load(Ordering::Relaxed);
        let idx = usize::from(!front);
        unsafe { &mut *self.shared.buffers[idx].get() }
    }

    /// Make the back buffer the front buffer. The render loop picks the
    /// change up at its next bit-plane boundary.
    pub fn publish(&mut self) {
        self.shared.front.fetch_xor(true, Ordering::Release);
    }
}

/// Render-side handle: read the front buffer, swap only when told.
pub struct BcmReader {
    shared: Arc<Shared>,
    current: bool,
}

impl BcmReader {
    /// Re-check the flip flag; returns whether the front buffer changed.
    /// Call only at bit-plane boundaries, never mid-row.
    #[inline]
    pub fn refresh(&mut self) -> bool {
        let front = self.shared.front.load(Ordering::Acquire);
        let swapped = front != self.current;
        self.current = front;
        swapped
    }

    /// The buffer observed as front at the last [`refresh`](Self::refresh).
    #[inline]
    pub fn front(&self) -> &[u32] {
        let idx = usize::from(self.current);
        unsafe { &*self.shared.buffers[idx].get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn reader_sees_nothing_until_publish() {
        let (mut writer, mut reader) = bcm_buffers(16);
        writer.back().fill(0xdead);
        assert!(!reader.refresh());
        assert!(reader.front().iter().all(|&w| w == 0));
        writer.publish();
        assert!(reader.refresh());
        assert!(reader.front().iter().all(|&w| w == 0xdead));
    }

    #[test]
    fn swap_is_observed_exactly_once_per_publish() {
        let (mut writer, mut reader) = bcm_buffers(4);
        writer.publish();
        assert!(reader.refresh());
        assert!(!reader.refresh());
        assert!(!reader.refresh());
        writer.publish();
        assert!(reader.refresh());
    }

    #[test]
    fn writer_alternates_buffers() {
        let (mut writer, mut reader) = bcm_buffers(1);
        writer.back()[0] = 1;
        writer.publish();
        writer.back()[0] = 2;
        writer.publish();
        reader.refresh();
        // Two publishes: front is back to buffer 0, holding the first frame.
        assert_eq!(reader.front()[0], 1);
    }

    /// Frames are numbered and every word of a frame carries its number; a
    /// torn read would show mixed numbers inside one refresh window. The
    /// producer honors the protocol's pacing contract: it starts a new
    /// frame only after the consumer has migrated off the buffer it is
    /// about to overwrite.
    #[test]
    fn interleaved_writes_never_tear() {
        use std::sync::atomic::AtomicU32;

        const LEN: usize = 1024;
        const FRAMES: u32 = 500;
        let (mut writer, mut reader) = bcm_buffers(LEN);
        let consumed = Arc::new(AtomicU32::new(0));

        let acked = Arc::clone(&consumed);
        let producer = thread::spawn(move || {
            for frame in 1..=FRAMES {
                writer.back().fill(frame);
                writer.publish();
                while acked.load(Ordering::Acquire) < frame {
                    thread::yield_now();
                }
            }
        });

        let mut last = 0;
        while last < FRAMES {
            if reader.refresh() {
                let words = reader.front();
                let first = words[0];
                assert!(words.iter().all(|&w| w == first), "torn frame");
                assert_eq!(first, last + 1, "swap observed more than once");
                last = first;
                consumed.store(last, Ordering::Release);
            }
        }
        producer.join().unwrap();
    }
}
