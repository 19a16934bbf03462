//! Source Stream
//!
//! The hand-off between the transport (which decodes tracks on its own
//! thread) and the signal graph (which pulls frames on the output callback).
//! Interleaved stereo samples travel through an `rtrb` SPSC ring; two atomic
//! flags let the writer pause the reader and ask it to discard what is
//! buffered (seek, track change).
//!
//! The reader never blocks: whatever the ring cannot supply is rendered as
//! silence.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

#[derive(Default)]
struct SourceFlags {
    paused: AtomicBool,
    flush: AtomicBool,
}

/// Create a connected writer / stream pair holding up to `capacity_frames`
pub fn source_channel(capacity_frames: usize) -> (SourceWriter, SourceStream) {
    let capacity = capacity_frames.max(1) * 2;
    let (producer, consumer) = RingBuffer::<f32>::new(capacity);
    let flags = Arc::new(SourceFlags::default());

    (
        SourceWriter {
            producer,
            flags: Arc::clone(&flags),
            capacity,
        },
        SourceStream { consumer, flags },
    )
}

/// Transport side of the source
pub struct SourceWriter {
    producer: Producer<f32>,
    flags: Arc<SourceFlags>,
    capacity: usize,
}

impl SourceWriter {
    /// Queue interleaved stereo samples; returns how many were taken
    ///
    /// Only whole frames are written. Nothing is written while a flush is
    /// pending, so audio queued after a seek is never discarded by it.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        if self.flush_pending() {
            return 0;
        }
        let len = (self.producer.slots().min(samples.len()) / 2) * 2;
        if len == 0 {
            return 0;
        }
        match self.producer.write_chunk_uninit(len) {
            Ok(chunk) => chunk.fill_from_iter(samples[..len].iter().copied()),
            Err(_) => 0,
        }
    }

    /// Frames that can be written right now
    pub fn free_frames(&self) -> usize {
        self.producer.slots() / 2
    }

    /// Frames written but not yet rendered
    pub fn buffered_frames(&self) -> usize {
        (self.capacity - self.producer.slots()) / 2
    }

    /// Ask the reader to drop everything currently buffered
    pub fn flush(&self) {
        self.flags.flush.store(true, Ordering::Release);
    }

    /// True until the reader has honoured the last flush
    pub fn flush_pending(&self) -> bool {
        self.flags.flush.load(Ordering::Acquire)
    }

    /// While paused the reader renders silence and keeps the buffer intact
    pub fn set_paused(&self, paused: bool) {
        self.flags.paused.store(paused, Ordering::Release);
    }
}

impl fmt::Debug for SourceWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceWriter")
            .field("capacity_frames", &(self.capacity / 2))
            .field("buffered_frames", &self.buffered_frames())
            .finish()
    }
}

/// Graph side of the source
pub struct SourceStream {
    consumer: Consumer<f32>,
    flags: Arc<SourceFlags>,
}

impl SourceStream {
    /// Fill `out` with interleaved stereo frames
    ///
    /// Returns the number of samples that came from the transport; the rest
    /// of `out` is silence.
    ///
    /// # Real-time Safety
    /// No allocations, no locks.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        if self.flags.flush.load(Ordering::Acquire) {
            let stale = self.consumer.slots();
            if let Ok(chunk) = self.consumer.read_chunk(stale) {
                chunk.commit_all();
            }
            self.flags.flush.store(false, Ordering::Release);
        }

        if self.flags.paused.load(Ordering::Acquire) {
            out.fill(0.0);
            return 0;
        }

        let to_read = (self.consumer.slots().min(out.len()) / 2) * 2;
        let mut read = 0;
        if let Ok(chunk) = self.consumer.read_chunk(to_read) {
            let (first, second) = chunk.as_slices();
            out[..first.len()].copy_from_slice(first);
            out[first.len()..first.len() + second.len()].copy_from_slice(second);
            read = first.len() + second.len();
            chunk.commit_all();
        }

        // Underrun - fill with silence
        out[read..].fill(0.0);
        read
    }
}
