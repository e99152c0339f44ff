//! Bounded lock-free frame queue
//!
//! Single producer (the audio thread), single consumer (the renderer).
//! Push is non-blocking: a full queue drops the offered frame. A consumer
//! that observes a frame observes all writes the producer made before the
//! push that enqueued it (release/acquire through the ring).

use rtrb::{Consumer, Producer, PushError, RingBuffer};

use vz_dsp::Frame;

/// Create a queue of fixed `capacity`, returning the producer and consumer
/// halves.
pub fn frame_queue(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    (
        FrameProducer {
            producer,
            capacity: capacity.max(1),
        },
        FrameConsumer { consumer },
    )
}

/// Audio-thread half.
pub struct FrameProducer {
    producer: Producer<Frame>,
    capacity: usize,
}

impl FrameProducer {
    /// Enqueue a finished frame. Returns `false` when the queue is full;
    /// the frame is dropped and the audio thread continues unblocked.
    #[inline]
    pub fn push(&mut self, frame: Frame) -> bool {
        match self.producer.push(frame) {
            Ok(()) => true,
            Err(PushError::Full(_)) => false,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Racy occupancy estimate, for diagnostics only.
    #[inline]
    pub fn approx_len(&self) -> usize {
        self.capacity - self.producer.slots()
    }
}

/// Renderer-thread half.
pub struct FrameConsumer {
    consumer: Consumer<Frame>,
}

impl FrameConsumer {
    /// Destructively take the oldest queued frame.
    #[inline]
    pub fn pop(&mut self) -> Option<Frame> {
        self.consumer.pop().ok()
    }

    /// Racy occupancy estimate, for diagnostics only.
    #[inline]
    pub fn approx_len(&self) -> usize {
        self.consumer.slots()
    }
}
