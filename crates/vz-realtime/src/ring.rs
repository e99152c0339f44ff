//! Stereo sample history
//!
//! Overwriting circular storage of the most recent samples per channel,
//! exposed as zero-copy two-segment views with newest-last iteration
//! order. Owned and written by the audio thread; the analysis stages read
//! it through [`AudioView`]s taken on the same thread within one callback.

use vz_core::{AudioView, Sample};

/// Circular history of one channel.
#[derive(Debug)]
pub struct HistoryBuffer {
    data: Vec<Sample>,
    write_pos: usize,
    filled: bool,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)],
            write_pos: 0,
            filled: false,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid samples currently in view.
    #[inline]
    pub fn len(&self) -> usize {
        if self.filled {
            self.data.len()
        } else {
            self.write_pos
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the backing storage. Contents are discarded; the next
    /// frames are skipped until the window refills. Runs only at the
    /// configuration-swap boundary.
    pub fn resize(&mut self, capacity: usize) {
        self.data = vec![0.0; capacity.max(1)];
        self.write_pos = 0;
        self.filled = false;
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_pos = 0;
        self.filled = false;
    }

    /// Append samples, overwriting the oldest history.
    pub fn write(&mut self, samples: &[Sample]) {
        let capacity = self.data.len();

        // only the newest `capacity` samples can survive
        let samples = if samples.len() > capacity {
            self.filled = true;
            &samples[samples.len() - capacity..]
        } else {
            samples
        };

        let first = (capacity - self.write_pos).min(samples.len());
        self.data[self.write_pos..self.write_pos + first].copy_from_slice(&samples[..first]);
        let rest = samples.len() - first;
        self.data[..rest].copy_from_slice(&samples[first..]);

        let advanced = self.write_pos + samples.len();
        if advanced >= capacity {
            self.filled = true;
        }
        self.write_pos = advanced % capacity;
    }

    /// Zero-copy view of the valid history, oldest to newest.
    pub fn view(&self) -> AudioView<'_> {
        if self.filled {
            let (tail, head) = self.data.split_at(self.write_pos);
            AudioView::new(head, tail)
        } else {
            AudioView::new(&self.data[..self.write_pos], &[])
        }
    }
}

/// Paired per-channel history for a stereo stream.
#[derive(Debug)]
pub struct StereoHistory {
    left: HistoryBuffer,
    right: HistoryBuffer,
}

impl StereoHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            left: HistoryBuffer::new(capacity),
            right: HistoryBuffer::new(capacity),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.left.capacity()
    }

    pub fn resize(&mut self, capacity: usize) {
        self.left.resize(capacity);
        self.right.resize(capacity);
    }

    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }

    pub fn write(&mut self, left: &[Sample], right: &[Sample]) {
        let n = left.len().min(right.len());
        self.left.write(&left[..n]);
        self.right.write(&right[..n]);
    }

    /// Views of both channels; always equal in length.
    pub fn views(&self) -> [AudioView<'_>; 2] {
        [self.left.view(), self.right.view()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_write_and_view() {
        let mut history = HistoryBuffer::new(8);
        assert!(history.is_empty());

        history.write(&[1.0, 2.0, 3.0]);
        assert_eq!(history.len(), 3);
        let collected: Vec<Sample> = history.view().iter().collect();
        assert_eq!(collected, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_wrap_keeps_newest() {
        let mut history = HistoryBuffer::new(4);
        history.write(&[1.0, 2.0, 3.0]);
        history.write(&[4.0, 5.0]);

        assert_eq!(history.len(), 4);
        let collected: Vec<Sample> = history.view().iter().collect();
        assert_eq!(collected, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_oversized_write_keeps_tail() {
        let mut history = HistoryBuffer::new(4);
        let burst: Vec<Sample> = (0..10).map(|i| i as f32).collect();
        history.write(&burst);

        let collected: Vec<Sample> = history.view().iter().collect();
        assert_eq!(collected, vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_view_segments_join_at_write_position() {
        let mut history = HistoryBuffer::new(4);
        history.write(&[1.0, 2.0, 3.0, 4.0]);
        history.write(&[5.0]);

        let (first, second) = history.view().segments();
        assert_eq!(first, &[2.0, 3.0, 4.0]);
        assert_eq!(second, &[5.0]);
    }

    #[test]
    fn test_stereo_lengths_stay_equal() {
        let mut history = StereoHistory::new(8);
        history.write(&[1.0, 2.0, 3.0], &[4.0, 5.0]);
        let [l, r] = history.views();
        assert_eq!(l.len(), 2);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_resize_discards() {
        let mut history = HistoryBuffer::new(4);
        history.write(&[1.0, 2.0, 3.0, 4.0]);
        history.resize(8);
        assert!(history.is_empty());
        assert_eq!(history.capacity(), 8);
    }
}
