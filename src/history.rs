// OgmaNeo actor - HistoryBuffer (fixed-capacity newest-first experience log)

use std::ops::Index;

use crate::helpers::*;

/// One step of experience. Buffers are allocated once at their final shape and
/// overwritten in place afterwards.
#[derive(Clone, Debug, Default)]
pub struct HistorySample {
    pub input_cis: Vec<IntBuffer>,
    pub hidden_target_cis_prev: IntBuffer,
    pub hidden_values_prev: FloatBuffer,
    pub reward: f32,
}

impl HistorySample {
    fn with_shape(visible_column_counts: &[usize], num_hidden_columns: usize) -> Self {
        Self {
            input_cis: visible_column_counts.iter().map(|&n| vec![0i32; n]).collect(),
            hidden_target_cis_prev: vec![0i32; num_hidden_columns],
            hidden_values_prev: vec![0.0f32; num_hidden_columns],
            reward: 0.0,
        }
    }
}

/// Circular history where index 0 is the most recent sample.
#[derive(Clone, Debug, Default)]
pub struct HistoryBuffer {
    samples: CircleBuffer<HistorySample>,
    size: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize, visible_column_counts: &[usize], num_hidden_columns: usize) -> Self {
        let data = (0..capacity)
            .map(|_| HistorySample::with_shape(visible_column_counts, num_hidden_columns))
            .collect();

        Self {
            samples: CircleBuffer::from_vec(data),
            size: 0,
        }
    }

    /// Copies a new sample into the slot vacated by the oldest one.
    ///
    /// Panics if any buffer length differs from the shape fixed at construction.
    pub fn push_front(
        &mut self,
        input_cis: &[&[i32]],
        hidden_target_cis_prev: &[i32],
        hidden_values_prev: &[f32],
        reward: f32,
    ) {
        assert!(!self.samples.is_empty(), "push into a zero-capacity history");

        let shape = self.samples.get(0);
        assert_eq!(input_cis.len(), shape.input_cis.len(), "visible layer count mismatch");
        for (vli, (dst, src)) in shape.input_cis.iter().zip(input_cis).enumerate() {
            assert_eq!(dst.len(), src.len(), "visible layer {vli} column count mismatch");
        }
        assert_eq!(
            hidden_target_cis_prev.len(),
            shape.hidden_target_cis_prev.len(),
            "hidden target column count mismatch"
        );
        assert_eq!(
            hidden_values_prev.len(),
            shape.hidden_values_prev.len(),
            "hidden value column count mismatch"
        );

        self.samples.push_front();

        if self.size < self.samples.len() {
            self.size += 1;
        }

        let s = self.samples.get_mut(0);

        for (dst, src) in s.input_cis.iter_mut().zip(input_cis) {
            dst.copy_from_slice(src);
        }
        s.hidden_target_cis_prev.copy_from_slice(hidden_target_cis_prev);
        s.hidden_values_prev.copy_from_slice(hidden_values_prev);
        s.reward = reward;
    }

    /// Return-to-go over samples `index..=0` and the bootstrap factor for the remainder:
    /// `q = sum(reward[t] * gamma^(index - t))`, `g = gamma^(index + 1)`.
    pub fn discounted_return(&self, index: usize, gamma: f32) -> (f32, f32) {
        let mut q = 0.0f32;
        let mut g = 1.0f32;

        for t in (0..=index).rev() {
            q += self.samples.get(t).reward * g;
            g *= gamma;
        }

        (q, g)
    }

    /// Forgets all samples without releasing storage.
    pub fn clear(&mut self) {
        self.size = 0;
    }

    /// Number of valid samples.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub(crate) fn start(&self) -> usize {
        self.samples.start
    }

    pub(crate) fn restore(&mut self, size: usize, start: usize) {
        assert!(size <= self.capacity(), "history size exceeds capacity");
        assert!(start < self.capacity().max(1), "history start out of range");

        self.size = size;
        self.samples.start = start;
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut HistorySample {
        self.samples.get_mut(index)
    }
}

impl Index<usize> for HistoryBuffer {
    type Output = HistorySample;

    fn index(&self, index: usize) -> &HistorySample {
        self.samples.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_reward(buf: &mut HistoryBuffer, reward: f32) {
        let inputs = [0i32; 4];
        buf.push_front(&[&inputs], &[0; 2], &[reward; 2], reward);
    }

    #[test]
    fn newest_sample_is_index_zero() {
        let mut buf = HistoryBuffer::new(4, &[4], 2);
        for r in [1.0, 2.0, 3.0] {
            push_reward(&mut buf, r);
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf[0].reward, 3.0);
        assert_eq!(buf[1].reward, 2.0);
        assert_eq!(buf[2].reward, 1.0);
        assert_eq!(buf[0].hidden_values_prev, vec![3.0, 3.0]);
    }

    #[test]
    fn size_saturates_and_oldest_is_overwritten() {
        let mut buf = HistoryBuffer::new(3, &[4], 2);
        for r in 0..7 {
            push_reward(&mut buf, r as f32);
            assert!(buf.len() <= buf.capacity());
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.capacity(), 3);
        assert_eq!(buf[0].reward, 6.0);
        assert_eq!(buf[2].reward, 4.0);
        // storage is reused, never grown
        assert_eq!(buf[0].input_cis[0].len(), 4);
    }

    #[test]
    fn discounted_return_weights_oldest_first() {
        let mut buf = HistoryBuffer::new(8, &[4], 2);
        for _ in 0..3 {
            push_reward(&mut buf, 1.0);
        }
        let (q, g) = buf.discounted_return(2, 0.5);
        assert_eq!(q, 1.75);
        assert_eq!(g, 0.125);

        let mut buf = HistoryBuffer::new(8, &[4], 2);
        for r in [1.0, 2.0, 4.0] {
            push_reward(&mut buf, r);
        }
        // buf[2] = 1 (weight 1), buf[1] = 2 (weight 0.5), buf[0] = 4 (weight 0.25)
        let (q, g) = buf.discounted_return(2, 0.5);
        assert_eq!(q, 3.0);
        assert_eq!(g, 0.125);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut buf = HistoryBuffer::new(2, &[4], 2);
        push_reward(&mut buf, 1.0);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 2);
    }

    #[test]
    #[should_panic]
    fn wrong_input_length_panics() {
        let mut buf = HistoryBuffer::new(2, &[4], 2);
        let inputs = [0i32; 3];
        buf.push_front(&[&inputs], &[0; 2], &[0.0; 2], 0.0);
    }
}
