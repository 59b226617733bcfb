// OgmaNeo actor - helpers (vectors, addressing, RNG, buffers, streams)

use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// --- Constants ---

pub const LIMIT_MIN: f32 = -999999.0;
pub const LIMIT_SMALL: f32 = 0.000001;

pub const RAND_SUBSEED_OFFSET: u64 = 12345;
pub const INIT_WEIGHT_NOISEF: f32 = 0.01;

const PCG_MULTIPLIER: u64 = 6364136223846793005;
const PCG_INCREMENT: u64 = 1442695040888963407;
pub const RAND_MAX: u32 = 0x00ffffff;

// --- Type aliases ---

pub type IntBuffer = Vec<i32>;
pub type FloatBuffer = Vec<f32>;

// --- Vector types ---

#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct Int2 {
    pub x: i32,
    pub y: i32,
}

impl Int2 {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Int3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Int3 {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Number of spatial columns (`x * y`).
    pub fn num_columns(&self) -> usize {
        (self.x * self.y) as usize
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct Float2 {
    pub x: f32,
    pub y: f32,
}

impl Float2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

// --- Projections ---

pub fn project(pos: Int2, to_scalars: Float2) -> Int2 {
    Int2::new(
        ((pos.x as f32 + 0.5) * to_scalars.x) as i32,
        ((pos.y as f32 + 0.5) * to_scalars.y) as i32,
    )
}

// --- Addressing (row-major) ---

pub fn address3(pos: Int3, dims: Int3) -> usize {
    (pos.z + dims.z * (pos.y + dims.y * pos.x)) as usize
}

// --- PCG32 RNG ---

pub fn rand_get_state(seed: u64) -> u64 {
    let state = seed.wrapping_add(PCG_INCREMENT);
    state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(PCG_INCREMENT)
}

#[inline]
fn rotr32(x: u32, r: u32) -> u32 {
    x >> r | x << (r.wrapping_neg() & 31)
}

pub fn rand_step(state: &mut u64) -> u32 {
    let x = *state;
    let count = (x >> 59) as u32;
    *state = x.wrapping_mul(PCG_MULTIPLIER).wrapping_add(PCG_INCREMENT);
    let x = x ^ (x >> 18);
    rotr32((x >> 27) as u32, count)
}

/// Uniform in `[0, 1)`.
pub fn randf_step(state: &mut u64) -> f32 {
    (rand_step(state) % RAND_MAX) as f32 / RAND_MAX as f32
}

pub fn randf_range_step(low: f32, high: f32, state: &mut u64) -> f32 {
    low + (high - low) * randf_step(state)
}

// --- Softmax / sampling ---

/// Replaces `acts` with `softmax(acts)`, subtracting the max before exponentiating.
pub fn softmax(acts: &mut [f32]) {
    let max_activation = acts.iter().fold(LIMIT_MIN, |m, &a| m.max(a));

    let mut total = 0.0f32;
    for a in acts.iter_mut() {
        *a = (*a - max_activation).exp();
        total += *a;
    }

    let total_inv = 1.0 / LIMIT_SMALL.max(total);
    for a in acts.iter_mut() {
        *a *= total_inv;
    }
}

/// Walks the cumulative distribution until it reaches `cusp`.
/// Falls back to slot 0 if rounding keeps the running sum below `cusp`.
pub fn sample_categorical(probs: &[f32], cusp: f32) -> usize {
    let mut sum_so_far = 0.0f32;
    for (i, &p) in probs.iter().enumerate() {
        sum_so_far += p;
        if sum_so_far >= cusp {
            return i;
        }
    }
    0
}

// --- CircleBuffer ---

#[derive(Clone, Debug)]
pub struct CircleBuffer<T> {
    pub data: Vec<T>,
    pub start: usize,
}

impl<T> CircleBuffer<T> {
    pub fn from_vec(data: Vec<T>) -> Self {
        Self { data, start: 0 }
    }

    /// Rotates the start back one slot; the old last slot becomes index 0.
    pub fn push_front(&mut self) {
        if self.data.is_empty() {
            return;
        }
        if self.start == 0 {
            self.start = self.data.len() - 1;
        } else {
            self.start -= 1;
        }
    }

    pub fn get(&self, index: usize) -> &T {
        &self.data[(self.start + index) % self.data.len()]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut T {
        let len = self.data.len();
        &mut self.data[(self.start + index) % len]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> Default for CircleBuffer<T> {
    fn default() -> Self {
        Self::from_vec(Vec::new())
    }
}

// --- Serialization traits ---

pub trait StreamWriter {
    fn write_bytes(&mut self, data: &[u8]);

    fn write_i32(&mut self, v: i32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f32(&mut self, v: f32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_i32_slice(&mut self, slice: &[i32]) {
        for &v in slice {
            self.write_i32(v);
        }
    }

    fn write_f32_slice(&mut self, slice: &[f32]) {
        for &v in slice {
            self.write_f32(v);
        }
    }
}

pub trait StreamReader {
    fn read_bytes(&mut self, buf: &mut [u8]);

    fn read_i32(&mut self) -> i32 {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf);
        i32::from_le_bytes(buf)
    }

    fn read_f32(&mut self) -> f32 {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf);
        f32::from_le_bytes(buf)
    }

    fn read_i32_slice(&mut self, slice: &mut [i32]) {
        for v in slice.iter_mut() {
            *v = self.read_i32();
        }
    }

    fn read_f32_slice(&mut self, slice: &mut [f32]) {
        for v in slice.iter_mut() {
            *v = self.read_f32();
        }
    }
}

// --- Vec-based stream implementations ---

#[derive(Default)]
pub struct VecWriter {
    pub data: Vec<u8>,
}

impl VecWriter {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }
}

impl StreamWriter for VecWriter {
    fn write_bytes(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }
}

pub struct SliceReader<'a> {
    pub data: &'a [u8],
    pub pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl StreamReader for SliceReader<'_> {
    fn read_bytes(&mut self, buf: &mut [u8]) {
        let end = self.pos + buf.len();
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
    }
}

// --- Thread pool size ---

static NUM_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Sizes the global rayon pool used by the column sweeps. Only the first call
/// that reaches rayon takes effect.
pub fn set_num_threads(n: usize) {
    NUM_THREADS.store(n, Ordering::Relaxed);
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(n).build_global() {
        log::warn!("rayon global pool already initialized: {e}");
    }
}

pub fn get_num_threads() -> usize {
    NUM_THREADS.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let mut acts = vec![0.3f32, -1.2, 4.0, 0.0, 2.5];
        softmax(&mut acts);
        let total: f32 = acts.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(acts.iter().all(|&p| p > 0.0));
    }

    #[test]
    fn softmax_handles_large_logits() {
        let mut acts = vec![1000.0f32, 1000.0, -1000.0];
        softmax(&mut acts);
        assert!(acts.iter().all(|p| p.is_finite()));
        assert!((acts[0] - 0.5).abs() < 1e-5);
        assert!(acts[2] < 1e-6);
    }

    #[test]
    fn sample_categorical_walks_cumulative_sum() {
        let probs = [0.2f32, 0.5, 0.3];
        assert_eq!(sample_categorical(&probs, 0.0), 0);
        assert_eq!(sample_categorical(&probs, 0.2), 0);
        assert_eq!(sample_categorical(&probs, 0.25), 1);
        assert_eq!(sample_categorical(&probs, 0.75), 2);
    }

    #[test]
    fn sample_categorical_falls_back_to_zero() {
        let probs = [0.3f32, 0.3, 0.3];
        assert_eq!(sample_categorical(&probs, 0.95), 0);
    }

    #[test]
    fn randf_in_unit_interval() {
        let mut state = rand_get_state(7);
        for _ in 0..1000 {
            let v = randf_step(&mut state);
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn same_seed_same_stream() {
        let mut a = rand_get_state(99);
        let mut b = rand_get_state(99);
        for _ in 0..16 {
            assert_eq!(rand_step(&mut a), rand_step(&mut b));
        }
    }

    #[test]
    fn circle_buffer_push_front_rotates() {
        let mut buf = CircleBuffer::from_vec(vec![0, 0, 0]);
        for v in 1..=4 {
            buf.push_front();
            *buf.get_mut(0) = v;
        }
        assert_eq!(*buf.get(0), 4);
        assert_eq!(*buf.get(1), 3);
        assert_eq!(*buf.get(2), 2);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn address3_is_depth_fastest() {
        let dims = Int3::new(3, 5, 4);
        assert_eq!(address3(Int3::new(0, 0, 1), dims), 1);
        assert_eq!(address3(Int3::new(0, 1, 0), dims), 4);
        assert_eq!(address3(Int3::new(1, 0, 0), dims), 20);
        assert_eq!(address3(Int3::new(2, 4, 3), dims), 59);
    }

    #[test]
    fn stream_round_trip() {
        let mut w = VecWriter::new();
        w.write_i32(-7);
        w.write_f32_slice(&[1.5, -2.25]);
        let mut r = SliceReader::new(&w.data);
        assert_eq!(r.read_i32(), -7);
        let mut out = [0.0f32; 2];
        r.read_f32_slice(&mut out);
        assert_eq!(out, [1.5, -2.25]);
    }
}
