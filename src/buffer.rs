//! Fixed-capacity visibility tensor with progress counters.

use crate::timer::get_timestamp;

/// Number of correlator polarisation products per visibility sample
/// (XX, XY, YX, YY), each a complex float (re, im).
pub const NUM_POLARISATIONS: usize = 4;

/// One visibility sample: 4 polarisations x (re, im) f32 = 32 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DataType {
    pub vis: [f32; NUM_POLARISATIONS * 2],
}

pub const BLOCK_SIZE: usize = std::mem::size_of::<DataType>();

impl DataType {
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: DataType is repr(C) and made entirely of f32, which has
        // no padding or invalid bit patterns.
        unsafe {
            std::slice::from_raw_parts(
                (self as *const DataType) as *const u8,
                BLOCK_SIZE,
            )
        }
    }
}

/// A dense `[time][channel][baseline] -> DataType` tensor plus the
/// bookkeeping the receiver needs to decide when it is quiescent.
pub struct Buffer {
    pub buffer_id: usize,
    /// Inclusive heap-id window this buffer currently owns.
    pub heap_id_start: i64,
    pub heap_id_end: i64,
    pub byte_counter: usize,
    pub buffer_size: usize,
    pub last_updated: f64,
    pub locked_for_write: bool,
    pub num_times: usize,
    pub num_channels: usize,
    pub num_baselines: usize,
    pub vis_data: Vec<DataType>,
    /// Per-baseline UVW geometry scratch, recomputed at flush time.
    pub uu: Vec<f64>,
    pub vv: Vec<f64>,
    pub ww: Vec<f64>,
}

impl Buffer {
    pub fn new(
        buffer_id: usize,
        num_times: usize,
        num_channels: usize,
        num_baselines: usize,
    ) -> Self {
        let num_samples = num_times * num_channels * num_baselines;
        Self {
            buffer_id,
            heap_id_start: 0,
            heap_id_end: 0,
            byte_counter: 0,
            buffer_size: num_samples * BLOCK_SIZE,
            last_updated: get_timestamp(),
            locked_for_write: false,
            num_times,
            num_channels,
            num_baselines,
            vis_data: vec![DataType::default(); num_samples],
            uu: vec![0.0; num_baselines],
            vv: vec![0.0; num_baselines],
            ww: vec![0.0; num_baselines],
        }
    }

    /// True when this buffer currently has no unflushed deposits and is
    /// not locked — i.e. it is a candidate for reassignment.
    pub fn is_recyclable(&self) -> bool {
        self.byte_counter == 0 && !self.locked_for_write
    }

    pub fn owns_heap(&self, heap_id: i64) -> bool {
        heap_id >= self.heap_id_start && heap_id <= self.heap_id_end
    }

    /// Assigns this buffer a fresh, aligned heap-id window for `heap_id`
    /// and resets its accounting.
    pub fn assign_window(&mut self, heap_id: i64, num_times_in_buffer: i64) {
        self.heap_id_start = num_times_in_buffer * (heap_id / num_times_in_buffer);
        self.heap_id_end = self.heap_id_start + num_times_in_buffer - 1;
    }

    /// Resets counters and zeroes the tensor; does not touch
    /// `locked_for_write` or the heap-id window, which the caller
    /// (the writer) clears/reassigns separately.
    pub fn clear(&mut self) {
        self.byte_counter = 0;
        for sample in self.vis_data.iter_mut() {
            *sample = DataType::default();
        }
    }

    /// Fraction of `buffer_size` filled, for the incomplete-buffer-at-flush
    /// WARN log.
    pub fn completion_fraction(&self) -> f64 {
        if self.buffer_size == 0 {
            1.0
        } else {
            self.byte_counter as f64 / self.buffer_size as f64
        }
    }

    /// Raw mutable byte pointer into the tensor, along with its length,
    /// for use by the decoder's unlocked memcpy.
    ///
    /// # Safety
    /// The caller must ensure that concurrent writers target disjoint
    /// byte ranges — guaranteed by the protocol invariant that
    /// `(heap_id, stream_id)` identifies a unique destination slice.
    pub unsafe fn tensor_ptr(&self) -> (*mut u8, usize) {
        (self.vis_data.as_ptr() as *mut u8, self.buffer_size)
    }
}
