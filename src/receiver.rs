//! Stream coordinator: buffer-pool arbitration, shared heap
//! metadata, and the receive-thread scheduler.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::barrier::ReceiveBarrier;
use crate::buffer::{Buffer, BLOCK_SIZE};
use crate::stream::{Stream, StreamCounters};
use crate::threadpool::ThreadPool;
use crate::timer::{get_timestamp, Timer};

/// Throughput/memcpy-fraction housekeeping report fires once at least
/// this many bytes have crossed all streams combined...
const REPORT_BYTES_THRESHOLD: u64 = 1024 * 1024 * 1024;
/// ...or once this many seconds have passed since the last report,
/// whichever comes first.
const REPORT_SECONDS_THRESHOLD: f64 = 1.0;

/// No deposit has landed on any stream for this long: the oldest open
/// window is quiescent and should be handed to the writer.
const QUIESCENCE_SECONDS: f64 = 1.0;

pub struct ReceiverConfig {
    pub num_streams: usize,
    pub num_threads_recv: usize,
    pub num_channels: usize,
    pub num_baselines: usize,
    pub num_times_in_buffer: i64,
    pub max_num_buffers: usize,
    pub base_port: u16,
    pub phase_centre_ra: f64,
    pub phase_centre_dec: f64,
}

impl ReceiverConfig {
    #[cfg(test)]
    pub fn default_for_test() -> Self {
        Self {
            num_streams: 1,
            num_threads_recv: 1,
            num_channels: 1,
            num_baselines: 1,
            num_times_in_buffer: 4,
            max_num_buffers: 2,
            base_port: 0,
            phase_centre_ra: 0.0,
            phase_centre_dec: 0.0,
        }
    }
}

/// A handle into one buffer's tensor, valid for the deposit write that
/// `acquire_buffer` authorized. Obtained while the pool mutex is held,
/// used after it is released — sound because `Buffer::vis_data` is
/// allocated once and never reallocated.
pub struct DepositSlot {
    ptr: *mut u8,
    len: usize,
    pub heap_id_start: i64,
    pub num_channels: usize,
    pub num_baselines: usize,
    pub block_size: usize,
}

// SAFETY: the pointer is only ever dereferenced through `write`, which
// bounds-checks against `len`; sending it across the thread boundary
// between `acquire_buffer`'s caller and the decode loop is sound because
// the protocol invariant keeps concurrent writers on disjoint ranges.
unsafe impl Send for DepositSlot {}

impl DepositSlot {
    /// Byte size of one (time, channel) slab — every baseline's
    /// [`crate::buffer::DataType`] for a single timestamp and channel.
    pub fn slab_size(&self) -> usize {
        self.num_baselines * self.block_size
    }

    /// Copies `bytes` into the tensor at byte offset `offset`.
    ///
    /// # Safety
    /// The caller must ensure `offset..offset + bytes.len()` falls
    /// within this slot's owning buffer and does not overlap a range
    /// some other in-flight deposit is writing.
    pub unsafe fn write(&self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        assert!(end <= self.len, "deposit offset out of bounds");
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset), bytes.len());
    }
}

pub struct Receiver {
    config: ReceiverConfig,
    buffers: Mutex<Vec<Buffer>>,
    num_baselines: AtomicU32,
    timestamp_count: AtomicU32,
}

impl Receiver {
    pub fn new(config: ReceiverConfig) -> Self {
        let num_baselines = config.num_baselines as u32;
        Self {
            buffers: Mutex::new(Vec::with_capacity(config.max_num_buffers)),
            num_baselines: AtomicU32::new(num_baselines),
            timestamp_count: AtomicU32::new(0),
            config,
        }
    }

    pub fn num_baselines(&self) -> u32 {
        self.num_baselines.load(Ordering::Relaxed)
    }

    pub fn set_num_baselines(&self, value: u32) {
        self.num_baselines.store(value, Ordering::Relaxed);
    }

    pub fn timestamp_count(&self) -> u32 {
        self.timestamp_count.load(Ordering::Relaxed)
    }

    pub fn set_timestamp_count(&self, value: u32) {
        self.timestamp_count.store(value, Ordering::Relaxed);
    }

    /// Buffer-pool arbitration: claim the buffer that already owns
    /// `heap_id`; otherwise track the oldest live window
    /// (`min_heap_start`) and drop the packet outright if `heap_id`
    /// precedes it — that window has already been flushed and reusing
    /// it would corrupt a retired buffer; otherwise recycle the oldest
    /// empty buffer; otherwise grow the pool; otherwise give up and let
    /// the caller drop the packet.
    pub fn acquire_buffer(&self, heap_id: i64, length: usize, now: f64) -> Option<DepositSlot> {
        let mut buffers = self.buffers.lock();

        if let Some(buf) = buffers.iter_mut().find(|b| b.owns_heap(heap_id) && !b.locked_for_write) {
            buf.last_updated = now;
            buf.byte_counter += length;
            return Some(Self::slot_for(buf));
        }

        if let Some(min_heap_start) = buffers.iter().map(|b| b.heap_id_start).min() {
            if heap_id < min_heap_start {
                return None;
            }
        }

        if let Some(buf) = buffers
            .iter_mut()
            .filter(|b| b.is_recyclable())
            .min_by(|a, c| a.last_updated.partial_cmp(&c.last_updated).unwrap())
        {
            buf.assign_window(heap_id, self.config.num_times_in_buffer);
            buf.last_updated = now;
            buf.byte_counter = length;
            return Some(Self::slot_for(buf));
        }

        if buffers.len() < self.config.max_num_buffers {
            let id = buffers.len();
            let mut buf = Buffer::new(
                id,
                self.config.num_times_in_buffer as usize,
                self.config.num_channels,
                self.num_baselines() as usize,
            );
            buf.assign_window(heap_id, self.config.num_times_in_buffer);
            buf.last_updated = now;
            buf.byte_counter = length;
            buffers.push(buf);
            return Some(Self::slot_for(buffers.last_mut().unwrap()));
        }

        None
    }

    fn slot_for(buf: &mut Buffer) -> DepositSlot {
        // SAFETY: `buf` outlives the slot's use — it lives in the
        // pool's `Vec`, which is never reallocated once a buffer is
        // constructed (the pool only grows by pushing, up to a fixed
        // `max_num_buffers` capacity reserved at construction).
        let (ptr, len) = unsafe { buf.tensor_ptr() };
        DepositSlot {
            ptr,
            len,
            heap_id_start: buf.heap_id_start,
            num_channels: buf.num_channels,
            num_baselines: buf.num_baselines,
            block_size: BLOCK_SIZE,
        }
    }

    /// Finds the oldest unlocked, non-empty buffer that has gone quiet
    /// for at least `QUIESCENCE_SECONDS`, locks it, and returns its id
    /// so the caller can hand it to the write thread pool.
    pub fn take_quiescent_buffer(&self, now: f64) -> Option<usize> {
        let mut buffers = self.buffers.lock();
        let candidate = buffers
            .iter()
            .filter(|b| !b.locked_for_write && b.byte_counter > 0 && now - b.last_updated >= QUIESCENCE_SECONDS)
            .min_by(|a, c| a.last_updated.partial_cmp(&c.last_updated).unwrap())
            .map(|b| b.buffer_id);

        if let Some(id) = candidate {
            buffers[id].locked_for_write = true;
        }
        candidate
    }

    pub fn with_buffer<R>(&self, buffer_id: usize, f: impl FnOnce(&mut Buffer) -> R) -> R {
        let mut buffers = self.buffers.lock();
        f(&mut buffers[buffer_id])
    }

    pub fn phase_centre(&self) -> (f64, f64) {
        (self.config.phase_centre_ra, self.config.phase_centre_dec)
    }

    pub fn num_streams(&self) -> usize {
        self.config.num_streams
    }

    pub fn base_port(&self) -> u16 {
        self.config.base_port
    }

    pub fn num_threads_recv(&self) -> usize {
        self.config.num_threads_recv
    }

    pub fn num_channels(&self) -> usize {
        self.config.num_channels
    }
}

/// Runs the receive thread pool to completion: each worker round-robins
/// its assigned streams, the threads rendezvous at a barrier each pass,
/// and thread 0 performs housekeeping (quiescence checks, enqueuing
/// flushes to `write_pool`) between passes.
pub fn run_receive_pool(
    receiver: Arc<Receiver>,
    mut streams: Vec<Stream>,
    write_pool: Arc<ThreadPool>,
    on_flush: impl Fn(Arc<Receiver>, usize) + Send + Sync + Clone + 'static,
) {
    let num_threads = receiver.num_threads_recv().max(1);
    let barrier = Arc::new(ReceiveBarrier::new(num_threads));

    // Every stream's counters are visible to thread 0 regardless of which
    // thread owns the socket/scratch buffer driving that stream's receive
    // loop, matching the reference's single shared `streams` array.
    let all_counters: Vec<Arc<StreamCounters>> = streams.iter().map(|s| s.counters.clone()).collect();

    // Partition streams round-robin across worker threads, matching the
    // reference's `stream_id % num_threads_recv` assignment.
    let mut per_thread: Vec<Vec<Stream>> = (0..num_threads).map(|_| Vec::new()).collect();
    while let Some(stream) = streams.pop() {
        let idx = stream.stream_id % num_threads;
        per_thread[idx].push(stream);
    }

    let mut handles = Vec::with_capacity(num_threads);
    for (thread_idx, mut owned_streams) in per_thread.into_iter().enumerate() {
        let receiver = receiver.clone();
        let barrier = barrier.clone();
        let write_pool = write_pool.clone();
        let on_flush = on_flush.clone();
        let all_counters = all_counters.clone();

        let handle = thread::Builder::new()
            .name(format!("recv-{thread_idx}"))
            .spawn(move || {
                let mut report_timer = Timer::new();
                report_timer.start();

                loop {
                    for stream in owned_streams.iter_mut() {
                        stream.receive(&receiver);
                    }
                    barrier.wait();

                    if thread_idx == 0 {
                        let now = get_timestamp();
                        while let Some(buffer_id) = receiver.take_quiescent_buffer(now) {
                            let receiver = receiver.clone();
                            let on_flush = on_flush.clone();
                            write_pool.enqueue(move || on_flush(receiver, buffer_id));
                        }

                        let elapsed = report_timer.elapsed();
                        let recv_total: u64 =
                            all_counters.iter().map(|c| c.recv_bytes.load(Ordering::Relaxed)).sum();
                        let dump_total: u64 =
                            all_counters.iter().map(|c| c.dump_bytes.load(Ordering::Relaxed)).sum();
                        let memcpy_nanos_total: u64 =
                            all_counters.iter().map(|c| c.memcpy_nanos.load(Ordering::Relaxed)).sum();

                        if recv_total + dump_total >= REPORT_BYTES_THRESHOLD
                            || elapsed >= REPORT_SECONDS_THRESHOLD
                        {
                            let mib_per_sec =
                                (recv_total + dump_total) as f64 / elapsed.max(f64::EPSILON) / (1024.0 * 1024.0);
                            let memcpy_fraction =
                                (memcpy_nanos_total as f64 / 1e9) / elapsed.max(f64::EPSILON);
                            log::info!(
                                "recv {mib_per_sec:.1} MiB/s across {} streams, dumped {dump_total} bytes, memcpy {:.1}% of wall time",
                                all_counters.len(),
                                memcpy_fraction * 100.0,
                            );
                            for counters in &all_counters {
                                counters.recv_bytes.store(0, Ordering::Relaxed);
                                counters.dump_bytes.store(0, Ordering::Relaxed);
                                counters.memcpy_nanos.store(0, Ordering::Relaxed);
                            }
                            report_timer.start();
                        }
                    }
                    barrier.wait();

                    if all_counters.iter().all(|c| c.done.load(Ordering::Relaxed)) {
                        break;
                    }
                }
            })
            .expect("failed to spawn receive thread");
        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_buffer_grows_pool_up_to_max_then_recycles() {
        let receiver = Receiver::new(ReceiverConfig::default_for_test());
        let slot0 = receiver.acquire_buffer(0, 4, 1.0).unwrap();
        assert_eq!(slot0.heap_id_start, 0);
        let slot1 = receiver.acquire_buffer(4, 4, 1.0).unwrap();
        assert_eq!(slot1.heap_id_start, 4);
        assert_eq!(receiver.buffers.lock().len(), 2);

        // Pool is now at max_num_buffers (2); neither buffer is empty,
        // so a third distinct window must fail until one clears.
        assert!(receiver.acquire_buffer(8, 4, 1.0).is_none());
    }

    #[test]
    fn acquire_buffer_reuses_recyclable_buffer_for_new_window() {
        let receiver = Receiver::new(ReceiverConfig::default_for_test());
        receiver.acquire_buffer(0, 4, 1.0).unwrap();
        receiver.with_buffer(0, |b| b.clear());
        let slot = receiver.acquire_buffer(100, 4, 2.0).unwrap();
        assert_eq!(slot.heap_id_start, 100);
    }

    #[test]
    fn heap_id_older_than_the_oldest_live_window_is_dropped() {
        let receiver = Receiver::new(ReceiverConfig::default_for_test());
        receiver.acquire_buffer(100, 4, 0.0).unwrap();
        receiver.with_buffer(0, |b| b.clear());
        // Recycling buffer 0 into a higher window advances min_heap_start
        // past 100; a heap id below that belongs to an already-retired
        // window and must be dropped, not resurrected into the new one.
        receiver.acquire_buffer(200, 4, 1.0).unwrap();
        assert!(receiver.acquire_buffer(0, 4, 2.0).is_none());
    }

    #[test]
    fn backpressure_drops_newer_heap_when_pool_is_saturated() {
        let mut config = ReceiverConfig::default_for_test();
        config.max_num_buffers = 1;
        let receiver = Receiver::new(config);
        receiver.acquire_buffer(0, 4, 0.0).unwrap();
        // Heap 8 is newer than the live window, not older, so the stale
        // guard does not apply — it is dropped only because the single
        // buffer is unflushed and the pool cannot grow further.
        assert!(receiver.acquire_buffer(8, 4, 0.0).is_none());
    }

    #[test]
    fn take_quiescent_buffer_locks_and_returns_oldest() {
        let receiver = Receiver::new(ReceiverConfig::default_for_test());
        receiver.acquire_buffer(0, 4, 0.0).unwrap();
        assert!(receiver.take_quiescent_buffer(0.5).is_none());
        let id = receiver.take_quiescent_buffer(QUIESCENCE_SECONDS + 0.5).unwrap();
        assert_eq!(id, 0);
        assert!(receiver.with_buffer(0, |b| b.locked_for_write));
    }
}
