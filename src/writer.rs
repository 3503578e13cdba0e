//! Buffer flush: raw POSIX file output, sharded by channel range across
//! a short-lived pool of writer threads, plus the measurement-set
//! dispatch path.

use std::io;
use std::sync::Arc;
use std::thread;

use crate::buffer::Buffer;
use crate::ms_sink::MeasurementSetSink;
use crate::receiver::Receiver;
use crate::timer::Timer;
use crate::uvw::{calculate_uvw, AntennaCoords};

/// Writes one flushed buffer to disk: every writer thread strides over
/// `num_channels` by `num_channels_per_file`, each producing its own
/// contiguous run of files so no two threads ever touch the same path.
pub fn write_buffer_raw(
    receiver: &Receiver,
    buffer_id: usize,
    output_root: &str,
    num_threads_write: usize,
    num_channels_per_file: usize,
) {
    let mut timer = Timer::new();
    timer.start();

    let (heap_id_start, heap_id_end, num_times, num_channels, num_baselines, completion) =
        receiver.with_buffer(buffer_id, |buf| {
            (
                buf.heap_id_start,
                buf.heap_id_end,
                buf.num_times,
                buf.num_channels,
                buf.num_baselines,
                buf.completion_fraction(),
            )
        });

    if completion < 1.0 {
        log::warn!(
            "buffer {buffer_id} flushed at {:.1}% capacity (heaps {heap_id_start}-{heap_id_end})",
            completion * 100.0
        );
    }

    let handles: Vec<_> = (0..num_threads_write)
        .map(|thread_id| {
            let output_root = output_root.to_string();
            let result = write_channel_stride(
                receiver,
                buffer_id,
                thread_id,
                num_threads_write,
                num_channels_per_file,
                num_channels,
                num_times,
                num_baselines,
                heap_id_start,
                heap_id_end,
                &output_root,
            );
            thread::Builder::new()
                .name(format!("writer-{buffer_id}-{thread_id}"))
                .spawn(move || result)
                .expect("failed to spawn writer thread")
        })
        .collect();

    for handle in handles {
        if let Err(e) = handle.join().unwrap() {
            log::error!("buffer {buffer_id}: {e}");
        }
    }

    let elapsed = timer.elapsed();
    let total_bytes: usize = receiver.with_buffer(buffer_id, |buf| buf.byte_counter);
    log::info!(
        "wrote buffer {buffer_id} in {elapsed:.2}s ({:.2} MB/s)",
        total_bytes as f64 / 1e6 / elapsed.max(1e-9)
    );

    receiver.with_buffer(buffer_id, |buf| {
        buf.clear();
        buf.locked_for_write = false;
    });
}

/// Clears and unlocks a flushed buffer without persisting it anywhere —
/// the `--output` absent path. Buffers are still reassembled and cycled
/// back into the pool; they are simply never written to disk.
pub fn discard_buffer(receiver: &Receiver, buffer_id: usize) {
    let byte_counter = receiver.with_buffer(buffer_id, |buf| buf.byte_counter);
    log::info!("buffer {buffer_id} flushed with no output configured, discarding {byte_counter} bytes");
    receiver.with_buffer(buffer_id, |buf| {
        buf.clear();
        buf.locked_for_write = false;
    });
}

#[allow(clippy::too_many_arguments)]
fn write_channel_stride(
    receiver: &Receiver,
    buffer_id: usize,
    thread_id: usize,
    num_threads_write: usize,
    num_channels_per_file: usize,
    num_channels: usize,
    num_times: usize,
    num_baselines: usize,
    heap_id_start: i64,
    heap_id_end: i64,
    output_root: &str,
) -> io::Result<()> {
    let mut channel = thread_id * num_channels_per_file;
    while channel < num_channels {
        let channel_end = (channel + num_channels_per_file - 1).min(num_channels - 1);
        let num_channels_block = channel_end - channel + 1;

        let filename = format!(
            "{output_root}_t{heap_id_start:04}-{heap_id_end:04}_c{channel:04}-{channel_end:04}.dat"
        );

        write_file_posix(&filename, |write_all| {
            receiver.with_buffer(buffer_id, |buf| {
                for t in 0..num_times {
                    let slab_size = num_baselines;
                    let start = slab_size * (num_channels * t + channel);
                    let samples = &buf.vis_data[start..start + slab_size * num_channels_block];
                    for sample in samples {
                        write_all(sample.as_bytes())?;
                    }
                }
                Ok(())
            })
        })?;

        channel += num_threads_write * num_channels_per_file;
    }
    Ok(())
}

/// Opens `path` with create/truncate semantics matching the reference's
/// `creat()` call (owner rw, group/other r), and streams bytes through
/// `body` before closing.
fn write_file_posix(path: &str, body: impl FnOnce(&mut dyn FnMut(&[u8]) -> io::Result<()>) -> io::Result<()>) -> io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    body(&mut |bytes: &[u8]| file.write_all(bytes))
}

/// Computes UVW geometry for the buffer and writes coordinates plus
/// visibility data through a measurement-set sink, then
/// clears and unlocks the buffer exactly as the raw-file path does.
pub fn write_buffer_ms(
    receiver: &Receiver,
    buffer_id: usize,
    antennas: &[AntennaCoords],
    sink: &mut dyn MeasurementSetSink,
    write_counter: usize,
) {
    let timer = {
        let mut t = Timer::new();
        t.start();
        t
    };
    let (ra, dec) = receiver.phase_centre();

    let byte_counter = receiver.with_buffer(buffer_id, |buf: &mut Buffer| {
        for t in 0..buf.num_times {
            // Recomputed every time step rather than once for the whole
            // buffer: `timestamp_count` is updated from the wire with
            // relaxed ordering and may move mid-flush.
            let timestamp_count = receiver.timestamp_count() as f64;
            calculate_uvw(antennas, ra, dec, timestamp_count, &mut buf.uu, &mut buf.vv, &mut buf.ww);

            let t_global = write_counter * buf.num_times + t;
            let start_row = t_global * buf.num_baselines;
            sink.write_coords_d(start_row, buf.num_baselines, &buf.uu, &buf.vv, &buf.ww);

            for c in 0..buf.num_channels {
                let start = buf.num_baselines * (buf.num_channels * t + c);
                let mut unpacked = Vec::with_capacity(buf.num_baselines * 8);
                for sample in &buf.vis_data[start..start + buf.num_baselines] {
                    unpacked.extend_from_slice(&sample.vis);
                }
                sink.write_vis_f(start_row, c, buf.num_baselines, &unpacked);
            }
        }

        buf.byte_counter
    });

    log::info!(
        "wrote buffer {buffer_id} to measurement set in {:.2}s ({:.2} MB/s)",
        timer.elapsed(),
        byte_counter as f64 / 1e6 / timer.elapsed().max(1e-9)
    );

    receiver.with_buffer(buffer_id, |buf| {
        buf.clear();
        buf.locked_for_write = false;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::ReceiverConfig;

    #[test]
    fn raw_write_produces_one_file_per_channel_stride() {
        let receiver = Receiver::new(ReceiverConfig::default_for_test());
        receiver.acquire_buffer(0, 4, 0.0).unwrap();

        let dir = std::env::temp_dir().join(format!("spead-vis-ingest-writer-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let output_root = dir.join("ingest").to_string_lossy().to_string();

        write_buffer_raw(&receiver, 0, &output_root, 1, 1);

        let expected = format!("{output_root}_t0000-0003_c0000-0000.dat");
        assert!(std::path::Path::new(&expected).exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn ms_write_runs_without_a_configured_sink() {
        let receiver = Receiver::new(ReceiverConfig::default_for_test());
        receiver.acquire_buffer(0, 4, 0.0).unwrap();
        let mut sink = crate::ms_sink::NullMeasurementSet;
        let antennas = vec![AntennaCoords::default(); 2];
        write_buffer_ms(&receiver, 0, &antennas, &mut sink, 0);
    }
}
