use std::sync::Arc;

use clap::Parser;

use spead_vis_ingest::cli::Cli;
use spead_vis_ingest::receiver::{run_receive_pool, Receiver, ReceiverConfig};
use spead_vis_ingest::stream::Stream;
use spead_vis_ingest::threadpool::ThreadPool;
use spead_vis_ingest::writer;
use spead_vis_ingest::{affinity, antenna};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.validate()?;

    stderrlog::new()
        .module(module_path!())
        .verbosity(cli.verbose as usize + 2)
        .init()?;

    let num_cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let num_threads_recv = cli.recv.min(num_cores.saturating_sub(2).max(1));
    affinity::pin_to_lower_half(num_cores);

    let antennas = match &cli.antenna {
        Some(path) => antenna::load(path)?,
        None => Vec::new(),
    };

    log::info!("system CPU cores            : {num_cores}");
    log::info!("SPEAD streams                : {}", cli.streams);
    log::info!("receiver threads             : {num_threads_recv}");
    log::info!("writer threads               : {}", cli.write);
    log::info!("times per buffer             : {}", cli.buffertimes);
    log::info!("maximum buffers              : {}", cli.buffers);
    log::info!(
        "UDP port range                : {}-{}",
        cli.port,
        cli.port as usize + cli.streams - 1
    );
    log::info!("channels per file            : {}", cli.channels);
    match &cli.output {
        Some(root) => log::info!("output root                  : {root}"),
        None => log::info!("output root                  : (none, raw-file writes disabled)"),
    }

    let config = ReceiverConfig {
        num_streams: cli.streams,
        num_threads_recv,
        num_channels: cli.channels,
        // Advisory, wire-set only: the original never takes this as a
        // construction argument either, since a correlator's own
        // 0x6005 item is the sole source of truth and need not agree
        // with what the antenna file implies.
        num_baselines: 0,
        num_times_in_buffer: cli.buffertimes as i64,
        max_num_buffers: cli.buffers,
        base_port: cli.port,
        phase_centre_ra: cli.ascension,
        phase_centre_dec: cli.declination,
    };

    let receiver = Arc::new(Receiver::new(config));
    let write_pool = Arc::new(ThreadPool::new());

    let streams: Vec<Stream> = (0..cli.streams)
        .map(|i| Stream::new(cli.port + i as u16, i))
        .collect::<Result<_, _>>()?;

    let output_root = cli.output.clone();
    let num_threads_write = cli.write;
    let num_channels_per_file = cli.channels;

    run_pipeline(receiver, streams, write_pool, antennas, output_root, num_threads_write, num_channels_per_file);

    log::info!("all streams completed, shutting down");
    Ok(())
}

#[cfg(not(feature = "with_ms"))]
fn run_pipeline(
    receiver: Arc<Receiver>,
    streams: Vec<Stream>,
    write_pool: Arc<ThreadPool>,
    _antennas: Vec<spead_vis_ingest::antenna::Antenna>,
    output_root: Option<String>,
    num_threads_write: usize,
    num_channels_per_file: usize,
) {
    run_receive_pool(receiver, streams, write_pool, move |receiver, buffer_id| match &output_root {
        Some(output_root) => {
            writer::write_buffer_raw(&receiver, buffer_id, output_root, num_threads_write, num_channels_per_file);
        }
        None => writer::discard_buffer(&receiver, buffer_id),
    });
}

/// Dispatches flushed buffers to a measurement set instead of raw files.
#[cfg(feature = "with_ms")]
fn run_pipeline(
    receiver: Arc<Receiver>,
    streams: Vec<Stream>,
    write_pool: Arc<ThreadPool>,
    antennas: Vec<spead_vis_ingest::antenna::Antenna>,
    output_root: Option<String>,
    _num_threads_write: usize,
    _num_channels_per_file: usize,
) {
    use parking_lot::Mutex;
    use spead_vis_ingest::ms_sink::oskar::OskarMeasurementSet;
    use spead_vis_ingest::ms_sink::MeasurementSetSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let coords: Vec<_> = antennas.iter().map(|a| a.coords).collect();
    let coords = Arc::new(coords);

    let output_root = output_root.unwrap_or_default();
    let mut sink = OskarMeasurementSet::default();
    sink.create(&output_root, antennas.len(), receiver.num_channels(), 4);
    let (ra, dec) = receiver.phase_centre();
    sink.set_phase_centre(ra, dec);
    let sink = Arc::new(Mutex::new(sink));
    let write_counter = Arc::new(AtomicUsize::new(0));

    run_receive_pool(receiver, streams, write_pool, move |receiver, buffer_id| {
        let counter = write_counter.fetch_add(1, Ordering::SeqCst);
        let mut sink = sink.lock();
        writer::write_buffer_ms(&receiver, buffer_id, &coords, &mut *sink, counter);
    });
}
