//! High-rate UDP ingester for SPEAD-framed radio-astronomy visibility
//! streams.
//!
//! Packets arrive on one UDP port per correlator stream, are decoded
//! and deposited into a small pool of shared visibility buffers keyed
//! by an aligned heap-id window, and a background thread pool flushes
//! each buffer to disk (or a measurement set) once it goes quiet.

pub mod affinity;
pub mod antenna;
pub mod barrier;
pub mod buffer;
pub mod cli;
pub mod error;
pub mod ms_sink;
pub mod receiver;
pub mod spead;
pub mod stream;
pub mod threadpool;
pub mod timer;
pub mod uvw;
pub mod writer;

pub use error::IngestError;
pub use receiver::{Receiver, ReceiverConfig};
