//! Per-port UDP socket and non-blocking receive loop.

use socket2::{Domain, Socket, Type};
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::IngestError;
use crate::receiver::Receiver;
use crate::spead;

/// Requested kernel socket receive buffer size. Matches the reference's
/// `requested_buffer_len` of 16 MiB — large enough to absorb a scheduling
/// hiccup across `num_threads_recv` worker passes without the kernel
/// dropping datagrams.
const SO_RCVBUF_BYTES: usize = 16 * 1024 * 1024;

/// Userspace scratch buffer for one `recvfrom`. Sized to the largest
/// possible UDP datagram rather than tied to `SO_RCVBUF_BYTES` — unlike
/// the reference, which (re)uses the same 16 MiB allocation for both;
/// doing so here would just be 16 MiB of mostly-unused scratch per stream.
const RECV_SCRATCH_BYTES: usize = 65_536;

/// Per-stream counters read and reset by the receive scheduler's
/// housekeeping pass, which may run on a different thread than the one
/// driving this stream's `receive()` loop — shared via `Arc` so the
/// owning thread writes and thread 0 aggregates without a data race.
#[derive(Default)]
pub struct StreamCounters {
    pub recv_bytes: AtomicU64,
    pub dump_bytes: AtomicU64,
    pub memcpy_nanos: AtomicU64,
    pub done: AtomicBool,
}

pub struct Stream {
    socket: UdpSocket,
    scratch: Vec<u8>,
    pub stream_id: usize,
    pub port: u16,
    /// Most recently observed heap counter.
    pub heap_count: i64,
    /// Offset within a heap at which visibility payload begins, latched
    /// from the first packet carrying item `0x600A`. Zero means "not yet
    /// seen".
    pub vis_data_heap_offset: usize,
    pub counters: Arc<StreamCounters>,
}

impl Stream {
    /// Binds a non-blocking UDP socket on `port` and sizes its receive
    /// buffer. Bind failure is propagated.
    pub fn new(port: u16, stream_id: usize) -> Result<Self, IngestError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)
            .map_err(|source| IngestError::SocketBind { port, source })?;
        socket
            .set_recv_buffer_size(SO_RCVBUF_BYTES)
            .map_err(|source| IngestError::SocketBind { port, source })?;
        socket.set_nonblocking(true).map_err(|source| IngestError::SocketBind { port, source })?;

        let addr: SocketAddr = SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, port).into();
        socket
            .bind(&addr.into())
            .map_err(|source| IngestError::SocketBind { port, source })?;

        let actual = socket.recv_buffer_size().unwrap_or(0);
        if actual < SO_RCVBUF_BYTES / 2 {
            log::warn!(
                "stream {stream_id}: requested {SO_RCVBUF_BYTES}-byte socket buffer, kernel granted {actual} bytes"
            );
        }

        Ok(Self {
            socket: socket.into(),
            scratch: vec![0u8; RECV_SCRATCH_BYTES],
            stream_id,
            port,
            heap_count: 0,
            vis_data_heap_offset: 0,
            counters: Arc::new(StreamCounters::default()),
        })
    }

    pub fn is_done(&self) -> bool {
        self.counters.done.load(Ordering::Relaxed)
    }

    pub fn set_done(&self) {
        self.counters.done.store(true, Ordering::Relaxed);
    }

    /// Performs a single non-blocking receive and decodes every SPEAD
    /// packet coalesced into the resulting datagram. Never blocks:
    /// absence of data returns immediately.
    pub fn receive(&mut self, receiver: &Receiver) {
        let recvlen = match self.socket.recv(&mut self.scratch) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(_) => return,
        };

        let mut offset = 0usize;
        while recvlen.saturating_sub(offset) >= 8 {
            // SAFETY: `scratch` is only read during `decode`, never
            // resized or otherwise mutated, so this borrow does not
            // alias any write `decode` performs through `&mut self`.
            let packet: &[u8] = unsafe {
                std::slice::from_raw_parts(self.scratch.as_ptr().add(offset), recvlen - offset)
            };
            let consumed = spead::decode(self, receiver, packet);
            if consumed == 0 {
                break;
            }
            offset += consumed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_assigns_requested_port_or_fails_cleanly() {
        // Port 0 asks the kernel for an ephemeral port, proving bind works
        // without colliding with a real SPEAD sender in test environments.
        let stream = Stream::new(0, 0);
        assert!(stream.is_ok());
    }
}
