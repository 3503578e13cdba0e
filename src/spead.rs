//! SPEAD v4 packet decoder: framing, item-pointer interpretation,
//! and placement arithmetic into the shared visibility tensor.

use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::receiver::Receiver;
use crate::stream::Stream;
use crate::timer::get_timestamp;

// Recognized item IDs.
const ITEM_NULL: u64 = 0x0;
const ITEM_HEAP_COUNTER: u64 = 0x1;
const ITEM_HEAP_SIZE: u64 = 0x2;
const ITEM_HEAP_OFFSET: u64 = 0x3;
const ITEM_PACKET_PAYLOAD_LENGTH: u64 = 0x4;
const ITEM_NESTED_DESCRIPTOR: u64 = 0x5;
const ITEM_STREAM_CONTROL: u64 = 0x6;
const ITEM_DESCRIPTOR_FIRST: u64 = 0x10;
const ITEM_DESCRIPTOR_LAST: u64 = 0x15;
const ITEM_TIMESTAMP_COUNT: u64 = 0x6000;
const ITEM_TIMESTAMP_FRACTION: u64 = 0x6001;
const ITEM_CHANNEL_ID: u64 = 0x6002;
const ITEM_CHANNEL_COUNT: u64 = 0x6003;
const ITEM_POLARISATION_ID: u64 = 0x6004;
const ITEM_BASELINE_COUNT: u64 = 0x6005;
const ITEM_SCAN_ID: u64 = 0x6008;
const ITEM_VIS_DATA: u64 = 0x600A;

const STREAM_CONTROL_END_OF_STREAM: u64 = 2;

const SPEAD_MAGIC: u8 = b'S';
const SPEAD_VERSION: u8 = 4;
const HEADER_BYTES: usize = 8;
const ITEM_POINTER_BYTES: usize = 8;

/// Parses exactly one SPEAD packet from the front of `buf` (which may
/// hold several coalesced packets) and returns the number of bytes it
/// consumed.
///
/// On a magic/version mismatch, returns 8 so the caller can attempt to
/// resync on the next 8-byte boundary.
pub fn decode(stream: &mut Stream, receiver: &Receiver, buf: &[u8]) -> usize {
    if buf.len() < HEADER_BYTES {
        return 0;
    }
    if buf[0] != SPEAD_MAGIC || buf[1] != SPEAD_VERSION {
        return HEADER_BYTES;
    }

    let item_id_bits = buf[2] as u32 * 8 - 1;
    let heap_addr_bits = buf[3] as u32 * 8;
    let num_items = buf[7] as usize;

    let mask_addr: u64 = (1u64 << heap_addr_bits) - 1;
    let mask_id: u64 = (1u64 << item_id_bits) - 1;

    let items_start = HEADER_BYTES;
    let payload_start = items_start + ITEM_POINTER_BYTES * num_items;
    if buf.len() < payload_start {
        // Truncated packet (short datagram); nothing sensible to decode.
        return buf.len();
    }

    let mut packet_has_stream_control = false;
    let mut packet_payload_length: usize = 0;
    let mut heap_offset: usize = 0;
    let mut vis_data_start: usize = 0;

    for i in 0..num_items {
        let off = items_start + ITEM_POINTER_BYTES * i;
        let raw = u64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
        let item_addr = raw & mask_addr;
        let item_id = (raw >> heap_addr_bits) & mask_id;

        match item_id {
            ITEM_NULL => {}
            ITEM_HEAP_COUNTER => {
                // Quirk of the reference sender: the heap counter item
                // carries the logical heap id plus 2. Preserve exactly.
                stream.heap_count = item_addr as i64 - 2;
            }
            ITEM_HEAP_SIZE => {} // present on the wire, never consulted downstream
            ITEM_HEAP_OFFSET => heap_offset = item_addr as usize,
            ITEM_PACKET_PAYLOAD_LENGTH => packet_payload_length = item_addr as usize,
            ITEM_NESTED_DESCRIPTOR => {}
            ITEM_STREAM_CONTROL => {
                packet_has_stream_control = true;
                if item_addr == STREAM_CONTROL_END_OF_STREAM {
                    stream.set_done();
                }
            }
            ITEM_DESCRIPTOR_FIRST..=ITEM_DESCRIPTOR_LAST => {}
            ITEM_TIMESTAMP_COUNT => {
                receiver.set_timestamp_count(item_addr as u32);
            }
            ITEM_TIMESTAMP_FRACTION => {}
            ITEM_CHANNEL_ID => {}
            ITEM_CHANNEL_COUNT => {}
            ITEM_POLARISATION_ID => {}
            ITEM_BASELINE_COUNT => {
                receiver.set_num_baselines(item_addr as u32);
            }
            ITEM_SCAN_ID => {} // absolute-addressed into the payload; no downstream consumer
            ITEM_VIS_DATA => {
                stream.vis_data_heap_offset = item_addr as usize;
                vis_data_start = item_addr as usize;
            }
            _ => {}
        }
    }

    if !packet_has_stream_control
        && stream.vis_data_heap_offset > 0
        && receiver.num_baselines() > 0
        && packet_payload_length >= vis_data_start
    {
        let vis_data_length = packet_payload_length - vis_data_start;
        let now = get_timestamp();
        match receiver.acquire_buffer(stream.heap_count, vis_data_length, now) {
            Some(slot) => {
                let src_start = payload_start + vis_data_start;
                let src_end = src_start + vis_data_length;
                if src_end <= buf.len() {
                    // `stream_id` selects the channel a stream carries;
                    // each packet's `heap_offset` is a byte offset
                    // within that (time, channel) baseline slab.
                    let i_time = stream.heap_count - slot.heap_id_start;
                    let within_slab = heap_offset - stream.vis_data_heap_offset + vis_data_start;
                    let dst_offset = within_slab
                        + slot.slab_size() * (i_time as usize * slot.num_channels + stream.stream_id);
                    let memcpy_start = Instant::now();
                    // SAFETY: `acquire_buffer` guarantees `slot` is the
                    // unique owner of the `(heap_id, stream_id)` byte
                    // range written here.
                    unsafe {
                        slot.write(dst_offset, &buf[src_start..src_end]);
                    }
                    stream
                        .counters
                        .memcpy_nanos
                        .fetch_add(memcpy_start.elapsed().as_nanos() as u64, Ordering::Relaxed);
                    stream.counters.recv_bytes.fetch_add(vis_data_length as u64, Ordering::Relaxed);
                }
            }
            None => {
                stream.counters.dump_bytes.fetch_add(vis_data_length as u64, Ordering::Relaxed);
            }
        }
    }

    payload_start + packet_payload_length
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::ReceiverConfig;

    fn build_packet(
        item_id_bytes: u8,
        heap_addr_bytes: u8,
        items: &[(u64, u64)],
        payload: &[u8],
    ) -> Vec<u8> {
        let mut buf = vec![b'S', 4, item_id_bytes, heap_addr_bytes, 0, 0, 0, items.len() as u8];
        let heap_addr_bits = heap_addr_bytes as u32 * 8;
        for (id, addr) in items {
            let word = (id << heap_addr_bits) | addr;
            buf.extend_from_slice(&word.to_be_bytes());
        }
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn bad_magic_advances_eight_bytes() {
        let mut stream = Stream::new(0, 0).unwrap();
        let receiver = Receiver::new(ReceiverConfig::default_for_test());
        let buf = [0u8; 16];
        assert_eq!(decode(&mut stream, &receiver, &buf), 8);
    }

    #[test]
    fn bytes_consumed_matches_closed_form() {
        let mut stream = Stream::new(0, 0).unwrap();
        let receiver = Receiver::new(ReceiverConfig::default_for_test());
        let payload = vec![0u8; 4];
        let buf = build_packet(5, 5, &[(ITEM_HEAP_COUNTER, 2)], &payload);
        let num_items = 1usize;
        let consumed = decode(&mut stream, &receiver, &buf);
        assert_eq!(consumed, 8 + 8 * num_items + payload.len());
    }

    #[test]
    fn end_of_stream_sets_done_without_depositing() {
        let mut stream = Stream::new(0, 0).unwrap();
        let receiver = Receiver::new(ReceiverConfig::default_for_test());
        receiver.set_num_baselines(1);
        stream.vis_data_heap_offset = 4;
        let buf = build_packet(
            5,
            5,
            &[(ITEM_STREAM_CONTROL, STREAM_CONTROL_END_OF_STREAM)],
            &[0u8; 4],
        );
        decode(&mut stream, &receiver, &buf);
        assert!(stream.is_done());
        assert_eq!(stream.counters.recv_bytes.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn deposit_offset_cancels_vis_data_heap_offset_against_vis_data_start() {
        // When a packet's heap offset equals its own vis-data item
        // address (the first packet of a new heap), the destination
        // offset's `- vis_data_heap_offset + vis_data_start` terms must
        // cancel exactly, landing the deposit at byte 0 of the slab.
        let mut stream = Stream::new(0, 0).unwrap();
        let receiver = Receiver::new(ReceiverConfig::default_for_test());
        receiver.set_num_baselines(1);
        let mut payload = vec![0u8; 32];
        payload[0..4].copy_from_slice(&1.5f32.to_le_bytes());
        let buf = build_packet(
            5,
            5,
            &[
                (ITEM_HEAP_OFFSET, 0),
                (ITEM_PACKET_PAYLOAD_LENGTH, payload.len() as u64),
                (ITEM_VIS_DATA, 0),
            ],
            &payload,
        );
        decode(&mut stream, &receiver, &buf);
        let deposited = receiver.with_buffer(0, |b| b.vis_data[0].vis);
        assert_eq!(deposited[0], 1.5);
    }

    #[test]
    fn heap_counter_latches_minus_two_quirk() {
        let mut stream = Stream::new(0, 0).unwrap();
        let receiver = Receiver::new(ReceiverConfig::default_for_test());
        let buf = build_packet(5, 5, &[(ITEM_HEAP_COUNTER, 10)], &[]);
        decode(&mut stream, &receiver, &buf);
        assert_eq!(stream.heap_count, 8);
    }
}
