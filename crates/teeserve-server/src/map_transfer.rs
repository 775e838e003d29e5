// map_transfer.rs — chunked map download (module G): client-pull and
// high-bandwidth push modes over a fixed-size chunk window.
// Converted from: myq2-common's net_chan.rs fragmentation/window
// bookkeeping (`FragmentState`, retransmit-on-stall guard), re-targeted at
// whole-map chunking instead of a single fragmented reliable message.

use teeserve_common::wire::MAP_CHUNK_SIZE;

use crate::client::MapCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapChunk<'a> {
    pub chunk_index: i32,
    pub is_last: bool,
    pub bytes: &'a [u8],
}

pub fn chunk_count(map_size: usize) -> i32 {
    map_size.div_ceil(MAP_CHUNK_SIZE).max(1) as i32
}

/// Produces the bytes for `chunk_index`, or `None` for an out-of-range
/// request — faulty requests (negative index, offset past end) are
/// silently dropped per spec §4.G.
pub fn chunk_for_index(map_bytes: &[u8], chunk_index: i32) -> Option<MapChunk<'_>> {
    if chunk_index < 0 {
        return None;
    }
    let start = chunk_index as usize * MAP_CHUNK_SIZE;
    if start >= map_bytes.len() && !map_bytes.is_empty() {
        return None;
    }
    if map_bytes.is_empty() && chunk_index != 0 {
        return None;
    }
    let end = (start + MAP_CHUNK_SIZE).min(map_bytes.len());
    let is_last = end >= map_bytes.len();
    Some(MapChunk {
        chunk_index,
        is_last,
        bytes: &map_bytes[start..end],
    })
}

/// Client-pull mode: respond 1:1 to a `REQUEST_MAP_DATA`. Updates the
/// cursor and returns the chunk to send.
pub fn handle_request<'a>(
    cursor: &mut MapCursor,
    map_bytes: &'a [u8],
    chunk_index: i32,
    now_tick: i64,
) -> Option<MapChunk<'a>> {
    let chunk = chunk_for_index(map_bytes, chunk_index)?;
    cursor.last_ask_chunk = chunk_index;
    cursor.last_ask_tick = now_tick;
    cursor.last_sent_chunk = chunk_index;
    Some(chunk)
}

/// High-bandwidth push mode: pushes ahead of the latest acked request up
/// to `window` chunks. Stops once `last_sent < last_ask + window` no
/// longer holds. If the client hasn't asked in at least one second
/// (`retransmit_ticks`), `last_sent` is rewound to `last_ask` first.
pub fn push_chunks<'a>(
    cursor: &mut MapCursor,
    map_bytes: &'a [u8],
    window: i32,
    now_tick: i64,
    retransmit_ticks: i64,
) -> Vec<MapChunk<'a>> {
    if now_tick - cursor.last_ask_tick >= retransmit_ticks {
        cursor.last_sent_chunk = cursor.last_ask_chunk;
    }

    let total = chunk_count(map_bytes.len());
    let mut out = Vec::new();
    while cursor.last_sent_chunk < cursor.last_ask_chunk + window && cursor.last_sent_chunk < total {
        let idx = cursor.last_sent_chunk;
        if let Some(chunk) = chunk_for_index(map_bytes, idx) {
            out.push(chunk);
        }
        cursor.last_sent_chunk += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn last_chunk_is_flagged_and_shorter() {
        let map = map_of(MAP_CHUNK_SIZE + 10);
        let total = chunk_count(map.len());
        assert_eq!(total, 2);
        let first = chunk_for_index(&map, 0).unwrap();
        assert!(!first.is_last);
        assert_eq!(first.bytes.len(), MAP_CHUNK_SIZE);
        let last = chunk_for_index(&map, 1).unwrap();
        assert!(last.is_last);
        assert_eq!(last.bytes.len(), 10);
    }

    #[test]
    fn faulty_requests_are_dropped() {
        let map = map_of(MAP_CHUNK_SIZE);
        assert!(chunk_for_index(&map, -1).is_none());
        assert!(chunk_for_index(&map, 999).is_none());
    }

    #[test]
    fn high_bandwidth_push_honors_window() {
        let map = map_of(MAP_CHUNK_SIZE * 10);
        let mut cursor = MapCursor::default();
        cursor.last_ask_chunk = 0;
        cursor.last_ask_tick = 0;
        let pushed = push_chunks(&mut cursor, &map, 5, 0, 50);
        assert_eq!(pushed.len(), 5);
        assert_eq!(cursor.last_sent_chunk, 5);

        cursor.last_ask_chunk = 3;
        cursor.last_ask_tick = 1;
        let pushed = push_chunks(&mut cursor, &map, 5, 1, 50);
        assert_eq!(pushed.len(), 3); // chunks 5..7 inclusive -> 3 more
        assert_eq!(cursor.last_sent_chunk, 8);
    }

    #[test]
    fn retransmit_guard_rewinds_after_stall() {
        let map = map_of(MAP_CHUNK_SIZE * 10);
        let mut cursor = MapCursor {
            last_ask_chunk: 2,
            last_sent_chunk: 6,
            last_ask_tick: 0,
        };
        // Client hasn't asked in >= 50 ticks: rewind last_sent to last_ask.
        let pushed = push_chunks(&mut cursor, &map, 5, 60, 50);
        assert_eq!(cursor.last_sent_chunk, 7);
        assert!(!pushed.is_empty());
    }
}
