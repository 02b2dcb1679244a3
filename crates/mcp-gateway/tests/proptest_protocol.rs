//! Property tests for the codec and pagination invariants.

use bytes::Bytes;
use proptest::prelude::*;
use uuid::Uuid;

use mcp_gateway::pagination::{decode_cursor, encode_cursor, paginate};
use mcp_gateway::protocol::stream::{decode_binary_frame, encode_binary_frame};
use mcp_gateway::session::buffer::{BufferedEvent, MessageBuffer};

proptest! {
    #[test]
    fn cursor_round_trips(offset in 0usize..1_000_000_000) {
        let cursor = encode_cursor(offset);
        prop_assert_eq!(decode_cursor(Some(&cursor)), offset);
    }

    #[test]
    fn arbitrary_cursor_never_panics(cursor in "\\PC*") {
        let _ = decode_cursor(Some(&cursor));
    }

    #[test]
    fn pagination_partitions_any_list(len in 0usize..500, page_size in 1usize..100) {
        let items: Vec<usize> = (0..len).collect();
        let mut walked = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = paginate(&items, cursor.as_deref(), Some(page_size));
            walked.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        prop_assert_eq!(walked, items);
    }

    #[test]
    fn binary_frame_round_trips(
        raw_id in any::<u128>(),
        index in any::<u64>(),
        payload in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let stream_id = Uuid::from_u128(raw_id);
        let frame = Bytes::from(encode_binary_frame(stream_id, index, &payload));
        let chunk = decode_binary_frame(&frame).unwrap();
        prop_assert_eq!(chunk.stream_id, stream_id);
        prop_assert_eq!(chunk.index, index);
        prop_assert_eq!(chunk.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn buffer_keeps_last_n_in_order(additions in 1usize..300, capacity in 1usize..50) {
        let mut buffer = MessageBuffer::new(capacity);
        for n in 0..additions {
            buffer.add(BufferedEvent::new(format!("s-{n}"), "message", "{}"));
        }

        let kept = buffer.events_after(None);
        let expected = additions.min(capacity);
        prop_assert_eq!(kept.len(), expected);

        let first_kept = additions - expected;
        for (i, event) in kept.iter().enumerate() {
            prop_assert_eq!(&event.event_id, &format!("s-{}", first_kept + i));
        }
    }

    #[test]
    fn replay_is_strict_suffix(total in 1usize..100, ack in 0usize..100) {
        let mut buffer = MessageBuffer::new(200);
        for n in 0..total {
            buffer.add(BufferedEvent::new(format!("s-{n}"), "message", "{}"));
        }

        let replay = buffer.events_after(Some(&format!("s-{ack}")));
        if ack < total {
            // Known id: everything strictly after it.
            prop_assert_eq!(replay.len(), total - ack - 1);
        } else {
            // Unknown id: full buffer.
            prop_assert_eq!(replay.len(), total);
        }
    }
}
