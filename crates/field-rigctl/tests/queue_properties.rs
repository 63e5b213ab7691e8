//! Property tests for the command queue
//!
//! Pipelined commands must resolve in submission order with exactly their own
//! data lines, however the daemon's reply stream is fragmented.

use std::time::Duration;

use field_rigctl::{CommandQueue, Request};
use proptest::prelude::*;
use tokio::sync::oneshot;
use tokio::time::Instant;

fn reply_stream(expected: &[usize]) -> Vec<u8> {
    let mut out = String::new();
    for (i, lines) in expected.iter().enumerate() {
        for j in 0..*lines {
            out.push_str(&format!("value-{}-{}\r\n", i, j));
        }
        out.push_str("RPRT 0\n");
    }
    out.into_bytes()
}

fn fragment(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|c| c % (bytes.len() + 1))
        .collect();
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for point in points {
        chunks.push(bytes[start..point].to_vec());
        start = point;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

proptest! {
    #[test]
    fn replies_resolve_in_fifo_order(
        expected in prop::collection::vec(0usize..3, 1..10),
        cuts in prop::collection::vec(any::<usize>(), 0..40),
    ) {
        let mut queue = CommandQueue::new(Duration::from_secs(2));
        let now = Instant::now();

        let mut writes = Vec::new();
        let mut receivers = Vec::new();
        for (i, lines) in expected.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            writes.extend(queue.enqueue(Request::new(format!("cmd{}", i), *lines), tx, now));
            receivers.push(rx);
        }
        prop_assert_eq!(writes.len(), 1);

        for chunk in fragment(&reply_stream(&expected), &cuts) {
            writes.extend(queue.push_bytes(&chunk, now));
        }

        let sent: Vec<String> = (0..expected.len()).map(|i| format!("cmd{}\n", i)).collect();
        prop_assert_eq!(writes, sent);
        prop_assert!(queue.is_empty());
        prop_assert!(!queue.is_in_flight());

        for (i, mut rx) in receivers.into_iter().enumerate() {
            let lines = rx.try_recv().expect("resolved").expect("success");
            let want: Vec<String> = (0..expected[i]).map(|j| format!("value-{}-{}", i, j)).collect();
            prop_assert_eq!(lines, want);
        }
    }

    #[test]
    fn every_command_resolves_once_at_timeout(
        expected in prop::collection::vec(0usize..3, 1..8),
    ) {
        let timeout = Duration::from_millis(500);
        let mut queue = CommandQueue::new(timeout);
        let start = Instant::now();

        let mut receivers = Vec::new();
        for (i, lines) in expected.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            let at = start + Duration::from_millis(i as u64);
            queue.enqueue(Request::new(format!("cmd{}", i), *lines), tx, at);
            receivers.push(rx);
        }

        // Each command's clock starts when the previous one times out
        for i in 0..expected.len() {
            prop_assert!(queue.next_deadline().is_some());
            queue.expire(start + timeout * (i as u32 + 1));
        }
        prop_assert!(queue.is_empty());

        for (i, mut rx) in receivers.into_iter().enumerate() {
            let result = rx.try_recv().expect("resolved exactly once");
            // sent with no data: success only when no data was expected
            prop_assert_eq!(result.is_ok(), expected[i] == 0);
        }
    }
}
