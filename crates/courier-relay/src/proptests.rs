use proptest::prelude::*;
use tokio::sync::{mpsc, watch};

use crate::hub::{EndpointHandle, Hub, Targeted};

fn targeted(to: &str, from: &str, frame: String) -> Targeted {
    Targeted {
        to: to.to_string(),
        from: from.to_string(),
        msg_id: String::new(),
        frame,
    }
}

proptest! {
    // Frames targeted at a disconnected recipient drain FIFO on its next
    // register; any that the fresh outbound queue cannot take are a
    // contiguous suffix, never an interior gap.
    #[test]
    fn offline_drain_is_fifo_with_contiguous_tail_loss(
        frame_count in 1usize..40,
        queue_capacity in 1usize..40,
    ) {
        let (mut hub, _handle) = Hub::new();

        let frames: Vec<String> = (0..frame_count).map(|i| format!("frame-{i}")).collect();
        for frame in &frames {
            hub.handle_targeted(targeted("receiver", "sender", frame.clone()));
        }
        prop_assert_eq!(hub.offline_len("receiver"), frame_count);

        let (tx, mut rx) = mpsc::channel(queue_capacity);
        let (close_tx, _close_rx) = watch::channel(false);
        hub.handle_register(EndpointHandle::new("receiver".to_string(), 1, tx, close_tx));

        let mut received = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let axum::extract::ws::Message::Text(text) = msg {
                received.push(text);
            }
        }

        // delivered frames are exactly a prefix of the sent order
        prop_assert_eq!(received.len(), frame_count.min(queue_capacity));
        prop_assert_eq!(&received[..], &frames[..received.len()]);
        // nothing is re-queued
        prop_assert_eq!(hub.offline_len("receiver"), 0);
    }

    // Interleaving registers, unregisters and targeted frames never leaves
    // two live endpoints for one identifier.
    #[test]
    fn at_most_one_endpoint_per_id(
        operations in prop::collection::vec(0u8..3, 1..60),
    ) {
        let (mut hub, _handle) = Hub::new();
        let mut next_conn = 1u64;
        let mut keepalive = Vec::new();

        for op in operations {
            match op {
                0 => {
                    let (tx, rx) = mpsc::channel(4);
                    let (close_tx, close_rx) = watch::channel(false);
                    hub.handle_register(EndpointHandle::new(
                        "contested".to_string(),
                        next_conn,
                        tx,
                        close_tx,
                    ));
                    keepalive.push((rx, close_rx));
                    next_conn += 1;
                }
                1 => {
                    // a stale unregister for some past connection
                    hub.handle_unregister(crate::hub::Unregister {
                        conn_id: next_conn.saturating_sub(2).max(1),
                        id: "contested".to_string(),
                    });
                }
                _ => {
                    hub.handle_targeted(targeted("contested", "someone", "x".to_string()));
                }
            }

            let live = hub.connected_ids_for_test("contested");
            prop_assert!(live <= 1, "found {live} live endpoints for one id");
        }
    }
}
