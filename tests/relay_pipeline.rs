//! Cross-task behavior of the relay queue: a producer and a consumer running
//! concurrently, backpressure under a stalled consumer, and shutdown wakeup.

use std::sync::Arc;
use std::time::Duration;

use wfb_bridge::{QueueError, RelayQueue};

#[tokio::test]
async fn producer_and_consumer_preserve_order_across_tasks() {
    let queue = Arc::new(RelayQueue::new(64, 256));
    let total = 500usize;

    let producer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            for i in 0..total {
                let payload = vec![(i % 251) as u8; 1 + i % 200];
                // Retry on backpressure so every payload eventually lands and
                // ordering stays checkable.
                while queue.enqueue(&payload).is_err() {
                    tokio::time::sleep(Duration::from_micros(200)).await;
                }
            }
        })
    };

    let consumer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            let mut out = vec![0u8; 256];
            for i in 0..total {
                let n = queue.dequeue(&mut out).await.expect("queue still open");
                assert_eq!(n, 1 + i % 200, "payload {i} length");
                assert!(
                    out[..n].iter().all(|&b| b == (i % 251) as u8),
                    "payload {i} contents"
                );
            }
        })
    };

    tokio::time::timeout(Duration::from_secs(10), async {
        producer.await.unwrap();
        consumer.await.unwrap();
    })
    .await
    .expect("pipeline should drain well before the deadline");
}

#[tokio::test]
async fn stalled_consumer_causes_counted_drops_not_blocking() {
    let queue = RelayQueue::new(8, 64);
    // No consumer: exactly capacity - 1 enqueues succeed.
    let mut accepted = 0;
    for i in 0..50u8 {
        if queue.enqueue(&[i]).is_ok() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 7);
    assert_eq!(queue.dropped(), 43);

    // Draining one slot admits exactly one more datagram.
    let mut out = vec![0u8; 64];
    queue.dequeue(&mut out).await.unwrap();
    assert!(queue.enqueue(b"late").is_ok());
    assert_eq!(queue.enqueue(b"too late"), Err(QueueError::Full));
}

#[tokio::test]
async fn shutdown_reaches_a_parked_consumer() {
    let queue = Arc::new(RelayQueue::new(16, 64));
    let consumer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            let mut out = vec![0u8; 64];
            queue.dequeue(&mut out).await
        })
    };

    // Give the consumer time to park on the empty queue.
    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.close();

    let result = tokio::time::timeout(Duration::from_secs(1), consumer)
        .await
        .expect("blocked consumer must observe shutdown")
        .unwrap();
    assert_eq!(result, Err(QueueError::Shutdown));
}
