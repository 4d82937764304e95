#![cfg(feature = "memory")]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_stream::StreamExt;

use dog_mq::{
    HandlerCtx, HandlerError, JsonCodec, MemoryBackend, Message, MessageCodec, MessageId, QueueAdapter,
    QueueBackend, QueueConfig, QueueEvent,
};

/// Test factory functions
fn fast_config() -> QueueConfig {
    QueueConfig::new()
        .with_pop_timeout(Duration::from_millis(50))
        .with_delayed_poll_interval(Duration::from_millis(20))
        .with_retry_base_delay(Duration::from_millis(50))
}

fn create_queue(config: QueueConfig) -> QueueAdapter<MemoryBackend> {
    QueueAdapter::new(MemoryBackend::new(), config).unwrap()
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "Timeout waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Published payloads reach the subscribed handler unchanged
#[tokio::test]
async fn test_published_payloads_are_delivered() {
    let queue = create_queue(fast_config());
    let received = Arc::new(Mutex::new(Vec::new()));

    let sink = received.clone();
    queue
        .subscribe("orders", move |_ctx: HandlerCtx, message: Message| {
            let sink = sink.clone();
            async move {
                sink.lock().push(message.payload);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    for i in 0..20u8 {
        queue.publish("orders", vec![i, 0xff]).await.unwrap();
    }

    wait_until("20 deliveries", || received.lock().len() == 20).await;

    let mut payloads = received.lock().clone();
    payloads.sort();
    let expected: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i, 0xff]).collect();
    assert_eq!(payloads, expected);
    assert_eq!(queue.backend().list_len("queue:orders"), 0);

    queue.close().await.unwrap();
}

/// Messages published before anyone subscribes wait in the ready list
#[tokio::test]
async fn test_messages_wait_for_first_subscriber() {
    let queue = create_queue(fast_config());
    queue.publish("orders", "early").await.unwrap();
    assert_eq!(queue.backend().list_len("queue:orders"), 1);

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    queue
        .subscribe("orders", move |_ctx: HandlerCtx, _message: Message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    wait_until("delivery", || calls.load(Ordering::SeqCst) == 1).await;
    queue.close().await.unwrap();
}

/// A delayed message is not delivered before its due time, and shortly after it
#[tokio::test]
async fn test_delayed_message_respects_due_time() {
    let queue = create_queue(fast_config());
    let delivered_at = Arc::new(Mutex::new(None));

    let slot = delivered_at.clone();
    queue
        .subscribe("notify", move |_ctx: HandlerCtx, _message: Message| {
            let slot = slot.clone();
            async move {
                *slot.lock() = Some(Instant::now());
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    let delay = Duration::from_millis(300);
    let published_at = Instant::now();
    queue.publish_delayed("notify", "hello", delay).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(delivered_at.lock().is_none(), "delivered before due time");

    wait_until("delayed delivery", || delivered_at.lock().is_some()).await;
    let elapsed = delivered_at.lock().map(|at| at - published_at).unwrap();

    assert!(elapsed >= delay, "delivered after {:?}", elapsed);
    assert!(elapsed < delay + Duration::from_secs(1), "delivered after {:?}", elapsed);

    queue.close().await.unwrap();
}

/// A delayed message published with no subscriber is delivered once one appears
#[tokio::test]
async fn test_delayed_message_before_subscriber() {
    let queue = create_queue(fast_config());
    let start = Instant::now();
    queue
        .publish_delayed("notify", "hello", Duration::from_millis(200))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    // Promoted, waiting on the ready list
    assert_eq!(queue.backend().sorted_set_len("delayed_queue"), 0);
    assert_eq!(queue.backend().list_len("queue:notify"), 1);

    let received = Arc::new(Mutex::new(None));
    let slot = received.clone();
    queue
        .subscribe("notify", move |_ctx: HandlerCtx, message: Message| {
            let slot = slot.clone();
            async move {
                *slot.lock() = Some((Instant::now(), message.payload));
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    wait_until("delivery", || received.lock().is_some()).await;
    let (at, payload) = received.lock().clone().unwrap();
    assert!(at - start >= Duration::from_millis(200));
    assert_eq!(payload, b"hello".to_vec());

    queue.close().await.unwrap();
}

/// A handler that fails twice then succeeds is called three times, no dead letter
#[tokio::test]
async fn test_transient_failures_recover() {
    let queue = create_queue(fast_config());
    let seen_retries = Arc::new(Mutex::new(Vec::new()));

    let seen = seen_retries.clone();
    queue
        .subscribe("orders", move |_ctx: HandlerCtx, message: Message| {
            let seen = seen.clone();
            async move {
                seen.lock().push(message.retries);
                if message.retries < 2 {
                    Err(HandlerError::retryable("gateway unavailable"))
                } else {
                    Ok(())
                }
            }
        })
        .unwrap();

    queue.publish_with_retries("orders", "x", 2).await.unwrap();

    wait_until("third call", || seen_retries.lock().len() == 3).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(*seen_retries.lock(), vec![0, 1, 2]);
    assert_eq!(queue.backend().list_len("dead_letter:orders"), 0);
    assert_eq!(queue.metrics().retried, 2);
    assert_eq!(queue.metrics().delivered, 1);

    queue.close().await.unwrap();
}

/// An always-failing handler is retried max_retries times, then dead-lettered once
#[tokio::test]
async fn test_retry_budget_then_single_dead_letter() {
    let queue = create_queue(fast_config());
    let seen_retries = Arc::new(Mutex::new(Vec::new()));

    let seen = seen_retries.clone();
    queue
        .subscribe("orders", move |_ctx: HandlerCtx, message: Message| {
            let seen = seen.clone();
            async move {
                seen.lock().push(message.retries);
                Err::<(), _>(HandlerError::retryable(format!("attempt {} failed", message.retries)))
            }
        })
        .unwrap();

    let id = queue.publish_with_retries("orders", "x", 3).await.unwrap();

    wait_until("dead letter", || queue.backend().list_len("dead_letter:orders") == 1).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(*seen_retries.lock(), vec![0, 1, 2, 3]);
    let dead = queue.backend().list_items("dead_letter:orders");
    assert_eq!(dead.len(), 1);
    let record = JsonCodec.decode_dead_letter(&dead[0]).unwrap();
    assert_eq!(record.message.id, id);
    assert_eq!(record.message.retries, 3);
    assert_eq!(record.error, "attempt 3 failed");

    assert_eq!(queue.backend().list_len("queue:orders"), 0);
    assert_eq!(queue.backend().sorted_set_len("delayed_queue"), 0);

    queue.close().await.unwrap();
}

/// A budget of one: two calls, one dead letter
#[tokio::test]
async fn test_single_retry_budget() {
    let queue = create_queue(fast_config());
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    queue
        .subscribe("orders", move |_ctx: HandlerCtx, _message: Message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(HandlerError::retryable("still broken"))
            }
        })
        .unwrap();

    queue.publish_with_retries("orders", "x", 1).await.unwrap();

    wait_until("dead letter", || queue.backend().list_len("dead_letter:orders") == 1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let record = JsonCodec
        .decode_dead_letter(&queue.backend().list_items("dead_letter:orders")[0])
        .unwrap();
    assert_eq!(record.error, "still broken");

    queue.close().await.unwrap();
}

/// Permanent failures skip the remaining budget
#[tokio::test]
async fn test_permanent_failure_dead_letters_immediately() {
    let queue = create_queue(fast_config());
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    queue
        .subscribe("orders", move |_ctx: HandlerCtx, _message: Message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(HandlerError::permanent("malformed order"))
            }
        })
        .unwrap();

    queue.publish_with_retries("orders", "x", 5).await.unwrap();

    wait_until("dead letter", || queue.backend().list_len("dead_letter:orders") == 1).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(queue.metrics().retried, 0);

    queue.close().await.unwrap();
}

/// Retried copies keep id, topic, payload and creation time
#[tokio::test]
async fn test_retry_preserves_envelope_identity() {
    let queue = create_queue(fast_config());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    queue
        .subscribe("orders", move |_ctx: HandlerCtx, message: Message| {
            let sink = sink.clone();
            async move {
                let retries = message.retries;
                sink.lock().push(message);
                if retries < 2 {
                    Err(HandlerError::retryable("again"))
                } else {
                    Ok(())
                }
            }
        })
        .unwrap();

    let id: MessageId = queue.publish_with_retries("orders", vec![0u8, 159, 146, 150], 3).await.unwrap();

    wait_until("three attempts", || seen.lock().len() == 3).await;

    let attempts = seen.lock().clone();
    let first = &attempts[0];
    assert_eq!(first.id, id);
    for (n, attempt) in attempts.iter().enumerate() {
        assert_eq!(attempt.id, first.id);
        assert_eq!(attempt.topic, "orders");
        assert_eq!(attempt.payload, vec![0u8, 159, 146, 150]);
        assert_eq!(attempt.created_at, first.created_at);
        assert_eq!(attempt.max_retries, 3);
        assert_eq!(attempt.retries, n as u32);
    }

    queue.close().await.unwrap();
}

/// Every handler sees every message, and only the failing one is retried
#[tokio::test]
async fn test_fan_out_retries_independently() {
    let queue = create_queue(fast_config());
    let audit_calls = Arc::new(AtomicU32::new(0));
    let billing_calls = Arc::new(AtomicU32::new(0));

    let counter = audit_calls.clone();
    queue
        .subscribe("orders", move |_ctx: HandlerCtx, _message: Message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    let counter = billing_calls.clone();
    queue
        .subscribe("orders", move |_ctx: HandlerCtx, message: Message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if message.retries == 0 {
                    Err(HandlerError::retryable("ledger locked"))
                } else {
                    Ok(())
                }
            }
        })
        .unwrap();

    queue.publish("orders", "x").await.unwrap();

    wait_until("billing retry", || billing_calls.load(Ordering::SeqCst) == 2).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(audit_calls.load(Ordering::SeqCst), 1);
    assert_eq!(billing_calls.load(Ordering::SeqCst), 2);
    assert_eq!(queue.backend().list_len("dead_letter:orders"), 0);

    queue.close().await.unwrap();
}

/// No more than max_workers handlers run at once; extra messages wait, none are lost
#[tokio::test]
async fn test_worker_pool_bounds_concurrency() {
    let queue = create_queue(fast_config().with_max_workers(2));
    let gate = Arc::new(Semaphore::new(0));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    let (g, r, p, d) = (gate.clone(), running.clone(), peak.clone(), done.clone());
    queue
        .subscribe("reports", move |_ctx: HandlerCtx, _message: Message| {
            let (gate, running, peak, done) = (g.clone(), r.clone(), p.clone(), d.clone());
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let permit = gate.acquire().await.map_err(|e| HandlerError::retryable(e.to_string()))?;
                permit.forget();
                running.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    for _ in 0..4 {
        queue.publish("reports", "slow").await.unwrap();
    }

    wait_until("pool saturated", || running.load(Ordering::SeqCst) == 2).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Two blocked in handlers, one popped and waiting for a slot, one still queued
    assert_eq!(running.load(Ordering::SeqCst), 2);
    assert_eq!(queue.metrics().in_flight, 2);
    assert_eq!(queue.backend().list_len("queue:reports"), 1);

    gate.add_permits(1);
    wait_until("slot reused", || done.load(Ordering::SeqCst) == 1).await;
    wait_until("next dispatched", || running.load(Ordering::SeqCst) == 2).await;

    gate.add_permits(3);
    wait_until("all done", || done.load(Ordering::SeqCst) == 4).await;

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(queue.backend().list_len("queue:reports"), 0);

    queue.close().await.unwrap();
}

/// Handlers past their deadline count as retryable failures
#[tokio::test]
async fn test_handler_timeout_is_retried() {
    let queue = create_queue(fast_config().with_handler_timeout(Duration::from_millis(50)));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    queue
        .subscribe("slow", move |_ctx: HandlerCtx, message: Message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if message.retries == 0 {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    queue.publish("slow", "x").await.unwrap();

    wait_until("retry after timeout", || calls.load(Ordering::SeqCst) == 2).await;
    wait_until("delivered", || queue.metrics().delivered == 1).await;
    assert_eq!(queue.metrics().retried, 1);

    queue.close().await.unwrap();
}

/// Undecodable bytes on a ready list are dropped without reaching handlers
#[tokio::test]
async fn test_malformed_envelope_dropped() {
    let queue = create_queue(fast_config());
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    queue
        .subscribe("orders", move |_ctx: HandlerCtx, _message: Message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    queue.backend().push("queue:orders", b"not json".to_vec()).await.unwrap();
    queue.publish("orders", "good").await.unwrap();

    wait_until("good message", || calls.load(Ordering::SeqCst) == 1).await;
    wait_until("drop recorded", || queue.metrics().dropped == 1).await;
    assert_eq!(queue.backend().list_len("dead_letter:orders"), 0);

    queue.close().await.unwrap();
}

/// Close returns only after in-flight handlers finish
#[tokio::test]
async fn test_close_waits_for_in_flight_handlers() {
    let queue = create_queue(fast_config());
    let started = Arc::new(AtomicU32::new(0));
    let finished = Arc::new(AtomicU32::new(0));

    let (s, f) = (started.clone(), finished.clone());
    queue
        .subscribe("orders", move |ctx: HandlerCtx, _message: Message| {
            let (started, finished) = (s.clone(), f.clone());
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                // Shutdown is visible but does not cut the call short
                assert!(ctx.is_shutting_down());
                finished.fetch_add(1, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    queue.publish("orders", "x").await.unwrap();
    wait_until("handler start", || started.load(Ordering::SeqCst) == 1).await;

    queue.close().await.unwrap();

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(queue.metrics().in_flight, 0);
    assert!(queue.subscribe("orders", |_ctx: HandlerCtx, _m: Message| async { Ok::<(), HandlerError>(()) }).is_err());
}

/// Due delayed messages left at shutdown stay in the store
#[tokio::test]
async fn test_close_leaves_pending_delayed_messages() {
    let backend = MemoryBackend::new();
    let queue = QueueAdapter::new(backend.clone(), fast_config()).unwrap();

    queue
        .publish_delayed("notify", "tomorrow", Duration::from_secs(86_400))
        .await
        .unwrap();
    queue.close().await.unwrap();

    assert_eq!(backend.sorted_set_len("delayed_queue"), 1);

    // A new process against the same store picks it up
    let next = QueueAdapter::new(backend.clone(), fast_config()).unwrap();
    assert_eq!(next.backend().sorted_set_len("delayed_queue"), 1);
    next.close().await.unwrap();
}

/// The event stream reports the life of a message
#[tokio::test]
async fn test_event_stream_follows_message() {
    let queue = create_queue(fast_config());
    let mut events = queue.events();

    queue
        .subscribe("orders", |_ctx: HandlerCtx, message: Message| async move {
            if message.retries == 0 {
                Err(HandlerError::retryable("first try"))
            } else {
                Ok(())
            }
        })
        .unwrap();

    let id = queue.publish("orders", "x").await.unwrap();

    let mut names = Vec::new();
    while names.last() != Some(&"delivered") {
        let event: QueueEvent = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .expect("Timeout waiting for event")
            .expect("Stream ended");
        assert_eq!(event.message_id(), Some(&id));
        names.push(event.event_name());
    }

    assert_eq!(names, vec!["published", "scheduled", "retrying", "promoted", "delivered"]);
    queue.close().await.unwrap();
}
