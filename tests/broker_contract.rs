use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::timeout;

use membus::Broker;
use membus::config::BrokerSettings;

const TEST_DEADLINE: Duration = Duration::from_secs(60);

/// Handler that counts invocations and fires a oneshot once `expected`
/// messages have arrived.
fn counting_handler(
    counter: Arc<AtomicUsize>,
    expected: usize,
    done: oneshot::Sender<()>,
) -> impl FnMut(usize) + Send + 'static {
    let mut done = Some(done);
    move |_msg| {
        let seen = counter.fetch_add(1, Ordering::Relaxed) + 1;
        if seen == expected {
            if let Some(done) = done.take() {
                let _ = done.send(());
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fanout_across_topics_loses_nothing() {
    membus::utils::logging::init("info");

    let count = 100_000;
    let broker: Broker<usize> = Broker::new();

    let c1 = Arc::new(AtomicUsize::new(0));
    let c2 = Arc::new(AtomicUsize::new(0));
    let c3 = Arc::new(AtomicUsize::new(0));
    let (d1_tx, d1) = oneshot::channel();
    let (d2_tx, d2) = oneshot::channel();
    let (d3_tx, d3) = oneshot::channel();

    let sub1 = broker.subscribe("topic1", counting_handler(c1.clone(), count, d1_tx));
    let sub2 = broker.subscribe("topic1", counting_handler(c2.clone(), count, d2_tx));
    let sub3 = broker.subscribe("topic2", counting_handler(c3.clone(), count, d3_tx));

    for i in 0..count {
        broker.publish("topic1", i).await;
        broker.publish("topic2", i).await;
    }

    timeout(TEST_DEADLINE, async {
        d1.await.unwrap();
        d2.await.unwrap();
        d3.await.unwrap();
    })
    .await
    .expect("handlers did not drain in time");

    assert_eq!(c1.load(Ordering::Relaxed), count);
    assert_eq!(c2.load(Ordering::Relaxed), count);
    assert_eq!(c3.load(Ordering::Relaxed), count);

    sub1.unsubscribe();
    sub2.unsubscribe();
    sub3.unsubscribe();
    assert_eq!(broker.subscriber_count("topic1"), 0);
    assert_eq!(broker.subscriber_count("topic2"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subscribes_register_every_subscription() {
    let count = 10_000;
    let broker: Broker<usize> = Broker::new();

    let mut tasks = JoinSet::new();
    for _ in 0..count {
        let broker = broker.clone();
        tasks.spawn(async move { broker.subscribe("topic1", |_| {}) });
    }

    let mut subs = Vec::with_capacity(count);
    while let Some(sub) = tasks.join_next().await {
        subs.push(sub.unwrap());
    }

    assert_eq!(broker.subscriber_count("topic1"), count);

    let mut tasks = JoinSet::new();
    for sub in subs {
        tasks.spawn(async move { sub.unsubscribe() });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    assert_eq!(broker.subscriber_count("topic1"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_delivery_after_unsubscribe() {
    let broker: Broker<usize> = Broker::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let (done_tx, done) = oneshot::channel();

    let sub = broker.subscribe("topic1", counting_handler(counter.clone(), 1, done_tx));

    broker.publish("topic1", 0).await;
    timeout(TEST_DEADLINE, done).await.unwrap().unwrap();
    assert_eq!(counter.load(Ordering::Relaxed), 1);

    sub.unsubscribe();
    broker.publish("topic1", 1).await;
    assert_eq!(counter.load(Ordering::Relaxed), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn publish_racing_unsubscribe_neither_panics_nor_hangs() {
    let broker: Broker<usize> = Broker::new();

    let subs: Vec<_> = (0..64)
        .map(|_| broker.subscribe("contended", |_| {}))
        .collect();

    let publisher = {
        let broker = broker.clone();
        tokio::spawn(async move {
            for i in 0..1_000 {
                broker.publish("contended", i).await;
            }
        })
    };

    for sub in subs {
        tokio::task::yield_now().await;
        sub.unsubscribe();
    }

    timeout(TEST_DEADLINE, publisher)
        .await
        .expect("publisher hung against concurrent unsubscribes")
        .unwrap();
    assert_eq!(broker.subscriber_count("contended"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_handler_blocks_only_its_own_topic() {
    let broker: Broker<usize> = Broker::new();

    let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
    let _slow = broker.subscribe("slow", move |_| {
        gate_rx.recv().unwrap();
    });

    let (fast_tx, mut fast_rx) = tokio::sync::mpsc::unbounded_channel();
    let _fast = broker.subscribe("fast", move |msg| {
        fast_tx.send(msg).unwrap();
    });

    // Fill the slow subscriber: one message held by its handler, one parked in
    // the single-slot mailbox, a third publish left waiting for the slot.
    broker.publish("slow", 0).await;
    broker.publish("slow", 1).await;
    let stalled = {
        let broker = broker.clone();
        tokio::spawn(async move { broker.publish("slow", 2).await })
    };

    // The other topic keeps flowing while the slow publisher is stuck.
    broker.publish("fast", 99).await;
    let got = timeout(TEST_DEADLINE, fast_rx.recv())
        .await
        .expect("fast topic starved by slow handler")
        .unwrap();
    assert_eq!(got, 99);
    assert!(!stalled.is_finished());

    // Open the gate and let the slow subscriber drain.
    gate_tx.send(()).unwrap();
    gate_tx.send(()).unwrap();
    gate_tx.send(()).unwrap();
    timeout(TEST_DEADLINE, stalled).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delivery_timeout_unblocks_publishers_when_configured() {
    let broker: Broker<usize> = Broker::with_settings(BrokerSettings {
        mailbox_capacity: 1,
        delivery_timeout_ms: Some(50),
    });

    // Handler that never returns: its mailbox fills and stays full.
    let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
    let _stuck = broker.subscribe("wedged", move |_| {
        let _ = gate_rx.recv();
    });

    // With a delivery timeout the broker drops messages for the wedged
    // subscriber instead of blocking the publisher forever.
    for i in 0..10 {
        broker.publish("wedged", i).await;
    }

    drop(gate_tx);
}
