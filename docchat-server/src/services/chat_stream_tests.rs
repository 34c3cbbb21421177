use std::{sync::Arc, time::Duration};

use chrono::DateTime;
use futures_util::StreamExt;
use serde_json::json;
use shared::models::StreamEvent;
use tokio::time::timeout;
use uuid::Uuid;

use super::chat_stream::{ChatStreamManager, Delivery, StreamSettings};

fn manager(queue_capacity: usize) -> Arc<ChatStreamManager> {
    Arc::new(ChatStreamManager::new(StreamSettings {
        heartbeat_interval: Duration::ZERO,
        queue_capacity,
        max_heartbeats: 3,
    }))
}

fn message(content: &str) -> StreamEvent {
    StreamEvent::message(&json!({ "content": content })).unwrap()
}

fn content_of(delivery: Option<Delivery>) -> String {
    match delivery {
        Some(Delivery::Event(StreamEvent::Message { data })) => {
            data["content"].as_str().unwrap_or_default().to_string()
        }
        other => panic!("expected message delivery, got {other:?}"),
    }
}

#[tokio::test]
async fn publish_without_subscribers_is_a_noop() {
    let streams = manager(4);
    let chat_id = Uuid::new_v4();

    streams.publish(chat_id, message("nobody listening"));

    assert_eq!(streams.total_connections(), 0);
    assert!(!streams.has_chat(chat_id));
}

#[tokio::test]
async fn events_arrive_in_publish_order() {
    let streams = manager(16);
    let chat_id = Uuid::new_v4();
    let mut subscription = streams.subscribe(chat_id);

    for index in 0..10 {
        streams.publish(chat_id, message(&format!("event-{index}")));
    }

    for index in 0..10 {
        let delivery = timeout(Duration::from_secs(1), subscription.recv())
            .await
            .expect("delivery");
        assert_eq!(content_of(delivery), format!("event-{index}"));
    }
    assert!(!subscription.should_disconnect());
}

#[tokio::test]
async fn queue_never_exceeds_capacity() {
    let streams = manager(4);
    let chat_id = Uuid::new_v4();
    let subscription = streams.subscribe(chat_id);

    for index in 0..20 {
        streams.publish(chat_id, message(&index.to_string()));
    }

    assert_eq!(subscription.queued(), 4);
    assert!(subscription.should_disconnect());
}

#[tokio::test]
async fn overflow_flags_subscriber_and_keeps_first_event() {
    let streams = manager(1);
    let chat_id = Uuid::new_v4();
    let mut subscription = streams.subscribe(chat_id);

    streams.publish(chat_id, message("first"));
    streams.publish(chat_id, message("second"));

    assert!(subscription.should_disconnect());
    assert_eq!(subscription.queued(), 1);
    assert_eq!(content_of(subscription.try_recv()), "first");
    assert!(subscription.try_recv().is_none());
}

#[tokio::test]
async fn evicted_subscriber_keeps_receiving_until_consumer_notices() {
    let streams = manager(2);
    let chat_id = Uuid::new_v4();
    let mut subscription = streams.subscribe(chat_id);

    streams.publish(chat_id, message("a"));
    streams.publish(chat_id, message("b"));
    streams.publish(chat_id, message("dropped"));
    assert!(subscription.should_disconnect());

    assert_eq!(content_of(subscription.try_recv()), "a");
    streams.publish(chat_id, message("late"));

    assert_eq!(content_of(subscription.try_recv()), "b");
    assert_eq!(content_of(subscription.try_recv()), "late");
    assert!(subscription.try_recv().is_none());
}

#[tokio::test]
async fn dropping_subscription_cleans_up_registry() {
    let streams = manager(4);
    let chat_id = Uuid::new_v4();

    let first = streams.subscribe(chat_id);
    let second = streams.subscribe(chat_id);
    assert_eq!(streams.total_connections(), 2);
    assert_eq!(streams.subscriber_count(chat_id), 2);

    drop(first);
    assert_eq!(streams.total_connections(), 1);
    assert!(streams.has_chat(chat_id));

    drop(second);
    assert_eq!(streams.total_connections(), 0);
    assert!(!streams.has_chat(chat_id));
    assert_eq!(streams.subscriber_count(chat_id), 0);
}

#[tokio::test]
async fn fan_out_is_isolated_between_subscribers() {
    let streams = manager(2);
    let chat_id = Uuid::new_v4();
    let mut fast = streams.subscribe(chat_id);
    let slow = streams.subscribe(chat_id);

    streams.publish(chat_id, message("one"));
    streams.publish(chat_id, message("two"));
    assert_eq!(content_of(fast.try_recv()), "one");
    assert_eq!(content_of(fast.try_recv()), "two");

    streams.publish(chat_id, message("three"));

    assert!(slow.should_disconnect());
    assert!(!fast.should_disconnect());
    assert_eq!(content_of(fast.try_recv()), "three");
}

#[tokio::test]
async fn subscribers_of_other_chats_see_nothing() {
    let streams = manager(4);
    let chat_a = Uuid::new_v4();
    let chat_b = Uuid::new_v4();
    let mut listener_a = streams.subscribe(chat_a);
    let mut listener_b = streams.subscribe(chat_b);

    streams.publish(chat_a, message("for a"));

    assert_eq!(content_of(listener_a.try_recv()), "for a");
    assert!(listener_b.try_recv().is_none());
}

#[tokio::test]
async fn heartbeat_yields_parseable_utc_timestamp() {
    let streams = manager(4);
    let mut heartbeats = streams.heartbeat();

    let event = timeout(Duration::from_secs(1), heartbeats.next())
        .await
        .expect("heartbeat within interval")
        .expect("stream is unbounded");

    let StreamEvent::Heartbeat { timestamp } = &event else {
        panic!("expected heartbeat, got {event:?}");
    };
    assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    assert_eq!(serde_json::to_value(&event).unwrap()["type"], "heartbeat");
}

#[tokio::test(start_paused = true)]
async fn heartbeat_waits_for_configured_interval() {
    let streams = Arc::new(ChatStreamManager::new(StreamSettings {
        heartbeat_interval: Duration::from_secs(25),
        queue_capacity: 4,
        max_heartbeats: 120,
    }));
    let mut heartbeats = streams.heartbeat();

    assert!(
        timeout(Duration::from_secs(24), heartbeats.next())
            .await
            .is_err()
    );
    assert!(
        timeout(Duration::from_secs(2), heartbeats.next())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn heartbeat_budget_is_reported_when_spent() {
    let streams = manager(4);
    let mut subscription = streams.subscribe(Uuid::new_v4());

    assert!(!subscription.record_heartbeat());
    assert!(!subscription.record_heartbeat());
    assert!(subscription.record_heartbeat());
    assert_eq!(subscription.heartbeat_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subscribe_and_drop_keeps_counts_consistent() {
    let streams = manager(8);
    let chat_id = Uuid::new_v4();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let streams = Arc::clone(&streams);
            tokio::spawn(async move {
                let subscription = streams.subscribe(chat_id);
                streams.publish(chat_id, message("ping"));
                tokio::task::yield_now().await;
                drop(subscription);
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(streams.total_connections(), 0);
    assert!(!streams.has_chat(chat_id));
}
