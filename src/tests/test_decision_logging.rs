use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

use super::runtime::block_on;
use crate::{
    BucketKey, Capacity, LocalTokenBucket, LocalTokenBucketOptions, LockTtl, ManualClock,
    MemoryBucketStore, RefillRate, SharedTokenBucket, SharedTokenBucketOptions, TokenBucket,
};

#[derive(Debug, Clone, PartialEq)]
struct Captured {
    level: Level,
    message: String,
}

struct CaptureLayer {
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        struct Visitor(String);
        impl tracing::field::Visit for Visitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }

        let mut visitor = Visitor(String::new());
        event.record(&mut visitor);
        self.captured.lock().unwrap().push(Captured {
            level: *event.metadata().level(),
            message: visitor.0,
        });
    }
}

fn capture<F: FnOnce()>(f: F) -> Vec<Captured> {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(CaptureLayer {
        captured: captured.clone(),
    });

    tracing::subscriber::with_default(subscriber, f);

    let events = captured.lock().unwrap().clone();
    events
}

fn decisions(events: &[Captured], prefix: &str) -> Vec<Captured> {
    events
        .iter()
        .filter(|e| e.message.starts_with(prefix))
        .cloned()
        .collect()
}

#[test]
fn local_decisions_log_allow_and_deny_at_debug() {
    let clock = Arc::new(ManualClock::new(Duration::from_secs(1_000)));
    let bucket = LocalTokenBucket::with_clock(
        LocalTokenBucketOptions {
            capacity: Capacity::try_from(1).unwrap(),
            refill_rate: RefillRate::try_from(1).unwrap(),
        },
        clock,
    );

    let events = capture(|| {
        assert!(bucket.allow());
        assert!(!bucket.allow());
    });

    let local = decisions(&events, "local.decide");
    assert_eq!(
        local,
        [
            Captured {
                level: Level::DEBUG,
                message: "local.decide, allowed".to_string(),
            },
            Captured {
                level: Level::DEBUG,
                message: "local.decide, bucket empty".to_string(),
            },
        ]
    );
}

#[test]
fn both_backends_log_decisions_at_the_same_level() {
    let clock = Arc::new(ManualClock::new(Duration::from_secs(1_000)));
    let local = LocalTokenBucket::with_clock(
        LocalTokenBucketOptions {
            capacity: Capacity::try_from(1).unwrap(),
            refill_rate: RefillRate::try_from(1).unwrap(),
        },
        clock.clone(),
    );
    let store = MemoryBucketStore::with_clock(clock.clone());

    let events = capture(|| {
        block_on(async {
            let shared = SharedTokenBucket::with_clock(
                store,
                BucketKey::try_from("k").unwrap(),
                SharedTokenBucketOptions {
                    capacity: Capacity::try_from(1).unwrap(),
                    refill_rate: RefillRate::try_from(1).unwrap(),
                    lock_ttl: LockTtl::default(),
                },
                clock.clone(),
            )
            .await
            .unwrap();

            for _ in 0..2 {
                local.decide().await.unwrap();
                shared.decide().await.unwrap();
            }
        });
    });

    let local_levels: Vec<_> = decisions(&events, "local.decide")
        .into_iter()
        .map(|e| e.level)
        .collect();
    let shared_levels: Vec<_> = decisions(&events, "shared.decide")
        .into_iter()
        .map(|e| e.level)
        .collect();

    assert_eq!(local_levels.len(), 2);
    assert_eq!(local_levels, shared_levels);
}
