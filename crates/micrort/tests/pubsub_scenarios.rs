// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish/subscribe scenarios through the public API.

use micrort::pubsub::{Always, Cutoff};
use micrort::{
    Core, CoreConfig, Error, HrtQos, ManualClock, SrtOutcome, TopicConfig, TopicId, ViolationKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SENSOR: TopicId = TopicId(1);

fn running_core(topic: TopicConfig) -> (Core, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let core = Core::builder()
        .config(CoreConfig::default().with_topic(SENSOR, topic))
        .clock(clock.clone())
        .build()
        .expect("core");
    core.add_topic(SENSOR).expect("topic");
    core.start().expect("start");
    (core, clock)
}

#[test]
fn test_hrt_and_srt_share_three_messages() {
    let (core, clock) = running_core(TopicConfig::default().with_capacity(4));
    let publisher = core.publisher(SENSOR).expect("publisher");
    let mut hrt = core.hrt_subscriber(SENSOR, HrtQos::default()).expect("hrt");
    let mut srt = core.srt_subscriber(SENSOR).expect("srt");

    for (i, payload) in [b"m1", b"m2", b"m3"].iter().enumerate() {
        if i > 0 {
            clock.advance(Duration::from_millis(1));
        }
        publisher.publish_now(*payload).expect("publish");
    }

    // SRT sees only the newest, aged but still above threshold.
    clock.advance(Duration::from_millis(3));
    let mut buf = [0u8; 8];
    match srt.poll(&mut buf).expect("poll") {
        SrtOutcome::Accepted { info, score } => {
            assert_eq!(&buf[..info.size], b"m3");
            assert_eq!(info.latency, Duration::from_millis(3));
            let age_ms = info.latency.as_secs_f64() * 1_000.0;
            assert_eq!(score, 1.0 / (age_ms + 1.0));
            assert!(score < 1.0);
        }
        other => panic!("expected Accepted, got {:?}", other),
    }
    assert_eq!(srt.poll(&mut buf).expect("poll"), SrtOutcome::NoMessage);

    // HRT sees all three, in order, with their age at consumption.
    let mut latencies = Vec::new();
    for expected in [b"m1", b"m2", b"m3"] {
        let info = hrt.try_receive(&mut buf).expect("receive").expect("queued");
        assert_eq!(&buf[..info.size], expected);
        latencies.push(info.latency);
    }
    assert_eq!(
        latencies,
        vec![
            Duration::from_millis(5),
            Duration::from_millis(4),
            Duration::from_millis(3)
        ]
    );
    assert_eq!(hrt.try_receive(&mut buf).expect("receive"), None);

    // Only the retained latest is still referenced.
    let snap = core.topic_snapshot(SENSOR).expect("snapshot");
    assert_eq!(snap.referenced_slots, 1);
    assert_eq!(snap.free_slots, 3);
    assert_eq!(snap.stats.published, 3);
    assert_eq!(snap.stats.hrt_delivered, 3);
    assert!(snap.is_consistent());
}

#[test]
fn test_stale_message_is_counted_not_returned() {
    let (core, clock) = running_core(TopicConfig::default());
    let publisher = core.publisher(SENSOR).expect("publisher");
    let mut srt = core.srt_subscriber(SENSOR).expect("srt");

    publisher.publish_now(b"old").expect("publish");
    // 1/(age_ms + 1) = 1/21 < 0.1
    clock.advance(Duration::from_millis(20));

    let mut buf = [0u8; 8];
    assert!(matches!(
        srt.poll(&mut buf).expect("poll"),
        SrtOutcome::Stale { .. }
    ));
    assert_eq!(srt.stats().stale_discarded, 1);
    assert_eq!(srt.stats().received, 0);
    assert_eq!(
        core.topic_snapshot(SENSOR).expect("snapshot").stats.stale_discarded,
        1
    );
}

#[test]
fn test_custom_evaluators() {
    let (core, clock) = running_core(TopicConfig::default());
    let publisher = core.publisher(SENSOR).expect("publisher");
    let mut always = core.srt_subscriber_with(SENSOR, Always, 0.5).expect("always");
    let mut cutoff = core
        .srt_subscriber_with(
            SENSOR,
            Cutoff {
                max_age: Duration::from_millis(10),
            },
            0.5,
        )
        .expect("cutoff");
    let mut closure = core
        .srt_subscriber_with(SENSOR, |age: Duration| if age.is_zero() { 1.0 } else { 0.0 }, 0.5)
        .expect("closure");

    publisher.publish_now(b"x").expect("publish");
    clock.advance(Duration::from_millis(11));

    let mut buf = [0u8; 4];
    assert!(matches!(always.poll(&mut buf), Ok(SrtOutcome::Accepted { .. })));
    assert!(matches!(cutoff.poll(&mut buf), Ok(SrtOutcome::Stale { .. })));
    assert!(matches!(closure.poll(&mut buf), Ok(SrtOutcome::Stale { .. })));
}

#[test]
fn test_pool_exhaustion_then_recovery() {
    let (core, _clock) = running_core(TopicConfig::default().with_capacity(2));
    let publisher = core.publisher(SENSOR).expect("publisher");
    let mut hrt = core.hrt_subscriber(SENSOR, HrtQos::default()).expect("hrt");

    publisher.publish_now(b"a").expect("a");
    publisher.publish_now(b"b").expect("b");
    let err = publisher.publish_now(b"c").expect_err("exhausted");
    assert_eq!(err, Error::PoolExhausted { capacity: 2 });
    assert!(err.is_transient());

    let mut buf = [0u8; 4];
    hrt.try_receive(&mut buf).expect("receive").expect("a");
    publisher.publish_now(b"c").expect("slot freed by consumption");

    let snap = core.topic_snapshot(SENSOR).expect("snapshot");
    assert_eq!(snap.stats.publish_failures, 1);
    assert!(snap.is_consistent());
}

#[test]
fn test_buffer_too_small_keeps_message() {
    let (core, _clock) = running_core(TopicConfig::default());
    let publisher = core.publisher(SENSOR).expect("publisher");
    let mut hrt = core.hrt_subscriber(SENSOR, HrtQos::default()).expect("hrt");
    publisher.publish_now(b"payload").expect("publish");

    let mut small = [0u8; 3];
    assert_eq!(
        hrt.try_receive(&mut small),
        Err(Error::BufferTooSmall {
            needed: 7,
            available: 3
        })
    );
    let mut buf = [0u8; 16];
    let info = hrt.try_receive(&mut buf).expect("receive").expect("still queued");
    assert_eq!(&buf[..info.size], b"payload");
}

#[test]
fn test_oversized_payload_rejected() {
    let (core, _clock) = running_core(TopicConfig::default().with_max_payload(4));
    let publisher = core.publisher(SENSOR).expect("publisher");
    assert_eq!(
        publisher.publish_now(b"too long"),
        Err(Error::PayloadTooLarge { size: 8, max: 4 })
    );
}

#[test]
fn test_single_publisher_per_topic() {
    let (core, _clock) = running_core(TopicConfig::default());
    let first = core.publisher(SENSOR).expect("publisher");
    assert_eq!(
        core.publisher(SENSOR).err(),
        Some(Error::PublisherAlreadyBound(SENSOR))
    );
    drop(first);
    core.publisher(SENSOR).expect("rebound after drop");
}

#[test]
fn test_dropping_hrt_subscriber_releases_its_queue() {
    let (core, _clock) = running_core(TopicConfig::default().with_capacity(4));
    let publisher = core.publisher(SENSOR).expect("publisher");
    let hrt = core.hrt_subscriber(SENSOR, HrtQos::default()).expect("hrt");
    for _ in 0..3 {
        publisher.publish_now(b"x").expect("publish");
    }
    drop(hrt);

    let snap = core.topic_snapshot(SENSOR).expect("snapshot");
    assert_eq!(snap.in_flight_hrt, 0);
    assert_eq!(snap.free_slots, 3);
    assert!(snap.is_consistent());
}

#[test]
fn test_receive_latest_skips_backlog() {
    let (core, _clock) = running_core(TopicConfig::default());
    let publisher = core.publisher(SENSOR).expect("publisher");
    let mut hrt = core.hrt_subscriber(SENSOR, HrtQos::default()).expect("hrt");
    for i in 0..5u8 {
        publisher.publish_now(&[i]).expect("publish");
    }

    let mut buf = [0u8; 1];
    let info = hrt.receive_latest(&mut buf).expect("receive").expect("newest");
    assert_eq!(buf[0], 4);
    assert_eq!(info.id.0, 5);
    assert_eq!(hrt.stats().skipped, 4);
    assert!(core.topic_snapshot(SENSOR).expect("snapshot").is_consistent());
}

#[test]
fn test_deadline_recovery_hook() {
    let (core, clock) = running_core(TopicConfig::default());
    let recovered = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&recovered);
    let qos = HrtQos::with_deadline(Duration::from_millis(2)).recover_with(move |v| {
        assert_eq!(v.kind, ViolationKind::Deadline);
        assert_eq!(v.limit, Duration::from_millis(2));
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let publisher = core.publisher(SENSOR).expect("publisher");
    let mut hrt = core.hrt_subscriber(SENSOR, qos).expect("hrt");

    publisher.publish_now(b"late").expect("publish");
    clock.advance(Duration::from_millis(5));

    let mut buf = [0u8; 8];
    let info = hrt.try_receive(&mut buf).expect("recovered").expect("delivered");
    assert_eq!(info.latency, Duration::from_millis(5));
    assert_eq!(recovered.load(Ordering::SeqCst), 1);
    assert_eq!(core.state(), micrort::CoreState::Running);
}

#[test]
fn test_blocking_receive_across_threads() {
    let core = Core::builder().build().expect("core");
    core.add_topic(SENSOR).expect("topic");
    core.start().expect("start");
    let mut hrt = core.hrt_subscriber(SENSOR, HrtQos::default()).expect("hrt");
    let publisher = core.publisher(SENSOR).expect("publisher");

    let producer = thread::spawn(move || {
        for i in 0..4u8 {
            thread::sleep(Duration::from_millis(2));
            publisher.publish_now(&[i]).expect("publish");
        }
    });

    let mut buf = [0u8; 1];
    for expected in 0..4u8 {
        hrt.receive(&mut buf, Duration::from_secs(2)).expect("receive");
        assert_eq!(buf[0], expected);
    }
    producer.join().expect("producer");
    assert_eq!(
        hrt.receive(&mut buf, Duration::from_millis(5)),
        Err(Error::ReceiveTimeout)
    );
}
