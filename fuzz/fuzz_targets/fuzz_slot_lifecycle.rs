// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use micrort::{
    Core, CoreConfig, HrtQos, HrtSubscriber, ManualClock, SrtSubscriber, TopicConfig, TopicId,
};
use std::sync::Arc;
use std::time::Duration;

const TOPIC: TopicId = TopicId(1);

// Each input byte is one operation: high nibble selects it, low nibble is its argument.
fuzz_target!(|data: &[u8]| {
    let clock = Arc::new(ManualClock::new());
    let config = CoreConfig::default().with_topic(
        TOPIC,
        TopicConfig::default()
            .with_capacity(4)
            .with_max_payload(16)
            .with_hrt_queue_depth(3),
    );
    let Ok(core) = Core::builder().config(config).clock(clock.clone()).build() else {
        return;
    };
    if core.add_topic(TOPIC).is_err() || core.start().is_err() {
        return;
    }
    let Ok(publisher) = core.publisher(TOPIC) else {
        return;
    };

    let mut hrt: Vec<HrtSubscriber> = Vec::new();
    let mut srt: Vec<SrtSubscriber> = Vec::new();
    let mut buf = [0u8; 16];

    for &op in data {
        let arg = usize::from(op & 0x0f);
        match op >> 4 {
            0..=3 => {
                let _ = publisher.publish_now(&data[..arg.min(data.len())]);
            }
            4..=6 => {
                if let Some(sub) = hrt.get_mut(arg % hrt.len().max(1)) {
                    let _ = sub.try_receive(&mut buf[..arg]);
                }
            }
            7 => {
                if let Some(sub) = hrt.get_mut(arg % hrt.len().max(1)) {
                    let _ = sub.receive_latest(&mut buf);
                }
            }
            8 | 9 => {
                if let Some(sub) = srt.get_mut(arg % srt.len().max(1)) {
                    let _ = sub.poll(&mut buf[..arg]);
                }
            }
            0xa if hrt.len() < 4 => {
                if let Ok(sub) = core.hrt_subscriber(TOPIC, HrtQos::default()) {
                    hrt.push(sub);
                }
            }
            0xb if srt.len() < 4 => {
                if let Ok(sub) = core.srt_subscriber(TOPIC) {
                    srt.push(sub);
                }
            }
            0xc if !hrt.is_empty() => {
                hrt.swap_remove(arg % hrt.len());
            }
            0xd if !srt.is_empty() => {
                srt.swap_remove(arg % srt.len());
            }
            _ => clock.advance(Duration::from_millis(arg as u64)),
        }

        let Ok(snap) = core.topic_snapshot(TOPIC) else {
            return;
        };
        assert!(snap.is_consistent(), "slot accounting broken: {:?}", snap);
    }

    drop(hrt);
    drop(srt);
    drop(publisher);
    let report = core.shutdown().expect("shutdown");
    assert_eq!(report.forced_releases, 0);
});
