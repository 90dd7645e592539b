// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/response through the public API.

use micrort::{
    CallId, Core, CoreConfig, Error, ReplyStatus, RespondOutcome, ServiceConfig, ServiceId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const ECHO: ServiceId = ServiceId(3);

fn running_core(service: ServiceConfig) -> Core {
    let core = Core::builder()
        .config(CoreConfig::default().with_service(ECHO, service))
        .build()
        .expect("core");
    core.add_service(ECHO).expect("service");
    core.start().expect("start");
    core
}

fn upper(_call: CallId, request: &[u8], response: &mut [u8]) -> Result<usize, ReplyStatus> {
    let out = &mut response[..request.len()];
    out.copy_from_slice(request);
    out.make_ascii_uppercase();
    Ok(request.len())
}

#[test]
fn test_concurrent_calls_get_their_own_response() {
    let core = running_core(ServiceConfig::default());
    let mut server = core.server(ECHO).expect("server");
    let client = Arc::new(core.client(ECHO).expect("client"));

    let callers: Vec<_> = [&b"alpha"[..], &b"bravo"[..]]
        .into_iter()
        .map(|request| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                let mut response = [0u8; 16];
                let reply = client
                    .call_timeout(request, &mut response, Duration::from_secs(2))
                    .expect("call");
                response[..reply.size].to_vec()
            })
        })
        .collect();

    let mut served = 0;
    while served < 2 {
        if server.serve_one(&upper, Duration::from_secs(2)).expect("serve") {
            served += 1;
        }
    }

    let mut answers: Vec<Vec<u8>> = callers
        .into_iter()
        .map(|h| h.join().expect("caller"))
        .collect();
    answers.sort();
    assert_eq!(answers, vec![b"ALPHA".to_vec(), b"BRAVO".to_vec()]);

    let stats = core.service_stats(ECHO).expect("stats");
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.completed, 2);
    assert_eq!(server.served(), 2);
}

#[test]
fn test_timeout_leaves_no_slot_behind() {
    let core = running_core(ServiceConfig::default().with_queue_depth(2));
    let client = core.client(ECHO).expect("client");

    let mut response = [0u8; 8];
    let timeout = Duration::from_millis(5);
    let started = Instant::now();
    let err = client
        .call_timeout(b"ping", &mut response, timeout)
        .expect_err("nobody serves");
    let waited = started.elapsed();
    assert!(waited >= timeout, "returned after {:?}", waited);
    assert!(waited < timeout + Duration::from_millis(500), "returned after {:?}", waited);
    assert!(matches!(err, Error::RpcTimeout { service, .. } if service == ECHO));
    assert!(err.is_transient());

    let service = core.service(ECHO).expect("service");
    assert_eq!(service.free_slots(), 4);
    assert_eq!(service.outstanding(), 0);
    assert_eq!(core.service_stats(ECHO).expect("stats").timeouts, 1);
}

#[test]
fn test_late_response_is_discarded() {
    let core = running_core(ServiceConfig::default());
    let server = core.server(ECHO).expect("server");
    let client = core.client(ECHO).expect("client");

    let caller = thread::spawn(move || {
        let mut response = [0u8; 8];
        client.call_timeout(b"slow", &mut response, Duration::from_millis(20))
    });

    let mut request = [0u8; 8];
    let dispatched = server
        .dispatch_timeout(&mut request, Duration::from_secs(2))
        .expect("dispatch")
        .expect("request arrived");
    assert!(matches!(
        caller.join().expect("caller"),
        Err(Error::RpcTimeout { .. })
    ));

    assert_eq!(
        server.respond(dispatched.call, b"late", ReplyStatus::Ok),
        Ok(RespondOutcome::Discarded)
    );
    let stats = core.service_stats(ECHO).expect("stats");
    assert_eq!(stats.late_discarded, 1);
    assert_eq!(core.service(ECHO).expect("service").outstanding(), 0);
}

#[test]
fn test_send_is_served_without_a_response() {
    let core = running_core(ServiceConfig::default().with_queue_depth(2));
    let mut server = core.server(ECHO).expect("server");
    let client = core.client(ECHO).expect("client");
    let service = core.service(ECHO).expect("service");

    let call = client.send(b"note").expect("send");
    assert_eq!(service.free_slots(), 3);

    let handled = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (h, s) = (Arc::clone(&handled), Arc::clone(&seen));
    let record = move |_: CallId, request: &[u8], _: &mut [u8]| -> Result<usize, ReplyStatus> {
        h.fetch_add(1, Ordering::Relaxed);
        s.lock().expect("lock").extend_from_slice(request);
        Ok(0)
    };
    assert!(server.serve_one(&record, Duration::from_secs(2)).expect("serve"));

    assert_eq!(handled.load(Ordering::Relaxed), 1);
    assert_eq!(seen.lock().expect("lock").as_slice(), b"note");
    assert_eq!(server.served(), 1);
    assert_eq!(service.free_slots(), 4);
    assert_eq!(service.outstanding(), 0);
    assert_eq!(
        server.respond(call, b"late", ReplyStatus::Ok),
        Err(Error::InvalidCall(call))
    );
    let stats = core.service_stats(ECHO).expect("stats");
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.completed, 1);
}

#[test]
fn test_handler_error_becomes_remote_exception() {
    let core = running_core(ServiceConfig::default());
    let mut server = core.server(ECHO).expect("server");
    let client = core.client(ECHO).expect("client");

    let caller = thread::spawn(move || {
        let mut response = [0u8; 8];
        client.call_timeout(b"?", &mut response, Duration::from_secs(2))
    });

    let reject = |_: CallId, _: &[u8], _: &mut [u8]| -> Result<usize, ReplyStatus> {
        Err(ReplyStatus::InvalidArgument)
    };
    assert!(server.serve_one(&reject, Duration::from_secs(2)).expect("serve"));

    match caller.join().expect("caller") {
        Err(Error::RemoteException { status, .. }) => {
            assert_eq!(status, ReplyStatus::InvalidArgument);
        }
        other => panic!("expected RemoteException, got {:?}", other),
    }
    assert_eq!(core.service_stats(ECHO).expect("stats").remote_errors, 1);
}

#[test]
fn test_dropped_server_answers_service_unavailable() {
    let core = running_core(ServiceConfig::default());
    let server = core.server(ECHO).expect("server");
    let client = core.client(ECHO).expect("client");

    let caller = thread::spawn(move || {
        let mut response = [0u8; 8];
        client.call_timeout(b"x", &mut response, Duration::from_secs(2))
    });

    let mut request = [0u8; 8];
    server
        .dispatch_timeout(&mut request, Duration::from_secs(2))
        .expect("dispatch")
        .expect("request arrived");
    drop(server);

    match caller.join().expect("caller") {
        Err(Error::RemoteException { status, .. }) => {
            assert_eq!(status, ReplyStatus::ServiceUnavailable);
        }
        other => panic!("expected RemoteException, got {:?}", other),
    }
    // A new server can bind once the old one is gone.
    core.server(ECHO).expect("rebind");
}

#[test]
fn test_call_table_full() {
    let core = running_core(ServiceConfig::default().with_queue_depth(1));
    let server = core.server(ECHO).expect("server");
    let client = Arc::new(core.client(ECHO).expect("client"));

    let first = {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            let mut response = [0u8; 8];
            client
                .call_timeout(b"one", &mut response, Duration::from_secs(2))
                .map(|r| response[..r.size].to_vec())
        })
    };

    let mut request = [0u8; 8];
    let dispatched = server
        .dispatch_timeout(&mut request, Duration::from_secs(2))
        .expect("dispatch")
        .expect("request arrived");

    let mut response = [0u8; 8];
    assert_eq!(
        client.call_timeout(b"two", &mut response, Duration::from_millis(5)),
        Err(Error::PoolExhausted { capacity: 1 })
    );

    server
        .respond(dispatched.call, b"done", ReplyStatus::Ok)
        .expect("respond");
    assert_eq!(first.join().expect("caller"), Ok(b"done".to_vec()));
    assert_eq!(core.service_stats(ECHO).expect("stats").rejected, 1);
}

#[test]
fn test_one_server_per_service_and_unknown_ids() {
    let core = running_core(ServiceConfig::default());
    let _server = core.server(ECHO).expect("server");
    assert_eq!(core.server(ECHO).err(), Some(Error::ServerAlreadyBound(ECHO)));
    assert_eq!(
        core.client(ServiceId(99)).err(),
        Some(Error::InvalidService(ServiceId(99)))
    );
}

#[test]
fn test_calls_refused_after_shutdown() {
    let core = running_core(ServiceConfig::default());
    let client = core.client(ECHO).expect("client");
    core.shutdown().expect("shutdown");

    let mut response = [0u8; 8];
    assert_eq!(
        client.call(b"x", &mut response),
        Err(Error::ShuttingDown)
    );
}
