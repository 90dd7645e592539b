// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Nodes: one thread per logical unit of publishers, subscribers and services.
//!
//! # Stages
//!
//! ```text
//! spawn ──> setup ──[gate]──> (core enters Running, gate released) ──> step* ──> teardown
//! ```
//!
//! No node steps before every node finished its setup. A setup failure aborts
//! the start for all nodes.

use super::Core;
use crate::error::{Error, Result};
use crate::types::Timestamp;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Whether a node wants to be stepped again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finished,
}

/// Body of a node.
///
/// `setup` runs once on the node thread before any node steps; it is where
/// endpoints are bound. `step` runs until it returns [`Flow::Finished`], an
/// error of the fatal class, or the core raises its terminate flag.
/// `teardown` runs once on exit with the error that stopped the node, if any.
pub trait NodeTask: Send + 'static {
    fn setup(&mut self, ctx: &NodeContext) -> Result<()>;

    fn step(&mut self, ctx: &NodeContext) -> Result<Flow>;

    fn teardown(&mut self, _ctx: &NodeContext, _reason: Option<&Error>) {}
}

/// Handle passed to every [`NodeTask`] call.
pub struct NodeContext {
    name: String,
    core: Core,
}

impl NodeContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    /// Raised once the drain phase of a shutdown is over, or on emergency.
    pub fn should_terminate(&self) -> bool {
        self.core.inner.lifecycle.should_terminate()
    }

    pub fn now(&self) -> Timestamp {
        self.core.now()
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext").field("name", &self.name).finish()
    }
}

/// Registered node, before and after spawn.
pub(crate) struct NodeEntry {
    pub(crate) name: String,
    task: Option<Box<dyn NodeTask>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl NodeEntry {
    pub(crate) fn new(name: String, task: Box<dyn NodeTask>) -> Self {
        Self {
            name,
            task: Some(task),
            handle: None,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Detach the join handle, leaving the entry registered.
    pub(crate) fn take_handle(&mut self) -> Option<(String, JoinHandle<Result<()>>)> {
        self.handle.take().map(|h| (self.name.clone(), h))
    }
}

/// Stage barrier shared by the starter and every node thread.
///
/// Unlike `std::sync::Barrier` the expected count can shrink when a node
/// thread fails to spawn, so the starter never waits on a missing party.
pub(crate) struct StartGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

struct GateState {
    pending_setup: usize,
    released: bool,
    failures: Vec<Error>,
}

impl StartGate {
    pub(crate) fn new(nodes: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState {
                pending_setup: nodes,
                released: false,
                failures: Vec::new(),
            }),
            cond: Condvar::new(),
        })
    }

    /// Node side: report setup done, then wait for the starter.
    fn arrive(&self, failure: Option<Error>) {
        let mut st = self.state.lock();
        st.pending_setup = st.pending_setup.saturating_sub(1);
        st.failures.extend(failure);
        self.cond.notify_all();
        while !st.released {
            self.cond.wait(&mut st);
        }
    }

    /// Starter side: account for a node that will never arrive.
    pub(crate) fn forfeit(&self, failure: Error) {
        let mut st = self.state.lock();
        st.pending_setup = st.pending_setup.saturating_sub(1);
        st.failures.push(failure);
        self.cond.notify_all();
    }

    /// Starter side: wait for every setup and return the first failure.
    pub(crate) fn wait_setup(&self) -> Option<Error> {
        let mut st = self.state.lock();
        while st.pending_setup > 0 {
            self.cond.wait(&mut st);
        }
        st.failures.first().cloned()
    }

    /// Starter side: let the nodes into their step loops (or teardown).
    pub(crate) fn release(&self) {
        self.state.lock().released = true;
        self.cond.notify_all();
    }
}

/// Spawn the thread for `entry`. Returns `false` if the node was already spawned.
pub(crate) fn spawn(entry: &mut NodeEntry, core: &Core, gate: &Arc<StartGate>) -> Result<bool> {
    let Some(task) = entry.task.take() else {
        return Ok(false);
    };
    let ctx = NodeContext {
        name: entry.name.clone(),
        core: core.clone(),
    };
    let gate = Arc::clone(gate);
    let handle = thread::Builder::new()
        .name(format!("micrort-{}", entry.name))
        .spawn(move || run(task, ctx, &gate))
        .map_err(|e| Error::NodeFailed {
            node: entry.name.clone(),
            reason: format!("thread spawn failed: {}", e),
        })?;
    entry.handle = Some(handle);
    Ok(true)
}

fn run(mut task: Box<dyn NodeTask>, ctx: NodeContext, gate: &StartGate) -> Result<()> {
    let setup = task.setup(&ctx).map_err(|e| Error::NodeFailed {
        node: ctx.name.clone(),
        reason: e.to_string(),
    });
    gate.arrive(setup.as_ref().err().cloned());

    if let Err(e) = setup {
        log::error!("[Node::setup] '{}' failed: {}", ctx.name, e);
        task.teardown(&ctx, Some(&e));
        return Err(e);
    }
    if ctx.should_terminate() {
        // Another node's setup failed.
        task.teardown(&ctx, None);
        return Ok(());
    }

    log::debug!("[Node::run] '{}' stepping", ctx.name);
    let poll = ctx.core.inner.config.drain_poll_interval;
    let stop = loop {
        if ctx.should_terminate() {
            break None;
        }
        match task.step(&ctx) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Finished) => break None,
            Err(e) if e.is_fatal() => {
                log::error!("[Node::step] '{}' fatal: {}", ctx.name, e);
                ctx.core.inner.emergency(e.clone());
                break Some(e);
            }
            Err(Error::ShuttingDown) => {
                // Draining: publish/call are refused until terminate is raised.
                thread::sleep(poll);
            }
            Err(e) => log::warn!("[Node::step] '{}': {}", ctx.name, e),
        }
    };

    task.teardown(&ctx, stop.as_ref());
    log::debug!("[Node::run] '{}' exited", ctx.name);
    match stop {
        Some(e) => Err(Error::NodeFailed {
            node: ctx.name.clone(),
            reason: e.to_string(),
        }),
        None => Ok(()),
    }
}

/// Join every spawned node thread except the caller's own.
///
/// Returns the failures (fatal step errors or panics).
pub(crate) fn join_all(entries: Vec<(String, JoinHandle<Result<()>>)>) -> Vec<Error> {
    let me = thread::current().id();
    let mut failures = Vec::new();
    for (name, handle) in entries {
        if handle.thread().id() == me {
            continue;
        }
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => failures.push(e),
            Err(_) => {
                log::error!("[Node::join] '{}' panicked", name);
                failures.push(Error::NodeFailed {
                    node: name,
                    reason: "panicked".into(),
                });
            }
        }
    }
    failures
}
