// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core dispatcher: the per-process context owning every topic, service and node.
//!
//! A [`Core`] is created once at startup with [`Core::builder`] and handed to
//! whatever needs it; there is no global registry. Several cores may coexist
//! in one process.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──add_*──> Initializing ──start──> Running ──shutdown──> ShuttingDown ──> Stopped
//!                                                     │                                      ^
//!                                                     └──────────── emergency ───────────────┘
//! ```
//!
//! A controlled [`shutdown`](Core::shutdown) refuses new publishes and calls,
//! lets in-flight HRT deliveries and RPC calls drain for at most
//! `shutdown_grace`, stops the nodes, then reclaims whatever is left.
//! An [`emergency`](Core::emergency) skips the drain and does not wait for
//! node threads.

mod builder;
mod lifecycle;
mod node;

pub use builder::CoreBuilder;
pub use lifecycle::CoreState;
pub(crate) use lifecycle::Lifecycle;
pub use node::{Flow, NodeContext, NodeTask};

use crate::config::{CoreConfig, ServiceConfig, TopicConfig};
use crate::error::{Error, Result};
use crate::pubsub::{
    HrtQos, HrtSubscriber, Publisher, Reciprocal, SrtSubscriber, Topic, TopicSnapshot, Usefulness,
};
use crate::rpc::{Service, ServiceClient, ServiceServer, ServiceStats};
use crate::rt::deadline_after;
use crate::time::Clock;
use crate::types::{ServiceId, Timestamp, TopicId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use node::{NodeEntry, StartGate};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

pub(crate) type FatalHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// How the core reached `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    Controlled,
    Emergency,
}

/// Outcome of a shutdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    pub kind: ShutdownKind,
    /// Everything in flight was consumed before the grace period ran out.
    pub drained: bool,
    /// HRT deliveries and RPC calls dropped by the final forced release.
    pub forced_releases: usize,
    /// First emergency reason, if any.
    pub reason: Option<Error>,
}

/// Point-in-time view of a core.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreStatus {
    pub state: CoreState,
    pub topics: usize,
    pub services: usize,
    pub nodes: usize,
    pub running_nodes: usize,
    /// Queued HRT deliveries plus outstanding RPC calls.
    pub in_flight: usize,
    pub reason: Option<Error>,
}

pub(crate) struct CoreInner {
    pub(crate) config: CoreConfig,
    clock: Arc<dyn Clock>,
    pub(crate) lifecycle: Arc<Lifecycle>,
    topics: DashMap<TopicId, Arc<Topic>>,
    services: DashMap<ServiceId, Arc<Service>>,
    nodes: Mutex<Vec<NodeEntry>>,
    shutdown_requested: AtomicBool,
    report: Mutex<Option<ShutdownReport>>,
    on_fatal: Option<FatalHook>,
}

impl CoreInner {
    fn new(config: CoreConfig, clock: Arc<dyn Clock>, on_fatal: Option<FatalHook>) -> Self {
        Self {
            config,
            clock,
            lifecycle: Arc::new(Lifecycle::new()),
            topics: DashMap::new(),
            services: DashMap::new(),
            nodes: Mutex::new(Vec::new()),
            shutdown_requested: AtomicBool::new(false),
            report: Mutex::new(None),
            on_fatal,
        }
    }

    // Snapshots so no map shard stays locked while topics call back into the core.
    fn all_topics(&self) -> Vec<Arc<Topic>> {
        self.topics.iter().map(|t| Arc::clone(t.value())).collect()
    }

    fn all_services(&self) -> Vec<Arc<Service>> {
        self.services.iter().map(|s| Arc::clone(s.value())).collect()
    }

    fn in_flight(&self) -> usize {
        let hrt: usize = self.all_topics().iter().map(|t| t.in_flight()).sum();
        let rpc: usize = self.all_services().iter().map(|s| s.outstanding()).sum();
        hrt + rpc
    }

    fn begin_registration(&self) -> Result<()> {
        self.lifecycle.ensure_registering()?;
        // Only the first declaration moves the state; later ones find Initializing.
        self.lifecycle
            .transition(CoreState::Uninitialized, CoreState::Initializing);
        Ok(())
    }

    fn close_all(&self) {
        for topic in self.all_topics() {
            topic.close();
        }
        for service in self.all_services() {
            service.close();
        }
    }

    fn force_release_all(&self) -> usize {
        let hrt: usize = self.all_topics().iter().map(|t| t.force_release()).sum();
        let rpc: usize = self.all_services().iter().map(|s| s.force_release()).sum();
        hrt + rpc
    }

    /// Wait for in-flight traffic to be consumed, at most `shutdown_grace`.
    fn drain(&self) -> bool {
        let deadline = deadline_after(self.config.shutdown_grace);
        loop {
            if self.lifecycle.reason().is_some() {
                return false;
            }
            let pending = self.in_flight();
            if pending == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "[Core::shutdown] grace period of {:?} expired with {} in flight",
                    self.config.shutdown_grace,
                    pending
                );
                return false;
            }
            thread::sleep(self.config.drain_poll_interval);
        }
    }

    /// Immediate stop. Safe to call from any thread, including node threads
    /// and delivery paths; never joins threads.
    pub(crate) fn emergency(&self, reason: Error) -> ShutdownReport {
        if self.lifecycle.state() == CoreState::Stopped {
            if let Some(report) = self.report.lock().clone() {
                log::warn!("[Core::emergency] already stopped, ignoring: {}", reason);
                return report;
            }
        }

        let first = self.lifecycle.record_reason(reason.clone());
        if first {
            log::error!("[Core::emergency] {}", reason);
        } else {
            log::warn!("[Core::emergency] already escalating, also saw: {}", reason);
        }

        self.lifecycle.begin_shutdown();
        self.lifecycle.raise_terminate();
        self.close_all();
        let forced = self.force_release_all();
        self.lifecycle.finish();

        let report = ShutdownReport {
            kind: ShutdownKind::Emergency,
            drained: false,
            forced_releases: forced,
            reason: self.lifecycle.reason(),
        };
        {
            let mut stored = self.report.lock();
            if first || stored.is_none() {
                *stored = Some(report.clone());
            }
        }
        if first {
            if let Some(hook) = &self.on_fatal {
                hook(&reason);
            }
        }
        report
    }
}

impl Drop for CoreInner {
    fn drop(&mut self) {
        if self.lifecycle.state() != CoreState::Stopped {
            log::debug!("[Core::drop] releasing resources of a core that was never shut down");
            self.lifecycle.raise_terminate();
            self.close_all();
            self.force_release_all();
            self.lifecycle.finish();
        }
    }
}

/// Process context: registry of topics and services, node supervisor, and
/// shutdown arbiter. Cheap to clone; clones share the same core.
///
/// # Example
///
/// ```
/// use micrort::{Core, HrtQos, TopicId};
/// use std::time::Duration;
///
/// # fn main() -> micrort::Result<()> {
/// let core = Core::builder().build()?;
/// core.add_topic(TopicId(1))?;
/// core.start()?;
///
/// let publisher = core.publisher(TopicId(1))?;
/// let mut hrt = core.hrt_subscriber(TopicId(1), HrtQos::default())?;
/// publisher.publish_now(b"hello")?;
///
/// let mut buf = [0u8; 16];
/// let info = hrt.receive(&mut buf, Duration::from_millis(10))?;
/// assert_eq!(&buf[..info.size], b"hello");
///
/// drop(hrt);
/// core.shutdown()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Core {
    pub(crate) inner: Arc<CoreInner>,
}

impl Core {
    pub fn builder() -> CoreBuilder {
        CoreBuilder::default()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn state(&self) -> CoreState {
        self.inner.lifecycle.state()
    }

    /// Current time on the core clock.
    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Declare a topic sized from the configuration.
    pub fn add_topic(&self, id: TopicId) -> Result<()> {
        self.add_topic_with(id, self.inner.config.topic(id))
    }

    pub fn add_topic_with(&self, id: TopicId, config: TopicConfig) -> Result<()> {
        self.inner.begin_registration()?;
        let topic = Topic::new(
            id,
            config,
            Arc::clone(&self.inner.clock),
            Arc::clone(&self.inner.lifecycle),
            Arc::downgrade(&self.inner),
        )?;
        match self.inner.topics.entry(id) {
            Entry::Occupied(_) => Err(Error::TopicDuplicate(id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(topic));
                log::info!(
                    "[Core::add_topic] {} capacity={} max_payload={} hrt_depth={}",
                    id,
                    config.capacity,
                    config.max_payload,
                    config.hrt_depth()
                );
                Ok(())
            }
        }
    }

    /// Declare a service sized from the configuration.
    pub fn add_service(&self, id: ServiceId) -> Result<()> {
        self.add_service_with(id, self.inner.config.service(id))
    }

    pub fn add_service_with(&self, id: ServiceId, config: ServiceConfig) -> Result<()> {
        self.inner.begin_registration()?;
        let service = Service::new(
            id,
            config,
            Arc::clone(&self.inner.clock),
            Arc::clone(&self.inner.lifecycle),
        )?;
        match self.inner.services.entry(id) {
            Entry::Occupied(_) => Err(Error::ServiceDuplicate(id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(service));
                log::info!(
                    "[Core::add_service] {} queue_depth={} max_payload={}",
                    id,
                    config.queue_depth,
                    config.max_payload
                );
                Ok(())
            }
        }
    }

    /// Register a node. Its thread is spawned by [`start`](Self::start).
    pub fn add_node<T: NodeTask>(&self, name: impl Into<String>, task: T) -> Result<()> {
        self.inner.begin_registration()?;
        let name = name.into();
        let mut nodes = self.inner.nodes.lock();
        if nodes.iter().any(|n| n.name == name) {
            return Err(Error::InvalidState(format!(
                "node '{}' already registered",
                name
            )));
        }
        log::debug!("[Core::add_node] '{}'", name);
        nodes.push(NodeEntry::new(name, Box::new(task)));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    pub fn topic(&self, id: TopicId) -> Result<Arc<Topic>> {
        self.inner
            .topics
            .get(&id)
            .map(|t| Arc::clone(t.value()))
            .ok_or(Error::InvalidTopic(id))
    }

    pub fn service(&self, id: ServiceId) -> Result<Arc<Service>> {
        self.inner
            .services
            .get(&id)
            .map(|s| Arc::clone(s.value()))
            .ok_or(Error::InvalidService(id))
    }

    /// Bind the single publisher of a topic.
    pub fn publisher(&self, id: TopicId) -> Result<Publisher> {
        self.topic(id)?.bind_publisher()
    }

    pub fn hrt_subscriber(&self, id: TopicId, qos: HrtQos) -> Result<HrtSubscriber> {
        self.topic(id)?.bind_hrt(qos)
    }

    /// SRT subscriber scored by [`Reciprocal`] against the configured threshold.
    pub fn srt_subscriber(&self, id: TopicId) -> Result<SrtSubscriber> {
        self.srt_subscriber_with(id, Reciprocal, self.inner.config.srt_threshold)
    }

    pub fn srt_subscriber_with<U>(&self, id: TopicId, evaluator: U, threshold: f64) -> Result<SrtSubscriber>
    where
        U: Usefulness + 'static,
    {
        self.topic(id)?.bind_srt(Box::new(evaluator), threshold)
    }

    /// Client using the configured default RPC timeout.
    pub fn client(&self, id: ServiceId) -> Result<ServiceClient> {
        let service = self.service(id)?;
        self.inner.lifecycle.ensure_binding()?;
        Ok(ServiceClient::new(service, self.inner.config.rpc_timeout))
    }

    /// Bind the single server of a service.
    pub fn server(&self, id: ServiceId) -> Result<ServiceServer> {
        ServiceServer::bind(self.service(id)?)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Enter `Running`.
    ///
    /// Every registered node is spawned on its own thread and runs its setup;
    /// the core enters `Running` only once all setups succeeded, and only then
    /// do the nodes start stepping. A failed setup triggers an emergency
    /// shutdown and is returned.
    pub fn start(&self) -> Result<()> {
        let lifecycle = &self.inner.lifecycle;
        lifecycle.transition(CoreState::Uninitialized, CoreState::Initializing);
        let state = lifecycle.state();
        if state != CoreState::Initializing {
            return Err(Error::InvalidState(format!(
                "start requires Initializing (state: {:?})",
                state
            )));
        }

        let gate = {
            let mut nodes = self.inner.nodes.lock();
            let gate = StartGate::new(nodes.len());
            for entry in nodes.iter_mut() {
                match node::spawn(entry, self, &gate) {
                    Ok(_) => {}
                    Err(e) => gate.forfeit(e),
                }
            }
            gate
        };

        if let Some(failure) = gate.wait_setup() {
            self.inner.emergency(failure.clone());
            gate.release();
            return Err(failure);
        }
        if !lifecycle.transition(CoreState::Initializing, CoreState::Running) {
            // Emergency raised from inside a setup.
            gate.release();
            return Err(Error::ShuttingDown);
        }
        gate.release();
        Ok(())
    }

    /// Controlled shutdown.
    ///
    /// Returns once the nodes have been joined and every slot is back in its
    /// pool. Calling it again after `Stopped` returns the stored report with
    /// zero forced releases. After an emergency it reaps the node threads and
    /// returns the emergency report.
    pub fn shutdown(&self) -> Result<ShutdownReport> {
        let inner = &self.inner;
        if inner.shutdown_requested.swap(true, Ordering::AcqRel) {
            if inner.lifecycle.state() == CoreState::Stopped {
                if let Some(report) = inner.report.lock().clone() {
                    return Ok(ShutdownReport {
                        forced_releases: 0,
                        ..report
                    });
                }
            }
            return Err(Error::ShuttingDown);
        }

        let prev = inner.lifecycle.begin_shutdown();
        if prev == CoreState::Stopped {
            self.reap_nodes();
            let report = inner.report.lock().clone().unwrap_or(ShutdownReport {
                kind: ShutdownKind::Emergency,
                drained: false,
                forced_releases: 0,
                reason: inner.lifecycle.reason(),
            });
            return Ok(report);
        }

        log::info!("[Core::shutdown] draining (grace {:?})", inner.config.shutdown_grace);
        let drained = if prev == CoreState::Running {
            inner.drain()
        } else {
            inner.in_flight() == 0
        };

        inner.lifecycle.raise_terminate();
        inner.close_all();
        self.reap_nodes();
        let forced = inner.force_release_all();

        let reason = inner.lifecycle.reason();
        let report = ShutdownReport {
            kind: if reason.is_some() {
                ShutdownKind::Emergency
            } else {
                ShutdownKind::Controlled
            },
            drained,
            forced_releases: forced,
            reason,
        };
        inner.lifecycle.finish();
        {
            let mut stored = inner.report.lock();
            if stored.is_none() {
                *stored = Some(report.clone());
            }
        }
        log::info!(
            "[Core::shutdown] {:?}, drained={} forced_releases={}",
            report.kind,
            report.drained,
            report.forced_releases
        );
        Ok(report)
    }

    /// Immediate stop: no drain, no join. The fatal hook runs once, for the
    /// first reason only.
    pub fn emergency(&self, reason: Error) -> ShutdownReport {
        self.inner.emergency(reason)
    }

    /// Wait for every node thread to exit. Returns the first node failure.
    ///
    /// A node calling this on its own core skips its own thread.
    pub fn join_nodes(&self) -> Result<()> {
        let handles: Vec<_> = self
            .inner
            .nodes
            .lock()
            .iter_mut()
            .filter_map(NodeEntry::take_handle)
            .collect();
        match node::join_all(handles).into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn reap_nodes(&self) {
        if let Err(e) = self.join_nodes() {
            log::warn!("[Core::shutdown] {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Monitoring
    // ------------------------------------------------------------------

    /// Scan every HRT queue for messages older than their subscriber's
    /// deadline and for subscribers silent past their expected rate.
    /// Intended for a periodic host timer.
    ///
    /// Returns the number of violations handled by recovery hooks, or the
    /// first unrecovered violation (the core is then in emergency shutdown).
    pub fn check_deadlines(&self) -> Result<usize> {
        let mut found = 0;
        for topic in self.inner.all_topics() {
            found += topic.check_deadlines()?;
        }
        Ok(found)
    }

    pub fn status(&self) -> CoreStatus {
        let (nodes, running_nodes) = {
            let nodes = self.inner.nodes.lock();
            (nodes.len(), nodes.iter().filter(|n| n.is_running()).count())
        };
        CoreStatus {
            state: self.state(),
            topics: self.inner.topics.len(),
            services: self.inner.services.len(),
            nodes,
            running_nodes,
            in_flight: self.inner.in_flight(),
            reason: self.inner.lifecycle.reason(),
        }
    }

    pub fn topic_snapshot(&self, id: TopicId) -> Result<TopicSnapshot> {
        Ok(self.topic(id)?.snapshot())
    }

    pub fn service_stats(&self, id: ServiceId) -> Result<ServiceStats> {
        Ok(self.service(id)?.stats())
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("state", &self.state())
            .field("topics", &self.inner.topics.len())
            .field("services", &self.inner.services.len())
            .finish()
    }
}
