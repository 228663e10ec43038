//! Instrumented steering handlers.

use rps_steer::{BoxError, CpuId, Packet, Priority, ProtocolId, SteeringHandler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared, ordered record of which handlers ran `process`.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_string());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// A handler with a fixed answer that counts every call into it.
pub struct TestHandler {
    name: String,
    protocol: ProtocolId,
    priority: Priority,
    answer: Option<CpuId>,
    fail_init: bool,
    log: Option<CallLog>,
    pub processed: AtomicUsize,
    pub registered: AtomicUsize,
    pub unregistered: AtomicUsize,
}

impl TestHandler {
    pub fn new(name: &str, protocol: ProtocolId, priority: Priority) -> Self {
        Self {
            name: name.to_string(),
            protocol,
            priority,
            answer: None,
            fail_init: false,
            log: None,
            processed: AtomicUsize::new(0),
            registered: AtomicUsize::new(0),
            unregistered: AtomicUsize::new(0),
        }
    }

    /// CPU returned from every `process` call.
    pub fn answer(mut self, cpu: CpuId) -> Self {
        self.answer = Some(cpu);
        self
    }

    /// Make `on_register` fail.
    pub fn fail_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Record `process` calls into `log`.
    pub fn logged(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }
}

impl SteeringHandler for TestHandler {
    fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn process(&self, _packet: &dyn Packet) -> Option<CpuId> {
        self.processed.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.push(&self.name);
        }
        self.answer
    }

    fn on_register(&self) -> Result<(), BoxError> {
        if self.fail_init {
            return Err(format!("{} refused to initialize", self.name).into());
        }
        self.registered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_unregister(&self) {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Upcast for registry calls that take `&Arc<dyn SteeringHandler>`.
pub fn dyn_handler(h: &Arc<TestHandler>) -> Arc<dyn SteeringHandler> {
    h.clone()
}

/// Names of `handlers`, in order.
pub fn names(handlers: &[Arc<dyn SteeringHandler>]) -> Vec<String> {
    handlers.iter().map(|h| h.name().to_string()).collect()
}
