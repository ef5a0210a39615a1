//! Shared fixtures: an in-memory container runtime and stream helpers.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use taskengine::{
    BackoffPolicy, ContainerInspect, ContainerRuntime, ContainerSpec, ContainerStatus,
    EngineConfig, JitterPolicy, RetryPolicy, RuntimeError, RuntimeEvent, StateChangeEvent,
};

/// Runtime double.
///
/// Container ids are `"{task}/{container}"`. Every call is logged as
/// `"{op} {key}"` where the key is the image for `pull`, and the container id
/// otherwise. Failures queued with [`fail_next`](Self::fail_next) are returned
/// in order by calls with the same log line.
#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, VecDeque<RuntimeError>>>,
    states: Mutex<HashMap<String, ContainerStatus>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<RuntimeEvent>>>,
    unreachable: AtomicBool,
    features: Vec<String>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_features(features: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            features: features.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn fail_next(&self, call: &str, err: RuntimeError) {
        self.failures
            .lock()
            .unwrap()
            .entry(call.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Pushes a runtime event to every subscribed engine.
    pub fn inject(&self, ev: RuntimeEvent) {
        self.feeds
            .lock()
            .unwrap()
            .retain(|tx| tx.send(ev.clone()).is_ok());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    fn record(&self, call: String) -> Result<(), RuntimeError> {
        self.calls.lock().unwrap().push(call.clone());
        match self.failures.lock().unwrap().get_mut(&call) {
            Some(queue) => queue.pop_front().map_or(Ok(()), Err),
            None => Ok(()),
        }
    }

    fn set_state(&self, id: &str, status: ContainerStatus) {
        self.states.lock().unwrap().insert(id.to_string(), status);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        self.record(format!("pull {image}"))
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let id = format!("{}/{}", spec.task_arn, spec.container_name);
        self.record(format!("create {id}"))?;
        self.set_state(&id, ContainerStatus::Created);
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(format!("start {id}"))?;
        self.set_state(id, ContainerStatus::Running);
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(format!("stop {id}"))?;
        self.set_state(id, ContainerStatus::Stopped);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(format!("remove {id}"))?;
        self.states.lock().unwrap().remove(id);
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInspect, RuntimeError> {
        self.record(format!("inspect {id}"))?;
        Ok(ContainerInspect {
            id: id.to_string(),
            status: self.states.lock().unwrap().get(id).copied(),
            error: None,
        })
    }

    async fn subscribe(&self) -> Result<BoxStream<'static, RuntimeEvent>, RuntimeError> {
        self.record("subscribe".to_string())?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|ev| (ev, rx))
        })
        .boxed())
    }

    async fn version(&self) -> Result<String, RuntimeError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RuntimeError::transient("connection refused"));
        }
        Ok("fake 1.0".to_string())
    }

    fn features(&self) -> Vec<String> {
        self.features.clone()
    }
}

/// Engine configuration with millisecond retries.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        grace: Duration::from_secs(5),
        op_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 3,
            backoff: BackoffPolicy {
                first: Duration::from_millis(1),
                max: Duration::from_millis(5),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
        },
        ..EngineConfig::default()
    }
}

/// Receives the next event or panics after a generous timeout.
pub async fn next_event(rx: &mut mpsc::Receiver<StateChangeEvent>) -> StateChangeEvent {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream closed")
}

/// Receives events until one matches, returning everything seen on the way.
pub async fn events_until(
    rx: &mut mpsc::Receiver<StateChangeEvent>,
    done: impl Fn(&StateChangeEvent) -> bool,
) -> Vec<StateChangeEvent> {
    let mut seen = Vec::new();
    loop {
        let ev = next_event(rx).await;
        let last = done(&ev);
        seen.push(ev);
        if last {
            return seen;
        }
    }
}

/// Statuses of one container, in emission order.
pub fn projection(events: &[StateChangeEvent], container: &str) -> Vec<ContainerStatus> {
    events
        .iter()
        .filter(|e| e.container_name() == Some(container))
        .filter_map(StateChangeEvent::container_status)
        .collect()
}

/// Polls until `check` holds or panics after a few seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
