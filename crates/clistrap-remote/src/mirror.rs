use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clistrap_core::{Endpoint, MirrorStrategy};
use tracing::{debug, info, warn};

use crate::transport::Transport;

/// Cheap liveness check issued against every candidate mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub path: String,
    pub expected_body: Option<String>,
}

impl Probe {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            expected_body: None,
        }
    }

    pub fn expecting(mut self, body: impl Into<String>) -> Self {
        self.expected_body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy { base_url: String, latency: Duration },
    Failed { base_url: String, reason: String },
    /// The race was already decided; never counted as a mirror failure.
    Cancelled { base_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSelection {
    pub base_url: String,
    pub latency: Duration,
    /// Mirrors that failed before the winner was found.
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RaceTiming {
    pub stagger_unit: Duration,
    pub probe_timeout: Duration,
}

pub struct MirrorSelector {
    transport: Arc<dyn Transport>,
    timing: RaceTiming,
}

impl MirrorSelector {
    pub fn new(transport: Arc<dyn Transport>, timing: RaceTiming) -> Self {
        Self { transport, timing }
    }

    pub fn select_fastest(
        &self,
        endpoints: &[Endpoint],
        probe: &Probe,
        strategy: MirrorStrategy,
    ) -> Result<MirrorSelection> {
        if endpoints.is_empty() {
            return Err(anyhow!("no mirror endpoints configured"));
        }
        match strategy {
            MirrorStrategy::Race => self.race_with_stagger(endpoints, probe),
            MirrorStrategy::Measure => self.measure_all(endpoints, probe),
        }
    }

    /// Starts one probe per endpoint, each delayed by `priority` stagger units.
    /// The first healthy response wins and the shared cancel signal stops
    /// every probe that has not started yet. Late results are discarded.
    pub fn race_with_stagger(
        &self,
        endpoints: &[Endpoint],
        probe: &Probe,
    ) -> Result<MirrorSelection> {
        let cancel = CancelSignal::default();
        let (sender, receiver) = mpsc::channel();

        for endpoint in endpoints {
            let endpoint = endpoint.clone();
            let probe = probe.clone();
            let transport = Arc::clone(&self.transport);
            let cancel = cancel.clone();
            let sender = sender.clone();
            let delay = self.timing.stagger_unit * endpoint.priority;
            thread::spawn(move || {
                let outcome = if cancel.wait(delay) {
                    ProbeOutcome::Cancelled {
                        base_url: endpoint.base_url,
                    }
                } else {
                    debug!(mirror = %endpoint.base_url, "probing mirror");
                    let outcome = run_probe(transport.as_ref(), &endpoint, &probe);
                    if cancel.is_cancelled() {
                        ProbeOutcome::Cancelled {
                            base_url: endpoint.base_url,
                        }
                    } else {
                        outcome
                    }
                };
                let _ = sender.send(outcome);
            });
        }
        drop(sender);

        let slowest_tier = endpoints.iter().map(|e| e.priority).max().unwrap_or(0);
        let budget = self.timing.stagger_unit * slowest_tier + self.timing.probe_timeout;
        let deadline = Instant::now() + budget;
        let mut failures = Vec::new();
        let mut pending = endpoints.len();

        while pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(remaining) {
                Ok(ProbeOutcome::Healthy { base_url, latency }) => {
                    cancel.fire();
                    info!(
                        mirror = %base_url,
                        latency_ms = latency.as_millis() as u64,
                        "mirror selected"
                    );
                    return Ok(MirrorSelection {
                        base_url,
                        latency,
                        failures,
                    });
                }
                Ok(ProbeOutcome::Failed { base_url, reason }) => {
                    warn!(mirror = %base_url, %reason, "mirror probe failed");
                    failures.push(format!("{base_url}: {reason}"));
                    pending -= 1;
                }
                Ok(ProbeOutcome::Cancelled { .. }) => pending -= 1,
                Err(RecvTimeoutError::Timeout) => {
                    cancel.fire();
                    failures.push(format!(
                        "{pending} probe(s) still pending after {}ms",
                        budget.as_millis()
                    ));
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        Err(aggregate_failure(endpoints.len(), &failures))
    }

    /// Probes every endpoint concurrently and keeps the lowest-latency success.
    pub fn measure_all(&self, endpoints: &[Endpoint], probe: &Probe) -> Result<MirrorSelection> {
        let outcomes: Vec<ProbeOutcome> = thread::scope(|scope| {
            let handles: Vec<_> = endpoints
                .iter()
                .map(|endpoint| {
                    let transport = self.transport.as_ref();
                    scope.spawn(move || run_probe(transport, endpoint, probe))
                })
                .collect();
            handles
                .into_iter()
                .zip(endpoints)
                .map(|(handle, endpoint)| {
                    handle.join().unwrap_or_else(|_| ProbeOutcome::Failed {
                        base_url: endpoint.base_url.clone(),
                        reason: "probe thread panicked".to_string(),
                    })
                })
                .collect()
        });

        let mut failures = Vec::new();
        let mut best: Option<(String, Duration)> = None;
        for outcome in outcomes {
            match outcome {
                ProbeOutcome::Healthy { base_url, latency } => {
                    debug!(
                        mirror = %base_url,
                        latency_ms = latency.as_millis() as u64,
                        "mirror healthy"
                    );
                    if best.as_ref().map_or(true, |(_, current)| latency < *current) {
                        best = Some((base_url, latency));
                    }
                }
                ProbeOutcome::Failed { base_url, reason } => {
                    warn!(mirror = %base_url, %reason, "mirror probe failed");
                    failures.push(format!("{base_url}: {reason}"));
                }
                ProbeOutcome::Cancelled { .. } => {}
            }
        }

        match best {
            Some((base_url, latency)) => {
                info!(
                    mirror = %base_url,
                    latency_ms = latency.as_millis() as u64,
                    "mirror selected"
                );
                Ok(MirrorSelection {
                    base_url,
                    latency,
                    failures,
                })
            }
            None => Err(aggregate_failure(endpoints.len(), &failures)),
        }
    }
}

pub fn run_probe(transport: &dyn Transport, endpoint: &Endpoint, probe: &Probe) -> ProbeOutcome {
    let started = Instant::now();
    let url = endpoint.join(&probe.path);
    let failed = |reason: String| ProbeOutcome::Failed {
        base_url: endpoint.base_url.clone(),
        reason,
    };
    let response = match transport.get_text(&url) {
        Ok(response) => response,
        Err(err) => return failed(format!("{err:#}")),
    };
    if !response.is_ok() {
        return failed(format!("HTTP status {}", response.status));
    }
    if let Some(expected) = &probe.expected_body {
        if response.body.trim() != expected.trim() {
            return failed("probe body did not match expected content".to_string());
        }
    }
    ProbeOutcome::Healthy {
        base_url: endpoint.base_url.clone(),
        latency: started.elapsed(),
    }
}

fn aggregate_failure(candidates: usize, failures: &[String]) -> anyhow::Error {
    if failures.is_empty() {
        return anyhow!("no reachable mirror among {candidates} candidate(s)");
    }
    anyhow!(
        "no reachable mirror among {candidates} candidate(s): {}",
        failures.join("; ")
    )
}

/// One-shot cancellation shared by every probe of a race.
#[derive(Clone, Default)]
struct CancelSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelSignal {
    fn fire(&self) {
        let (lock, signal) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        signal.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `delay` unless cancelled first. Returns whether cancelled.
    fn wait(&self, delay: Duration) -> bool {
        let (lock, signal) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = signal
            .wait_timeout_while(guard, delay, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}
