//! Run control: start, cancel and observe probe runs
//!
//! One run at a time. Each run gets fresh statistics and a fresh dedup set;
//! the proxy registry persists across runs.

use crate::candidates::CandidateSource;
use crate::error::{Result, ScoutError};
use crate::notify::WebhookNotifier;
use crate::probe::dispatcher::{DispatcherConfig, ProbeDispatcher};
use crate::probe::models::{ProbeEvent, RunOutcome};
use crate::probe::scheduler::{ProbeScheduler, SchedulerConfig};
use crate::probe::stats::{RunStats, StatsSnapshot};
use crate::proxy::models::ProxyType;
use crate::proxy::parser::ProxyParser;
use crate::proxy::registry::{ProxyRegistry, RegistryConfig};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

struct ActiveRun {
    cancel: CancellationToken,
    /// Cleared by the run itself before it announces `Finished`
    running: Arc<AtomicBool>,
    handle: JoinHandle<RunOutcome>,
}

impl ActiveRun {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.handle.is_finished()
    }
}

/// Turns raw scheduler events into what the consumer asked to see
struct Relay {
    dispatcher: Arc<ProbeDispatcher>,
    notifier: WebhookNotifier,
    verbose: bool,
    out: UnboundedSender<ProbeEvent>,
}

impl Relay {
    fn emit(&self, event: ProbeEvent) {
        let _ = self.out.send(event);
    }

    fn forward(&self, event: ProbeEvent) {
        match event {
            ProbeEvent::Checked {
                candidate,
                kind,
                result,
            } if result.available => {
                if self.notifier.is_enabled() {
                    self.notify(candidate.clone(), kind.clone());
                }
                self.emit(ProbeEvent::Hit { candidate, kind });
            }
            ProbeEvent::Checked { .. } => {
                if self.verbose {
                    self.emit(event);
                }
            }
            other => self.emit(other),
        }
    }

    fn notify(&self, candidate: String, kind: String) {
        let notifier = self.notifier.clone();
        let out = self.out.clone();
        tokio::spawn(async move {
            let delivered = notifier.send_availability_alert(&candidate, &kind).await;
            if delivered {
                tracing::info!(candidate = %candidate, "Webhook sent");
            } else {
                tracing::warn!(candidate = %candidate, "Webhook failed");
            }
            let _ = out.send(ProbeEvent::Notified {
                candidate,
                delivered,
            });
        });
    }
}

async fn drive(
    scheduler: ProbeScheduler,
    sources: Vec<CandidateSource>,
    relay: Relay,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
) -> RunOutcome {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let run = tokio::spawn(async move { scheduler.run(sources, tx, cancel).await });

    // Closes once the scheduler and all of its workers are done.
    while let Some(event) = rx.recv().await {
        relay.forward(event);
    }

    let outcome = match run.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "Probe run terminated abnormally");
            RunOutcome::Stopped
        }
    };

    // Snapshot first: once the flag drops a new run may reset the counters.
    let snapshot = relay.dispatcher.stats_snapshot();
    running.store(false, Ordering::Release);

    relay.emit(ProbeEvent::Finished(outcome));
    relay.emit(ProbeEvent::Stats(snapshot));
    outcome
}

/// Owns the dispatcher and the currently active run
pub struct ProbeEngine {
    dispatcher: Arc<ProbeDispatcher>,
    notifier: WebhookNotifier,
    active: Mutex<Option<ActiveRun>>,
}

impl ProbeEngine {
    pub fn new(dispatcher: Arc<ProbeDispatcher>, notifier: WebhookNotifier) -> Self {
        Self {
            dispatcher,
            notifier,
            active: Mutex::new(None),
        }
    }

    /// Build an engine on the real HTTP transport
    pub fn from_config(
        dispatcher_config: DispatcherConfig,
        registry_config: RegistryConfig,
        webhook_url: &str,
    ) -> Result<Self> {
        let registry = Arc::new(ProxyRegistry::with_config(registry_config));
        let stats = Arc::new(RunStats::new());
        let dispatcher = ProbeDispatcher::new(dispatcher_config, registry, stats)?;
        Ok(Self::new(
            Arc::new(dispatcher),
            WebhookNotifier::new(webhook_url)?,
        ))
    }

    pub fn registry(&self) -> &Arc<ProxyRegistry> {
        self.dispatcher.registry()
    }

    pub fn notifier(&self) -> &WebhookNotifier {
        &self.notifier
    }

    /// Replace the proxy set from a list file; a missing file clears it
    pub fn load_proxies_from_file<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let proxies = ProxyParser::load_file(path, ProxyType::Http)?;
        self.dispatcher.load_proxies(proxies);
        Ok(self.registry().count())
    }

    pub fn state(&self) -> RunState {
        let active = self.active.lock();
        match active.as_ref() {
            Some(run) if run.is_running() => RunState::Running,
            _ => RunState::Idle,
        }
    }

    /// Start a run over `sources`, returning its event stream.
    ///
    /// Non-hit results are only forwarded when `verbose` is set.
    pub fn start_run(
        &self,
        sources: Vec<CandidateSource>,
        config: SchedulerConfig,
        verbose: bool,
    ) -> Result<UnboundedReceiver<ProbeEvent>> {
        if sources.is_empty() {
            return Err(ScoutError::NoSources);
        }

        let mut active = self.active.lock();
        if active.as_ref().is_some_and(ActiveRun::is_running) {
            return Err(ScoutError::AlreadyRunning);
        }

        self.dispatcher.stats().reset();

        let kinds: Vec<&str> = sources.iter().map(CandidateSource::kind).collect();
        tracing::info!(
            kinds = ?kinds,
            concurrency = config.concurrency,
            use_proxy = config.use_proxy,
            proxies = self.registry().count(),
            available = self.registry().available_count(),
            "Starting run"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let relay = Relay {
            dispatcher: self.dispatcher.clone(),
            notifier: self.notifier.clone(),
            verbose,
            out: tx,
        };
        let scheduler = ProbeScheduler::new(config, self.dispatcher.clone());
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(drive(
            scheduler,
            sources,
            relay,
            cancel.clone(),
            running.clone(),
        ));

        *active = Some(ActiveRun {
            cancel,
            running,
            handle,
        });
        Ok(rx)
    }

    /// Request cancellation of the active run, if any
    pub fn cancel_run(&self) {
        if let Some(run) = self.active.lock().as_ref() {
            if !run.cancel.is_cancelled() {
                tracing::info!("Stopping run");
                run.cancel.cancel();
            }
        }
    }

    /// Wait for the active run to quiesce and return how it ended
    pub async fn join(&self) -> Option<RunOutcome> {
        let run = self.active.lock().take()?;
        match run.handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(error = %e, "Run task failed");
                Some(RunOutcome::Stopped)
            }
        }
    }

    /// Cancel and wait
    pub async fn stop(&self) -> Option<RunOutcome> {
        self.cancel_run();
        self.join().await
    }

    pub fn current_stats(&self) -> StatsSnapshot {
        self.dispatcher.stats_snapshot()
    }
}
