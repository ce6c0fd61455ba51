//! Probe scheduler: a fixed pool of workers draining candidate sources
//!
//! Workers share the active source list, the per-run dedup set and the
//! dispatcher. A run ends when the cancellation token fires or when every
//! source has reported exhaustion; in-flight checks always finish first.

use crate::candidates::CandidateSource;
use crate::probe::dedup::CandidateRegistry;
use crate::probe::dispatcher::ProbeDispatcher;
use crate::probe::models::{ProbeEvent, RunOutcome};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Default number of concurrent workers
const DEFAULT_CONCURRENCY: usize = 10;

/// Upper bound on concurrent workers
pub const MAX_CONCURRENCY: usize = 100;

/// Default interval between statistics snapshots
const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(2);

/// Configuration for a scheduler run
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub concurrency: usize,
    /// Route checks through the proxy registry
    pub use_proxy: bool,
    pub stats_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            use_proxy: true,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count, clamped to `1..=MAX_CONCURRENCY`
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn with_proxy(mut self, use_proxy: bool) -> Self {
        self.use_proxy = use_proxy;
        self
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }
}

enum Pull {
    Candidate { kind: String, candidate: String },
    Drained { kind: String },
    NoSources,
}

/// State shared by the workers of one run
struct RunContext {
    sources: Mutex<Vec<CandidateSource>>,
    seen: CandidateRegistry,
    dispatcher: Arc<ProbeDispatcher>,
    use_proxy: bool,
    events: UnboundedSender<ProbeEvent>,
    cancel: CancellationToken,
}

impl RunContext {
    /// Pull from a uniformly random active source, dropping it if it ran dry
    fn pull(&self) -> Pull {
        let mut sources = self.sources.lock();
        if sources.is_empty() {
            return Pull::NoSources;
        }

        let index = rand::thread_rng().gen_range(0..sources.len());
        match sources[index].next_candidate() {
            Some(candidate) => Pull::Candidate {
                kind: sources[index].kind().to_string(),
                candidate,
            },
            None => {
                let drained = sources.remove(index);
                Pull::Drained {
                    kind: drained.kind().to_string(),
                }
            }
        }
    }

    fn emit(&self, event: ProbeEvent) {
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.events.send(event);
    }
}

async fn worker(ctx: Arc<RunContext>) {
    while !ctx.cancel.is_cancelled() {
        match ctx.pull() {
            Pull::NoSources => break,
            Pull::Drained { kind } => {
                tracing::warn!(kind = %kind, "Candidate source exhausted");
                ctx.emit(ProbeEvent::SourceExhausted { kind });
            }
            Pull::Candidate { kind, candidate } => {
                if !ctx.seen.try_insert(&candidate) {
                    tokio::task::yield_now().await;
                    continue;
                }
                let result = ctx.dispatcher.check(&candidate, ctx.use_proxy).await;
                ctx.emit(ProbeEvent::Checked {
                    candidate,
                    kind,
                    result,
                });
            }
        }
    }
}

async fn stats_ticker(ctx: Arc<RunContext>, interval: Duration, done: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            // Cancellation wins over a tick that is due at the same moment.
            biased;
            _ = ctx.cancel.cancelled() => break,
            _ = done.cancelled() => break,
            _ = ticker.tick() => ctx.emit(ProbeEvent::Stats(ctx.dispatcher.stats_snapshot())),
        }
    }
}

/// Drives a pool of workers over a set of candidate sources
#[derive(Clone)]
pub struct ProbeScheduler {
    config: SchedulerConfig,
    dispatcher: Arc<ProbeDispatcher>,
}

impl ProbeScheduler {
    pub fn new(config: SchedulerConfig, dispatcher: Arc<ProbeDispatcher>) -> Self {
        Self { config, dispatcher }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run until cancelled or until every source is exhausted.
    ///
    /// Results, exhaustion notices and periodic statistics go to `events`.
    /// Returns only after every worker has finished its in-flight check.
    pub async fn run(
        &self,
        sources: Vec<CandidateSource>,
        events: UnboundedSender<ProbeEvent>,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let ctx = Arc::new(RunContext {
            sources: Mutex::new(sources),
            seen: CandidateRegistry::new(),
            dispatcher: self.dispatcher.clone(),
            use_proxy: self.config.use_proxy,
            events,
            cancel: cancel.clone(),
        });

        tracing::info!(
            concurrency = self.config.concurrency,
            use_proxy = self.config.use_proxy,
            "Starting probe workers"
        );

        let done = CancellationToken::new();
        let ticker = tokio::spawn(stats_ticker(
            ctx.clone(),
            self.config.stats_interval,
            done.clone(),
        ));

        let workers: Vec<_> = (0..self.config.concurrency)
            .map(|_| tokio::spawn(worker(ctx.clone())))
            .collect();

        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Probe worker terminated abnormally");
            }
        }

        done.cancel();
        if let Err(e) = ticker.await {
            tracing::error!(error = %e, "Stats ticker terminated abnormally");
        }

        let outcome = if cancel.is_cancelled() {
            RunOutcome::Stopped
        } else {
            tracing::warn!("All candidate sources exhausted");
            RunOutcome::Exhausted
        };

        tracing::info!(
            %outcome,
            dispatched = ctx.seen.len(),
            "Probe run finished"
        );
        outcome
    }
}
