//! The synchronizer: backfill, live subscription, self-heal loop.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use common::LogPosition;
use event_log::{EventLog, EventLogError, LogEnvelope};
use futures_util::StreamExt;
use ledger::{ApplyOutcome, LedgerEvent, LedgerMachine, Signal};
use projection::ProjectionStore;
use tokio::sync::{Mutex, RwLock, watch};

use crate::{Result, SyncConfig, SyncError};

/// Observable phase of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Backfilling,
    Live,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Backfilling => write!(f, "backfilling"),
            SyncState::Live => write!(f, "live"),
        }
    }
}

/// Summary of one backfill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Events that changed projection state.
    pub applied: u64,
    /// Redelivered events collapsed to no-ops.
    pub duplicates: u64,
    /// Revocations still waiting for their recording after this pass.
    pub deferred: usize,
    /// True if the run was dropped because another was in flight.
    pub skipped: bool,
}

impl BackfillReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// How a single envelope was handled.
enum Application {
    Applied,
    Duplicate,
    Deferred,
    Ignored,
}

/// State shared by backfill and live paths, guarded by one lock so event
/// application is serialized: two events for the same driver must never
/// interleave their read-modify-write of the aggregate.
struct ApplyState {
    machine: LedgerMachine,
    /// Revocations seen before their recording, retried each pass.
    deferred: VecDeque<LogEnvelope>,
}

/// Drives the core loop: historical backfill from the durable cursor,
/// live subscription for new entries, and an interval heal pass that
/// re-runs backfill to reconcile anything the subscription missed.
pub struct Synchronizer<L, P> {
    log: Arc<L>,
    store: Arc<P>,
    config: SyncConfig,
    state: RwLock<SyncState>,
    /// Non-queueing re-entrancy guard: a second backfill started while one
    /// is in flight is dropped, not queued.
    backfill_gate: Mutex<()>,
    apply: Mutex<ApplyState>,
    live_active: AtomicBool,
    /// Bumped each time a subscription is established. A backfill pass may
    /// only declare caught-up if the subscription that was up before it
    /// read the head is still the one up when the pass ends.
    live_epoch: AtomicU64,
    /// Set when a backfill pass completes while the subscription is up.
    /// Until then the live path applies events but leaves the cursor to
    /// backfill: the subscription is only gapless from the moment it was
    /// established, and the cursor must never move past an unapplied entry.
    caught_up: AtomicBool,
}

impl<L, P> Synchronizer<L, P>
where
    L: EventLog,
    P: ProjectionStore,
{
    pub fn new(log: Arc<L>, store: Arc<P>, config: SyncConfig) -> Self {
        Self {
            log,
            store,
            config,
            state: RwLock::new(SyncState::Idle),
            backfill_gate: Mutex::new(()),
            apply: Mutex::new(ApplyState {
                machine: LedgerMachine::default(),
                deferred: VecDeque::new(),
            }),
            live_active: AtomicBool::new(false),
            live_epoch: AtomicU64::new(0),
            caught_up: AtomicBool::new(false),
        }
    }

    /// Current phase, for health reporting.
    pub async fn state(&self) -> SyncState {
        *self.state.read().await
    }

    /// Number of revocations currently deferred.
    pub async fn deferred_count(&self) -> usize {
        self.apply.lock().await.deferred.len()
    }

    async fn set_state(&self, state: SyncState) {
        *self.state.write().await = state;
    }

    /// Applies the bounded per-operation timeout to a log or store call.
    async fn bounded<T, E>(
        &self,
        op: &'static str,
        fut: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T>
    where
        SyncError: From<E>,
    {
        match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout { op }),
        }
    }

    /// Runs one backfill pass: cursor successor to current head.
    ///
    /// At most one pass runs at a time; re-entrant calls are dropped. A
    /// clean pass leaves the projection reflecting the log up to the head
    /// observed at pass start and the cursor advanced to that head, or
    /// parked just below the earliest still-deferred revocation.
    #[tracing::instrument(skip(self))]
    pub async fn run_backfill(&self) -> Result<BackfillReport> {
        let Ok(_gate) = self.backfill_gate.try_lock() else {
            tracing::debug!("backfill already in flight, dropping re-entrant run");
            return Ok(BackfillReport::skipped());
        };

        metrics::counter!("sync_backfill_runs_total").increment(1);
        let started = std::time::Instant::now();
        // Snapshot before the pass reads the head. A subscription
        // (re)established after the head read may have missed entries below
        // its own start, so only a subscription already up at this point,
        // and still the same one when the pass ends, makes the pass a valid
        // caught-up proof.
        let live_at_start = self.live_active.load(Ordering::SeqCst);
        let epoch_at_start = self.live_epoch.load(Ordering::SeqCst);
        self.set_state(SyncState::Backfilling).await;

        let result = self.backfill_pass().await;

        if result.is_ok()
            && live_at_start
            && self.live_active.load(Ordering::SeqCst)
            && self.live_epoch.load(Ordering::SeqCst) == epoch_at_start
        {
            // Everything up to the observed head is applied and the
            // subscription covers everything after it.
            self.caught_up.store(true, Ordering::SeqCst);
        }

        let next = if self.live_active.load(Ordering::SeqCst) {
            SyncState::Live
        } else {
            SyncState::Idle
        };
        self.set_state(next).await;
        metrics::histogram!("sync_backfill_duration_seconds").record(started.elapsed().as_secs_f64());

        result
    }

    async fn backfill_pass(&self) -> Result<BackfillReport> {
        let cursor = self.bounded("get_cursor", self.store.get_cursor()).await?;
        let head = self.bounded("head", self.log.head()).await?;
        let from = cursor.resume_from();

        let Some(head) = head.filter(|head| from <= *head) else {
            // Nothing new; still a completed pass for staleness tracking.
            self.bounded("touch_sync_time", self.store.touch_sync_time())
                .await?;
            tracing::debug!(from = %from, "backfill no-op, projection is current");
            return Ok(BackfillReport::default());
        };

        let entries = self
            .bounded("fetch_range", self.log.fetch_range(from, head))
            .await?;

        let mut report = BackfillReport::default();
        let earliest_deferred = {
            let mut region = self.apply.lock().await;
            for envelope in &entries {
                match self.apply_envelope(&mut region, envelope).await? {
                    Application::Applied => report.applied += 1,
                    Application::Duplicate => report.duplicates += 1,
                    Application::Deferred | Application::Ignored => {}
                }
            }
            self.retry_deferred(&mut region).await?;
            report.deferred = region.deferred.len();
            region.deferred.iter().map(|e| e.position).min()
        };

        // Every entry up to the observed head is durably applied, so the
        // cursor may move, but never past a still-deferred revocation: the
        // deferral queue lives in memory only, and a restart must be able
        // to re-fetch the entry.
        let advance_to = match earliest_deferred {
            None => Some(head),
            Some(deferred) => position_before(deferred).map(|p| p.min(head)),
        };
        match advance_to {
            Some(position) => {
                self.bounded("advance_cursor", self.store.advance_cursor(position))
                    .await?;
            }
            None => {
                self.bounded("touch_sync_time", self.store.touch_sync_time())
                    .await?;
            }
        }

        tracing::info!(
            from = %from,
            head = %head,
            applied = report.applied,
            duplicates = report.duplicates,
            deferred = report.deferred,
            "backfill pass complete"
        );
        Ok(report)
    }

    /// Consumes the live subscription until shutdown.
    ///
    /// Each entry is applied; once caught up the cursor also advances to
    /// the entry's own position, making it a safe resumption point
    /// mid-stream. Subscription trouble never kills the process: the
    /// stream is re-established after a pause and the heal pass reconciles
    /// the gap.
    #[tracing::instrument(skip(self, shutdown))]
    pub async fn run_live(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        'resubscribe: loop {
            if *shutdown.borrow() {
                break;
            }

            let mut stream = match self.bounded("subscribe", self.log.subscribe()).await {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::warn!(%error, "live subscription failed, next heal pass reconciles");
                    tokio::select! {
                        _ = shutdown.changed() => break 'resubscribe,
                        _ = tokio::time::sleep(self.config.resubscribe_delay) => continue 'resubscribe,
                    }
                }
            };

            // A fresh subscription invalidates any caught-up proof made
            // against an earlier one.
            self.live_epoch.fetch_add(1, Ordering::SeqCst);
            self.live_active.store(true, Ordering::SeqCst);
            self.set_state(SyncState::Live).await;
            tracing::info!("live subscription established");

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        self.live_active.store(false, Ordering::SeqCst);
                        self.caught_up.store(false, Ordering::SeqCst);
                        break 'resubscribe;
                    }
                    item = stream.next() => match item {
                        Some(Ok(envelope)) => {
                            if let Err(error) = self.apply_live(envelope).await {
                                // The entry is now unapplied below the
                                // cursor's reach; later entries must not
                                // move the cursor past it.
                                self.caught_up.store(false, Ordering::SeqCst);
                                tracing::warn!(%error, "live apply failed, heal pass will retry the event");
                            }
                        }
                        Some(Err(EventLogError::Lagged { skipped })) => {
                            // The stream is no longer gapless; stop moving
                            // the cursor until a backfill pass re-covers it.
                            self.caught_up.store(false, Ordering::SeqCst);
                            metrics::counter!("sync_live_lagged_total").increment(skipped);
                            tracing::warn!(skipped, "live subscription lagged, heal pass reconciles");
                        }
                        Some(Err(error)) => {
                            tracing::warn!(%error, "live subscription error, re-subscribing");
                            break;
                        }
                        None => {
                            tracing::warn!("live subscription closed, re-subscribing");
                            break;
                        }
                    }
                }
            }

            self.live_active.store(false, Ordering::SeqCst);
            self.caught_up.store(false, Ordering::SeqCst);
            self.set_state(SyncState::Idle).await;
            tokio::select! {
                _ = shutdown.changed() => break 'resubscribe,
                _ = tokio::time::sleep(self.config.resubscribe_delay) => {}
            }
        }

        self.live_active.store(false, Ordering::SeqCst);
        self.caught_up.store(false, Ordering::SeqCst);
        self.set_state(SyncState::Idle).await;
        tracing::info!("live loop stopped");
        Ok(())
    }

    /// Applies one live entry, then advances the cursor to its position.
    ///
    /// Apply-before-advance is the shutdown/crash safety order: an
    /// interrupted application leaves the cursor behind the event, and
    /// re-application is idempotent. The cursor moves only once caught up;
    /// before that the entry is still applied, and backfill owns the cursor.
    async fn apply_live(&self, envelope: LogEnvelope) -> Result<()> {
        let position = envelope.position;
        {
            let mut region = self.apply.lock().await;
            self.apply_envelope(&mut region, &envelope).await?;
        }
        if self.caught_up.load(Ordering::SeqCst) {
            self.bounded("advance_cursor", self.store.advance_cursor(position))
                .await?;
        }
        Ok(())
    }

    /// Orchestrates the full lifecycle: startup backfill (fatal on
    /// failure), spawned live loop, and the interval heal pass.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<()>
    where
        L: 'static,
        P: 'static,
    {
        // Subscribe before the startup backfill reads the head: every
        // entry is then covered by one path or the other, with no window
        // between them.
        let live = {
            let this = Arc::clone(&self);
            let rx = shutdown.clone();
            tokio::spawn(async move { this.run_live(rx).await })
        };

        // A log or store that is unreachable at startup is a fatal
        // configuration problem; after this point every failure is
        // transient and retried.
        if let Err(error) = self.run_backfill().await {
            live.abort();
            return Err(error);
        }

        let mut heal = tokio::time::interval(self.config.heal_interval);
        heal.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        heal.tick().await; // the first tick fires immediately

        let mut shutdown = shutdown;
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = heal.tick() => {
                    if let Err(error) = self.run_backfill().await {
                        tracing::warn!(%error, "heal backfill failed, retrying next interval");
                    }
                }
            }
        }

        if let Err(error) = live.await {
            tracing::warn!(%error, "live task join failed");
        }
        tracing::info!("synchronizer stopped");
        Ok(())
    }

    /// Retries every deferred revocation; still-missing ones re-defer.
    async fn retry_deferred(&self, region: &mut ApplyState) -> Result<()> {
        if region.deferred.is_empty() {
            return Ok(());
        }
        let pending: Vec<LogEnvelope> = region.deferred.drain(..).collect();
        for envelope in &pending {
            self.apply_envelope(region, envelope).await?;
        }
        metrics::gauge!("sync_deferred_revocations").set(region.deferred.len() as f64);
        Ok(())
    }

    /// The unit of application: decode, transition, persist.
    async fn apply_envelope(
        &self,
        region: &mut ApplyState,
        envelope: &LogEnvelope,
    ) -> Result<Application> {
        let event: LedgerEvent = match envelope.event_type.as_str() {
            "ViolationRecorded" | "PointsRevoked" | "MaxPointsUpdated" => {
                match envelope.decode() {
                    Ok(event) => event,
                    Err(error) => {
                        // The log is trusted fact; an undecodable payload is
                        // a transport bug. Skipping beats wedging the cursor
                        // on one entry forever.
                        metrics::counter!("sync_decode_failures_total").increment(1);
                        tracing::error!(
                            %error,
                            position = %envelope.position,
                            event_type = %envelope.event_type,
                            "undecodable payload, skipping entry"
                        );
                        return Ok(Application::Ignored);
                    }
                }
            }
            // DriverSuspended / DriverReinstated arrive on the wire too,
            // but they are derived facts; the machine re-derives them.
            other => {
                tracing::debug!(event_type = %other, "ignoring non-state-bearing entry");
                return Ok(Application::Ignored);
            }
        };

        let aggregate = match event.driver() {
            Some(address) => {
                self.bounded("get_driver", self.store.get_driver(address))
                    .await?
            }
            None => None,
        };
        let existing = match &event {
            LedgerEvent::ViolationRecorded(data) => {
                self.bounded("get_violation", self.store.get_violation(data.violation_id))
                    .await?
            }
            LedgerEvent::PointsRevoked(data) => {
                self.bounded("get_violation", self.store.get_violation(data.violation_id))
                    .await?
            }
            LedgerEvent::MaxPointsUpdated(_) => None,
        };

        let outcome = region.machine.apply(
            aggregate.as_ref(),
            existing.as_ref(),
            &event,
            envelope.position,
            envelope.tx_hash,
        );

        match outcome {
            ApplyOutcome::Applied(transition) => {
                // Driver row first: violation rows reference it.
                self.bounded("upsert_driver", self.store.upsert_driver(&transition.aggregate))
                    .await?;
                self.bounded(
                    "upsert_violation",
                    self.store.upsert_violation(&transition.record),
                )
                .await?;

                match transition.signal {
                    Some(Signal::DriverSuspended(driver)) => {
                        metrics::counter!("sync_drivers_suspended_total").increment(1);
                        tracing::info!(%driver, "driver suspended");
                    }
                    Some(Signal::DriverReinstated(driver)) => {
                        metrics::counter!("sync_drivers_reinstated_total").increment(1);
                        tracing::info!(%driver, "driver reinstated");
                    }
                    None => {}
                }

                metrics::counter!("sync_events_applied_total").increment(1);
                tracing::debug!(
                    event_type = envelope.event_type.as_str(),
                    position = %envelope.position,
                    "event applied"
                );
                Ok(Application::Applied)
            }
            ApplyOutcome::PolicyUpdated { new_max } => {
                metrics::counter!("sync_events_applied_total").increment(1);
                tracing::info!(new_max, "points policy updated");
                Ok(Application::Applied)
            }
            ApplyOutcome::AlreadyApplied => {
                metrics::counter!("sync_duplicate_events_total").increment(1);
                tracing::debug!(position = %envelope.position, "duplicate delivery, no-op");
                Ok(Application::Duplicate)
            }
            ApplyOutcome::MissingRecording { violation_id } => {
                if !region
                    .deferred
                    .iter()
                    .any(|e| e.position == envelope.position)
                {
                    region.deferred.push_back(envelope.clone());
                }
                metrics::gauge!("sync_deferred_revocations").set(region.deferred.len() as f64);
                tracing::warn!(
                    %violation_id,
                    position = %envelope.position,
                    "revocation before its recording, deferred for retry"
                );
                Ok(Application::Deferred)
            }
        }
    }
}

/// The position immediately before `position`, if one exists.
fn position_before(position: LogPosition) -> Option<LogPosition> {
    if position.log_index > 0 {
        Some(LogPosition::new(position.block_number, position.log_index - 1))
    } else if position.block_number > 0 {
        Some(LogPosition::new(position.block_number - 1, u32::MAX))
    } else {
        None
    }
}
