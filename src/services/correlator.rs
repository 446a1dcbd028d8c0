use {
    crate::domain::{
        callback::CallbackPayload,
        error::CorrelationError,
        id::CorrelationId,
        provider::CallbackSink,
        transaction::{TransactionKind, TransactionOutcome, TransactionState},
    },
    std::{
        collections::HashMap,
        sync::{
            Arc, Mutex, MutexGuard, OnceLock, PoisonError,
            atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
        },
        time::Duration,
    },
    tokio::{sync::watch, time::Instant},
};

#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// How long a registered transaction waits for its callback.
    pub callback_deadline: Duration,
    /// How long an unmatched callback is kept for a late `register`.
    pub orphan_retention: Duration,
    /// How long a terminal entry stays to classify duplicate and late callbacks.
    pub resolved_retention: Duration,
}

/// What `resolve` did with a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Set the outcome of a pending transaction.
    Applied,
    /// Same id already resolved by an earlier callback; ignored.
    Duplicate,
    /// No pending transaction to apply to; retained for late registration.
    Orphaned,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::Orphaned => "orphaned",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub evicted: usize,
    pub orphans_dropped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    pub pending: usize,
    pub terminal: usize,
    pub orphans: usize,
    pub applied: u64,
    pub duplicates: u64,
    pub orphaned: u64,
    pub expired: u64,
    pub orphans_dropped: u64,
}

struct Telemetry {
    sink: Arc<dyn CallbackSink>,
    applied: AtomicU64,
    duplicates: AtomicU64,
    orphaned: AtomicU64,
    expired: AtomicU64,
    orphans_dropped: AtomicU64,
}

impl Telemetry {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// One registered transaction. Shared between the registry and every handle.
struct PendingEntry {
    id: CorrelationId,
    kind: TransactionKind,
    created_at: Instant,
    deadline: Instant,
    state: AtomicU8,
    outcome: OnceLock<TransactionOutcome>,
    finished_at: OnceLock<Instant>,
    signal: watch::Sender<Option<TransactionOutcome>>,
    telemetry: Option<Arc<Telemetry>>,
}

impl PendingEntry {
    fn new(
        id: CorrelationId,
        kind: TransactionKind,
        deadline: Duration,
        telemetry: Option<Arc<Telemetry>>,
    ) -> Self {
        let created_at = Instant::now();
        let (signal, _) = watch::channel(None);
        Self {
            id,
            kind,
            created_at,
            deadline: created_at + deadline,
            state: AtomicU8::new(TransactionState::Created as u8),
            outcome: OnceLock::new(),
            finished_at: OnceLock::new(),
            signal,
            telemetry,
        }
    }

    /// Raw lifecycle state. Decides races; may run ahead of `outcome`.
    fn raw_state(&self) -> TransactionState {
        // Only valid discriminants are ever stored.
        TransactionState::from_u8(self.state.load(Ordering::Acquire))
            .unwrap_or(TransactionState::Failed)
    }

    /// State as observers see it: terminal only once the outcome is readable.
    fn state(&self) -> TransactionState {
        if let Some(outcome) = self.outcome.get() {
            return outcome.terminal_state();
        }
        match self.raw_state() {
            // The winner of `finish` is still publishing.
            state if state.is_terminal() => TransactionState::AwaitingCallback,
            state => state,
        }
    }

    fn advance(&self, from: TransactionState, to: TransactionState) -> bool {
        debug_assert!(from.can_transition_to(&to), "illegal transition {from} -> {to}");
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn mark_awaiting(&self) -> bool {
        self.advance(TransactionState::Created, TransactionState::AwaitingCallback)
    }

    /// The single terminal transition. Returns `false` if another outcome won.
    fn finish(&self, outcome: TransactionOutcome) -> bool {
        let from = match outcome {
            TransactionOutcome::RegistrationFailed { .. } => TransactionState::Created,
            _ => TransactionState::AwaitingCallback,
        };
        if !self.advance(from, outcome.terminal_state()) {
            return false;
        }

        let _ = self.finished_at.set(Instant::now());
        let _ = self.outcome.set(outcome.clone());
        self.signal.send_replace(Some(outcome));
        true
    }

    fn expire(&self) -> bool {
        if !self.finish(TransactionOutcome::TimedOut) {
            return false;
        }

        tracing::warn!(
            correlation_id = %self.id,
            kind = %self.kind,
            waited_ms = self.created_at.elapsed().as_millis() as u64,
            "no callback before deadline, transaction timed out"
        );
        if let Some(telemetry) = &self.telemetry {
            Telemetry::bump(&telemetry.expired);
            telemetry
                .sink
                .record(&CorrelationError::Timeout(self.id.clone()), None);
        }
        true
    }

    fn evictable(&self, now: Instant, retention: Duration) -> bool {
        self.finished_at
            .get()
            .is_some_and(|finished| *finished + retention <= now)
    }
}

/// Awaitable view of one transaction. Dropping it, or abandoning a `wait`,
/// never affects the transaction itself.
pub struct PendingHandle {
    entry: Arc<PendingEntry>,
    rx: watch::Receiver<Option<TransactionOutcome>>,
}

impl PendingHandle {
    fn new(entry: Arc<PendingEntry>) -> Self {
        let rx = entry.signal.subscribe();
        Self { entry, rx }
    }

    /// Handle for a transaction the remote accepted but that could not be
    /// registered. It is already `Failed`.
    pub fn registration_failed(
        id: CorrelationId,
        kind: TransactionKind,
        reason: impl Into<String>,
    ) -> Self {
        let entry = Arc::new(PendingEntry::new(id, kind, Duration::ZERO, None));
        entry.finish(TransactionOutcome::RegistrationFailed {
            reason: reason.into(),
        });
        Self::new(entry)
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.entry.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.entry.kind
    }

    /// A terminal state is reported only once `outcome()` returns it.
    pub fn state(&self) -> TransactionState {
        self.entry.state()
    }

    pub fn deadline(&self) -> Instant {
        self.entry.deadline
    }

    pub fn outcome(&self) -> Option<TransactionOutcome> {
        self.entry.outcome.get().cloned()
    }

    /// Wait for the outcome. If the transaction's deadline passes first, the
    /// waiter performs the expiry itself.
    pub async fn wait(&mut self) -> TransactionOutcome {
        let deadline = self.entry.deadline;
        tokio::select! {
            biased;
            published = self.rx.wait_for(Option::is_some) => {
                if let Some(outcome) = published.ok().and_then(|o| o.clone()) {
                    return outcome;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                self.entry.expire();
            }
        }
        // Either this waiter or a concurrent resolver just finished the entry.
        self.published().await
    }

    /// Bounded wait. On elapse only this waiter gives up; the transaction
    /// keeps waiting for its callback.
    pub async fn wait_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<TransactionOutcome, CorrelationError> {
        let id = self.entry.id.clone();
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| CorrelationError::Timeout(id))
    }

    async fn published(&mut self) -> TransactionOutcome {
        if let Some(outcome) = self
            .rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|o| o.clone())
        {
            return outcome;
        }
        // The sender lives in the entry we hold, so the channel cannot close.
        self.entry
            .outcome
            .get()
            .cloned()
            .unwrap_or(TransactionOutcome::TimedOut)
    }
}

struct Orphan {
    payload: CallbackPayload,
    received_at: Instant,
}

#[derive(Default)]
struct Registry {
    pending: HashMap<CorrelationId, Arc<PendingEntry>>,
    orphans: HashMap<CorrelationId, Orphan>,
}

impl Registry {
    /// Returns `true` if this is the first unmatched callback for `id`.
    fn stash_orphan(&mut self, id: &CorrelationId, payload: &CallbackPayload) -> bool {
        if self.orphans.contains_key(id) {
            return false;
        }
        self.orphans.insert(
            id.clone(),
            Orphan {
                payload: payload.clone(),
                received_at: Instant::now(),
            },
        );
        true
    }
}

/// Maps correlation ids to pending transactions. Owned by the application
/// (usually behind an `Arc` in `AppState`); create a fresh one per test.
///
/// The registry mutex only guards map insert/lookup/remove. Outcome delivery
/// happens through each entry's atomic state, outside the lock.
pub struct Correlator {
    config: CorrelatorConfig,
    registry: Mutex<Registry>,
    telemetry: Arc<Telemetry>,
    closed: AtomicBool,
}

impl Correlator {
    pub fn new(config: CorrelatorConfig, sink: Arc<dyn CallbackSink>) -> Self {
        Self {
            config,
            registry: Mutex::new(Registry::default()),
            telemetry: Arc::new(Telemetry {
                sink,
                applied: AtomicU64::new(0),
                duplicates: AtomicU64::new(0),
                orphaned: AtomicU64::new(0),
                expired: AtomicU64::new(0),
                orphans_dropped: AtomicU64::new(0),
            }),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Nothing panics while holding the lock; recover rather than cascade.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking `id`. An orphaned callback already received for `id` is
    /// claimed immediately and the returned handle is already terminal.
    pub fn register(
        &self,
        id: CorrelationId,
        kind: TransactionKind,
    ) -> Result<PendingHandle, CorrelationError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CorrelationError::Closed);
        }

        let entry = Arc::new(PendingEntry::new(
            id.clone(),
            kind,
            self.config.callback_deadline,
            Some(self.telemetry.clone()),
        ));
        entry.mark_awaiting();

        let claimed = {
            let mut registry = self.registry();
            if registry
                .pending
                .get(&id)
                .is_some_and(|existing| !existing.raw_state().is_terminal())
            {
                return Err(CorrelationError::AlreadyRegistered(id));
            }

            // The entry is not visible to anyone else yet, so finishing it
            // here cannot race with resolve or expire.
            let claimed = registry.orphans.remove(&id);
            if let Some(orphan) = &claimed {
                entry.finish(orphan.payload.outcome());
            }
            registry.pending.insert(id.clone(), entry.clone());
            claimed
        };

        match claimed {
            Some(orphan) => {
                Telemetry::bump(&self.telemetry.applied);
                if orphan.payload.kind() != kind {
                    tracing::warn!(
                        correlation_id = %id,
                        registered = %kind,
                        callback = %orphan.payload.kind(),
                        "claimed orphan of a different transaction kind"
                    );
                }
                tracing::info!(
                    correlation_id = %id,
                    result_code = orphan.payload.result_code(),
                    waited_ms = orphan.received_at.elapsed().as_millis() as u64,
                    "registration claimed orphaned callback"
                );
            }
            None => tracing::debug!(correlation_id = %id, kind = %kind, "awaiting callback"),
        }

        Ok(PendingHandle::new(entry))
    }

    /// Another waiter on an already registered transaction.
    pub fn subscribe(&self, id: &CorrelationId) -> Option<PendingHandle> {
        let entry = self.registry().pending.get(id).cloned()?;
        Some(PendingHandle::new(entry))
    }

    pub fn state(&self, id: &CorrelationId) -> Option<TransactionState> {
        self.registry().pending.get(id).map(|entry| entry.state())
    }

    /// Apply a callback. The first callback for a pending transaction wins;
    /// later ones are ignored as duplicates. Callbacks with no live
    /// transaction, including ones arriving after a timeout, become orphans.
    pub fn resolve(&self, id: &CorrelationId, payload: CallbackPayload) -> Resolution {
        loop {
            let entry = {
                let mut registry = self.registry();
                let live = registry
                    .pending
                    .get(id)
                    .filter(|entry| entry.raw_state() != TransactionState::TimedOut)
                    .cloned();
                match live {
                    Some(entry) => entry,
                    None => {
                        let first = registry.stash_orphan(id, &payload);
                        drop(registry);
                        return self.report_orphan(id, &payload, first);
                    }
                }
            };

            if entry.finish(payload.outcome()) {
                Telemetry::bump(&self.telemetry.applied);
                tracing::info!(
                    correlation_id = %id,
                    kind = %payload.kind(),
                    result_code = payload.result_code(),
                    "callback applied"
                );
                return Resolution::Applied;
            }

            // Lost to `expire`: this callback is late, go around and treat
            // it as an orphan.
            if entry.raw_state() == TransactionState::TimedOut {
                continue;
            }

            Telemetry::bump(&self.telemetry.duplicates);
            self.telemetry.sink.record(
                &CorrelationError::DuplicateResolve(id.clone()),
                Some(&payload),
            );
            return Resolution::Duplicate;
        }
    }

    /// Retain a callback that has no pending transaction so a late `register`
    /// can claim it. The first orphan per id is kept.
    pub fn resolve_orphan(&self, id: &CorrelationId, payload: CallbackPayload) -> Resolution {
        let first = self.registry().stash_orphan(id, &payload);
        self.report_orphan(id, &payload, first)
    }

    fn report_orphan(&self, id: &CorrelationId, payload: &CallbackPayload, first: bool) -> Resolution {
        if first {
            Telemetry::bump(&self.telemetry.orphaned);
            self.telemetry
                .sink
                .record(&CorrelationError::Orphan(id.clone()), Some(payload));
            Resolution::Orphaned
        } else {
            Telemetry::bump(&self.telemetry.duplicates);
            self.telemetry
                .sink
                .record(&CorrelationError::DuplicateResolve(id.clone()), Some(payload));
            Resolution::Duplicate
        }
    }

    /// Time out `id` unless it already has an outcome.
    pub fn expire(&self, id: &CorrelationId) -> bool {
        let entry = self.registry().pending.get(id).cloned();
        entry.is_some_and(|entry| entry.expire())
    }

    /// Expire overdue transactions, evict terminal ones past retention and
    /// drop orphans nobody claimed.
    pub fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let (overdue, evicted, dropped) = {
            let mut registry = self.registry();

            let overdue: Vec<Arc<PendingEntry>> = registry
                .pending
                .values()
                .filter(|entry| !entry.raw_state().is_terminal() && entry.deadline <= now)
                .cloned()
                .collect();

            let before = registry.pending.len();
            let retention = self.config.resolved_retention;
            registry
                .pending
                .retain(|_, entry| !entry.evictable(now, retention));
            let evicted = before - registry.pending.len();

            let retention = self.config.orphan_retention;
            let mut dropped = Vec::new();
            registry.orphans.retain(|id, orphan| {
                let keep = orphan.received_at + retention > now;
                if !keep {
                    dropped.push((id.clone(), orphan.payload.kind(), orphan.payload.result_code()));
                }
                keep
            });

            (overdue, evicted, dropped)
        };

        let expired = overdue.iter().filter(|entry| entry.expire()).count();

        for (id, kind, result_code) in &dropped {
            Telemetry::bump(&self.telemetry.orphans_dropped);
            tracing::error!(
                correlation_id = %id,
                kind = %kind,
                result_code,
                "orphaned callback was never claimed, dropping"
            );
        }

        SweepReport {
            expired,
            evicted,
            orphans_dropped: dropped.len(),
        }
    }

    pub fn stats(&self) -> CorrelatorStats {
        let (pending, terminal, orphans) = {
            let registry = self.registry();
            let terminal = registry
                .pending
                .values()
                .filter(|entry| entry.state().is_terminal())
                .count();
            (
                registry.pending.len() - terminal,
                terminal,
                registry.orphans.len(),
            )
        };

        CorrelatorStats {
            pending,
            terminal,
            orphans,
            applied: self.telemetry.applied.load(Ordering::Relaxed),
            duplicates: self.telemetry.duplicates.load(Ordering::Relaxed),
            orphaned: self.telemetry.orphaned.load(Ordering::Relaxed),
            expired: self.telemetry.expired.load(Ordering::Relaxed),
            orphans_dropped: self.telemetry.orphans_dropped.load(Ordering::Relaxed),
        }
    }

    /// Refuse new registrations. Pending transactions still resolve.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("correlator closed to new registrations");
        }
    }
}
