//! Batch scheduler for deploy and destroy runs.
//!
//! Challenges advance through their lifecycle batch by batch: a batch only
//! starts once every unit of the previous batch is terminal, so a worker can
//! assume all of its challenge's dependencies are Deployed before resolving.
//! Within a batch, workers run concurrently under a semaphore bound; one
//! failed challenge skips its transitive dependents without disturbing
//! unrelated branches.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{RangeError, Result};
use crate::graph::DependencyGraph;
use crate::ledger::{input_signature, Ledger, LedgerEntry};
use crate::lifecycle::{LifecycleState, UnitState};
use crate::provisioner::Provisioner;
use crate::report::{FailureKind, RunMode, RunReport, UnitError, UnitReport};
use crate::resolver;
use crate::store::OutputStore;
use crate::unit::Challenge;

// ---------------------------------------------------------------------------
// RunOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker bound within a batch. Each worker holds one external
    /// provisioner process, so this stays small.
    pub concurrency: usize,
    /// Per-challenge adapter timeout; `None` waits indefinitely.
    pub unit_timeout: Option<Duration>,
    /// Opt-in fast path: reuse recorded outputs when the input signature is
    /// unchanged instead of re-applying.
    pub reuse: bool,
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            unit_timeout: None,
            reuse: false,
            cancel: CancellationToken::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    challenges: BTreeMap<String, Challenge>,
    graph: DependencyGraph,
    provisioner: Arc<dyn Provisioner>,
    base_dir: PathBuf,
}

/// Terminal result of one worker, fed back into scheduling.
#[derive(Debug, Clone)]
struct UnitOutcome {
    state: LifecycleState,
    reused: bool,
    duration_secs: f64,
    error: Option<UnitError>,
    ledger_update: Option<LedgerUpdate>,
}

#[derive(Debug, Clone)]
enum LedgerUpdate {
    Deployed {
        signature: String,
        outputs: BTreeMap<String, Value>,
    },
    Destroyed,
}

impl UnitOutcome {
    fn failed(kind: FailureKind, detail: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            state: LifecycleState::Failed,
            reused: false,
            duration_secs,
            error: Some(UnitError::new(kind, detail)),
            ledger_update: None,
        }
    }

    fn skipped(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            state: LifecycleState::Skipped,
            reused: false,
            duration_secs: 0.0,
            error: Some(UnitError::new(kind, detail)),
            ledger_update: None,
        }
    }
}

impl Orchestrator {
    /// Register the challenge set and build its dependency graph. Structural
    /// errors (duplicate ids, unknown references, cycles) surface here,
    /// before anything deploys.
    pub fn new(
        challenges: Vec<Challenge>,
        provisioner: Arc<dyn Provisioner>,
        base_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let graph = DependencyGraph::build(&challenges)?;
        let challenges = challenges.into_iter().map(|c| (c.id.clone(), c)).collect();
        Ok(Self {
            challenges,
            graph,
            provisioner,
            base_dir: base_dir.into(),
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Drive `targets` (plus whatever the mode requires around them) to
    /// their terminal states and report the result. The ledger is updated
    /// in memory as units land; the caller persists it.
    pub async fn run(
        &self,
        mode: RunMode,
        targets: &[String],
        ledger: &mut Ledger,
        opts: &RunOptions,
    ) -> Result<RunReport> {
        for t in targets {
            if !self.graph.contains(t) {
                return Err(RangeError::ChallengeNotFound(t.clone()));
            }
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%run_id, %mode, targets = targets.len(), "starting run");

        let store = OutputStore::new();
        let (requested, batches) = match mode {
            RunMode::Deploy => (self.deploy_set(targets), self.graph.deploy_batches()),
            RunMode::Destroy => {
                // Workers resolve destroy-time inputs against the outputs
                // recorded when their dependencies deployed.
                for (id, entry) in &ledger.entries {
                    store.record(id, entry.outputs.clone());
                }
                (self.destroy_set(targets, ledger), self.graph.destroy_batches())
            }
        };

        let mut outcomes: HashMap<String, UnitOutcome> = HashMap::new();
        for batch in &batches {
            if opts.cancel.is_cancelled() {
                // Remaining units are reported Skipped/cancelled by assemble().
                break;
            }
            let members: Vec<&String> = batch
                .iter()
                .filter(|id| requested.contains(*id) && !outcomes.contains_key(*id))
                .collect();
            if members.is_empty() {
                continue;
            }

            let settled = self
                .run_batch(mode, &members, &store, ledger, opts)
                .await;
            for (id, outcome) in settled {
                self.apply_ledger_update(&id, &outcome, ledger);
                outcomes.insert(id, outcome);
            }

            self.cascade(mode, &requested, &mut outcomes);
        }

        let units = self.assemble(&batches, &requested, outcomes);
        let report = RunReport {
            run_id,
            mode,
            started_at,
            finished_at: Utc::now(),
            units,
            outputs: store.snapshot(),
        };
        tracing::info!(
            %run_id,
            succeeded = report.succeeded(),
            units = report.units.len(),
            "run finished"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    async fn run_batch(
        &self,
        mode: RunMode,
        members: &[&String],
        store: &OutputStore,
        ledger: &Ledger,
        opts: &RunOptions,
    ) -> Vec<(String, UnitOutcome)> {
        let semaphore = Arc::new(Semaphore::new(opts.concurrency.max(1)));
        let mut join_set: JoinSet<(String, UnitOutcome)> = JoinSet::new();
        let mut settled = Vec::new();

        for &id in members {
            if opts.cancel.is_cancelled() {
                settled.push((
                    id.clone(),
                    UnitOutcome::skipped(FailureKind::Cancelled, "run cancelled"),
                ));
                continue;
            }

            let worker = Worker {
                challenge: self.challenges[id].clone(),
                workdir: self.base_dir.join(&self.challenges[id].directory),
                provisioner: Arc::clone(&self.provisioner),
                store: store.clone(),
                prior: ledger.entry(id).cloned(),
                unit_timeout: opts.unit_timeout,
                reuse: opts.reuse,
                cancel: opts.cancel.clone(),
            };
            let sem = Arc::clone(&semaphore);
            let id = id.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore never closed");
                let outcome = match mode {
                    RunMode::Deploy => worker.deploy().await,
                    RunMode::Destroy => worker.destroy().await,
                };
                (id, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => settled.push(result),
                Err(join_err) => {
                    tracing::error!("worker task failed: {join_err}");
                }
            }
        }
        settled
    }

    /// Mark every not-yet-settled unit downstream of a failure as Skipped.
    /// Downstream means dependents on deploy, dependencies on destroy (a
    /// challenge cannot be torn down while a dependent still stands).
    fn cascade(
        &self,
        mode: RunMode,
        requested: &BTreeSet<String>,
        outcomes: &mut HashMap<String, UnitOutcome>,
    ) {
        // Cancellation is run-scoped, not a dependency failure: dependents of
        // a cancelled unit stay cancelled rather than cascading.
        let broken: Vec<String> = outcomes
            .iter()
            .filter(|(_, o)| match o.state {
                LifecycleState::Failed => true,
                LifecycleState::Skipped => o
                    .error
                    .as_ref()
                    .is_some_and(|e| e.kind != FailureKind::Cancelled),
                _ => false,
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in broken {
            let downstream = match mode {
                RunMode::Deploy => self.graph.dependents(&id),
                RunMode::Destroy => self.graph.dependencies(&id),
            };
            let state = outcomes[&id].state;
            for dep in downstream {
                if !requested.contains(&dep) || outcomes.contains_key(&dep) {
                    continue;
                }
                tracing::warn!(unit = %dep, cause = %id, "skipping: blocked by {state} unit");
                outcomes.insert(
                    dep,
                    UnitOutcome::skipped(
                        FailureKind::DependencyFailed,
                        format!("blocked by '{id}' ({state})"),
                    ),
                );
            }
        }
    }

    /// Deploy covers the targets plus everything they transitively need.
    fn deploy_set(&self, targets: &[String]) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        for t in targets {
            set.insert(t.clone());
            set.extend(self.graph.dependencies(t));
        }
        set
    }

    /// Destroy covers the targets plus every deployed challenge that still
    /// depends on them.
    fn destroy_set(&self, targets: &[String], ledger: &Ledger) -> BTreeSet<String> {
        let mut set = BTreeSet::new();
        for t in targets {
            set.insert(t.clone());
            for dep in self.graph.dependents(t) {
                if ledger.entry(&dep).is_some() {
                    set.insert(dep);
                }
            }
        }
        set
    }

    fn apply_ledger_update(&self, id: &str, outcome: &UnitOutcome, ledger: &mut Ledger) {
        match &outcome.ledger_update {
            Some(LedgerUpdate::Deployed { signature, outputs }) => {
                ledger.record_deploy(id, signature.clone(), outputs.clone());
            }
            Some(LedgerUpdate::Destroyed) => ledger.record_destroy(id),
            None => {}
        }
    }

    fn assemble(
        &self,
        batches: &[Vec<String>],
        requested: &BTreeSet<String>,
        mut outcomes: HashMap<String, UnitOutcome>,
    ) -> Vec<UnitReport> {
        let mut units = Vec::with_capacity(requested.len());
        for batch in batches {
            for id in batch {
                if !requested.contains(id) {
                    continue;
                }
                let outcome = outcomes.remove(id).unwrap_or_else(|| {
                    // A batch never ran because the run was cancelled first.
                    UnitOutcome::skipped(FailureKind::Cancelled, "run cancelled")
                });
                units.push(UnitReport {
                    id: id.clone(),
                    state: outcome.state,
                    reused: outcome.reused,
                    duration_secs: outcome.duration_secs,
                    error: outcome.error,
                });
            }
        }
        units
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Everything one unit's lifecycle needs, moved into its task.
struct Worker {
    challenge: Challenge,
    workdir: PathBuf,
    provisioner: Arc<dyn Provisioner>,
    store: OutputStore,
    prior: Option<LedgerEntry>,
    unit_timeout: Option<Duration>,
    reuse: bool,
    cancel: CancellationToken,
}

impl Worker {
    async fn deploy(self) -> UnitOutcome {
        let id = self.challenge.id.clone();
        let start = Instant::now();
        let mut sm = UnitState::new();

        if let Err(e) = sm.transition(LifecycleState::Resolving) {
            return UnitOutcome::failed(FailureKind::Resolve, e.to_string(), 0.0);
        }
        tracing::debug!(unit = %id, "resolving inputs");
        let resolved = match resolver::resolve(&self.challenge, &self.store) {
            Ok(r) => r,
            Err(e) => {
                let _ = sm.transition(LifecycleState::Failed);
                return UnitOutcome::failed(
                    FailureKind::Resolve,
                    e.to_string(),
                    start.elapsed().as_secs_f64(),
                );
            }
        };

        let signature = input_signature(&resolved);
        if let Err(e) = sm.transition(LifecycleState::Applying) {
            return UnitOutcome::failed(FailureKind::Apply, e.to_string(), 0.0);
        }

        let unchanged = self
            .prior
            .as_ref()
            .is_some_and(|p| p.signature == signature);
        if self.reuse && unchanged {
            let read = self
                .guarded(
                    FailureKind::Apply,
                    self.provisioner.read_outputs(&id, &self.workdir),
                )
                .await;
            if let Ok(outputs) = read {
                tracing::info!(unit = %id, "inputs unchanged, reusing recorded outputs");
                self.store.record(&id, outputs.clone());
                let _ = sm.transition(LifecycleState::Deployed);
                return UnitOutcome {
                    state: LifecycleState::Deployed,
                    reused: true,
                    duration_secs: start.elapsed().as_secs_f64(),
                    error: None,
                    ledger_update: Some(LedgerUpdate::Deployed { signature, outputs }),
                };
            }
            tracing::warn!(unit = %id, "output read failed, falling back to apply");
        }

        tracing::info!(unit = %id, workdir = %self.workdir.display(), "applying");
        match self
            .guarded(
                FailureKind::Apply,
                self.provisioner.apply(&id, &self.workdir, &resolved),
            )
            .await
        {
            Ok(outputs) => {
                for declared in &self.challenge.outputs {
                    if !outputs.contains_key(declared) {
                        tracing::warn!(unit = %id, output = %declared, "declared output missing from apply result");
                    }
                }
                self.store.record(&id, outputs.clone());
                let _ = sm.transition(LifecycleState::Deployed);
                tracing::info!(unit = %id, outputs = outputs.len(), "deployed");
                UnitOutcome {
                    state: LifecycleState::Deployed,
                    reused: false,
                    duration_secs: start.elapsed().as_secs_f64(),
                    error: None,
                    ledger_update: Some(LedgerUpdate::Deployed { signature, outputs }),
                }
            }
            Err(e) => {
                let _ = sm.transition(LifecycleState::Failed);
                tracing::error!(unit = %id, "apply failed: {}", e.detail);
                UnitOutcome {
                    state: LifecycleState::Failed,
                    reused: false,
                    duration_secs: start.elapsed().as_secs_f64(),
                    error: Some(e),
                    ledger_update: None,
                }
            }
        }
    }

    async fn destroy(self) -> UnitOutcome {
        let id = self.challenge.id.clone();
        let start = Instant::now();

        if self.prior.is_none() {
            // Never deployed; nothing to tear down.
            return UnitOutcome {
                state: LifecycleState::Destroyed,
                reused: false,
                duration_secs: 0.0,
                error: None,
                ledger_update: None,
            };
        }

        let mut sm = UnitState::deployed();
        if let Err(e) = sm.transition(LifecycleState::Destroying) {
            return UnitOutcome::failed(FailureKind::Destroy, e.to_string(), 0.0);
        }

        // Destroy-time inputs resolve against the ledger-seeded store; a
        // hole here means the recorded state is inconsistent.
        let resolved = match resolver::resolve(&self.challenge, &self.store) {
            Ok(r) => r,
            Err(e) => {
                let _ = sm.transition(LifecycleState::Failed);
                return UnitOutcome::failed(
                    FailureKind::Resolve,
                    e.to_string(),
                    start.elapsed().as_secs_f64(),
                );
            }
        };

        tracing::info!(unit = %id, workdir = %self.workdir.display(), "destroying");
        match self
            .guarded(
                FailureKind::Destroy,
                self.provisioner.destroy(&id, &self.workdir, &resolved),
            )
            .await
        {
            Ok(()) => {
                let _ = sm.transition(LifecycleState::Destroyed);
                tracing::info!(unit = %id, "destroyed");
                UnitOutcome {
                    state: LifecycleState::Destroyed,
                    reused: false,
                    duration_secs: start.elapsed().as_secs_f64(),
                    error: None,
                    ledger_update: Some(LedgerUpdate::Destroyed),
                }
            }
            Err(e) => {
                // The challenge stays recorded as deployed-but-broken for
                // operator intervention.
                let _ = sm.transition(LifecycleState::Failed);
                tracing::error!(unit = %id, "destroy failed: {}", e.detail);
                UnitOutcome {
                    state: LifecycleState::Failed,
                    reused: false,
                    duration_secs: start.elapsed().as_secs_f64(),
                    error: Some(e),
                    ledger_update: None,
                }
            }
        }
    }

    /// Run one adapter call under the unit timeout and the run's
    /// cancellation token. The failure kind tags adapter errors; timeout and
    /// cancellation carry their own kinds.
    async fn guarded<T>(
        &self,
        kind: FailureKind,
        call: impl std::future::Future<Output = crate::provisioner::ProvisionResult<T>>,
    ) -> std::result::Result<T, UnitError> {
        let bounded = async {
            match self.unit_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result.map_err(|e| UnitError::new(kind, e.to_string())),
                    Err(_) => Err(UnitError::new(
                        FailureKind::Timeout,
                        format!("timed out after {}s", limit.as_secs()),
                    )),
                },
                None => call.await.map_err(|e| UnitError::new(kind, e.to_string())),
            }
        };
        tokio::select! {
            () = self.cancel.cancelled() => Err(UnitError::new(
                FailureKind::Cancelled,
                "run cancelled while waiting on the provisioner",
            )),
            result = bounded => result,
        }
    }
}
