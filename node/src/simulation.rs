//! # Byzantine Recovery Simulator
//!
//! Runs recovery trials against the real [`RecoveryAuthority`] with a
//! committee of `3f+1` watchers, of which up to `f` misbehave. Every trial
//! registers a fresh DID, configures its committee, collects endorsements
//! according to the chosen [`Behavior`], submits them and then replays the
//! same batch.
//!
//! ## Behaviours
//!
//! | Behaviour   | Batch                                        | Expected          |
//! |-------------|----------------------------------------------|-------------------|
//! | `honest`    | all `3f+1` watchers sign                     | commit            |
//! | `refuse`    | `f` watchers withhold, `2f+1` sign           | commit            |
//! | `garbage`   | `f` malformed endorsements + `2f+1` valid    | commit            |
//! | `impostor`  | `f` non-watcher endorsements + `2f+1` valid  | commit            |
//! | `duplicate` | `f` repeated endorsements + `2f+1` valid     | commit            |
//! | `rotation`  | all sign, then the controller rotates        | `epoch_mismatch`  |
//! | `race`      | same batch from several tasks at once        | exactly one commit|
//!
//! After the first submission every trial resubmits the batch. A committed
//! epoch must answer `already_completed`; a stale epoch must keep answering
//! `epoch_mismatch`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use rand::{Rng, RngCore};
use serde::Serialize;
use tracing::{debug, info};

use bftdid_contracts::{RecoveryAuthority, RecoveryProposal, RecoveryReceipt, RegistryError};
use bftdid_protocol::config::{network_name, ConfigError, RegistryConfig};
use bftdid_protocol::crypto::{Endorsement, Keypair};
use bftdid_protocol::identity::{DidId, DocRef, Identity};
use bftdid_protocol::storage::RecoveryStore;

use crate::metrics::NodeMetrics;

/// How the faulty part of the committee behaves in a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    Honest,
    Refuse,
    Garbage,
    Impostor,
    Duplicate,
    Rotation,
    Race,
}

impl Behavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::Honest => "honest",
            Behavior::Refuse => "refuse",
            Behavior::Garbage => "garbage",
            Behavior::Impostor => "impostor",
            Behavior::Duplicate => "duplicate",
            Behavior::Rotation => "rotation",
            Behavior::Race => "race",
        }
    }

    /// What the first submission should end in.
    pub fn expectation(&self) -> &'static str {
        match self {
            Behavior::Rotation => "epoch_mismatch",
            _ => "commit",
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to run.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub behaviors: Vec<Behavior>,
    pub faults: Vec<u32>,
    pub trials: usize,
    pub racers: usize,
}

impl SimulationPlan {
    pub fn validate(&self, config: &RegistryConfig) -> Result<()> {
        anyhow::ensure!(!self.behaviors.is_empty(), "no behaviours selected");
        anyhow::ensure!(!self.faults.is_empty(), "no fault bounds selected");
        anyhow::ensure!(self.trials > 0, "trials must be at least 1");
        anyhow::ensure!(self.racers >= 2, "race needs at least 2 submitters");
        for &f in &self.faults {
            let size = 3 * u64::from(f) + 1;
            anyhow::ensure!(
                size <= config.max_committee_size as u64,
                "f = {f} needs a committee of {size}, above the configured cap of {}",
                config.max_committee_size
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Aggregate over all trials of one (behaviour, f) pair.
#[derive(Debug, Clone, Serialize)]
pub struct CellReport {
    pub behavior: Behavior,
    pub f: u32,
    pub committee_size: usize,
    pub threshold: usize,
    pub expected: &'static str,
    pub trials: usize,
    pub commits: usize,
    pub replay_rejections: usize,
    /// Every rejection seen in the cell, first submissions and replays alike.
    pub rejections: BTreeMap<&'static str, usize>,
    pub mean_submitted: f64,
    pub mean_accepted: f64,
    pub mean_commit_latency_us: f64,
    pub unexpected: usize,
    /// First unexpected outcome, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CellReport {
    pub fn passed(&self) -> bool {
        self.unexpected == 0
    }

    pub fn name(&self) -> String {
        format!("{} f={}", self.behavior, self.f)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub network: &'static str,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u128,
    pub cells: Vec<CellReport>,
}

impl SimulationReport {
    pub fn passed(&self) -> bool {
        self.cells.iter().all(CellReport::passed)
    }

    pub fn failures(&self) -> usize {
        self.cells.iter().filter(|c| !c.passed()).count()
    }

    pub fn print_summary(&self) {
        println!("\n========================================");
        println!("     RECOVERY SIMULATION ({})", self.network);
        println!("========================================\n");

        for cell in &self.cells {
            let icon = if cell.passed() { "PASS" } else { "FAIL" };
            println!(
                "  [{}] {:<16} n={:<3} q={:<3} commits {}/{}  replays rejected {}  \
                 sigs {:.1} -> {:.1}  latency {:.0}us",
                icon,
                cell.name(),
                cell.committee_size,
                cell.threshold,
                cell.commits,
                cell.trials,
                cell.replay_rejections,
                cell.mean_submitted,
                cell.mean_accepted,
                cell.mean_commit_latency_us,
            );
            if !cell.rejections.is_empty() {
                let reasons: Vec<String> = cell
                    .rejections
                    .iter()
                    .map(|(reason, n)| format!("{reason}={n}"))
                    .collect();
                println!("         rejections: {}", reasons.join(", "));
            }
            if let Some(detail) = &cell.detail {
                println!("         {detail}");
            }
        }

        println!();
        let total = self.cells.len();
        let failed = self.failures();
        if failed == 0 {
            println!("  ALL PASSED {}/{} cells in {}ms", total, total, self.elapsed_ms);
        } else {
            println!(
                "  SOME FAILED {}/{} passed, {} failed",
                total - failed,
                total,
                failed
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Trials
// ---------------------------------------------------------------------------

struct Attempt {
    result: Result<RecoveryReceipt, RegistryError>,
    latency: Duration,
}

struct TrialOutcome {
    submitted: usize,
    accepted: Option<usize>,
    commits: usize,
    latency: Option<Duration>,
    rejections: Vec<&'static str>,
    replay_rejected: bool,
    /// Why the trial did not go as expected.
    problem: Option<String>,
}

/// Drives one authority through the plan. Every trial uses a fresh DID, so
/// a persistent store can be reused across runs.
pub struct Simulator<S> {
    authority: Arc<RecoveryAuthority<S>>,
    metrics: NodeMetrics,
    run_id: u64,
}

impl<S: RecoveryStore + 'static> Simulator<S> {
    pub fn new(store: S, config: RegistryConfig, metrics: NodeMetrics) -> Result<Self, ConfigError> {
        Ok(Self {
            authority: Arc::new(RecoveryAuthority::new(store, config)?),
            metrics,
            run_id: rand::thread_rng().gen(),
        })
    }

    pub fn authority(&self) -> &RecoveryAuthority<S> {
        &self.authority
    }

    pub async fn run(&self, plan: &SimulationPlan) -> Result<SimulationReport> {
        plan.validate(self.authority.config())?;

        let started_at = Utc::now();
        let clock = Instant::now();
        let mut cells = Vec::with_capacity(plan.behaviors.len() * plan.faults.len());

        for &behavior in &plan.behaviors {
            for &f in &plan.faults {
                let cell = self.run_cell(behavior, f, plan).await?;
                info!(
                    behavior = %behavior,
                    f,
                    commits = cell.commits,
                    trials = cell.trials,
                    passed = cell.passed(),
                    "cell finished"
                );
                cells.push(cell);
            }
        }

        Ok(SimulationReport {
            network: network_name(self.authority.config().network_id).unwrap_or("unknown"),
            started_at,
            elapsed_ms: clock.elapsed().as_millis(),
            cells,
        })
    }

    async fn run_cell(&self, behavior: Behavior, f: u32, plan: &SimulationPlan) -> Result<CellReport> {
        let mut cell = CellReport {
            behavior,
            f,
            committee_size: 3 * f as usize + 1,
            threshold: 2 * f as usize + 1,
            expected: behavior.expectation(),
            trials: plan.trials,
            commits: 0,
            replay_rejections: 0,
            rejections: BTreeMap::new(),
            mean_submitted: 0.0,
            mean_accepted: 0.0,
            mean_commit_latency_us: 0.0,
            unexpected: 0,
            detail: None,
        };

        let mut submitted = 0usize;
        let mut accepted = Vec::new();
        let mut latencies = Vec::new();

        for trial in 0..plan.trials {
            let outcome = self
                .run_trial(behavior, f, trial, plan.racers)
                .await
                .with_context(|| format!("trial {trial} of {behavior} f={f} could not be set up"))?;

            submitted += outcome.submitted;
            accepted.extend(outcome.accepted);
            latencies.extend(outcome.latency);
            cell.commits += outcome.commits;
            if outcome.replay_rejected {
                cell.replay_rejections += 1;
            }
            for reason in outcome.rejections {
                *cell.rejections.entry(reason).or_default() += 1;
            }
            if let Some(problem) = outcome.problem {
                cell.unexpected += 1;
                cell.detail.get_or_insert(format!("trial {trial}: {problem}"));
            }
        }

        cell.mean_submitted = submitted as f64 / plan.trials as f64;
        cell.mean_accepted = mean(accepted.iter().map(|&n| n as f64));
        cell.mean_commit_latency_us = mean(latencies.iter().map(|d| d.as_secs_f64() * 1e6));
        Ok(cell)
    }

    async fn run_trial(
        &self,
        behavior: Behavior,
        f: u32,
        trial: usize,
        racers: usize,
    ) -> Result<TrialOutcome> {
        let n = 3 * f as usize + 1;
        let quorum = 2 * f as usize + 1;
        let faulty = f as usize;

        let did = DidId::from_did_string(&format!(
            "did:sim:{:016x}-{}-f{}-t{}",
            self.run_id, behavior, f, trial
        ))?;
        let controller = Keypair::generate();
        let watchers = generate_keys(n);

        self.authority
            .create_did(did, controller.identity(), DocRef::from_content(did.as_bytes()))?;
        self.metrics.dids_created_total.inc();
        let epoch = self.configure(&did, &controller, &watchers, f)?;

        let proposal = RecoveryProposal {
            did,
            new_doc_ref: DocRef::from_content(format!("recovered {did}").as_bytes()),
            new_controller: Keypair::generate().identity(),
            nonce: trial as u64,
            epoch,
        };
        let domain = self.authority.config().domain();
        let endorse =
            |keys: &[Keypair]| -> Vec<Endorsement> { keys.iter().map(|w| proposal.endorse(&domain, w)).collect() };

        // Byzantine noise goes first so it is always examined before the
        // honest quorum.
        let batch = match behavior {
            Behavior::Honest | Behavior::Rotation | Behavior::Race => endorse(&watchers),
            Behavior::Refuse => endorse(&watchers[..quorum]),
            Behavior::Garbage => {
                let mut batch: Vec<Endorsement> = (0..faulty).map(garbage_endorsement).collect();
                batch.extend(endorse(&watchers[..quorum]));
                batch
            }
            Behavior::Impostor => {
                let mut batch = endorse(&generate_keys(faulty));
                batch.extend(endorse(&watchers[..quorum]));
                batch
            }
            Behavior::Duplicate => {
                let honest = endorse(&watchers[..quorum]);
                let mut batch = honest[..faulty].to_vec();
                batch.extend(honest);
                batch
            }
        };

        if behavior == Behavior::Rotation {
            self.configure(&did, &controller, &generate_keys(n), f)?;
        }

        let attempts = if behavior == Behavior::Race {
            self.race(&proposal, batch.clone(), racers).await?
        } else {
            vec![self.submit(&proposal, &batch)]
        };
        let replay = self.submit(&proposal, &batch);

        let mut outcome = TrialOutcome {
            submitted: batch.len(),
            accepted: None,
            commits: 0,
            latency: None,
            rejections: Vec::new(),
            replay_rejected: false,
            problem: None,
        };

        let mut receipt = None;
        for attempt in attempts {
            match attempt.result {
                Ok(r) => {
                    outcome.commits += 1;
                    outcome.accepted = Some(r.signers.len());
                    outcome.latency = Some(attempt.latency);
                    receipt = Some(r);
                }
                Err(e) => outcome.rejections.push(e.reason()),
            }
        }

        let replay_reason = match &replay.result {
            Ok(_) => None,
            Err(e) => Some(e.reason()),
        };
        if let Some(reason) = replay_reason {
            outcome.rejections.push(reason);
        }

        let record = self
            .authority
            .resolve(&did)?
            .context("simulated DID disappeared")?;

        outcome.problem = match behavior {
            Behavior::Rotation => {
                outcome.replay_rejected = replay_reason == Some("epoch_mismatch");
                if outcome.commits != 0 {
                    Some("recovery committed against a rotated committee".to_string())
                } else if outcome.rejections.iter().any(|r| *r != "epoch_mismatch") {
                    Some(format!("expected only epoch_mismatch, saw {:?}", outcome.rejections))
                } else if record.controller != controller.identity() {
                    Some("controller changed despite rejection".to_string())
                } else {
                    None
                }
            }
            _ => {
                outcome.replay_rejected = replay_reason == Some("already_completed");
                let expected_signers = match behavior {
                    Behavior::Honest | Behavior::Race => n,
                    _ => quorum,
                };
                if outcome.commits != 1 {
                    Some(format!("expected exactly one commit, saw {}", outcome.commits))
                } else if !outcome.replay_rejected {
                    Some(format!("replay was not rejected as already_completed: {replay_reason:?}"))
                } else if outcome
                    .rejections
                    .iter()
                    .any(|r| *r != "already_completed")
                {
                    Some(format!("unexpected rejections {:?}", outcome.rejections))
                } else if outcome.accepted != Some(expected_signers) {
                    Some(format!(
                        "expected {expected_signers} counted signers, got {:?}",
                        outcome.accepted
                    ))
                } else if receipt.map(|r| r.new_controller) != Some(record.controller)
                    || record.controller != proposal.new_controller
                {
                    Some("stored controller does not match the committed proposal".to_string())
                } else {
                    None
                }
            }
        };

        debug!(
            %did,
            behavior = %behavior,
            commits = outcome.commits,
            replay = ?replay_reason,
            ok = outcome.problem.is_none(),
            "trial finished"
        );
        Ok(outcome)
    }

    fn configure(&self, did: &DidId, controller: &Keypair, watchers: &[Keypair], f: u32) -> Result<u64> {
        let epoch = self.authority.configure_watchers(
            did,
            &controller.identity(),
            watchers.iter().map(Keypair::identity).collect::<Vec<Identity>>(),
            f,
        )?;
        self.metrics.watcher_sets_configured_total.inc();
        self.metrics.committee_size.set(watchers.len() as i64);
        Ok(epoch)
    }

    fn submit(&self, proposal: &RecoveryProposal, batch: &[Endorsement]) -> Attempt {
        let attempt = timed_commit(&self.authority, proposal, batch);
        self.observe(&attempt);
        attempt
    }

    /// Submit the same batch from `racers` blocking tasks released together.
    async fn race(
        &self,
        proposal: &RecoveryProposal,
        batch: Vec<Endorsement>,
        racers: usize,
    ) -> Result<Vec<Attempt>> {
        let batch = Arc::new(batch);
        let barrier = Arc::new(Barrier::new(racers));

        let handles: Vec<_> = (0..racers)
            .map(|_| {
                let authority = Arc::clone(&self.authority);
                let batch = Arc::clone(&batch);
                let barrier = Arc::clone(&barrier);
                let proposal = *proposal;
                tokio::task::spawn_blocking(move || {
                    barrier.wait();
                    timed_commit(&authority, &proposal, &batch)
                })
            })
            .collect();

        let mut attempts = Vec::with_capacity(racers);
        for handle in handles {
            let attempt = handle.await.context("racing submitter panicked")?;
            self.observe(&attempt);
            attempts.push(attempt);
        }
        Ok(attempts)
    }

    fn observe(&self, attempt: &Attempt) {
        match &attempt.result {
            Ok(receipt) => self
                .metrics
                .observe_commit(receipt, attempt.latency.as_secs_f64()),
            Err(e) => self.metrics.observe_rejection(e),
        }
    }
}

fn timed_commit<S: RecoveryStore>(
    authority: &RecoveryAuthority<S>,
    proposal: &RecoveryProposal,
    batch: &[Endorsement],
) -> Attempt {
    let start = Instant::now();
    let result = authority.commit_recovery(proposal, batch);
    Attempt {
        result,
        latency: start.elapsed(),
    }
}

fn generate_keys(count: usize) -> Vec<Keypair> {
    (0..count).map(|_| Keypair::generate()).collect()
}

/// Even slots get a full-length endorsement of random bytes, odd slots a
/// truncated one.
fn garbage_endorsement(slot: usize) -> Endorsement {
    let len = if slot % 2 == 0 { 96 } else { 17 };
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    Endorsement::from_bytes(bytes)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bftdid_protocol::storage::{MemoryStore, SledStore};

    const ALL: [Behavior; 7] = [
        Behavior::Honest,
        Behavior::Refuse,
        Behavior::Garbage,
        Behavior::Impostor,
        Behavior::Duplicate,
        Behavior::Rotation,
        Behavior::Race,
    ];

    fn plan(behaviors: &[Behavior], faults: &[u32], trials: usize) -> SimulationPlan {
        SimulationPlan {
            behaviors: behaviors.to_vec(),
            faults: faults.to_vec(),
            trials,
            racers: 4,
        }
    }

    fn simulator() -> Simulator<MemoryStore> {
        Simulator::new(
            MemoryStore::new(),
            RegistryConfig::default(),
            NodeMetrics::new().unwrap(),
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_behaviour_meets_expectations() {
        let sim = simulator();
        let report = sim.run(&plan(&ALL, &[1, 2], 3)).await.unwrap();

        assert_eq!(report.cells.len(), 14);
        for cell in &report.cells {
            assert!(cell.passed(), "{}: {:?}", cell.name(), cell.detail);
            assert_eq!(cell.replay_rejections, 3, "{}", cell.name());
        }
        assert!(report.passed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cell_statistics() {
        let sim = simulator();
        let report = sim
            .run(&plan(&[Behavior::Garbage, Behavior::Rotation, Behavior::Race], &[2], 2))
            .await
            .unwrap();

        let garbage = &report.cells[0];
        assert_eq!(garbage.commits, 2);
        assert_eq!(garbage.mean_submitted, 7.0);
        assert_eq!(garbage.mean_accepted, 5.0);
        assert_eq!(garbage.rejections.get("already_completed"), Some(&2));

        let rotation = &report.cells[1];
        assert_eq!(rotation.commits, 0);
        assert_eq!(rotation.expected, "epoch_mismatch");
        assert_eq!(rotation.rejections.get("epoch_mismatch"), Some(&4));
        assert_eq!(rotation.mean_accepted, 0.0);

        // 4 racers and a replay per trial: one commit, four losers.
        let race = &report.cells[2];
        assert_eq!(race.commits, 2);
        assert_eq!(race.rejections.get("already_completed"), Some(&8));
    }

    #[tokio::test]
    async fn metrics_follow_the_run() {
        let sim = simulator();
        sim.run(&plan(&[Behavior::Impostor], &[1], 2)).await.unwrap();

        assert_eq!(sim.metrics.dids_created_total.get(), 2);
        assert_eq!(sim.metrics.recoveries_committed_total.get(), 2);
        assert_eq!(
            sim.metrics
                .signatures_skipped_total
                .with_label_values(&["unauthorized"])
                .get(),
            2
        );
        assert_eq!(
            sim.metrics
                .recovery_rejections_total
                .with_label_values(&["already_completed"])
                .get(),
            2
        );
        assert_eq!(sim.authority().store().completed_recoveries(), 2);
    }

    #[tokio::test]
    async fn sled_store_survives_repeated_runs() {
        let dir = tempfile::tempdir().unwrap();
        for _ in 0..3 {
            let store = reopen_sled(dir.path());
            let sim = Simulator::new(store, RegistryConfig::default(), NodeMetrics::new().unwrap())
                .unwrap();
            let report = sim.run(&plan(&[Behavior::Refuse], &[1], 2)).await.unwrap();
            assert!(report.passed());
        }
    }

    fn reopen_sled(path: &std::path::Path) -> SledStore {
        for _ in 0..50 {
            if let Ok(store) = SledStore::open(path) {
                return store;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        SledStore::open(path).unwrap()
    }

    #[test]
    fn plan_validation() {
        let config = RegistryConfig::default();
        assert!(plan(&[Behavior::Honest], &[1], 1).validate(&config).is_ok());
        assert!(plan(&[], &[1], 1).validate(&config).is_err());
        assert!(plan(&[Behavior::Honest], &[], 1).validate(&config).is_err());
        assert!(plan(&[Behavior::Honest], &[1], 0).validate(&config).is_err());

        let mut racers = plan(&[Behavior::Race], &[1], 1);
        racers.racers = 1;
        assert!(racers.validate(&config).is_err());

        let small = RegistryConfig {
            max_committee_size: 10,
            ..RegistryConfig::default()
        };
        assert!(plan(&[Behavior::Honest], &[3], 1).validate(&small).is_ok());
        assert!(plan(&[Behavior::Honest], &[4], 1).validate(&small).is_err());
    }

    #[test]
    fn behaviour_names_match_cli_values() {
        for b in ALL {
            let value = b.to_possible_value().unwrap();
            assert_eq!(value.get_name(), b.as_str());
        }
    }
}
