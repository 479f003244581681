//! Trial loops and per-trial metrics.
//!
//! A run feeds every trial of a batch through one [`TdLearner`], strictly in
//! trial order, and keeps what the learner returns: the δ vector of each trial.
//! Weights carry over from trial to trial within a run and are never shared
//! between runs; [`run_schedule`] and [`run_protocol`] build a fresh learner
//! every time they are called.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1};
use tracing::{debug, info, warn};

use crate::core::{TdError, TdLearner, TdResult};
use crate::protocol::Protocol;
use crate::stimulus::StimulusSchedule;
use crate::Config;

/// Summary of one trial.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TrialMetrics {
    pub trial: usize,
    /// Whether any reward was delivered on this trial
    pub rewarded: bool,
    /// δ with the largest magnitude in the trial (signed)
    pub peak_delta: f64,
    /// Time-step at which `peak_delta` occurred
    pub peak_step: usize,
    /// Frobenius norm of the weights after this trial's update
    pub weight_norm: f64,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// δ per trial, shape `(n_trials, T)`
    pub deltas: Array2<f64>,
    /// Weights after the last trial
    pub final_weights: Array2<f64>,
    /// Weights after each requested trial, keyed by trial index
    pub snapshots: BTreeMap<usize, Array2<f64>>,
    pub metrics: Vec<TrialMetrics>,
}

impl RunRecord {
    pub fn n_trials(&self) -> usize {
        self.deltas.nrows()
    }

    /// δ of one trial.
    pub fn delta(&self, trial: usize) -> ArrayView1<'_, f64> {
        self.deltas.row(trial)
    }

    /// δ at one time-step across all trials.
    pub fn delta_at_step(&self, step: usize) -> ArrayView1<'_, f64> {
        self.deltas.column(step)
    }
}

fn frobenius_norm(w: &Array2<f64>) -> f64 {
    w.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Index and value of the entry with the largest magnitude.
fn peak(delta: &Array1<f64>) -> (usize, f64) {
    delta
        .iter()
        .copied()
        .enumerate()
        .fold((0, 0.0), |best, (t, d)| {
            if d.abs() > best.1.abs() {
                (t, d)
            } else {
                best
            }
        })
}

/// Run every row of `samples`/`targets` through `learner`, in order.
///
/// Weight snapshots are cloned after the update of each trial listed in
/// `snapshot_trials`.
///
/// # Errors
/// - `DimensionMismatch` if the matrices disagree in shape or do not have
///   `learner.n_time_steps()` columns
/// - `InvalidConfig` if a snapshot trial is out of range
///
/// All checks happen before the first trial runs.
pub fn run_trials(
    learner: &mut TdLearner,
    samples: &Array2<f64>,
    targets: &Array2<f64>,
    snapshot_trials: &[usize],
) -> TdResult<RunRecord> {
    let n_trials = samples.nrows();
    let t = learner.n_time_steps();

    if targets.nrows() != n_trials {
        return Err(TdError::DimensionMismatch {
            what: "target rows",
            expected: n_trials,
            actual: targets.nrows(),
        });
    }
    if samples.ncols() != t {
        return Err(TdError::DimensionMismatch {
            what: "stimulus",
            expected: t,
            actual: samples.ncols(),
        });
    }
    if targets.ncols() != t {
        return Err(TdError::DimensionMismatch {
            what: "reward",
            expected: t,
            actual: targets.ncols(),
        });
    }
    if let Some(&bad) = snapshot_trials.iter().find(|&&i| i >= n_trials) {
        return Err(TdError::InvalidConfig(format!(
            "Snapshot trial {bad} outside run of {n_trials} trials"
        )));
    }

    let mut deltas = Array2::zeros((n_trials, t));
    let mut snapshots = BTreeMap::new();
    let mut metrics = Vec::with_capacity(n_trials);
    let mut warned = false;

    for trial in 0..n_trials {
        let stimulus = samples.row(trial).to_owned();
        let reward = targets.row(trial).to_owned();

        let delta = learner.observe(&stimulus, &reward)?;

        if !warned && delta.iter().any(|d| !d.is_finite()) {
            warn!(trial, "prediction error became non-finite");
            warned = true;
        }

        let (peak_step, peak_delta) = peak(&delta);
        let trial_metrics = TrialMetrics {
            trial,
            rewarded: reward.iter().any(|&r| r != 0.0),
            peak_delta,
            peak_step,
            weight_norm: frobenius_norm(learner.weights()),
        };
        debug!(
            trial,
            rewarded = trial_metrics.rewarded,
            peak_step,
            peak_delta,
            weight_norm = trial_metrics.weight_norm,
            "trial complete"
        );

        deltas.row_mut(trial).assign(&delta);
        metrics.push(trial_metrics);
        if snapshot_trials.contains(&trial) {
            snapshots.insert(trial, learner.weights().clone());
        }
    }

    Ok(RunRecord {
        deltas,
        final_weights: learner.weights().clone(),
        snapshots,
        metrics,
    })
}

/// Run a stimulus schedule on a fresh learner built from `config`.
///
/// # Errors
/// `InvalidConfig` if the schedule or config is invalid, or if they disagree
/// on the number of time-steps.
pub fn run_schedule(
    schedule: &StimulusSchedule,
    config: &Config,
    snapshot_trials: &[usize],
) -> TdResult<RunRecord> {
    if schedule.n_time_steps != config.n_time_steps {
        return Err(TdError::InvalidConfig(format!(
            "Schedule has {} time-steps, learner expects {}",
            schedule.n_time_steps, config.n_time_steps
        )));
    }
    let (samples, targets) = schedule.generate()?;
    let mut learner = TdLearner::from_config(config)?;
    run_trials(&mut learner, &samples, &targets, snapshot_trials)
}

/// Run one of the conditioning protocols on a fresh learner.
pub fn run_protocol(
    protocol: Protocol,
    config: &Config,
    snapshot_trials: &[usize],
) -> TdResult<RunRecord> {
    let schedule = protocol.schedule(config.n_time_steps);
    info!(
        %protocol,
        n_trials = schedule.n_trials,
        withheld = schedule.no_reward_trials.len(),
        learning_rate = config.learning_rate,
        "starting run"
    );

    let record = run_schedule(&schedule, config, snapshot_trials)?;

    info!(
        %protocol,
        final_weight_norm = frobenius_norm(&record.final_weights),
        "run complete"
    );
    Ok(record)
}
