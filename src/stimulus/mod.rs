//! Stimulus and reward schedules for conditioning trials.
//!
//! Every trial presents a sustained cue: the stimulus switches on at
//! `stimulus_onset_time` and stays on until the end of the trial. Reward is a
//! single pulse at `reward_delivery_time`, except on trials listed as
//! withheld, whose reward vector is all zero.

use std::collections::BTreeSet;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::core::{TdError, TdResult};

/// Default cue onset, in time-steps from the start of a trial.
pub const DEFAULT_STIMULUS_ONSET: usize = 41;

/// Default reward delivery, in time-steps from the start of a trial.
pub const DEFAULT_REWARD_DELIVERY: usize = 54;

/// Trial batch description: timing, length and which trials go unrewarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StimulusSchedule {
    pub n_trials: usize,
    pub n_time_steps: usize,
    pub stimulus_onset_time: usize,
    pub reward_delivery_time: usize,
    pub no_reward_trials: BTreeSet<usize>,
}

impl StimulusSchedule {
    /// Schedule with default timing and every trial rewarded.
    pub fn new(n_trials: usize, n_time_steps: usize) -> Self {
        Self {
            n_trials,
            n_time_steps,
            stimulus_onset_time: DEFAULT_STIMULUS_ONSET,
            reward_delivery_time: DEFAULT_REWARD_DELIVERY,
            no_reward_trials: BTreeSet::new(),
        }
    }

    pub fn with_timing(mut self, stimulus_onset_time: usize, reward_delivery_time: usize) -> Self {
        self.stimulus_onset_time = stimulus_onset_time;
        self.reward_delivery_time = reward_delivery_time;
        self
    }

    pub fn withholding<I: IntoIterator<Item = usize>>(mut self, trials: I) -> Self {
        self.no_reward_trials.extend(trials);
        self
    }

    /// Check timing and withheld trial indices.
    ///
    /// # Errors
    /// - `InvalidConfig` unless `0 ≤ onset < delivery < T` and every withheld
    ///   trial lies in `[0, n_trials)`
    pub fn validate(&self) -> TdResult<()> {
        let t = self.n_time_steps;
        if t == 0 {
            return Err(TdError::InvalidConfig(
                "Must have at least 1 time-step per trial".to_string(),
            ));
        }
        if self.stimulus_onset_time >= t {
            return Err(TdError::InvalidConfig(format!(
                "Stimulus onset {} outside trial of {} time-steps",
                self.stimulus_onset_time, t
            )));
        }
        if self.reward_delivery_time >= t {
            return Err(TdError::InvalidConfig(format!(
                "Reward delivery {} outside trial of {} time-steps",
                self.reward_delivery_time, t
            )));
        }
        if self.stimulus_onset_time >= self.reward_delivery_time {
            return Err(TdError::InvalidConfig(format!(
                "Stimulus onset {} must precede reward delivery {}",
                self.stimulus_onset_time, self.reward_delivery_time
            )));
        }
        if let Some(&last) = self.no_reward_trials.iter().next_back() {
            if last >= self.n_trials {
                return Err(TdError::InvalidConfig(format!(
                    "Withheld-reward trial {} outside batch of {} trials",
                    last, self.n_trials
                )));
            }
        }
        Ok(())
    }

    pub fn is_rewarded(&self, trial: usize) -> bool {
        !self.no_reward_trials.contains(&trial)
    }

    /// Stimulus vector shared by every trial: 0 before onset, 1 from onset on.
    ///
    /// # Errors
    /// `InvalidConfig` if the schedule does not validate.
    pub fn stimulus(&self) -> TdResult<Array1<f64>> {
        self.validate()?;
        Ok(self.stimulus_row())
    }

    /// Reward vector for one trial.
    ///
    /// # Errors
    /// `InvalidConfig` if the schedule does not validate or `trial` is outside
    /// the batch.
    pub fn reward(&self, trial: usize) -> TdResult<Array1<f64>> {
        self.validate()?;
        if trial >= self.n_trials {
            return Err(TdError::InvalidConfig(format!(
                "Trial {} outside batch of {} trials",
                trial, self.n_trials
            )));
        }
        let mut r = Array1::zeros(self.n_time_steps);
        if self.is_rewarded(trial) {
            r[self.reward_delivery_time] = 1.0;
        }
        Ok(r)
    }

    fn stimulus_row(&self) -> Array1<f64> {
        let onset = self.stimulus_onset_time;
        Array1::from_shape_fn(self.n_time_steps, |t| if t >= onset { 1.0 } else { 0.0 })
    }

    /// Stimulus and reward matrices for the whole batch, one row per trial.
    pub fn generate(&self) -> TdResult<(Array2<f64>, Array2<f64>)> {
        self.validate()?;

        let stimulus = self.stimulus_row();
        let mut samples = Array2::zeros((self.n_trials, self.n_time_steps));
        let mut targets = Array2::zeros((self.n_trials, self.n_time_steps));

        for trial in 0..self.n_trials {
            samples.row_mut(trial).assign(&stimulus);
            if self.is_rewarded(trial) {
                targets[[trial, self.reward_delivery_time]] = 1.0;
            }
        }

        Ok((samples, targets))
    }
}

/// Generate stimulus and reward matrices for `n_trials` conditioning trials.
///
/// Returns `(samples, targets)`, each of shape `(n_trials, n_time_steps)`.
///
/// # Errors
/// `InvalidConfig` on bad timing or an out-of-range withheld trial; nothing is
/// generated in that case.
pub fn make_stimuli(
    n_trials: usize,
    no_reward_trials: &BTreeSet<usize>,
    stimulus_onset_time: usize,
    reward_delivery_time: usize,
    n_time_steps: usize,
) -> TdResult<(Array2<f64>, Array2<f64>)> {
    StimulusSchedule {
        n_trials,
        n_time_steps,
        stimulus_onset_time,
        reward_delivery_time,
        no_reward_trials: no_reward_trials.clone(),
    }
    .generate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes() {
        let (samples, targets) = make_stimuli(5, &BTreeSet::new(), 41, 54, 60).unwrap();
        assert_eq!(samples.dim(), (5, 60));
        assert_eq!(targets.dim(), (5, 60));
    }

    #[test]
    fn test_stimulus_is_sustained_step() {
        let (samples, _) = make_stimuli(3, &BTreeSet::new(), 41, 54, 60).unwrap();
        for row in samples.rows() {
            for (t, &s) in row.iter().enumerate() {
                assert_eq!(s, if t < 41 { 0.0 } else { 1.0 }, "t={t}");
            }
        }
    }

    #[test]
    fn test_reward_pulse_and_withheld_trials() {
        let withheld: BTreeSet<usize> = [1, 3].into_iter().collect();
        let (_, targets) = make_stimuli(4, &withheld, 41, 54, 60).unwrap();

        for (trial, row) in targets.rows().into_iter().enumerate() {
            if withheld.contains(&trial) {
                assert!(row.iter().all(|&r| r == 0.0), "trial {trial} should be unrewarded");
            } else {
                assert_eq!(row[54], 1.0);
                assert_eq!(row.sum(), 1.0);
            }
        }
    }

    #[test]
    fn test_onset_at_zero() {
        let (samples, _) = make_stimuli(1, &BTreeSet::new(), 0, 1, 4).unwrap();
        assert_eq!(samples.row(0).to_vec(), vec![1.0; 4]);
    }

    #[test]
    fn test_invalid_timing() {
        let none = BTreeSet::new();
        assert!(make_stimuli(1, &none, 60, 54, 60).is_err());
        assert!(make_stimuli(1, &none, 41, 60, 60).is_err());
        assert!(make_stimuli(1, &none, 54, 54, 60).is_err());
        assert!(make_stimuli(1, &none, 55, 54, 60).is_err());
        assert!(make_stimuli(1, &none, 0, 0, 0).is_err());
    }

    #[test]
    fn test_withheld_trial_out_of_range() {
        let withheld: BTreeSet<usize> = [10].into_iter().collect();
        let err = make_stimuli(10, &withheld, 41, 54, 60).unwrap_err();
        assert!(matches!(err, TdError::InvalidConfig(_)));
        assert!(make_stimuli(11, &withheld, 41, 54, 60).is_ok());
    }

    #[test]
    fn test_zero_trials() {
        let (samples, targets) = make_stimuli(0, &BTreeSet::new(), 41, 54, 60).unwrap();
        assert_eq!(samples.nrows(), 0);
        assert_eq!(targets.nrows(), 0);
    }

    #[test]
    fn test_schedule_builders() {
        let schedule = StimulusSchedule::new(20, 30).with_timing(5, 10).withholding(15..20);
        schedule.validate().unwrap();
        assert!(schedule.is_rewarded(14));
        assert!(!schedule.is_rewarded(15));
        assert_eq!(schedule.reward(2).unwrap()[10], 1.0);
        assert_eq!(schedule.reward(17).unwrap().sum(), 0.0);
        assert_eq!(schedule.stimulus().unwrap().sum(), 25.0);
        assert!(schedule.reward(20).is_err());
    }

    #[test]
    fn test_invalid_schedule_vectors_are_errors() {
        let schedule = StimulusSchedule::new(1, 10).with_timing(12, 15);
        assert!(schedule.validate().is_err());
        assert!(matches!(schedule.stimulus(), Err(TdError::InvalidConfig(_))));
        assert!(matches!(schedule.reward(0), Err(TdError::InvalidConfig(_))));

        let withheld_out_of_range = StimulusSchedule::new(2, 60).withholding([5]);
        assert!(withheld_out_of_range.stimulus().is_err());
        assert!(withheld_out_of_range.reward(0).is_err());
    }
}
