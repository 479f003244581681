//! # TD dopamine model
//!
//! Temporal-difference model of mesolimbic dopamine cell activity during
//! Pavlovian conditioning, after Montague, Dayan & Sejnowski (1996),
//! *A framework for mesencephalic dopamine systems based on predictive
//! Hebbian learning*, J. Neurosci. 16(5).
//!
//! ## Overview
//!
//! A single linear network predicts, at every time-step of a trial, the
//! future reward signalled by a sustained cue. Its TD prediction error δ stands
//! in for the phasic dopamine response recorded during conditioning.
//!
//! ## Structure
//!
//! - [`core`](crate::core) — TD(0) learner, readout functions, error type
//! - [`stimulus`] — stimulus/reward schedules for a batch of trials
//! - [`protocol`] — the acquisition, delayed-acquisition and extinction experiments
//! - [`training`] — runs a schedule through a learner, collecting δ per trial
//! - [`trace`] — reshapes and exports δ for plotting

pub mod core;
pub mod protocol;
pub mod stimulus;
pub mod trace;
pub mod training;

pub use crate::core::{Activation, LinearActivation, TdError, TdLearner, TdResult};
pub use crate::protocol::Protocol;
pub use crate::stimulus::{make_stimuli, StimulusSchedule};
pub use crate::training::{run_protocol, run_schedule, run_trials, RunRecord, TrialMetrics};

/// Learner configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time-steps per trial (T). Default 60.
    pub n_time_steps: usize,
    /// Weight learning rate (α). Default 0.3.
    pub learning_rate: f64,
    /// Slope of the linear value readout. Default 1.0.
    pub slope: f64,
    /// Intercept of the linear value readout. Default 0.01.
    pub intercept: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            n_time_steps: 60,
            learning_rate: 0.3,
            slope: 1.0,
            intercept: 0.01,
        }
    }
}

impl Config {
    /// # Errors
    /// `InvalidConfig` if T is zero, α is negative or non-finite, or the
    /// readout parameters are non-finite.
    pub fn validate(&self) -> TdResult<()> {
        if self.n_time_steps == 0 {
            return Err(TdError::InvalidConfig(
                "n_time_steps must be > 0".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(TdError::InvalidConfig(format!(
                "learning_rate must be finite and non-negative, got {}",
                self.learning_rate
            )));
        }
        if !self.slope.is_finite() || !self.intercept.is_finite() {
            return Err(TdError::InvalidConfig(format!(
                "readout must be finite, got slope={} intercept={}",
                self.slope, self.intercept
            )));
        }
        Ok(())
    }
}
