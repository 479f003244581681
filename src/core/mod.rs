//! Core TD(0) learner.
//!
//! This module provides the learning network at the heart of the model:
//! - Linear value readout over a windowed stimulus representation
//! - Temporal-difference prediction error per time-step
//! - Outer-product weight update
//!
//! ## Prediction Error
//!
//! For one trial with stimulus `s` and reward `r`, both of length T:
//! ```text
//! V[t] = f(Σ_j W[t][j] s[j])          f(x) = slope * x + intercept
//! δ[t] = r[t] + V[t] - V[t-1]          V[-1] = 0
//! W   += α δ ⊗ s
//! ```
//!
//! δ is computed entirely from the pre-update weights; the update is applied
//! once the whole trial has been evaluated.

use ndarray::{Array1, Array2};
use thiserror::Error;

/// Error type for TD model operations.
#[derive(Debug, Error)]
pub enum TdError {
    /// A trial vector does not have the learner's time-step count.
    #[error("Dimension mismatch: {what} expected length {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Invalid learner, schedule or protocol configuration.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type TdResult<T> = Result<T, TdError>;

/// Output function applied to the summed weighted stimulus at each time-step.
pub trait Activation: Send + Sync {
    /// Apply the function element-wise: f(x)
    fn apply(&self, x: &Array1<f64>) -> Array1<f64>;

    /// Name for debugging
    fn name(&self) -> &'static str;
}

/// Linear readout: f(x) = slope * x + intercept.
///
/// The model's default readout uses slope 1.0 and intercept 0.01, so an
/// untrained network predicts a small constant value at every time-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearActivation {
    pub slope: f64,
    pub intercept: f64,
}

impl Default for LinearActivation {
    fn default() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.01,
        }
    }
}

impl Activation for LinearActivation {
    fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|v| self.slope * v + self.intercept)
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}

/// A TD(0) learner over a fixed number of time-steps per trial.
///
/// # Architecture
///
/// - **Weights:** `w` has shape `(T, T)`; row `t` maps the whole stimulus
///   vector onto the value estimate at time-step `t`
/// - **Readout:** `activation` turns the row sums into `V`
///
/// Weights start at zero and accumulate across every `observe` call for the
/// life of the learner. One learner corresponds to one simulation run.
pub struct TdLearner {
    n_time_steps: usize,
    learning_rate: f64,
    w: Array2<f64>,
    activation: Box<dyn Activation>,
}

impl std::fmt::Debug for TdLearner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TdLearner")
            .field("n_time_steps", &self.n_time_steps)
            .field("learning_rate", &self.learning_rate)
            .field("activation", &self.activation.name())
            .finish_non_exhaustive()
    }
}

impl TdLearner {
    /// Create a learner with the default linear readout (slope 1.0, intercept 0.01).
    ///
    /// # Errors
    /// - `InvalidConfig` if `n_time_steps` is zero or `learning_rate` is
    ///   negative or not finite
    pub fn new(n_time_steps: usize, learning_rate: f64) -> TdResult<Self> {
        Self::with_activation(
            n_time_steps,
            learning_rate,
            Box::new(LinearActivation::default()),
        )
    }

    /// Create a learner with a custom readout.
    pub fn with_activation(
        n_time_steps: usize,
        learning_rate: f64,
        activation: Box<dyn Activation>,
    ) -> TdResult<Self> {
        if n_time_steps == 0 {
            return Err(TdError::InvalidConfig(
                "Must have at least 1 time-step per trial".to_string(),
            ));
        }
        if !learning_rate.is_finite() || learning_rate < 0.0 {
            return Err(TdError::InvalidConfig(format!(
                "Learning rate must be finite and non-negative, got {learning_rate}"
            )));
        }

        Ok(Self {
            n_time_steps,
            learning_rate,
            w: Array2::zeros((n_time_steps, n_time_steps)),
            activation,
        })
    }

    /// Build a learner from a [`Config`](crate::Config).
    pub fn from_config(config: &crate::Config) -> TdResult<Self> {
        config.validate()?;
        Self::with_activation(
            config.n_time_steps,
            config.learning_rate,
            Box::new(LinearActivation {
                slope: config.slope,
                intercept: config.intercept,
            }),
        )
    }

    pub fn n_time_steps(&self) -> usize {
        self.n_time_steps
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Current weight matrix, shape `(T, T)`.
    pub fn weights(&self) -> &Array2<f64> {
        &self.w
    }

    /// Value estimate at every time-step for a stimulus vector.
    ///
    /// `V[t] = f(Σ_j W[t][j] s[j])`
    pub fn predict(&self, stimulus: &Array1<f64>) -> TdResult<Array1<f64>> {
        self.check_len("stimulus", stimulus)?;
        Ok(self.activation.apply(&self.w.dot(stimulus)))
    }

    /// Prediction error for one trial against the current weights, without learning.
    ///
    /// `δ[t] = r[t] + V[t] - V[t-1]`, with `V[-1] = 0` so `δ[0] = r[0] + V[0]`.
    pub fn prediction_error(
        &self,
        stimulus: &Array1<f64>,
        reward: &Array1<f64>,
    ) -> TdResult<Array1<f64>> {
        self.check_len("reward", reward)?;
        let value = self.predict(stimulus)?;

        let mut delta = reward + &value;
        for t in 1..self.n_time_steps {
            delta[t] -= value[t - 1];
        }
        Ok(delta)
    }

    /// Apply the TD weight update for one trial.
    ///
    /// ```text
    /// ΔW = α δ ⊗ s    (outer product)
    /// ```
    ///
    /// Row `i` moves in proportion to the error at time-step `i`, column `j` in
    /// proportion to how active stimulus input `j` was. While δ is finite,
    /// columns whose stimulus entry is zero are left untouched.
    pub fn update_weights(
        &mut self,
        delta: &Array1<f64>,
        stimulus: &Array1<f64>,
    ) -> TdResult<()> {
        self.check_len("delta", delta)?;
        self.check_len("stimulus", stimulus)?;

        let alpha = self.learning_rate;
        for (mut row, &d) in self.w.rows_mut().into_iter().zip(delta.iter()) {
            row.scaled_add(alpha * d, stimulus);
        }
        Ok(())
    }

    /// Process one trial: compute δ from the current weights, then learn from it.
    ///
    /// Must be called once per trial, in trial order. On a dimension error the
    /// weights are left unchanged.
    pub fn observe(
        &mut self,
        stimulus: &Array1<f64>,
        reward: &Array1<f64>,
    ) -> TdResult<Array1<f64>> {
        let delta = self.prediction_error(stimulus, reward)?;
        self.update_weights(&delta, stimulus)?;
        Ok(delta)
    }

    fn check_len(&self, what: &'static str, v: &Array1<f64>) -> TdResult<()> {
        if v.len() != self.n_time_steps {
            return Err(TdError::DimensionMismatch {
                what,
                expected: self.n_time_steps,
                actual: v.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn step(len: usize, onset: usize) -> Array1<f64> {
        Array1::from_shape_fn(len, |t| if t >= onset { 1.0 } else { 0.0 })
    }

    fn pulse(len: usize, at: usize) -> Array1<f64> {
        let mut r = Array1::zeros(len);
        r[at] = 1.0;
        r
    }

    #[test]
    fn test_learner_init() {
        let learner = TdLearner::new(10, 0.3).unwrap();
        assert_eq!(learner.n_time_steps(), 10);
        assert_eq!(learner.weights().dim(), (10, 10));
        assert!(learner.weights().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_invalid_config() {
        assert!(TdLearner::new(0, 0.3).is_err());
        assert!(TdLearner::new(10, -0.1).is_err());
        assert!(TdLearner::new(10, f64::NAN).is_err());
        assert!(TdLearner::new(10, f64::INFINITY).is_err());
        assert!(TdLearner::new(10, 0.0).is_ok());
    }

    #[test]
    fn test_linear_activation() {
        let f = LinearActivation { slope: 2.0, intercept: 0.5 };
        let out = f.apply(&ndarray::arr1(&[0.0, 1.0, -1.0]));
        assert_eq!(out, ndarray::arr1(&[0.5, 2.5, -1.5]));
    }

    #[test]
    fn test_untrained_prediction_is_intercept() {
        let learner = TdLearner::new(8, 0.3).unwrap();
        let v = learner.predict(&step(8, 3)).unwrap();
        assert_abs_diff_eq!(v, Array1::from_elem(8, 0.01), epsilon = 1e-15);
    }

    #[test]
    fn test_first_step_has_no_predecessor() {
        let learner = TdLearner::new(5, 0.3).unwrap();
        let mut r = Array1::zeros(5);
        r[0] = 1.0;
        let delta = learner.prediction_error(&step(5, 0), &r).unwrap();
        assert_abs_diff_eq!(delta[0], 1.01, epsilon = 1e-12);
        for t in 1..5 {
            assert_abs_diff_eq!(delta[t], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_intercept_delta_equals_reward() {
        let readout = LinearActivation { slope: 1.0, intercept: 0.0 };
        let mut learner = TdLearner::with_activation(6, 0.0, Box::new(readout)).unwrap();
        let r = pulse(6, 4);
        let delta = learner.observe(&step(6, 2), &r).unwrap();
        assert_eq!(delta, r);
    }

    #[test]
    fn test_update_is_outer_product() {
        let mut learner = TdLearner::new(3, 0.5).unwrap();
        let delta = ndarray::arr1(&[1.0, -2.0, 0.0]);
        let s = ndarray::arr1(&[0.0, 1.0, 1.0]);
        learner.update_weights(&delta, &s).unwrap();

        let expected = ndarray::arr2(&[[0.0, 0.5, 0.5], [0.0, -1.0, -1.0], [0.0, 0.0, 0.0]]);
        assert_eq!(learner.weights(), &expected);
    }

    #[test]
    fn test_observe_uses_pre_update_weights() {
        let mut learner = TdLearner::new(4, 0.3).unwrap();
        let s = step(4, 1);
        let r = pulse(4, 3);

        let expected = learner.prediction_error(&s, &r).unwrap();
        let delta = learner.observe(&s, &r).unwrap();
        assert_eq!(delta, expected);

        let after = learner.prediction_error(&s, &r).unwrap();
        assert_ne!(after, delta);
    }

    #[test]
    fn test_dimension_mismatch_leaves_weights() {
        let mut learner = TdLearner::new(5, 0.3).unwrap();
        learner.observe(&step(5, 1), &pulse(5, 3)).unwrap();
        let before = learner.weights().clone();

        let err = learner.observe(&step(4, 1), &pulse(5, 3)).unwrap_err();
        assert!(matches!(
            err,
            TdError::DimensionMismatch { what: "stimulus", expected: 5, actual: 4 }
        ));
        assert!(learner.observe(&step(5, 1), &pulse(6, 3)).is_err());
        assert_eq!(learner.weights(), &before);
    }

    #[test]
    fn test_weights_persist_until_new_learner() {
        let mut learner = TdLearner::new(5, 0.3).unwrap();
        learner.observe(&step(5, 1), &pulse(5, 3)).unwrap();
        let after_first = learner.weights().clone();
        assert!(after_first.iter().any(|&w| w != 0.0));

        learner.observe(&step(5, 1), &pulse(5, 3)).unwrap();
        assert_ne!(learner.weights(), &after_first);

        let fresh = TdLearner::new(5, 0.3).unwrap();
        assert!(fresh.weights().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_non_finite_input_propagates() {
        let mut learner = TdLearner::new(4, 0.3).unwrap();
        let mut r = pulse(4, 2);
        r[2] = f64::NAN;
        let delta = learner.observe(&step(4, 1), &r).unwrap();
        assert!(delta[2].is_nan());
        assert!(learner.weights()[[2, 1]].is_nan());
        assert!(learner.weights()[[1, 1]].is_finite());
    }
}
