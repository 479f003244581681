//! Experimental protocols from Montague, Dayan & Sejnowski (1996), figure 5.
//!
//! | protocol              | trials | reward withheld on                      |
//! |-----------------------|--------|-----------------------------------------|
//! | `acquisition`         | 120    | 14, 29, 44, 59, 74, 89                  |
//! | `delayed-acquisition` | 120    | 0–9, then every 15th trial from 14      |
//! | `extinction`          | 150    | 70 onward                               |
//!
//! All three use the default cue onset (41) and reward delivery (54).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::TdError;
use crate::stimulus::StimulusSchedule;

/// Trial at which reward delivery stops in the extinction protocol.
pub const EXTINCTION_ONSET: usize = 70;

/// One of the three conditioning experiments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// Figure 5A: training with occasional omitted rewards.
    Acquisition,
    /// Figure 5B: as acquisition, but training starts at trial 10.
    DelayedAcquisition,
    /// Figure 5C: reward stops after trial 69.
    Extinction,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [
        Protocol::Acquisition,
        Protocol::DelayedAcquisition,
        Protocol::Extinction,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Acquisition => "acquisition",
            Protocol::DelayedAcquisition => "delayed-acquisition",
            Protocol::Extinction => "extinction",
        }
    }

    pub fn n_trials(self) -> usize {
        match self {
            Protocol::Acquisition | Protocol::DelayedAcquisition => 120,
            Protocol::Extinction => 150,
        }
    }

    /// Trials whose reward is withheld.
    pub fn no_reward_trials(self) -> Vec<usize> {
        let probes = (14..self.n_trials()).step_by(15);
        match self {
            Protocol::Acquisition => probes.take(6).collect(),
            Protocol::DelayedAcquisition => (0..10).chain(probes).collect(),
            Protocol::Extinction => (EXTINCTION_ONSET..self.n_trials()).collect(),
        }
    }

    /// Stimulus schedule for this protocol at the given trial length.
    pub fn schedule(self, n_time_steps: usize) -> StimulusSchedule {
        StimulusSchedule::new(self.n_trials(), n_time_steps).withholding(self.no_reward_trials())
    }

    /// Trials singled out for line plots of δ over time.
    pub fn highlight_trials(self) -> &'static [usize] {
        match self {
            Protocol::Acquisition => &[0, 29, 49],
            Protocol::DelayedAcquisition | Protocol::Extinction => &[],
        }
    }

    /// First time-step shown when plotting this protocol.
    pub fn window_start(self) -> usize {
        match self {
            Protocol::Acquisition => 35,
            Protocol::DelayedAcquisition | Protocol::Extinction => 40,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = TdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                TdError::InvalidConfig(format!(
                    "Unknown protocol '{s}' (expected acquisition, delayed-acquisition or extinction)"
                ))
            })
    }
}
