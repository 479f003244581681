//! δ traces for plotting.
//!
//! Plotting itself happens elsewhere; this module only cuts the δ matrix of a
//! run into the shapes the figures need and writes them out as JSON Lines:
//!
//! - `run` — protocol, schedule and learner parameters
//! - `trial` — one per trial, with its metrics and full δ vector
//! - `weights` — one per weight snapshot
//! - `trace` — δ vector of each highlighted trial
//! - `surface` — δ restricted to the plotted time window, time-step major
//! - `summary` — final weight norm and highlighted trials

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::{s, Array1, Array2};
use serde_json::json;

use crate::core::{TdError, TdResult};
use crate::protocol::Protocol;
use crate::training::RunRecord;
use crate::Config;

/// δ rows of the selected trials, for line plots of δ against time-step.
pub fn trial_traces(deltas: &Array2<f64>, trials: &[usize]) -> TdResult<Vec<(usize, Array1<f64>)>> {
    trials
        .iter()
        .map(|&trial| {
            if trial >= deltas.nrows() {
                return Err(TdError::InvalidConfig(format!(
                    "Trial {trial} outside run of {} trials",
                    deltas.nrows()
                )));
            }
            Ok((trial, deltas.row(trial).to_owned()))
        })
        .collect()
}

/// δ from time-step `t_start` on, transposed to shape `(T - t_start, n_trials)`.
///
/// Row `k` holds time-step `t_start + k` across all trials, the layout of a
/// trial × time-step surface grid.
pub fn surface(deltas: &Array2<f64>, t_start: usize) -> TdResult<Array2<f64>> {
    if t_start >= deltas.ncols() {
        return Err(TdError::InvalidConfig(format!(
            "Window start {t_start} outside trial of {} time-steps",
            deltas.ncols()
        )));
    }
    Ok(deltas.slice(s![.., t_start..]).t().to_owned())
}

fn rows(m: &Array2<f64>) -> Vec<Vec<f64>> {
    m.rows().into_iter().map(|r| r.to_vec()).collect()
}

/// Write a run as JSON Lines.
pub fn write_jsonl<W: Write>(
    out: &mut W,
    protocol: Protocol,
    config: &Config,
    record: &RunRecord,
) -> TdResult<()> {
    let schedule = protocol.schedule(config.n_time_steps);
    let highlights = protocol.highlight_trials();

    let run_event = json!({
        "type": "run",
        "protocol": protocol,
        "n_trials": record.n_trials(),
        "n_time_steps": config.n_time_steps,
        "stimulus_onset_time": schedule.stimulus_onset_time,
        "reward_delivery_time": schedule.reward_delivery_time,
        "no_reward_trials": schedule.no_reward_trials,
        "learning_rate": config.learning_rate,
    });
    writeln!(out, "{run_event}")?;

    for m in &record.metrics {
        let mut trial_event = serde_json::to_value(m)?;
        trial_event["type"] = json!("trial");
        trial_event["highlight"] = json!(highlights.contains(&m.trial));
        trial_event["delta"] = json!(record.delta(m.trial).to_vec());
        writeln!(out, "{trial_event}")?;
    }

    for (trial, w) in &record.snapshots {
        let weights_event = json!({
            "type": "weights",
            "trial": trial,
            "weights": rows(w),
        });
        writeln!(out, "{weights_event}")?;
    }

    for (trial, delta) in trial_traces(&record.deltas, highlights)? {
        let trace_event = json!({
            "type": "trace",
            "trial": trial,
            "delta": delta.to_vec(),
        });
        writeln!(out, "{trace_event}")?;
    }

    let t_start = protocol.window_start().min(config.n_time_steps.saturating_sub(1));
    let grid = surface(&record.deltas, t_start)?;
    let surface_event = json!({
        "type": "surface",
        "t_start": t_start,
        "n_trials": record.n_trials(),
        "values": rows(&grid),
    });
    writeln!(out, "{surface_event}")?;

    let final_norm = record.metrics.last().map(|m| m.weight_norm).unwrap_or(0.0);
    let summary_event = json!({
        "type": "summary",
        "protocol": protocol,
        "final_weight_norm": final_norm,
        "highlight_trials": highlights,
        "snapshot_trials": record.snapshots.keys().collect::<Vec<_>>(),
    });
    writeln!(out, "{summary_event}")?;

    out.flush()?;
    Ok(())
}

/// Write a run to `<dir>/<protocol>.jsonl`, creating `dir` if needed.
pub fn write_run_file(
    dir: &Path,
    protocol: Protocol,
    config: &Config,
    record: &RunRecord,
) -> TdResult<std::path::PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{protocol}.jsonl"));
    let mut out = BufWriter::new(File::create(&path)?);
    write_jsonl(&mut out, protocol, config, record)?;
    Ok(path)
}
