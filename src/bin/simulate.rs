//! TD dopamine simulation binary.
//!
//! Runs the conditioning protocols, each on its own freshly built learner, and
//! writes one JSON Lines trace file per protocol for plotting.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use rayon::prelude::*;
use td_dopamine::trace::write_run_file;
use td_dopamine::{run_protocol, Config, Protocol, RunRecord, TdResult};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "td-simulate",
    about = "Simulate dopamine prediction errors during conditioning with a TD(0) model"
)]
struct Args {
    /// Protocols to run (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "acquisition,delayed-acquisition,extinction"
    )]
    protocols: Vec<Protocol>,

    /// Directory for the JSONL trace files
    #[arg(long, default_value = "data/output")]
    out_dir: PathBuf,

    /// JSON file with learner settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Time-steps per trial
    #[arg(long)]
    time_steps: Option<usize>,

    /// Weight learning rate (alpha)
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Trials after which to record the weight matrix (comma-separated);
    /// indices past a protocol's last trial are skipped for that protocol
    #[arg(long, value_delimiter = ',')]
    snapshot_trials: Vec<usize>,

    /// Log every trial
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> TdResult<Config> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    if let Some(t) = args.time_steps {
        config.n_time_steps = t;
    }
    if let Some(lr) = args.learning_rate {
        config.learning_rate = lr;
    }
    config.validate()?;
    Ok(config)
}

fn report(protocol: Protocol, config: &Config, record: &RunRecord) {
    let reward_step = protocol.schedule(config.n_time_steps).reward_delivery_time;
    if reward_step >= record.deltas.ncols() {
        return;
    }
    let at_reward = record.delta_at_step(reward_step);
    for &trial in protocol.highlight_trials() {
        info!(%protocol, trial, delta = at_reward[trial], "delta at reward delivery");
    }
    let n = at_reward.len();
    if n > 0 {
        info!(
            %protocol,
            first = at_reward[0],
            last = at_reward[n - 1],
            "delta at reward delivery, first vs last trial"
        );
    }
}

fn run(args: &Args) -> TdResult<()> {
    let config = load_config(args)?;

    info!(
        protocols = ?args.protocols,
        n_time_steps = config.n_time_steps,
        learning_rate = config.learning_rate,
        out_dir = %args.out_dir.display(),
        "TD dopamine simulation"
    );

    let start = Instant::now();
    let records: Vec<(Protocol, RunRecord)> = args
        .protocols
        .par_iter()
        .map(|&protocol| {
            let snapshots: Vec<usize> = args
                .snapshot_trials
                .iter()
                .copied()
                .filter(|&trial| trial < protocol.n_trials())
                .collect();
            run_protocol(protocol, &config, &snapshots).map(|record| (protocol, record))
        })
        .collect::<TdResult<_>>()?;

    for (protocol, record) in &records {
        report(*protocol, &config, record);
        let path = write_run_file(&args.out_dir, *protocol, &config, record)?;
        info!(%protocol, path = %path.display(), "trace written");
    }

    info!(elapsed_secs = start.elapsed().as_secs_f64(), "done");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
