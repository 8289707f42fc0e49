//! Dispatch of election trials.
//!
//! Each trial is an independent task: it borrows the immutable runner and the sampling
//! parameters, and sends back a self-contained [`ElectionRecord`]. With a worker pool the
//! records are merged in completion order, which is fine because the [`ResultAccumulator`]
//! does not depend on merge order.
//!
//! All the trials of a configuration run inside one pool scope, so no trial outlives the
//! call that started it. A panicking trial is reported as a [`ResilienceError::WorkerPool`]
//! error, and the first failure cancels the trials that have not started yet.

use std::any::Any;
use std::hash::Hasher;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use siphasher::sip::SipHasher13;

use crate::aggregate::ResultAccumulator;
use crate::config::*;
use crate::rules::{FastScorer, GreedySolver, MarginalScorer, ResoluteSolver};
use crate::runner::{ElectionRecord, ExperimentRunner};

/// The seed of a trial, derived from the master seed with SipHash-1-3 (zero keys).
pub fn derive_trial_seed(master_seed: u64, configuration: u64, trial: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(configuration);
    hasher.write_u64(trial);
    hasher.finish()
}

fn trial_rng(seed: Option<u64>, configuration: usize, trial: usize) -> StdRng {
    match seed {
        Some(s) => {
            StdRng::seed_from_u64(derive_trial_seed(s, configuration as u64, trial as u64))
        }
        None => StdRng::from_entropy(),
    }
}

fn run_trial<S: MarginalScorer, R: ResoluteSolver>(
    runner: &ExperimentRunner<S, R>,
    params: &SamplingParameters,
    configuration: usize,
    trial: usize,
) -> ResilienceResult<ElectionRecord> {
    let mut rng = trial_rng(runner.config().seed, configuration, trial);
    runner.run_election(params, trial, &mut rng)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// [`run_trial`], with a panic turned into an error.
fn run_trial_guarded<S: MarginalScorer, R: ResoluteSolver>(
    runner: &ExperimentRunner<S, R>,
    params: &SamplingParameters,
    configuration: usize,
    trial: usize,
) -> ResilienceResult<ElectionRecord> {
    match catch_unwind(AssertUnwindSafe(|| {
        run_trial(runner, params, configuration, trial)
    })) {
        Ok(res) => res,
        Err(payload) => WorkerPoolSnafu {
            detail: format!(
                "trial {} of {} panicked: {}",
                trial,
                params.file_stem(),
                panic_message(payload.as_ref())
            ),
        }
        .fail(),
    }
}

/// Logs every 10% of the trials of a configuration. Shared by the workers.
struct Progress {
    total: usize,
    done: AtomicUsize,
}

impl Progress {
    fn new(total: usize) -> Progress {
        Progress {
            total,
            done: AtomicUsize::new(0),
        }
    }

    fn tick(&self, stem: &str) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done * 10 / self.total != (done - 1) * 10 / self.total {
            info!(
                "{}: {} out of {} elections done ({}%)",
                stem,
                done,
                self.total,
                done * 100 / self.total
            );
        }
    }
}

/// Runs all the trials of sampling configurations, sequentially or on a thread pool.
pub struct ExperimentDriver<S = FastScorer, R = GreedySolver> {
    runner: ExperimentRunner<S, R>,
    pool: Option<rayon::ThreadPool>,
}

impl ExperimentDriver {
    /// A driver with the standard rule oracle.
    ///
    /// `workers` is `None` for a sequential run, `Some(0)` for one worker per available core.
    pub fn new(
        config: ExperimentConfig,
        workers: Option<usize>,
    ) -> ResilienceResult<ExperimentDriver> {
        ExperimentDriver::with_runner(ExperimentRunner::new(config)?, workers)
    }
}

impl<S: MarginalScorer, R: ResoluteSolver> ExperimentDriver<S, R> {
    pub fn with_runner(
        runner: ExperimentRunner<S, R>,
        workers: Option<usize>,
    ) -> ResilienceResult<ExperimentDriver<S, R>> {
        let pool = match workers {
            None => None,
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("trial-worker-{}", i))
                    .build()
                    .map_err(|e| ResilienceError::WorkerPool {
                        detail: e.to_string(),
                    })?;
                Some(pool)
            }
        };
        Ok(ExperimentDriver { runner, pool })
    }

    pub fn config(&self) -> &ExperimentConfig {
        self.runner.config()
    }

    /// The number of worker threads, 1 for a sequential driver.
    pub fn num_workers(&self) -> usize {
        self.pool
            .as_ref()
            .map(|p| p.current_num_threads())
            .unwrap_or(1)
    }

    /// Runs `num_elections` trials of one sampling configuration.
    ///
    /// `configuration` is the index of the configuration in the study; with a master seed it
    /// selects the random streams of the trials. The first failing trial fails the whole
    /// configuration, and this only returns once no trial of the configuration is running.
    pub fn run_configuration(
        &self,
        configuration: usize,
        params: &SamplingParameters,
    ) -> ResilienceResult<ResultAccumulator> {
        let config = self.runner.config();
        let stem = params.file_stem();
        let mut acc = ResultAccumulator::new(config);
        let progress = Progress::new(config.num_elections);
        debug!(
            "run_configuration: {} with {} elections on {} workers",
            stem,
            config.num_elections,
            self.num_workers()
        );

        let pool = match &self.pool {
            Some(p) => p,
            None => {
                for trial in 0..config.num_elections {
                    let record = run_trial_guarded(&self.runner, params, configuration, trial)?;
                    acc.merge(&record)?;
                    progress.tick(&stem);
                }
                return Ok(acc);
            }
        };

        let cancelled = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<ResilienceResult<ElectionRecord>>();
        let runner = &self.runner;
        pool.scope(|scope| {
            let tx = tx;
            for trial in 0..config.num_elections {
                let tx = tx.clone();
                let (cancelled, progress, stem) = (&cancelled, &progress, &stem);
                scope.spawn(move |_| {
                    if cancelled.load(Ordering::Relaxed) {
                        return;
                    }
                    let res = run_trial_guarded(runner, params, configuration, trial);
                    match &res {
                        Ok(_) => progress.tick(stem),
                        Err(e) => {
                            warn!("{}: trial {} failed: {}", stem, trial, e);
                            cancelled.store(true, Ordering::Relaxed);
                        }
                    }
                    // The receiver outlives the scope.
                    let _ = tx.send(res);
                });
            }
        });

        for res in rx.iter() {
            acc.merge(&res?)?;
        }
        Ok(acc)
    }
}
