mod config;
use log::info;

pub mod aggregate;
pub mod builder;
pub mod driver;
pub mod manual;
pub mod perturbation;
pub mod profile;
pub mod rules;
pub mod runner;
pub mod sampler;

pub use crate::aggregate::{ResultAccumulator, RuleSeries};
pub use crate::config::*;
pub use crate::driver::ExperimentDriver;
pub use crate::perturbation::Operation;
pub use crate::profile::{committee_distance, CandidateId, Committee, Profile};
pub use crate::rules::RuleOracle;
pub use crate::runner::{ElectionRecord, ExperimentRunner, TieStats};

/// Runs all the election trials of one sampling configuration.
///
/// Arguments:
/// * `config` the experiment settings shared by all the trials
/// * `params` how the base profiles are sampled
/// * `workers` `None` to run the trials one after the other, otherwise the size of the worker
///   pool (0 for one worker per core)
pub fn run_experiment(
    config: &ExperimentConfig,
    params: &SamplingParameters,
    workers: Option<usize>,
) -> ResilienceResult<ResultAccumulator> {
    info!(
        "Running {} elections of {} with {} voters, {} candidates, committee size {}, rules {:?}",
        config.num_elections,
        params.file_stem(),
        config.num_voters,
        config.num_candidates,
        config.committee_size,
        config.rules
    );
    let driver = ExperimentDriver::new(config.clone(), workers)?;
    driver.run_configuration(0, params)
}
