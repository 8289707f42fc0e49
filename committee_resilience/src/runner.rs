// ********* Election trials ***********

use std::collections::BTreeMap;

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::*;
use crate::perturbation::{Operation, SampleSpace, SampledChanges};
use crate::profile::{committee_distance, Profile};
use crate::rules::{
    FastScorer, GreedySolver, MarginalScorer, ResoluteOutcome, ResoluteSolver, RuleOracle,
};
use crate::sampler::sample_election;

/// The committees tied after a MIX perturbation, compared to the baseline committee.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TieStats {
    /// The number of tied committees found (at most `max_num_committees`).
    pub tied: usize,
    /// The smallest distance from the baseline committee to a tied committee.
    pub min_distance: usize,
    /// How much closer to the baseline the closest tied committee is than the resolute one.
    pub excess: usize,
}

/// The measurements of one rule for one election.
///
/// Every field is indexed by percentage tier first.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RuleRecord {
    /// EXP1: distance to the baseline for each iteration, per operation.
    pub distances: BTreeMap<Operation, Vec<Vec<usize>>>,
    /// EXP2: tie statistics for each iteration of the MIX operation.
    pub ties: Vec<Vec<TieStats>>,
    /// EXP3: for each position of the baseline selection order, the number of iterations of
    /// the MIX operation in which the candidate at that position left the committee.
    pub replacements: Vec<Vec<u32>>,
}

impl RuleRecord {
    fn new(num_tiers: usize, num_iterations: usize, committee_size: usize) -> RuleRecord {
        let per_tier = || vec![Vec::with_capacity(num_iterations); num_tiers];
        RuleRecord {
            distances: Operation::ALL.iter().map(|op| (*op, per_tier())).collect(),
            ties: vec![Vec::with_capacity(num_iterations); num_tiers],
            replacements: vec![vec![0; committee_size]; num_tiers],
        }
    }

    pub fn distances(&self, operation: Operation) -> &[Vec<usize>] {
        self.distances
            .get(&operation)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }
}

/// Everything measured during one election trial.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ElectionRecord {
    pub trial: usize,
    /// The number of approvals of the base profile (the size of the deletable space).
    pub approval_count: usize,
    pub rules: BTreeMap<Rule, RuleRecord>,
}

/// Runs election trials for a fixed configuration.
pub struct ExperimentRunner<S = FastScorer, R = GreedySolver> {
    config: ExperimentConfig,
    oracle: RuleOracle<S, R>,
}

impl ExperimentRunner {
    pub fn new(config: ExperimentConfig) -> ResilienceResult<ExperimentRunner> {
        ExperimentRunner::with_oracle(config, RuleOracle::standard())
    }
}

impl<S: MarginalScorer, R: ResoluteSolver> ExperimentRunner<S, R> {
    pub fn with_oracle(
        config: ExperimentConfig,
        oracle: RuleOracle<S, R>,
    ) -> ResilienceResult<ExperimentRunner<S, R>> {
        config.validate()?;
        Ok(ExperimentRunner { config, oracle })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn oracle(&self) -> &RuleOracle<S, R> {
        &self.oracle
    }

    /// Samples a base profile and runs the perturbation experiments on it.
    pub fn run_election<G: Rng + ?Sized>(
        &self,
        params: &SamplingParameters,
        trial: usize,
        rng: &mut G,
    ) -> ResilienceResult<ElectionRecord> {
        let mut profile = sample_election(rng, &self.config, params)?;
        self.run_on_profile(&mut profile, trial, rng)
    }

    /// Runs the perturbation experiments on a given base profile.
    ///
    /// The profile is perturbed in place and is identical to its initial state when the
    /// function returns, whether it succeeds or not.
    pub fn run_on_profile<G: Rng + ?Sized>(
        &self,
        profile: &mut Profile,
        trial: usize,
        rng: &mut G,
    ) -> ResilienceResult<ElectionRecord> {
        let config = &self.config;
        let k = config.committee_size;
        let num_tiers = config.percentages.len();

        let space = SampleSpace::from_profile(profile);
        let mut baselines: BTreeMap<Rule, ResoluteOutcome> = BTreeMap::new();
        for rule in config.rules.iter() {
            baselines.insert(*rule, self.oracle.resolute(*rule, profile, k)?);
        }
        let mut records: BTreeMap<Rule, RuleRecord> = config
            .rules
            .iter()
            .map(|rule| (*rule, RuleRecord::new(num_tiers, config.num_iterations, k)))
            .collect();

        for _ in 0..config.num_iterations {
            let changes = SampledChanges::draw(&space, &config.percentages, rng)?;
            for op in Operation::ALL {
                for tier in 0..num_tiers {
                    let perturbation = changes.tier(op, tier);
                    let perturbed = perturbation.apply(profile)?;
                    for (rule, baseline) in baselines.iter() {
                        let record = match records.get_mut(rule) {
                            Some(r) => r,
                            None => continue,
                        };
                        let committee = self.oracle.resolute(*rule, &perturbed, k)?.committee;
                        let distance = committee_distance(&baseline.committee, &committee);
                        if let Some(d) = record.distances.get_mut(&op) {
                            d[tier].push(distance);
                        }
                        if op != Operation::Mix {
                            continue;
                        }

                        let tied = self.oracle.irresolute(
                            *rule,
                            &perturbed,
                            k,
                            Some(config.max_num_committees),
                        )?;
                        let min_distance = tied
                            .iter()
                            .map(|c| committee_distance(&baseline.committee, c))
                            .min()
                            .unwrap_or(distance);
                        record.ties[tier].push(TieStats {
                            tied: tied.len(),
                            min_distance,
                            excess: distance.saturating_sub(min_distance),
                        });

                        for (pos, step) in baseline.order.iter().enumerate() {
                            if !committee.contains(&step.candidate) {
                                record.replacements[tier][pos] += 1;
                            }
                        }
                    }
                    perturbed.revert();
                }
            }
        }

        debug!(
            "run_on_profile: trial {} done: {} approvals, {} iterations",
            trial,
            space.deletions().len(),
            config.num_iterations
        );
        Ok(ElectionRecord {
            trial,
            approval_count: space.deletions().len(),
            rules: records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProfileBuilder;
    use crate::sampler::random_vcr_profile;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config() -> ExperimentConfig {
        ExperimentConfig {
            num_voters: 60,
            num_candidates: 20,
            committee_size: 4,
            num_elections: 2,
            num_iterations: 3,
            max_num_committees: 20,
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn record_shapes() {
        let runner = ExperimentRunner::new(small_config()).unwrap();
        let params = SamplingParameters::two_d(PointDistribution::Square, 0.244, None).unwrap();
        let record = runner
            .run_election(&params, 5, &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert_eq!(record.trial, 5);
        assert!(record.approval_count > 0);
        assert_eq!(record.rules.len(), 2);
        for rr in record.rules.values() {
            for op in Operation::ALL {
                assert_eq!(rr.distances(op).len(), 15);
                assert!(rr.distances(op).iter().all(|t| t.len() == 3));
                // Nothing changes at the empty tier.
                assert_eq!(rr.distances(op)[0], vec![0, 0, 0]);
            }
            assert_eq!(rr.ties.len(), 15);
            assert_eq!(rr.replacements[0], vec![0; 4]);
        }
    }

    #[test]
    fn closest_tied_committee_is_never_further_than_the_resolute_one() {
        let config = small_config();
        let runner = ExperimentRunner::new(config.clone()).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let mut profile =
            random_vcr_profile(&mut rng, 60, 20, PointDistribution::Interval, 0.05, 0.0).unwrap();
        let record = runner.run_on_profile(&mut profile, 0, &mut rng).unwrap();
        for rr in record.rules.values() {
            let mix = rr.distances(Operation::Mix);
            for (tier, ties) in rr.ties.iter().enumerate() {
                for (it, t) in ties.iter().enumerate() {
                    assert!(t.tied >= 1 && t.tied <= config.max_num_committees);
                    assert!(t.min_distance <= mix[tier][it]);
                    assert_eq!(t.min_distance + t.excess, mix[tier][it]);
                }
            }
        }
    }

    #[test]
    fn replacements_are_bounded_by_the_committee_size() {
        let config = small_config();
        let runner = ExperimentRunner::new(config.clone()).unwrap();
        let params = SamplingParameters::resampling(0.15, 0.75).unwrap();
        let record = runner
            .run_election(&params, 0, &mut StdRng::seed_from_u64(4))
            .unwrap();
        for rr in record.rules.values() {
            for (tier, hist) in rr.replacements.iter().enumerate() {
                let total: u32 = hist.iter().sum();
                assert!(total as usize <= config.committee_size * config.num_iterations);
                // Replacements are exactly the MIX distances, counted by position.
                let mix_total: usize = rr.distances(Operation::Mix)[tier].iter().sum();
                assert_eq!(total as usize, mix_total);
            }
        }
    }

    #[test]
    fn profile_is_restored() {
        let runner = ExperimentRunner::new(small_config()).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut profile =
            random_vcr_profile(&mut rng, 60, 20, PointDistribution::Square, 0.2, 0.0).unwrap();
        let before = profile.clone();
        runner.run_on_profile(&mut profile, 0, &mut rng).unwrap();
        assert_eq!(profile, before);
    }

    #[test]
    fn dense_profiles_cannot_be_perturbed() {
        let config = ExperimentConfig {
            num_voters: 10,
            num_candidates: 3,
            committee_size: 2,
            ..small_config()
        };
        let runner = ExperimentRunner::new(config).unwrap();
        let mut profile = ProfileBuilder::new(3)
            .voters(10, &[0, 1, 2])
            .unwrap()
            .build()
            .unwrap();
        let res = runner.run_on_profile(&mut profile, 0, &mut StdRng::seed_from_u64(0));
        assert!(matches!(
            res,
            Err(ResilienceError::InsufficientSampleSpace { .. })
        ));
    }
}
