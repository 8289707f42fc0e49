use std::collections::BTreeSet;

use committee_resilience::perturbation::{SampleSpace, SampledChanges};
use committee_resilience::rules::{FastScorer, MarginalScorer, ReferenceScorer, ThieleWeights};
use committee_resilience::sampler::random_vcr_profile;
use committee_resilience::*;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn sampled_profile(seed: u64, voters: usize, candidates: u32, radius: f64) -> Profile {
    let mut rng = StdRng::seed_from_u64(seed);
    random_vcr_profile(
        &mut rng,
        voters,
        candidates,
        PointDistribution::Square,
        radius,
        0.0,
    )
    .unwrap()
}

proptest! {
    #[test]
    fn resolute_committees_are_ordered_sets(
        seed in any::<u64>(),
        voters in 1usize..25,
        candidates in 2u32..12,
        k_frac in 0.0f64..1.0,
        radius in 0.0f64..0.6,
    ) {
        let profile = sampled_profile(seed, voters, candidates, radius);
        let k = 1 + (k_frac * (candidates - 1) as f64) as usize;
        let oracle = RuleOracle::standard();
        for rule in Rule::ALL {
            let outcome = oracle.resolute(rule, &profile, k).unwrap();
            prop_assert_eq!(outcome.committee.len(), k);
            let order: BTreeSet<CandidateId> = outcome.order_candidates().into_iter().collect();
            prop_assert_eq!(outcome.order.len(), k);
            prop_assert_eq!(&order, &outcome.committee);
        }
    }

    #[test]
    fn scorers_agree(
        seed in any::<u64>(),
        voters in 1usize..30,
        candidates in 2u32..12,
        radius in 0.0f64..0.6,
        partial in proptest::collection::btree_set(0u32..12, 0..4),
    ) {
        let profile = sampled_profile(seed, voters, candidates, radius);
        let partial: Vec<CandidateId> = partial
            .into_iter()
            .filter(|c| *c < candidates)
            .map(CandidateId)
            .collect();
        for rule in Rule::ALL {
            let weights = ThieleWeights::new(rule, 4).unwrap();
            prop_assert_eq!(
                FastScorer.marginal_scores_add(&weights, &profile, &partial),
                ReferenceScorer.marginal_scores_add(&weights, &profile, &partial)
            );
        }
    }

    #[test]
    fn tied_committees_contain_the_resolute_one(
        seed in any::<u64>(),
        voters in 1usize..15,
        candidates in 2u32..9,
        radius in 0.0f64..0.5,
        cap in 1usize..20,
    ) {
        let profile = sampled_profile(seed, voters, candidates, radius);
        let k = 2.min(candidates as usize);
        let oracle = RuleOracle::standard();
        for rule in Rule::ALL {
            let resolute = oracle.resolute(rule, &profile, k).unwrap().committee;
            let tied = oracle.irresolute(rule, &profile, k, Some(cap)).unwrap();
            prop_assert!(!tied.is_empty() && tied.len() <= cap);
            prop_assert!(tied.iter().all(|c| c.len() == k));
            prop_assert!(tied.contains(&resolute));
            prop_assert!(tied.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn perturbations_are_nested_and_reversible(
        seed in any::<u64>(),
        voters in 5usize..30,
        candidates in 5u32..20,
    ) {
        let mut profile = sampled_profile(seed, voters, candidates, 0.3);
        let before = profile.clone();
        let space = SampleSpace::from_profile(&profile);
        let grid = PercentageGrid::power_law(0.5, 2.0, 6).unwrap();
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        let changes = match SampledChanges::draw(&space, &grid, &mut rng) {
            Ok(c) => c,
            Err(ResilienceError::InsufficientSampleSpace { .. }) => return Ok(()),
            Err(e) => return Err(TestCaseError::fail(e.to_string())),
        };
        for op in Operation::ALL {
            let mut previous: BTreeSet<(usize, CandidateId)> = BTreeSet::new();
            for tier in 0..changes.num_tiers() {
                let perturbation = changes.tier(op, tier);
                let pairs: BTreeSet<(usize, CandidateId)> = perturbation
                    .additions
                    .iter()
                    .chain(perturbation.deletions.iter())
                    .copied()
                    .collect();
                prop_assert!(previous.is_subset(&pairs));
                previous = pairs;

                let perturbed = perturbation.apply(&mut profile).unwrap();
                prop_assert_eq!(
                    perturbed.num_approvals() + perturbation.deletions.len(),
                    before.num_approvals() + perturbation.additions.len()
                );
                perturbed.revert();
                prop_assert_eq!(&profile, &before);
            }
        }
    }

    #[test]
    fn distance_is_a_set_difference(
        a in proptest::collection::btree_set(0u32..10, 0..6),
        b in proptest::collection::btree_set(0u32..10, 0..6),
    ) {
        let a: Committee = a.into_iter().map(CandidateId).collect();
        let b: Committee = b.into_iter().map(CandidateId).collect();
        let common = a.intersection(&b).count();
        prop_assert_eq!(committee_distance(&a, &b), a.len() - common);
        prop_assert_eq!(committee_distance(&a, &a), 0);
    }
}
