use committee_resilience::builder::ProfileBuilder;
use committee_resilience::perturbation::{Perturbation, SampledChanges};
use committee_resilience::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn committee(ids: &[u32]) -> Committee {
    ids.iter().map(|i| CandidateId(*i)).collect()
}

/// Removes every approval of `candidate`.
fn remove_candidate(profile: &Profile, candidate: u32) -> Perturbation {
    Perturbation {
        additions: Vec::new(),
        deletions: profile
            .voters()
            .iter()
            .enumerate()
            .filter(|(_, v)| v.approves(CandidateId(candidate)))
            .map(|(idx, _)| (idx, CandidateId(candidate)))
            .collect(),
    }
}

#[test]
fn unanimous_profile() {
    init_logger();
    let mut profile = ProfileBuilder::new(5)
        .voters(10, &[0, 1])
        .unwrap()
        .build()
        .unwrap();
    let oracle = RuleOracle::standard();
    for rule in Rule::ALL {
        let baseline = oracle.resolute(rule, &profile, 2).unwrap();
        assert_eq!(baseline.committee, committee(&[0, 1]));

        let deletion = remove_candidate(&profile, 1);
        assert_eq!(deletion.len(), 10);
        let perturbed = deletion.apply(&mut profile).unwrap();
        let after = oracle.resolute(rule, &perturbed, 2).unwrap();
        // Nobody supports the second seat any more: candidates 1 to 4 tie at zero and the
        // lowest index keeps its seat.
        assert_eq!(after.order[1].delta, 0);
        assert_eq!(after.order[1].num_tied, 4);
        assert_eq!(committee_distance(&baseline.committee, &after.committee), 0);
        let tied = oracle.irresolute(rule, &perturbed, 2, Some(100)).unwrap();
        assert_eq!(
            tied,
            vec![
                committee(&[0, 1]),
                committee(&[0, 2]),
                committee(&[0, 3]),
                committee(&[0, 4])
            ]
        );
        perturbed.revert();
    }
}

#[test]
fn unanimous_profile_with_a_dissenting_voter() {
    init_logger();
    let mut profile = ProfileBuilder::new(5)
        .voters(9, &[0, 1])
        .unwrap()
        .voter(&[1, 4])
        .unwrap()
        .build()
        .unwrap();
    let oracle = RuleOracle::standard();
    for rule in Rule::ALL {
        let baseline = oracle.resolute(rule, &profile, 2).unwrap();
        assert_eq!(baseline.committee, committee(&[0, 1]));

        let deletion = remove_candidate(&profile, 1);
        let perturbed = deletion.apply(&mut profile).unwrap();
        let after = oracle.resolute(rule, &perturbed, 2).unwrap();
        assert_eq!(after.committee, committee(&[0, 4]));
        assert_eq!(committee_distance(&baseline.committee, &after.committee), 1);
    }
    assert_eq!(profile.num_approvals(), 20);
}

#[test]
fn runner_on_fixed_profile() {
    init_logger();
    let config = ExperimentConfig {
        num_voters: 10,
        num_candidates: 5,
        committee_size: 2,
        num_elections: 1,
        num_iterations: 4,
        max_num_committees: 10,
        percentages: PercentageGrid::from_values(vec![0.0, 0.05, 0.1]).unwrap(),
        ..ExperimentConfig::default()
    };
    let runner = ExperimentRunner::new(config.clone()).unwrap();
    let mut profile = ProfileBuilder::new(5)
        .voters(10, &[0, 1])
        .unwrap()
        .build()
        .unwrap();
    let before = profile.clone();
    let record = runner
        .run_on_profile(&mut profile, 0, &mut StdRng::seed_from_u64(8))
        .unwrap();
    assert_eq!(profile, before);
    assert_eq!(record.approval_count, 20);

    // Two changes per list: one per tier, so MIX keeps none of them.
    let changes = SampledChanges::new(
        vec![(0, CandidateId(2)), (1, CandidateId(3))],
        vec![(0, CandidateId(0)), (1, CandidateId(1))],
        &config.percentages,
    )
    .unwrap();
    assert_eq!(changes.boundary(1), 1);
    assert_eq!(changes.tier(Operation::Mix, 2).len(), 0);

    let mut acc = ResultAccumulator::new(&config);
    acc.merge(&record).unwrap();
    for rule in Rule::ALL {
        // Two changed approvals cannot overturn a unanimous baseline.
        assert_eq!(acc.mean_distance(rule, Operation::Add, 2), Some(0.0));
        assert_eq!(acc.mean_distance(rule, Operation::Del, 2), Some(0.0));
        assert_eq!(acc.replacement_frequency(rule, 2), Some(vec![0.0, 0.0]));
    }
}
