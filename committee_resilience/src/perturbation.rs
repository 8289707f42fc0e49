//! Random perturbations of an approval profile, split into nested magnitude tiers.
//!
//! A draw takes the same number of pairs from the addable and from the deletable
//! (voter, candidate) positions. The number is based on the size of the deletable space in
//! both cases. Each drawn list is then cut at the tier boundaries, and the perturbation of a
//! tier is the prefix of the list up to its boundary:
//!
//! ```text
//! drawn:   a0 a1 a2 a3 a4 a5 a6 a7 a8 a9
//! tiers:   |0|  1  |    2   |     3    |
//! ```
//!
//! so the changes of a tier always include the changes of all the smaller tiers.

use std::collections::HashSet;
use std::fmt::Display;
use std::ops::Deref;

use rand::Rng;
use snafu::ensure;

use crate::config::*;
use crate::profile::{ApprovalPair, Profile};

/// The three kinds of perturbation measured by the experiments.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Operation {
    Add,
    Del,
    /// The first half of the additions and the first half of the deletions of every tier.
    Mix,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Add, Operation::Del, Operation::Mix];

    pub fn id(&self) -> &'static str {
        match self {
            Operation::Add => "ADD",
            Operation::Del => "DEL",
            Operation::Mix => "MIX",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// All the positions of a profile that can be changed.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SampleSpace {
    additions: Vec<ApprovalPair>,
    deletions: Vec<ApprovalPair>,
}

impl SampleSpace {
    pub fn from_profile(profile: &Profile) -> SampleSpace {
        let mut additions: Vec<ApprovalPair> = Vec::new();
        let mut deletions: Vec<ApprovalPair> = Vec::new();
        for (v_idx, voter) in profile.voters().iter().enumerate() {
            for c in profile.candidates() {
                if voter.approves(c) {
                    deletions.push((v_idx, c));
                } else {
                    additions.push((v_idx, c));
                }
            }
        }
        SampleSpace {
            additions,
            deletions,
        }
    }

    /// The (voter, non-approved candidate) pairs.
    pub fn additions(&self) -> &[ApprovalPair] {
        &self.additions
    }

    /// The (voter, approved candidate) pairs.
    pub fn deletions(&self) -> &[ApprovalPair] {
        &self.deletions
    }

    /// The number of pairs drawn from each space for the given largest percentage.
    pub fn draw_size(&self, max_percentage: f64) -> usize {
        (self.deletions.len() as f64 * max_percentage).floor() as usize
    }
}

/// One random draw of additions and deletions, with its tier boundaries.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SampledChanges {
    additions: Vec<ApprovalPair>,
    deletions: Vec<ApprovalPair>,
    boundaries: Vec<usize>,
}

fn tier_boundaries(num_drawn: usize, grid: &PercentageGrid) -> Vec<usize> {
    let max = grid.max();
    let mut boundaries: Vec<usize> = grid
        .values()
        .iter()
        .map(|p| ((num_drawn as f64 * p / max).round() as usize).min(num_drawn))
        .collect();
    if let Some(last) = boundaries.last_mut() {
        *last = num_drawn;
    }
    boundaries
}

impl SampledChanges {
    /// Draws, without replacement, `space.draw_size(grid.max())` pairs from each space.
    ///
    /// Fails if the addable space is smaller than the draw.
    pub fn draw<R: Rng + ?Sized>(
        space: &SampleSpace,
        grid: &PercentageGrid,
        rng: &mut R,
    ) -> ResilienceResult<SampledChanges> {
        let num_drawn = space.draw_size(grid.max());
        let mut pick = |name: &str, pairs: &[ApprovalPair]| -> ResilienceResult<Vec<ApprovalPair>> {
            ensure!(
                num_drawn <= pairs.len(),
                InsufficientSampleSpaceSnafu {
                    space: name,
                    requested: num_drawn,
                    available: pairs.len(),
                }
            );
            Ok(rand::seq::index::sample(rng, pairs.len(), num_drawn)
                .into_iter()
                .map(|idx| pairs[idx])
                .collect())
        };
        let additions = pick("addable", &space.additions)?;
        let deletions = pick("deletable", &space.deletions)?;
        SampledChanges::new(additions, deletions, grid)
    }

    /// Uses fixed lists of changes, in the order in which they should be applied.
    pub fn new(
        additions: Vec<ApprovalPair>,
        deletions: Vec<ApprovalPair>,
        grid: &PercentageGrid,
    ) -> ResilienceResult<SampledChanges> {
        ensure!(
            additions.len() == deletions.len(),
            InvalidParameterSnafu {
                detail: format!(
                    "{} additions and {} deletions: both lists must have the same length",
                    additions.len(),
                    deletions.len()
                ),
            }
        );
        let boundaries = tier_boundaries(additions.len(), grid);
        Ok(SampledChanges {
            additions,
            deletions,
            boundaries,
        })
    }

    pub fn num_tiers(&self) -> usize {
        self.boundaries.len()
    }

    /// The number of changes of each list included in a tier.
    pub fn boundary(&self, tier: usize) -> usize {
        self.boundaries[tier]
    }

    /// The perturbation of an operation at a tier.
    pub fn tier(&self, operation: Operation, tier: usize) -> Perturbation {
        let end = self.boundaries[tier];
        match operation {
            Operation::Add => Perturbation {
                additions: self.additions[..end].to_vec(),
                deletions: Vec::new(),
            },
            Operation::Del => Perturbation {
                additions: Vec::new(),
                deletions: self.deletions[..end].to_vec(),
            },
            Operation::Mix => {
                let mut additions: Vec<ApprovalPair> = Vec::new();
                let mut deletions: Vec<ApprovalPair> = Vec::new();
                let mut start = 0;
                for stop in self.boundaries[..=tier].iter() {
                    let half = start + (stop - start) / 2;
                    additions.extend_from_slice(&self.additions[start..half]);
                    deletions.extend_from_slice(&self.deletions[start..half]);
                    start = *stop;
                }
                Perturbation {
                    additions,
                    deletions,
                }
            }
        }
    }
}

/// A set of approvals to add and approvals to remove.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Perturbation {
    pub additions: Vec<ApprovalPair>,
    pub deletions: Vec<ApprovalPair>,
}

impl Perturbation {
    pub fn len(&self) -> usize {
        self.additions.len() + self.deletions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, profile: &Profile) -> ResilienceResult<()> {
        let mut seen: HashSet<ApprovalPair> = HashSet::with_capacity(self.len());
        let all = self
            .additions
            .iter()
            .map(|p| (p, false))
            .chain(self.deletions.iter().map(|p| (p, true)));
        for (pair, approved) in all {
            let (v_idx, c) = *pair;
            let voter = match profile.voters().get(v_idx) {
                Some(v) if c.index() < profile.num_candidates() => v,
                _ => {
                    return InvalidParameterSnafu {
                        detail: format!("({}, {}) is not a position of the profile", v_idx, c),
                    }
                    .fail()
                }
            };
            ensure!(
                voter.approves(c) == approved && seen.insert(*pair),
                InvalidParameterSnafu {
                    detail: format!(
                        "cannot {} the approval of voter {} for {}",
                        if approved { "remove" } else { "add" },
                        v_idx,
                        c
                    ),
                }
            );
        }
        Ok(())
    }

    /// Applies the perturbation in place.
    ///
    /// Every pair is checked before the profile is touched. The profile is restored when
    /// the returned guard is reverted or dropped.
    pub fn apply<'a>(&'a self, profile: &'a mut Profile) -> ResilienceResult<PerturbedProfile<'a>> {
        self.check(profile)?;
        let voters = profile.voters_mut();
        for (v_idx, c) in self.additions.iter() {
            voters[*v_idx].approve(*c);
        }
        for (v_idx, c) in self.deletions.iter() {
            voters[*v_idx].disapprove(*c);
        }
        Ok(PerturbedProfile {
            profile,
            perturbation: self,
            reverted: false,
        })
    }
}

/// A profile with a perturbation applied to it.
pub struct PerturbedProfile<'a> {
    profile: &'a mut Profile,
    perturbation: &'a Perturbation,
    reverted: bool,
}

impl<'a> PerturbedProfile<'a> {
    pub fn revert(mut self) {
        self.undo();
    }

    fn undo(&mut self) {
        if self.reverted {
            return;
        }
        let voters = self.profile.voters_mut();
        for (v_idx, c) in self.perturbation.additions.iter() {
            voters[*v_idx].disapprove(*c);
        }
        for (v_idx, c) in self.perturbation.deletions.iter() {
            voters[*v_idx].approve(*c);
        }
        self.reverted = true;
    }
}

impl<'a> Deref for PerturbedProfile<'a> {
    type Target = Profile;

    fn deref(&self) -> &Profile {
        self.profile
    }
}

impl<'a> Drop for PerturbedProfile<'a> {
    fn drop(&mut self) {
        self.undo();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProfileBuilder;
    use crate::profile::CandidateId;
    use crate::sampler::random_vcr_profile;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sampled() -> (Profile, SampledChanges) {
        let mut rng = StdRng::seed_from_u64(11);
        let profile =
            random_vcr_profile(&mut rng, 100, 40, PointDistribution::Interval, 0.1, 0.0).unwrap();
        let space = SampleSpace::from_profile(&profile);
        let changes = SampledChanges::draw(&space, &PercentageGrid::default(), &mut rng).unwrap();
        (profile, changes)
    }

    fn as_set(pairs: &[ApprovalPair]) -> HashSet<ApprovalPair> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn sample_space_covers_the_profile() {
        let profile = ProfileBuilder::new(4)
            .voter(&[0, 1])
            .unwrap()
            .voter(&[])
            .unwrap()
            .build()
            .unwrap();
        let space = SampleSpace::from_profile(&profile);
        assert_eq!(
            space.deletions(),
            &[(0, CandidateId(0)), (0, CandidateId(1))]
        );
        assert_eq!(space.additions().len(), 6);
        assert_eq!(space.draw_size(0.5), 1);
    }

    #[test]
    fn boundaries_follow_the_grid() {
        let (profile, changes) = sampled();
        let num_drawn = SampleSpace::from_profile(&profile).draw_size(0.1);
        assert!(num_drawn > 0);
        assert_eq!(changes.num_tiers(), 15);
        assert_eq!(changes.boundary(0), 0);
        assert_eq!(changes.boundary(14), num_drawn);
        for t in 1..15 {
            assert!(changes.boundary(t - 1) <= changes.boundary(t));
        }
        // The tier of 0.051 holds round(51%) of the drawn pairs.
        assert_eq!(
            changes.boundary(10),
            (num_drawn as f64 * 0.051 / 0.1).round() as usize
        );
    }

    #[test]
    fn tiers_are_nested() {
        let (_, changes) = sampled();
        for op in Operation::ALL {
            for t in 1..changes.num_tiers() {
                let small = changes.tier(op, t - 1);
                let large = changes.tier(op, t);
                assert!(as_set(&small.additions).is_subset(&as_set(&large.additions)));
                assert!(as_set(&small.deletions).is_subset(&as_set(&large.deletions)));
            }
            assert!(changes.tier(op, 0).is_empty());
        }
    }

    #[test]
    fn mix_takes_half_of_each_tier() {
        let (_, changes) = sampled();
        for t in 0..changes.num_tiers() {
            let mix = changes.tier(Operation::Mix, t);
            let add = changes.tier(Operation::Add, t);
            let del = changes.tier(Operation::Del, t);
            assert_eq!(mix.additions.len(), mix.deletions.len());
            assert!(2 * mix.additions.len() <= add.additions.len());
            assert!(as_set(&mix.additions).is_subset(&as_set(&add.additions)));
            assert!(as_set(&mix.deletions).is_subset(&as_set(&del.deletions)));
        }
    }

    #[test]
    fn mix_halves_with_fixed_changes() {
        let grid = PercentageGrid::from_values(vec![0.0, 0.5, 1.0]).unwrap();
        let additions: Vec<ApprovalPair> = (0..4).map(|v| (v, CandidateId(0))).collect();
        let deletions: Vec<ApprovalPair> = (0..4).map(|v| (v, CandidateId(1))).collect();
        let changes = SampledChanges::new(additions, deletions, &grid).unwrap();
        // Tiers are [], [0, 1] and [2, 3].
        assert_eq!(changes.tier(Operation::Mix, 1).additions, vec![(0, CandidateId(0))]);
        assert_eq!(
            changes.tier(Operation::Mix, 2).deletions,
            vec![(0, CandidateId(1)), (2, CandidateId(1))]
        );
        assert_eq!(changes.tier(Operation::Add, 2).len(), 4);
    }

    #[test]
    fn apply_and_revert_restore_the_profile() {
        let (mut profile, changes) = sampled();
        let before = profile.clone();
        for op in Operation::ALL {
            for t in 0..changes.num_tiers() {
                let perturbation = changes.tier(op, t);
                let perturbed = perturbation.apply(&mut profile).unwrap();
                let expected = before.num_approvals() + perturbation.additions.len()
                    - perturbation.deletions.len();
                assert_eq!(perturbed.num_approvals(), expected);
                perturbed.revert();
                assert_eq!(profile, before);
            }
        }
    }

    #[test]
    fn dropping_the_guard_reverts() {
        let (mut profile, changes) = sampled();
        let before = profile.clone();
        {
            let perturbation = changes.tier(Operation::Del, 14);
            let _perturbed = perturbation.apply(&mut profile).unwrap();
        }
        assert_eq!(profile, before);
    }

    #[test]
    fn invalid_perturbations_leave_the_profile_untouched() {
        let mut profile = ProfileBuilder::new(3).voter(&[0]).unwrap().build().unwrap();
        let before = profile.clone();
        let bad = [
            Perturbation {
                additions: vec![(0, CandidateId(1)), (0, CandidateId(0))],
                deletions: Vec::new(),
            },
            Perturbation {
                additions: Vec::new(),
                deletions: vec![(0, CandidateId(2))],
            },
            Perturbation {
                additions: vec![(0, CandidateId(1)), (0, CandidateId(1))],
                deletions: Vec::new(),
            },
            Perturbation {
                additions: vec![(1, CandidateId(1))],
                deletions: Vec::new(),
            },
        ];
        for p in bad.iter() {
            assert!(matches!(
                p.apply(&mut profile),
                Err(ResilienceError::InvalidParameter { .. })
            ));
            assert_eq!(profile, before);
        }
    }

    #[test]
    fn draw_fails_when_few_positions_are_addable() {
        let profile = ProfileBuilder::new(3)
            .voters(10, &[0, 1, 2])
            .unwrap()
            .build()
            .unwrap();
        let space = SampleSpace::from_profile(&profile);
        let res = SampledChanges::draw(
            &space,
            &PercentageGrid::default(),
            &mut StdRng::seed_from_u64(1),
        );
        assert_eq!(
            res,
            Err(ResilienceError::InsufficientSampleSpace {
                space: "addable".to_string(),
                requested: 3,
                available: 0,
            })
        );
    }
}
