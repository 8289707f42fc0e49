// ********* Approval profiles and committees ***********

use std::collections::BTreeSet;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::config::{InvalidParameterSnafu, ResilienceResult};

/// The identifier of a candidate: its index in the candidate universe `0..num_candidates`.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub u32);

impl CandidateId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A committee is a set of distinct candidates.
pub type Committee = BTreeSet<CandidateId>;

/// One (voter index, candidate) position of the approval matrix.
pub type ApprovalPair = (usize, CandidateId);

/// The number of candidates in `s1` that are not in `s2`.
///
/// This is deliberately not symmetric: `committee_distance({1, 2}, {1, 2, 3})` is 0 while
/// `committee_distance({1, 2, 3}, {1, 2})` is 1. The experiments always measure from the
/// baseline committee towards the recomputed one.
pub fn committee_distance(s1: &Committee, s2: &Committee) -> usize {
    s1.difference(s2).count()
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Hash)]
pub struct Voter {
    approved: BTreeSet<CandidateId>,
}

impl Voter {
    pub fn approved(&self) -> &BTreeSet<CandidateId> {
        &self.approved
    }

    pub fn approves(&self, candidate: CandidateId) -> bool {
        self.approved.contains(&candidate)
    }

    pub fn num_approved(&self) -> usize {
        self.approved.len()
    }

    pub(crate) fn approve(&mut self, candidate: CandidateId) -> bool {
        self.approved.insert(candidate)
    }

    pub(crate) fn disapprove(&mut self, candidate: CandidateId) -> bool {
        self.approved.remove(&candidate)
    }
}

/// An approval profile: an ordered sequence of voters over a fixed candidate universe.
///
/// Profiles are mutated in place by perturbations (see [`crate::perturbation`]) and must
/// always be restored afterwards, so the approval sets are only reachable mutably from
/// inside the crate.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Profile {
    num_candidates: u32,
    voters: Vec<Voter>,
}

impl Profile {
    pub fn new(num_candidates: u32) -> Profile {
        Profile {
            num_candidates,
            voters: Vec::new(),
        }
    }

    /// Appends a voter approving exactly the given candidates.
    pub fn add_voter<I>(&mut self, approved: I) -> ResilienceResult<()>
    where
        I: IntoIterator<Item = CandidateId>,
    {
        let mut voter = Voter::default();
        for c in approved {
            ensure!(
                c.0 < self.num_candidates,
                InvalidParameterSnafu {
                    detail: format!(
                        "candidate {} is outside of the universe of {} candidates",
                        c, self.num_candidates
                    ),
                }
            );
            voter.approve(c);
        }
        self.voters.push(voter);
        Ok(())
    }

    pub fn num_candidates(&self) -> usize {
        self.num_candidates as usize
    }

    pub fn candidates(&self) -> impl Iterator<Item = CandidateId> {
        (0..self.num_candidates).map(CandidateId)
    }

    pub fn voters(&self) -> &[Voter] {
        &self.voters
    }

    pub fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }

    /// Total number of (voter, approved candidate) pairs.
    pub fn num_approvals(&self) -> usize {
        self.voters.iter().map(|v| v.num_approved()).sum()
    }

    /// The number of voters approving each candidate.
    #[cfg(test)]
    pub(crate) fn approval_scores(&self) -> Vec<usize> {
        let mut scores = vec![0; self.num_candidates()];
        for v in self.voters.iter() {
            for c in v.approved.iter() {
                scores[c.index()] += 1;
            }
        }
        scores
    }

    pub(crate) fn voters_mut(&mut self) -> &mut [Voter] {
        &mut self.voters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committee(ids: &[u32]) -> Committee {
        ids.iter().map(|i| CandidateId(*i)).collect()
    }

    #[test]
    fn distance_counts_only_the_first_argument() {
        let a = committee(&[1, 2, 3]);
        let b = committee(&[2, 3, 4]);
        assert_eq!(committee_distance(&a, &b), 1);
        assert_eq!(committee_distance(&b, &a), 1);
    }

    #[test]
    fn distance_is_not_symmetric() {
        let a = committee(&[1, 2]);
        let b = committee(&[1, 2, 3]);
        assert_eq!(committee_distance(&a, &b), 0);
        assert_eq!(committee_distance(&b, &a), 1);
    }

    #[test]
    fn rejects_out_of_universe_candidates() {
        let mut profile = Profile::new(3);
        assert!(profile.add_voter([CandidateId(0), CandidateId(2)]).is_ok());
        assert!(profile.add_voter([CandidateId(3)]).is_err());
        assert_eq!(profile.len(), 1);
        assert_eq!(profile.num_approvals(), 2);
        assert_eq!(profile.approval_scores(), vec![1, 0, 1]);
    }
}
