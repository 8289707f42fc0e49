//! Sequential Thiele methods with selection-order tracking.
//!
//! The oracle is assembled from two strategies chosen at construction time: a
//! [`MarginalScorer`] (the hot path, called once per greedy step) and a [`ResoluteSolver`]
//! that runs the greedy selection and records the order in which candidates were added.

use std::collections::{BTreeSet, HashSet};

use log::debug;
use snafu::ensure;

use crate::config::*;
use crate::profile::{CandidateId, Committee, Profile};

/// Exact score, in units of `1 / ThieleWeights::scale()`.
pub type Score = u128;

fn gcd(a: Score, b: Score) -> Score {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Marginal contribution of a voter, indexed by how many of their approved candidates are
/// already in the committee.
///
/// PAV weights are 1/(x+1); they are scaled by lcm(1..=k) so that all scores are integers
/// and ties are detected exactly.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ThieleWeights {
    rule: Rule,
    scale: Score,
    weights: Vec<Score>,
}

impl ThieleWeights {
    pub fn new(rule: Rule, committee_size: usize) -> ResilienceResult<ThieleWeights> {
        let weights = match rule {
            Rule::SeqCc => (0..committee_size)
                .map(|x| if x == 0 { 1 } else { 0 })
                .collect::<Vec<Score>>(),
            Rule::SeqPav => {
                let mut scale: Score = 1;
                for x in 1..=committee_size as Score {
                    let next = (scale / gcd(scale, x)).checked_mul(x);
                    scale = match next {
                        Some(s) => s,
                        None => {
                            return InvalidParameterSnafu {
                                detail: format!(
                                    "committee size {} is too large for exact PAV scores",
                                    committee_size
                                ),
                            }
                            .fail()
                        }
                    };
                }
                (0..committee_size as Score).map(|x| scale / (x + 1)).collect()
            }
        };
        let scale = weights.first().copied().unwrap_or(1);
        Ok(ThieleWeights {
            rule,
            scale,
            weights,
        })
    }

    /// The weights for a profile of `num_voters` voters. A candidate's score is at most
    /// `scale * num_voters`, and that bound must fit in a [`Score`].
    pub fn for_profile(
        rule: Rule,
        committee_size: usize,
        num_voters: usize,
    ) -> ResilienceResult<ThieleWeights> {
        let weights = ThieleWeights::new(rule, committee_size)?;
        ensure!(
            weights.scale.checked_mul(num_voters as Score).is_some(),
            InvalidParameterSnafu {
                detail: format!(
                    "committee size {} with {} voters is too large for exact {} scores",
                    committee_size, num_voters, rule
                ),
            }
        );
        Ok(weights)
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }

    pub fn scale(&self) -> Score {
        self.scale
    }

    pub fn weight(&self, already_approved: usize) -> Score {
        self.weights.get(already_approved).copied().unwrap_or(0)
    }

    pub fn to_f64(&self, score: Score) -> f64 {
        score as f64 / self.scale as f64
    }
}

/// Computes the marginal score of adding each candidate to a partial committee.
pub trait MarginalScorer: Send + Sync {
    /// One entry per candidate of the profile; `None` for the members of `committee`.
    fn marginal_scores_add(
        &self,
        weights: &ThieleWeights,
        profile: &Profile,
        committee: &[CandidateId],
    ) -> Vec<Option<Score>>;
}

/// Candidate by candidate: sums, over the voters approving the candidate, the weight given
/// by the size of the voter's intersection with the committee.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceScorer;

impl MarginalScorer for ReferenceScorer {
    fn marginal_scores_add(
        &self,
        weights: &ThieleWeights,
        profile: &Profile,
        committee: &[CandidateId],
    ) -> Vec<Option<Score>> {
        profile
            .candidates()
            .map(|cand| {
                if committee.contains(&cand) {
                    return None;
                }
                let total = profile
                    .voters()
                    .iter()
                    .filter(|v| v.approves(cand))
                    .map(|v| {
                        let already = committee.iter().filter(|c| v.approves(**c)).count();
                        weights.weight(already)
                    })
                    .sum();
                Some(total)
            })
            .collect()
    }
}

/// Voter by voter: the weight of a voter is computed once per call and credited to all of
/// their approved candidates outside of the committee.
#[derive(Debug, Clone, Copy, Default)]
pub struct FastScorer;

impl MarginalScorer for FastScorer {
    fn marginal_scores_add(
        &self,
        weights: &ThieleWeights,
        profile: &Profile,
        committee: &[CandidateId],
    ) -> Vec<Option<Score>> {
        let mut in_committee = vec![false; profile.num_candidates()];
        for c in committee.iter() {
            in_committee[c.index()] = true;
        }
        let mut totals: Vec<Score> = vec![0; profile.num_candidates()];
        for v in profile.voters() {
            let already = v
                .approved()
                .iter()
                .filter(|c| in_committee[c.index()])
                .count();
            let w = weights.weight(already);
            if w == 0 {
                continue;
            }
            for c in v.approved().iter() {
                totals[c.index()] += w;
            }
        }
        totals
            .into_iter()
            .zip(in_committee)
            .map(|(total, member)| if member { None } else { Some(total) })
            .collect()
    }
}

/// One greedy step of a resolute sequential rule.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SelectionStep {
    pub candidate: CandidateId,
    /// Marginal score gained by adding the candidate.
    pub delta: Score,
    /// How many candidates shared the maximal marginal score, the chosen one included.
    pub num_tied: usize,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ResoluteOutcome {
    pub committee: Committee,
    /// The greedy steps, in the order the candidates were added.
    pub order: Vec<SelectionStep>,
}

impl ResoluteOutcome {
    pub fn order_candidates(&self) -> Vec<CandidateId> {
        self.order.iter().map(|s| s.candidate).collect()
    }
}

/// Runs the sequential selection and records the order of the choices.
pub trait ResoluteSolver: Send + Sync {
    fn solve(
        &self,
        scorer: &dyn MarginalScorer,
        weights: &ThieleWeights,
        profile: &Profile,
        committee_size: usize,
    ) -> ResoluteOutcome;
}

/// Picks, at each step, the first candidate reaching the maximal marginal score when the
/// candidates are scanned by increasing index.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySolver;

impl ResoluteSolver for GreedySolver {
    fn solve(
        &self,
        scorer: &dyn MarginalScorer,
        weights: &ThieleWeights,
        profile: &Profile,
        committee_size: usize,
    ) -> ResoluteOutcome {
        let mut committee: Vec<CandidateId> = Vec::with_capacity(committee_size);
        let mut order: Vec<SelectionStep> = Vec::with_capacity(committee_size);
        for _ in 0..committee_size {
            let scores = scorer.marginal_scores_add(weights, profile, &committee);
            let mut best: Option<(usize, Score)> = None;
            for (idx, s) in scores.iter().enumerate() {
                match (s, best) {
                    (Some(s), Some((_, b))) if *s > b => best = Some((idx, *s)),
                    (Some(s), None) => best = Some((idx, *s)),
                    _ => {}
                }
            }
            let (idx, delta) = match best {
                Some(x) => x,
                None => break,
            };
            let num_tied = scores.iter().filter(|s| **s == Some(delta)).count();
            let candidate = CandidateId(idx as u32);
            committee.push(candidate);
            order.push(SelectionStep {
                candidate,
                delta,
                num_tied,
            });
        }
        ResoluteOutcome {
            committee: committee.into_iter().collect(),
            order,
        }
    }
}

/// Computes committees of the sequential Thiele methods.
pub struct RuleOracle<S = FastScorer, R = GreedySolver> {
    scorer: S,
    solver: R,
}

impl RuleOracle {
    /// The oracle used by the experiments.
    pub fn standard() -> RuleOracle {
        RuleOracle::new(FastScorer, GreedySolver)
    }
}

impl<S: MarginalScorer, R: ResoluteSolver> RuleOracle<S, R> {
    pub fn new(scorer: S, solver: R) -> RuleOracle<S, R> {
        RuleOracle { scorer, solver }
    }

    fn check(&self, profile: &Profile, committee_size: usize) -> ResilienceResult<()> {
        ensure!(
            !profile.is_empty(),
            InvalidParameterSnafu {
                detail: "the profile has no voters".to_string(),
            }
        );
        ensure!(
            committee_size >= 1 && committee_size <= profile.num_candidates(),
            InvalidParameterSnafu {
                detail: format!(
                    "committee size {} must be between 1 and the number of candidates {}",
                    committee_size,
                    profile.num_candidates()
                ),
            }
        );
        Ok(())
    }

    /// The single winning committee, with ties broken in favour of lower candidate indices
    /// at each step, and the order of selection.
    pub fn resolute(
        &self,
        rule: Rule,
        profile: &Profile,
        committee_size: usize,
    ) -> ResilienceResult<ResoluteOutcome> {
        self.check(profile, committee_size)?;
        let weights = ThieleWeights::for_profile(rule, committee_size, profile.len())?;
        let outcome = self
            .solver
            .solve(&self.scorer, &weights, profile, committee_size);
        debug!(
            "resolute: {} committee {:?} order {:?} gains {:?}",
            rule,
            outcome.committee,
            outcome.order_candidates(),
            outcome
                .order
                .iter()
                .map(|s| weights.to_f64(s.delta))
                .collect::<Vec<f64>>()
        );
        Ok(outcome)
    }

    /// All the committees reachable under some tie-breaking order ("parallel universes"),
    /// sorted, and capped to `max_committees` if given.
    ///
    /// The exploration follows lower candidate indices first, so the resolute committee is
    /// always the first one found and is always part of the result.
    pub fn irresolute(
        &self,
        rule: Rule,
        profile: &Profile,
        committee_size: usize,
        max_committees: Option<usize>,
    ) -> ResilienceResult<Vec<Committee>> {
        self.check(profile, committee_size)?;
        let weights = ThieleWeights::for_profile(rule, committee_size, profile.len())?;

        let mut partial_committees: Vec<Vec<CandidateId>> = vec![Vec::new()];
        let mut expanded: HashSet<Committee> = HashSet::new();
        let mut winning: BTreeSet<Committee> = BTreeSet::new();

        while let Some(partial) = partial_committees.pop() {
            let scores = self
                .scorer
                .marginal_scores_add(&weights, profile, &partial);
            let best = match scores.iter().flatten().max() {
                Some(b) => *b,
                None => continue,
            };
            let mut children: Vec<Vec<CandidateId>> = Vec::new();
            for (idx, s) in scores.iter().enumerate() {
                if *s != Some(best) {
                    continue;
                }
                let mut child = partial.clone();
                child.push(CandidateId(idx as u32));
                if child.len() == committee_size {
                    winning.insert(child.into_iter().collect());
                    if max_committees.map(|m| winning.len() >= m).unwrap_or(false) {
                        return Ok(winning.into_iter().collect());
                    }
                } else if expanded.insert(child.iter().copied().collect()) {
                    children.push(child);
                }
            }
            // Reversed so that the lowest candidate is explored first.
            partial_committees.extend(children.into_iter().rev());
        }
        Ok(winning.into_iter().collect())
    }
}
