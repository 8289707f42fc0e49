// ********* Result accumulation ***********

use std::collections::BTreeMap;

use snafu::ensure;

use crate::config::*;
use crate::perturbation::Operation;
use crate::runner::{ElectionRecord, RuleRecord, TieStats};

/// The measurements of one rule, for every election merged so far.
///
/// Every series is indexed by percentage tier, then by election (in trial order).
#[derive(PartialEq, Debug, Clone)]
pub struct RuleSeries {
    distances: BTreeMap<Operation, Vec<Vec<Vec<usize>>>>,
    ties: Vec<Vec<Vec<TieStats>>>,
    replacements: Vec<Vec<Vec<u32>>>,
}

impl RuleSeries {
    fn new(num_tiers: usize) -> RuleSeries {
        RuleSeries {
            distances: Operation::ALL
                .iter()
                .map(|op| (*op, vec![Vec::new(); num_tiers]))
                .collect(),
            ties: vec![Vec::new(); num_tiers],
            replacements: vec![Vec::new(); num_tiers],
        }
    }

    fn insert(&mut self, pos: usize, record: &RuleRecord) {
        for (op, series) in self.distances.iter_mut() {
            let values = record.distances(*op);
            for (tier, elections) in series.iter_mut().enumerate() {
                elections.insert(pos, values[tier].clone());
            }
        }
        for (tier, elections) in self.ties.iter_mut().enumerate() {
            elections.insert(pos, record.ties[tier].clone());
        }
        for (tier, elections) in self.replacements.iter_mut().enumerate() {
            elections.insert(pos, record.replacements[tier].clone());
        }
    }

    fn election(&self, idx: usize) -> RuleRecord {
        RuleRecord {
            distances: self
                .distances
                .iter()
                .map(|(op, series)| (*op, series.iter().map(|e| e[idx].clone()).collect()))
                .collect(),
            ties: self.ties.iter().map(|e| e[idx].clone()).collect(),
            replacements: self.replacements.iter().map(|e| e[idx].clone()).collect(),
        }
    }

    /// EXP1: one list of per-iteration distances per election.
    pub fn distances(&self, operation: Operation, tier: usize) -> &[Vec<usize>] {
        self.distances
            .get(&operation)
            .and_then(|s| s.get(tier))
            .map(|e| e.as_slice())
            .unwrap_or(&[])
    }

    /// EXP2: one list of per-iteration tie statistics per election.
    pub fn ties(&self, tier: usize) -> &[Vec<TieStats>] {
        self.ties.get(tier).map(|e| e.as_slice()).unwrap_or(&[])
    }

    /// EXP3: one replacement histogram per election.
    pub fn replacements(&self, tier: usize) -> &[Vec<u32>] {
        self.replacements
            .get(tier)
            .map(|e| e.as_slice())
            .unwrap_or(&[])
    }
}

fn mean<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), x| (s + x, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Collects the election records of one sampling configuration.
///
/// Elections are kept sorted by trial index, so the contents do not depend on the order in
/// which the records are merged.
#[derive(PartialEq, Debug, Clone)]
pub struct ResultAccumulator {
    percentages: PercentageGrid,
    committee_size: usize,
    num_iterations: usize,
    trials: Vec<usize>,
    approval_counts: Vec<usize>,
    rules: BTreeMap<Rule, RuleSeries>,
}

impl ResultAccumulator {
    pub fn new(config: &ExperimentConfig) -> ResultAccumulator {
        ResultAccumulator {
            percentages: config.percentages.clone(),
            committee_size: config.committee_size,
            num_iterations: config.num_iterations,
            trials: Vec::new(),
            approval_counts: Vec::new(),
            rules: config
                .rules
                .iter()
                .map(|r| (*r, RuleSeries::new(config.percentages.len())))
                .collect(),
        }
    }

    fn check(&self, record: &ElectionRecord) -> ResilienceResult<()> {
        let num_tiers = self.percentages.len();
        ensure!(
            record.rules.keys().eq(self.rules.keys()),
            InvalidParameterSnafu {
                detail: format!(
                    "trial {}: the record has rules {:?}, expected {:?}",
                    record.trial,
                    record.rules.keys().collect::<Vec<_>>(),
                    self.rules.keys().collect::<Vec<_>>()
                ),
            }
        );
        for rr in record.rules.values() {
            let shapes_match = Operation::ALL
                .iter()
                .all(|op| rr.distances(*op).len() == num_tiers)
                && rr.ties.len() == num_tiers
                && rr.replacements.len() == num_tiers
                && rr.replacements.iter().all(|h| h.len() == self.committee_size)
                && Operation::ALL.iter().all(|op| {
                    rr.distances(*op)
                        .iter()
                        .all(|d| d.len() == self.num_iterations)
                })
                && rr.ties.iter().all(|t| t.len() == self.num_iterations);
            ensure!(
                shapes_match,
                InvalidParameterSnafu {
                    detail: format!(
                        "trial {}: the record does not have {} tiers of {} iterations \
                         with committee size {}",
                        record.trial, num_tiers, self.num_iterations, self.committee_size
                    ),
                }
            );
        }
        Ok(())
    }

    /// Adds one election. Fails if the trial was already merged or if the record was produced
    /// with another configuration.
    pub fn merge(&mut self, record: &ElectionRecord) -> ResilienceResult<()> {
        self.check(record)?;
        let pos = self.trials.partition_point(|t| *t < record.trial);
        ensure!(
            self.trials.get(pos) != Some(&record.trial),
            InvalidParameterSnafu {
                detail: format!("trial {} was already merged", record.trial),
            }
        );
        self.trials.insert(pos, record.trial);
        self.approval_counts.insert(pos, record.approval_count);
        for (rule, series) in self.rules.iter_mut() {
            if let Some(rr) = record.rules.get(rule) {
                series.insert(pos, rr);
            }
        }
        Ok(())
    }

    /// Adds all the elections of another accumulator.
    pub fn merge_accumulator(&mut self, other: &ResultAccumulator) -> ResilienceResult<()> {
        for record in other.records() {
            self.merge(&record)?;
        }
        Ok(())
    }

    /// The merged elections, in trial order.
    pub fn records(&self) -> Vec<ElectionRecord> {
        (0..self.trials.len())
            .map(|idx| ElectionRecord {
                trial: self.trials[idx],
                approval_count: self.approval_counts[idx],
                rules: self
                    .rules
                    .iter()
                    .map(|(rule, series)| (*rule, series.election(idx)))
                    .collect(),
            })
            .collect()
    }

    pub fn percentages(&self) -> &PercentageGrid {
        &self.percentages
    }

    pub fn num_elections(&self) -> usize {
        self.trials.len()
    }

    pub fn trials(&self) -> &[usize] {
        &self.trials
    }

    /// The size of the deletable space of every election.
    pub fn approval_counts(&self) -> &[usize] {
        &self.approval_counts
    }

    pub fn rules(&self) -> impl Iterator<Item = Rule> + '_ {
        self.rules.keys().copied()
    }

    pub fn rule_series(&self, rule: Rule) -> Option<&RuleSeries> {
        self.rules.get(&rule)
    }

    // ********* Summary statistics ***********

    /// The mean distance to the baseline over all elections and iterations.
    pub fn mean_distance(&self, rule: Rule, operation: Operation, tier: usize) -> Option<f64> {
        let series = self.rules.get(&rule)?;
        mean(
            series
                .distances(operation, tier)
                .iter()
                .flatten()
                .map(|d| *d as f64),
        )
    }

    pub fn mean_tied(&self, rule: Rule, tier: usize) -> Option<f64> {
        let series = self.rules.get(&rule)?;
        mean(series.ties(tier).iter().flatten().map(|t| t.tied as f64))
    }

    pub fn mean_excess(&self, rule: Rule, tier: usize) -> Option<f64> {
        let series = self.rules.get(&rule)?;
        mean(series.ties(tier).iter().flatten().map(|t| t.excess as f64))
    }

    /// For each position of the baseline selection order, the fraction of MIX perturbations
    /// that removed the candidate at that position.
    pub fn replacement_frequency(&self, rule: Rule, tier: usize) -> Option<Vec<f64>> {
        let series = self.rules.get(&rule)?;
        let histograms = series.replacements(tier);
        if histograms.is_empty() {
            return None;
        }
        let draws = (histograms.len() * self.num_iterations) as f64;
        let mut freq = vec![0.0; self.committee_size];
        for h in histograms.iter() {
            for (pos, count) in h.iter().enumerate() {
                freq[pos] += *count as f64 / draws;
            }
        }
        Some(freq)
    }
}
