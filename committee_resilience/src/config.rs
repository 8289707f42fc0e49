// ********* Errors ***********

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::{ensure, Snafu};

use crate::rules::ThieleWeights;

/// Errors that prevent an experiment from completing.
///
/// None of them is retried: a failing trial fails the whole batch of its configuration.
#[derive(Debug, Snafu, Clone, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum ResilienceError {
    /// An unrecognized preference model, distribution or rule, or an inconsistent setting.
    #[snafu(display("Invalid configuration: {detail}"))]
    InvalidConfiguration { detail: String },

    /// A perturbation asked for more (voter, candidate) pairs than the profile offers.
    #[snafu(display(
        "Cannot draw {requested} {space} pairs: only {available} are available"
    ))]
    InsufficientSampleSpace {
        space: String,
        requested: usize,
        available: usize,
    },

    #[snafu(display("Algorithm {algorithm:?} is not available for rule {rule}"))]
    UnknownAlgorithm { rule: String, algorithm: String },

    /// The inputs given to the rule oracle or to a perturbation are not usable.
    #[snafu(display("Invalid parameter: {detail}"))]
    InvalidParameter { detail: String },

    #[snafu(display("Worker pool failure: {detail}"))]
    WorkerPool { detail: String },
}

pub type ResilienceResult<T> = Result<T, ResilienceError>;

// ********* Committee rules **********

/// The sequential Thiele methods studied by the experiments.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Rule {
    /// Sequential Chamberlin-Courant: a voter counts once, as soon as one of their approved
    /// candidates is in the committee.
    #[serde(rename = "seqcc")]
    SeqCc,
    /// Sequential proportional approval voting: the x-th approved member is worth 1/x.
    #[serde(rename = "seqpav")]
    SeqPav,
}

impl Rule {
    pub const ALL: [Rule; 2] = [Rule::SeqCc, Rule::SeqPav];

    pub fn id(&self) -> &'static str {
        match self {
            Rule::SeqCc => "seqcc",
            Rule::SeqPav => "seqpav",
        }
    }

    /// Resolves an algorithm name for this rule.
    ///
    /// Sequential Thiele methods only have the standard greedy implementation, which is
    /// also what `fastest` resolves to.
    pub fn algorithm(&self, name: &str) -> ResilienceResult<Algorithm> {
        match name {
            "fastest" => Ok(Algorithm::Fastest),
            "standard" => Ok(Algorithm::Standard),
            x => UnknownAlgorithmSnafu {
                rule: self.id(),
                algorithm: x,
            }
            .fail(),
        }
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Rule {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seqcc" => Ok(Rule::SeqCc),
            "seqpav" => Ok(Rule::SeqPav),
            x => InvalidConfigurationSnafu {
                detail: format!("unknown rule id {:?}", x),
            }
            .fail(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Algorithm {
    Fastest,
    Standard,
}

impl Algorithm {
    /// The concrete algorithm that will run.
    pub fn resolve(self) -> Algorithm {
        match self {
            Algorithm::Fastest => Algorithm::Standard,
            x => x,
        }
    }
}

// ********* Preference models **********

/// Distributions used to place voters and candidates in the spatial models.
///
/// All of them have width 1 and are centred on the origin.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum PointDistribution {
    /// Uniform on [-0.5, 0.5].
    #[serde(rename = "1d_interval")]
    Interval,
    /// Uniform on [-0.5, 0.5]².
    #[serde(rename = "2d_square")]
    Square,
    /// Uniform on the disc of radius 0.5.
    #[serde(rename = "2d_disc")]
    Disc,
}

impl PointDistribution {
    pub fn dimension(&self) -> usize {
        match self {
            PointDistribution::Interval => 1,
            PointDistribution::Square | PointDistribution::Disc => 2,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            PointDistribution::Interval => "1d_interval",
            PointDistribution::Square => "2d_square",
            PointDistribution::Disc => "2d_disc",
        }
    }
}

impl FromStr for PointDistribution {
    type Err = ResilienceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1d_interval" => Ok(PointDistribution::Interval),
            "2d_square" => Ok(PointDistribution::Square),
            "2d_disc" => Ok(PointDistribution::Disc),
            x => InvalidConfigurationSnafu {
                detail: format!("unknown point distribution {:?}", x),
            }
            .fail(),
        }
    }
}

/// Parameters of the voter-candidate-range models.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct SpatialParameters {
    pub distribution: PointDistribution,
    /// A voter approves every candidate within this distance.
    pub radius: f64,
    /// If set, the sampled approvals are redrawn afterwards with this probability per pair.
    pub resample_phi: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ResamplingParameters {
    pub rho: f64,
    pub phi: f64,
}

/// Identifies how the base profile of a trial is sampled.
///
/// Only the fields of the selected model exist, so a radius can never be attached to the
/// resampling model or a rho to a spatial one.
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum SamplingParameters {
    OneD(SpatialParameters),
    TwoD(SpatialParameters),
    Resampling(ResamplingParameters),
}

fn check_probability(name: &str, p: f64) -> ResilienceResult<()> {
    ensure!(
        (0.0..=1.0).contains(&p),
        InvalidConfigurationSnafu {
            detail: format!("{} must be a probability, got {}", name, p),
        }
    );
    Ok(())
}

impl SamplingParameters {
    pub fn one_d(
        distribution: PointDistribution,
        radius: f64,
        resample_phi: Option<f64>,
    ) -> ResilienceResult<SamplingParameters> {
        let sp = SamplingParameters::spatial(1, distribution, radius, resample_phi)?;
        Ok(SamplingParameters::OneD(sp))
    }

    pub fn two_d(
        distribution: PointDistribution,
        radius: f64,
        resample_phi: Option<f64>,
    ) -> ResilienceResult<SamplingParameters> {
        let sp = SamplingParameters::spatial(2, distribution, radius, resample_phi)?;
        Ok(SamplingParameters::TwoD(sp))
    }

    pub fn resampling(rho: f64, phi: f64) -> ResilienceResult<SamplingParameters> {
        check_probability("rho", rho)?;
        check_probability("phi", phi)?;
        Ok(SamplingParameters::Resampling(ResamplingParameters { rho, phi }))
    }

    fn spatial(
        dimension: usize,
        distribution: PointDistribution,
        radius: f64,
        resample_phi: Option<f64>,
    ) -> ResilienceResult<SpatialParameters> {
        ensure!(
            distribution.dimension() == dimension,
            InvalidConfigurationSnafu {
                detail: format!(
                    "distribution {} cannot be used for a {}D model",
                    distribution.id(),
                    dimension
                ),
            }
        );
        ensure!(
            radius.is_finite() && radius >= 0.0,
            InvalidConfigurationSnafu {
                detail: format!("radius must be non-negative, got {}", radius),
            }
        );
        if let Some(phi) = resample_phi {
            check_probability("phi", phi)?;
        }
        Ok(SpatialParameters {
            distribution,
            radius,
            resample_phi,
        })
    }

    /// Builds the parameters from the flat tuple `(id, dist_id, euclid_resample, radius, rho, phi)`
    /// used by study configuration files. Fields that do not belong to the model are ignored.
    pub fn from_raw(
        id: &str,
        dist_id: &str,
        euclid_resample: bool,
        radius: f64,
        rho: f64,
        phi: f64,
    ) -> ResilienceResult<SamplingParameters> {
        let resample_phi = if euclid_resample { Some(phi) } else { None };
        match id {
            "1D" => SamplingParameters::one_d(dist_id.parse()?, radius, resample_phi),
            "2D" => SamplingParameters::two_d(dist_id.parse()?, radius, resample_phi),
            "Res" => SamplingParameters::resampling(rho, phi),
            x => InvalidConfigurationSnafu {
                detail: format!("unknown preference model id {:?}", x),
            }
            .fail(),
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            SamplingParameters::OneD(_) => "1D",
            SamplingParameters::TwoD(_) => "2D",
            SamplingParameters::Resampling(_) => "Res",
        }
    }

    /// The name identifying this configuration, e.g. `1D_0.025`, `2D+res_0.134` or `Res_0.05_0.75`.
    pub fn file_stem(&self) -> String {
        match self {
            SamplingParameters::OneD(sp) | SamplingParameters::TwoD(sp) => {
                let suffix = if sp.resample_phi.is_some() { "+res" } else { "" };
                format!("{}{}_{:?}", self.id(), suffix, sp.radius)
            }
            SamplingParameters::Resampling(rp) => {
                format!("{}_{:?}_{:?}", self.id(), rp.rho, rp.phi)
            }
        }
    }

    /// The fifteen configurations of the study.
    ///
    /// The radii are chosen so that voters approve about 5%, 10% and 15% of the candidates.
    pub fn standard_grid() -> Vec<SamplingParameters> {
        const RADII_1D: [f64; 3] = [0.025, 0.051, 0.078];
        const RADII_2D: [f64; 3] = [0.134, 0.195, 0.244];
        const RHOS: [f64; 3] = [0.05, 0.1, 0.15];
        const RESAMPLE_PHI: f64 = 0.1;
        const RESAMPLING_PHI: f64 = 0.75;

        let one_d = |radius, resample_phi| {
            SamplingParameters::OneD(SpatialParameters {
                distribution: PointDistribution::Interval,
                radius,
                resample_phi,
            })
        };
        let two_d = |radius, resample_phi| {
            SamplingParameters::TwoD(SpatialParameters {
                distribution: PointDistribution::Square,
                radius,
                resample_phi,
            })
        };

        let mut grid: Vec<SamplingParameters> = Vec::new();
        grid.extend(RADII_1D.iter().map(|r| one_d(*r, None)));
        grid.extend(RADII_2D.iter().map(|r| two_d(*r, None)));
        grid.extend(RADII_1D.iter().map(|r| one_d(*r, Some(RESAMPLE_PHI))));
        grid.extend(RADII_2D.iter().map(|r| two_d(*r, Some(RESAMPLE_PHI))));
        grid.extend(RHOS.iter().map(|rho| {
            SamplingParameters::Resampling(ResamplingParameters {
                rho: *rho,
                phi: RESAMPLING_PHI,
            })
        }));
        grid
    }
}

// ********* Perturbation magnitudes **********

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

fn power_law_values(max_percentage: f64, power: f64, count: usize) -> Vec<f64> {
    let top = max_percentage.powf(1.0 / power);
    let steps = (count.max(2) - 1) as f64;
    (0..count)
        .map(|i| round3((top * i as f64 / steps).powf(power)))
        .collect()
}

/// The increasing perturbation percentages, expressed as fractions of the number of
/// approvals of the base profile.
#[derive(PartialEq, Debug, Clone)]
pub struct PercentageGrid {
    values: Vec<f64>,
}

impl PercentageGrid {
    /// `count` values `round3(x^power)` for `x` evenly spaced between 0 and
    /// `max_percentage^(1/power)`: dense close to 0 and sparse close to the maximum.
    pub fn power_law(
        max_percentage: f64,
        power: f64,
        count: usize,
    ) -> ResilienceResult<PercentageGrid> {
        ensure!(
            count >= 2,
            InvalidConfigurationSnafu {
                detail: format!("the percentage grid needs at least 2 values, got {}", count),
            }
        );
        ensure!(
            power.is_finite() && power > 0.0,
            InvalidConfigurationSnafu {
                detail: format!("the percentage power must be positive, got {}", power),
            }
        );
        PercentageGrid::from_values(power_law_values(max_percentage, power, count))
    }

    pub fn from_values(values: Vec<f64>) -> ResilienceResult<PercentageGrid> {
        ensure!(
            values.iter().all(|p| p.is_finite() && (0.0..=1.0).contains(p)),
            InvalidConfigurationSnafu {
                detail: format!("percentages must be between 0 and 1: {:?}", values),
            }
        );
        ensure!(
            values.windows(2).all(|w| w[0] < w[1]),
            InvalidConfigurationSnafu {
                detail: format!("percentages must be strictly increasing: {:?}", values),
            }
        );
        ensure!(
            values.last().map(|p| *p > 0.0).unwrap_or(false),
            InvalidConfigurationSnafu {
                detail: "the largest percentage must be positive".to_string(),
            }
        );
        Ok(PercentageGrid { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn max(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    /// The label of a tier as it appears in the result files (`0.0`, `0.013`, `0.1`).
    pub fn label(&self, tier: usize) -> String {
        format!("{:?}", self.values[tier])
    }
}

impl Default for PercentageGrid {
    fn default() -> Self {
        PercentageGrid {
            values: power_law_values(0.1, 2.0, 15),
        }
    }
}

// ********* Experiment configuration **********

/// Everything a trial needs to know besides its sampling parameters.
///
/// The value is immutable once built and is shared by all the workers.
#[derive(PartialEq, Debug, Clone)]
pub struct ExperimentConfig {
    pub num_voters: usize,
    pub num_candidates: usize,
    pub committee_size: usize,
    /// Trials per sampling configuration.
    pub num_elections: usize,
    /// Perturbation draws per trial.
    pub num_iterations: usize,
    /// Cap on the number of tied committees enumerated for EXP2.
    pub max_num_committees: usize,
    pub percentages: PercentageGrid,
    pub rules: Vec<Rule>,
    pub algorithm: Algorithm,
    /// Master seed. Without it every trial draws its generator from the OS.
    pub seed: Option<u64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            num_voters: 1000,
            num_candidates: 100,
            committee_size: 10,
            num_elections: 100,
            num_iterations: 100,
            max_num_committees: 100,
            percentages: PercentageGrid::default(),
            rules: Rule::ALL.to_vec(),
            algorithm: Algorithm::Fastest,
            seed: None,
        }
    }
}

fn invalid(detail: String) -> ResilienceResult<()> {
    InvalidConfigurationSnafu { detail }.fail()
}

impl ExperimentConfig {
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.num_voters == 0 || self.num_elections == 0 || self.num_iterations == 0 {
            return invalid(format!(
                "voters ({}), elections ({}) and iterations ({}) must all be positive",
                self.num_voters, self.num_elections, self.num_iterations
            ));
        }
        if self.num_candidates > u32::MAX as usize {
            return invalid(format!("too many candidates: {}", self.num_candidates));
        }
        if self.committee_size == 0 || self.committee_size > self.num_candidates {
            return invalid(format!(
                "committee size {} must be between 1 and the number of candidates {}",
                self.committee_size, self.num_candidates
            ));
        }
        if self.max_num_committees == 0 {
            return invalid("max_num_committees must be positive".to_string());
        }
        if self.rules.is_empty() {
            return invalid("no rule selected".to_string());
        }
        let mut rules = self.rules.clone();
        rules.sort();
        rules.dedup();
        if rules.len() != self.rules.len() {
            return invalid(format!("duplicate rules in {:?}", self.rules));
        }
        for rule in rules {
            let weights = ThieleWeights::for_profile(rule, self.committee_size, self.num_voters);
            if let Err(e) = weights {
                return invalid(e.to_string());
            }
        }
        PercentageGrid::from_values(self.percentages.values.clone())?;
        Ok(())
    }
}
