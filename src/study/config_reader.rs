use crate::study::*;
use committee_resilience::*;
use snafu::prelude::*;

use serde::{Deserialize, Serialize};
use std::fs;

/// One sampling configuration, in the flat form `(id, distId, euclidResample, radius, rho, phi)`.
///
/// Fields that do not belong to the model of `id` are ignored.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RawParameters {
    pub id: String,
    #[serde(rename = "distId")]
    pub dist_id: Option<String>,
    #[serde(rename = "euclidResample")]
    pub euclid_resample: Option<bool>,
    pub radius: Option<f64>,
    pub rho: Option<f64>,
    pub phi: Option<f64>,
}

impl RawParameters {
    pub fn sampling_parameters(&self) -> StudyResult<SamplingParameters> {
        let dist_id = match (&self.dist_id, self.id.as_str()) {
            (Some(d), _) => d.as_str(),
            (None, "1D") => "1d_interval",
            (None, "2D") => "2d_square",
            (None, _) => "",
        };
        SamplingParameters::from_raw(
            &self.id,
            dist_id,
            self.euclid_resample.unwrap_or(false),
            self.radius.unwrap_or(-1.0),
            self.rho.unwrap_or(-1.0),
            self.phi.unwrap_or(-1.0),
        )
        .context(ConfigurationSnafu {})
    }
}

/// The content of a study configuration file. Every field is optional.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyConfig {
    #[serde(rename = "numVoters")]
    pub num_voters: Option<usize>,
    #[serde(rename = "numCandidates")]
    pub num_candidates: Option<usize>,
    #[serde(rename = "committeeSize")]
    pub committee_size: Option<usize>,
    #[serde(rename = "numElections")]
    pub num_elections: Option<usize>,
    #[serde(rename = "numIterations")]
    pub num_iterations: Option<usize>,
    #[serde(rename = "maxNumCommittees")]
    pub max_num_committees: Option<usize>,
    #[serde(rename = "percentagePower")]
    pub percentage_power: Option<f64>,
    #[serde(rename = "maxPercentage")]
    pub max_percentage: Option<f64>,
    #[serde(rename = "numPercentages")]
    pub num_percentages: Option<usize>,
    pub rules: Option<Vec<String>>,
    pub algorithm: Option<String>,
    pub seed: Option<u64>,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    pub multiprocessing: Option<bool>,
    #[serde(rename = "writeData")]
    pub write_data: Option<bool>,
    pub threads: Option<usize>,
    pub parameters: Option<Vec<RawParameters>>,
}

impl StudyConfig {
    /// The experiment settings, with the defaults of the standard study for the missing fields.
    pub fn experiment_config(&self) -> StudyResult<ExperimentConfig> {
        let default = ExperimentConfig::default();

        let percentages = if self.percentage_power.is_some()
            || self.max_percentage.is_some()
            || self.num_percentages.is_some()
        {
            PercentageGrid::power_law(
                self.max_percentage.unwrap_or(0.1),
                self.percentage_power.unwrap_or(2.0),
                self.num_percentages.unwrap_or(15),
            )
            .context(ConfigurationSnafu {})?
        } else {
            default.percentages.clone()
        };

        let rules: Vec<Rule> = match &self.rules {
            Some(ids) => ids
                .iter()
                .map(|id| id.parse::<Rule>())
                .collect::<Result<Vec<Rule>, ResilienceError>>()
                .context(ConfigurationSnafu {})?,
            None => default.rules.clone(),
        };

        let algorithm = match &self.algorithm {
            Some(name) => {
                let mut algorithm = default.algorithm;
                for rule in rules.iter() {
                    algorithm = rule.algorithm(name).context(ConfigurationSnafu {})?;
                }
                algorithm
            }
            None => default.algorithm,
        };

        Ok(ExperimentConfig {
            num_voters: self.num_voters.unwrap_or(default.num_voters),
            num_candidates: self.num_candidates.unwrap_or(default.num_candidates),
            committee_size: self.committee_size.unwrap_or(default.committee_size),
            num_elections: self.num_elections.unwrap_or(default.num_elections),
            num_iterations: self.num_iterations.unwrap_or(default.num_iterations),
            max_num_committees: self.max_num_committees.unwrap_or(default.max_num_committees),
            percentages,
            rules,
            algorithm,
            seed: self.seed,
        })
    }

    /// The configurations to run: the given ones, or the fifteen configurations of the
    /// standard study.
    pub fn sampling_parameters(&self) -> StudyResult<Vec<SamplingParameters>> {
        match &self.parameters {
            Some(raw) => raw.iter().map(|p| p.sampling_parameters()).collect(),
            None => Ok(SamplingParameters::standard_grid()),
        }
    }
}

pub fn read_study_config(path: &str) -> StudyResult<StudyConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let config: StudyConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(config)
}
