use log::{debug, info, warn};

use committee_resilience::*;
use snafu::{prelude::*, Snafu};

use std::path::PathBuf;
use std::time::Instant;

use crate::args::Args;
use crate::study::config_reader::*;
use crate::study::io_json::*;

pub mod config_reader;
pub mod io_json;

#[derive(Debug, Snafu)]
pub enum StudyError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Invalid study configuration: {source}"))]
    Configuration { source: ResilienceError },
    #[snafu(display("Configuration {name} failed: {source}"))]
    Experiment {
        source: ResilienceError,
        name: String,
    },
    #[snafu(display("{path} differs from the reference"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type StudyResult<T> = Result<T, StudyError>;

/// Everything needed to run a study, after merging the configuration file and the command line.
#[derive(PartialEq, Debug, Clone)]
pub struct StudySettings {
    pub config: ExperimentConfig,
    pub parameters: Vec<SamplingParameters>,
    pub output_directory: PathBuf,
    pub write_data: bool,
    /// `None` for a sequential run.
    pub workers: Option<usize>,
    pub reference: Option<PathBuf>,
}

pub fn settings_from_args(args: &Args) -> StudyResult<StudySettings> {
    let study_config = match &args.config {
        Some(p) => read_study_config(p)?,
        None => StudyConfig::default(),
    };
    debug!("settings_from_args: study config: {:?}", study_config);

    let mut config = study_config.experiment_config()?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate().context(ConfigurationSnafu {})?;

    let mut parameters = study_config.sampling_parameters()?;
    if !args.only.is_empty() {
        parameters.retain(|p| args.only.contains(&p.file_stem()));
        if parameters.is_empty() {
            whatever!("No configuration matches {:?}", args.only)
        }
    }

    let multiprocessing = !args.sequential && study_config.multiprocessing.unwrap_or(true);
    let workers = if multiprocessing {
        Some(args.threads.or(study_config.threads).unwrap_or(0))
    } else {
        None
    };

    Ok(StudySettings {
        config,
        parameters,
        output_directory: PathBuf::from(
            args.out
                .clone()
                .or_else(|| study_config.output_directory.clone())
                .unwrap_or_else(|| "jsons".to_string()),
        ),
        write_data: !args.no_write && study_config.write_data.unwrap_or(true),
        workers,
        reference: args.reference.clone().map(PathBuf::from),
    })
}

fn format_duration(seconds: f64) -> String {
    let s = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", s / 3600, (s / 60) % 60, s % 60)
}

fn log_summary(stem: &str, acc: &ResultAccumulator) {
    let top = acc.percentages().len() - 1;
    let label = acc.percentages().label(top);
    for rule in acc.rules() {
        let mean = |op| acc.mean_distance(rule, op, top).unwrap_or(f64::NAN);
        info!(
            "{}: {} at {}: mean distance ADD {:.3} DEL {:.3} MIX {:.3}, tied committees {:.2}, excess {:.3}",
            stem,
            rule,
            label,
            mean(Operation::Add),
            mean(Operation::Del),
            mean(Operation::Mix),
            acc.mean_tied(rule, top).unwrap_or(f64::NAN),
            acc.mean_excess(rule, top).unwrap_or(f64::NAN)
        );
        debug!(
            "{}: {}: replacement frequency by position: {:?}",
            stem,
            rule,
            acc.replacement_frequency(rule, top)
        );
    }
}

/// Runs every configuration of the study, writes the result files and compares them to the
/// reference files if requested. Returns the paths of the written files.
pub fn run_study(settings: &StudySettings) -> StudyResult<Vec<PathBuf>> {
    let config = &settings.config;
    info!(
        "Study of {} configurations: {} elections of {} voters, {} candidates, committee size {}, {} iterations",
        settings.parameters.len(),
        config.num_elections,
        config.num_voters,
        config.num_candidates,
        config.committee_size,
        config.num_iterations
    );
    debug!(
        "run_study: algorithm {:?} resolved to {:?}",
        config.algorithm,
        config.algorithm.resolve()
    );
    if config.seed.is_none() {
        warn!("No seed given: the results cannot be reproduced");
    }
    let driver =
        ExperimentDriver::new(config.clone(), settings.workers).context(ConfigurationSnafu {})?;
    info!("Running on {} workers", driver.num_workers());

    let start = Instant::now();
    let total = settings.parameters.len();
    let mut written: Vec<PathBuf> = Vec::new();
    for (idx, params) in settings.parameters.iter().enumerate() {
        let stem = params.file_stem();
        info!("Starting {}", stem);
        let acc = driver
            .run_configuration(idx, params)
            .context(ExperimentSnafu { name: stem.clone() })?;
        log_summary(&stem, &acc);

        let js = accumulator_to_json(&acc);
        if settings.write_data {
            written.push(write_json(&settings.output_directory, &stem, &js)?);
        }
        if let Some(reference_dir) = &settings.reference {
            compare_with_reference(reference_dir, &stem, &js)?;
        }

        let done = idx + 1;
        let elapsed = start.elapsed().as_secs_f64();
        let estimate = elapsed / done as f64 * total as f64;
        info!(
            "{} out of {} parameter combinations done ({}%)",
            done,
            total,
            done * 100 / total
        );
        info!(
            "{} / ~{} (approx. {} remaining)",
            format_duration(elapsed),
            format_duration(estimate),
            format_duration(estimate - elapsed)
        );
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;

    fn small_study(dir: &std::path::Path) -> String {
        let path = dir.join("study.json");
        fs::write(
            &path,
            r#"{
                "numVoters": 20,
                "numCandidates": 8,
                "committeeSize": 2,
                "numElections": 2,
                "numIterations": 2,
                "maxNumCommittees": 5,
                "numPercentages": 4,
                "seed": 5,
                "parameters": [
                    {"id": "1D", "distId": "1d_interval", "euclidResample": false, "radius": 0.2},
                    {"id": "Res", "rho": 0.25, "phi": 0.5}
                ]
            }"#,
        )
        .unwrap();
        path.display().to_string()
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(0.2), "0:00:00");
        assert_eq!(format_duration(3725.0), "1:02:05");
    }

    #[test]
    fn command_line_overrides_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_study(dir.path());
        let args = Args::parse_from([
            "resilience",
            "--config",
            config.as_str(),
            "--seed",
            "9",
            "--sequential",
            "--only",
            "Res_0.25_0.5",
        ]);
        let settings = settings_from_args(&args).unwrap();
        assert_eq!(settings.config.seed, Some(9));
        assert_eq!(settings.config.num_voters, 20);
        assert_eq!(settings.config.percentages.len(), 4);
        assert_eq!(settings.workers, None);
        assert_eq!(settings.parameters.len(), 1);
        assert_eq!(settings.output_directory, PathBuf::from("jsons"));

        let args = Args::parse_from(["resilience", "--only", "3D_0.1"]);
        assert!(settings_from_args(&args).is_err());
    }

    #[test]
    fn default_settings_are_the_standard_study() {
        let args = Args::parse_from(["resilience", "--threads", "3"]);
        let settings = settings_from_args(&args).unwrap();
        assert_eq!(settings.parameters, SamplingParameters::standard_grid());
        assert_eq!(settings.config, ExperimentConfig::default());
        assert_eq!(settings.workers, Some(3));
        assert!(settings.write_data);
    }

    #[test]
    fn runs_and_compares_with_reference() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_study(dir.path());
        let out = dir.path().join("out");
        let out_str = out.display().to_string();
        let args = Args::parse_from([
            "resilience",
            "-c",
            config.as_str(),
            "-o",
            out_str.as_str(),
            "-t",
            "2",
        ]);
        let settings = settings_from_args(&args).unwrap();
        let written = run_study(&settings).unwrap();
        assert_eq!(
            written,
            vec![out.join("1D_0.2.json"), out.join("Res_0.25_0.5.json")]
        );

        // Same seed: the second run reproduces the first one.
        let args = Args::parse_from([
            "resilience",
            "-c",
            config.as_str(),
            "--no-write",
            "--reference",
            out_str.as_str(),
        ]);
        let settings = settings_from_args(&args).unwrap();
        assert!(run_study(&settings).unwrap().is_empty());

        let args = Args::parse_from([
            "resilience",
            "-c",
            config.as_str(),
            "--no-write",
            "--seed",
            "6",
            "--reference",
            out_str.as_str(),
        ]);
        let settings = settings_from_args(&args).unwrap();
        assert!(matches!(
            run_study(&settings),
            Err(StudyError::ReferenceMismatch { .. })
        ));
    }
}
