use clap::Parser;

/// Perturbation experiments on committees elected by sequential approval rules.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file with the settings of the study. Every setting is optional and
    /// defaults to the values of the standard study. See the manual of committee_resilience for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (directory, optional) A directory containing the outputs of a previous run. If provided, every
    /// file produced by this run is compared to the file of the same name in this directory.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (directory, default jsons) Where the result files are written. Setting this option overrides the
    /// directory that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// If passed as an argument, the elections are run one after the other instead of on a worker pool.
    #[clap(long, takes_value = false)]
    pub sequential: bool,

    /// If passed as an argument, the results are computed and logged but not written.
    #[clap(long, takes_value = false)]
    pub no_write: bool,

    /// (number, optional) The size of the worker pool. By default, one worker per core.
    #[clap(short, long, value_parser)]
    pub threads: Option<usize>,

    /// (number, optional) The master seed. Runs with the same seed and settings produce the same files.
    #[clap(short, long, value_parser)]
    pub seed: Option<u64>,

    /// (name, repeatable) Only runs the configurations with this name, for example 1D_0.025 or Res_0.05_0.75.
    #[clap(long, value_parser)]
    pub only: Vec<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
