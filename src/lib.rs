//! # fmgen
//!
//! fmgen compiles systems of communicating state machines
//! into [JANI](https://jani-spec.org/) formal models,
//! ready to be verified by probabilistic model checkers.
//!
//! Models are described in JSON (see [`fmgen_scxml::ModelDescription`]):
//! state machines with typed variables, ECMAScript guards and assignments,
//! and interfaces (plain events, topics, services, actions, timers and behavior-tree nodes)
//! through which they communicate.

use std::path::PathBuf;

use anyhow::{Context, ensure};
use clap::Parser;
use fmgen_scxml::ConversionConfig;

/// A compiler from communicating state machines to JANI models.
///
/// fmgen reads the JSON description of a system of state machines
/// and writes the equivalent JANI model,
/// with events compiled into synchronizations
/// and random distributions into probabilistic branching.
#[derive(Parser)]
#[deny(missing_docs)]
#[command(version, about, long_about)]
pub struct Cli {
    /// Path of the JSON model description.
    #[arg(value_hint = clap::ValueHint::FilePath)]
    input: PathBuf,
    /// Path of the JANI file to write.
    ///
    /// By default, the model is written next to its description,
    /// with the same name and the .jani extension.
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    output: Option<PathBuf>,
    /// Max size of arrays declared without size, and of array payloads.
    #[arg(long, default_value_t = 100)]
    max_array_size: usize,
    /// Number of values each random distribution is discretized into.
    #[arg(long, default_value_t = 100)]
    resolution: usize,
    /// Time horizon of the model, in seconds.
    ///
    /// Timers stop firing once the global time reaches it.
    #[arg(long, default_value_t = 100.)]
    max_time: f64,
    /// Verbose output
    #[command(flatten)]
    pub verbosity: clap_verbosity_flag::Verbosity,
}

impl Cli {
    /// Converts the model description and writes the JANI model.
    pub fn run(self) -> anyhow::Result<()> {
        let config = self.config()?;
        let description = fmgen_scxml::load(&self.input)?;
        eprint!("Converting model, please wait...");
        let model = fmgen_scxml::convert(&description, &config)
            .with_context(|| format!("failed to convert model '{}'", description.name))?;
        eprintln!(" done");
        let output = self
            .output
            .unwrap_or_else(|| self.input.with_extension("jani"));
        fmgen_jani::save(&model, &output)?;
        println!(
            "model '{}' written to '{}'",
            model.name(),
            output.display()
        );
        Ok(())
    }

    fn config(&self) -> anyhow::Result<ConversionConfig> {
        ensure!(
            self.max_time.is_finite() && self.max_time >= 0.,
            "max time must be a non-negative number of seconds"
        );
        ensure!(self.resolution > 0, "resolution must be positive");
        Ok(ConversionConfig {
            max_array_size: self.max_array_size,
            resolution: self.resolution,
            max_time_ns: (self.max_time * 1e9).round() as u64,
        })
    }
}

// From Clap tutorial <https://docs.rs/clap/latest/clap/_derive/_tutorial/index.html#testing>
#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}

#[test]
fn cli_config() {
    let cli = Cli::try_parse_from(["fmgen", "model.json", "--max-time", "1.5"]).unwrap();
    let config = cli.config().unwrap();
    assert_eq!(config.max_time_ns, 1_500_000_000);
    assert_eq!(config.resolution, 100);
    assert_eq!(cli.output, None);

    let cli = Cli::try_parse_from(["fmgen", "model.json", "--max-time=-1"]).unwrap();
    assert!(cli.config().is_err());
}
