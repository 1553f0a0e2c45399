use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use rusty_spectra::data::loader::{load_file, save_file};
use rusty_spectra::{CorrectionConfig, Interpolation, Spectrum, TelluricCorrector};

/// Resample and telluric-correct 1-D spectra.
#[derive(Parser)]
#[command(name = "rusty-spectra", version, about)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Divide the best matching calibration out of every input spectrum.
    Correct(CorrectArgs),
    /// Put every input spectrum on an evenly spaced wavelength grid.
    Resample(ResampleArgs),
}

#[derive(clap::Args)]
struct CorrectArgs {
    /// File with the spectra to correct (.parquet, .json, .csv).
    #[arg(short, long)]
    input: PathBuf,

    /// File(s) with calibration spectra; all of them are candidates.
    #[arg(short, long = "calibration", required = true)]
    calibrations: Vec<PathBuf>,

    /// Output file (.json or .csv).
    #[arg(short, long)]
    output: PathBuf,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the maximum pixel shift from the config.
    #[arg(long)]
    lag: Option<usize>,
}

#[derive(clap::Args)]
struct ResampleArgs {
    #[arg(short, long)]
    input: PathBuf,

    #[arg(short, long)]
    output: PathBuf,

    /// Lower wavelength bound, in each spectrum's own unit.
    #[arg(long)]
    lower: f64,

    /// Upper wavelength bound, in each spectrum's own unit.
    #[arg(long)]
    upper: f64,

    /// Number of samples in the new grid.
    #[arg(long)]
    count: usize,

    /// Interpolation scheme; defaults to the one in the config.
    #[arg(long, value_enum)]
    interpolation: Option<InterpolationArg>,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum InterpolationArg {
    Linear,
    Nearest,
    Cubic,
}

impl From<InterpolationArg> for Interpolation {
    fn from(arg: InterpolationArg) -> Self {
        match arg {
            InterpolationArg::Linear => Interpolation::Linear,
            InterpolationArg::Nearest => Interpolation::Nearest,
            InterpolationArg::Cubic => Interpolation::CubicSpline,
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Correct(args) => run_correct(args),
        Command::Resample(args) => run_resample(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<CorrectionConfig> {
    match path {
        Some(path) => Ok(CorrectionConfig::from_json_file(path)?),
        None => Ok(CorrectionConfig::default()),
    }
}

fn run_correct(args: CorrectArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(lag) = args.lag {
        config.lag = lag;
    }

    let spectra = load_file(&args.input)
        .with_context(|| format!("loading {}", args.input.display()))?;
    let mut calibrations: Vec<Spectrum> = Vec::new();
    for path in &args.calibrations {
        let loaded = load_file(path).with_context(|| format!("loading {}", path.display()))?;
        calibrations.extend(loaded);
    }
    info!(
        "correcting {} spectra against {} calibrations",
        spectra.len(),
        calibrations.len()
    );

    let corrector = TelluricCorrector::with_config(config);
    let corrected = spectra
        .iter()
        .enumerate()
        .map(|(i, sp)| {
            corrector
                .correct(sp, &calibrations)
                .with_context(|| format!("correcting spectrum {i}"))
        })
        .collect::<Result<Vec<_>>>()?;

    save_file(&args.output, &corrected)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!("wrote {} spectra to {}", corrected.len(), args.output.display());
    Ok(())
}

fn run_resample(args: ResampleArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    let interpolation = args
        .interpolation
        .map(Interpolation::from)
        .unwrap_or(config.interpolation);

    let mut spectra = load_file(&args.input)
        .with_context(|| format!("loading {}", args.input.display()))?;
    for (i, sp) in spectra.iter_mut().enumerate() {
        sp.set_interpolation(interpolation);
        sp.resample_to(args.lower, args.upper, args.count)
            .with_context(|| format!("resampling spectrum {i}"))?;
    }
    save_file(&args.output, &spectra)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!("wrote {} spectra to {}", spectra.len(), args.output.display());
    Ok(())
}
