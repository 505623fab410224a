use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "qcdesc - Boltzmann-averaged quantum-chemical descriptors from conformer ensembles, computed with an external xTB-compatible engine.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute Boltzmann-averaged descriptors for a conformer ensemble.
    Run(RunArgs),
    /// Recalibrate a previously computed descriptor file against experimental references.
    Calibrate(CalibrateArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Path to the conformer ensemble (multi-record XYZ with energies on the comment lines).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Output directory for per-conformer and Boltzmann-averaged descriptor files.
    #[arg(short, long, value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Molecule name used for output files. Defaults to the input file stem.
    #[arg(short, long, value_name = "NAME")]
    pub name: Option<String>,

    // --- Engine Overrides ---
    /// Override the QM method (gfn0, gfn1, gfn2, gfnff).
    #[arg(short, long, value_name = "METHOD")]
    pub method: Option<String>,

    /// Override the implicit solvent; pass 'none' to disable solvation.
    #[arg(long, value_name = "SOLVENT")]
    pub solvent: Option<String>,

    /// Override the molecular charge.
    #[arg(long, value_name = "INT", allow_hyphen_values = true)]
    pub charge: Option<i32>,

    /// Override the spin multiplicity (2S+1, >= 1).
    #[arg(long, value_name = "INT")]
    pub multiplicity: Option<u32>,

    /// Override the engine accuracy level.
    #[arg(long, value_name = "FLOAT")]
    pub accuracy: Option<f64>,

    /// Override the electronic temperature passed to the engine, in K.
    #[arg(long, value_name = "KELVIN")]
    pub etemp: Option<f64>,

    /// Override the engine executable path.
    #[arg(long, value_name = "PATH")]
    pub engine: Option<PathBuf>,

    // --- Weighting and Resource Overrides ---
    /// Override the thermodynamic temperature for Boltzmann weighting, in K.
    #[arg(short = 't', long, value_name = "KELVIN")]
    pub temperature: Option<f64>,

    /// Override the unit of the ensemble energies (hartree, kcal-mol).
    #[arg(long, value_name = "UNIT")]
    pub energy_unit: Option<String>,

    /// Override the maximum number of concurrent engine jobs.
    #[arg(short = 'w', long, value_name = "INT")]
    pub workers: Option<usize>,

    /// Override the thread count given to each engine job.
    #[arg(long, value_name = "INT")]
    pub job_threads: Option<usize>,

    /// Override the per-process memory budget (e.g. '1G').
    #[arg(long, value_name = "SIZE")]
    pub memory: Option<String>,

    /// Override the per-job timeout, in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    // --- Calibration ---
    /// Enable NMR calibration of shieldings into chemical shifts.
    #[arg(long)]
    pub nmr: bool,

    /// Path to experimental reference shifts (CSV: atom_index,value). Implies --nmr.
    #[arg(long, value_name = "PATH")]
    pub experim: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Unrecognized keys are warned about and ignored.
    /// Example: -S engine.accuracy=0.1
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `calibrate` subcommand.
#[derive(Args, Debug)]
pub struct CalibrateArgs {
    /// Path to an existing Boltzmann-averaged descriptor JSON file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the calibrated output file. Defaults to '<input>_calibrated.json'.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Path to the configuration file carrying [calibration] rules.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to experimental reference values (CSV: atom_index,value).
    #[arg(long, value_name = "PATH")]
    pub experim: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_subcommand_parses_with_minimal_arguments() {
        let cli = Cli::parse_from(["qcdesc", "run", "-i", "ensemble.xyz"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.input, PathBuf::from("ensemble.xyz"));
        assert!(args.config.is_none());
        assert!(!args.nmr);
    }

    #[test]
    fn run_overrides_parse() {
        let cli = Cli::parse_from([
            "qcdesc", "run", "-i", "e.xyz", "--charge", "-1", "--multiplicity", "2",
            "-t", "310.0", "-w", "8", "--nmr",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.charge, Some(-1));
        assert_eq!(args.multiplicity, Some(2));
        assert_eq!(args.temperature, Some(310.0));
        assert_eq!(args.workers, Some(8));
        assert!(args.nmr);
    }

    #[test]
    fn verbosity_flags_are_global() {
        let cli = Cli::parse_from(["qcdesc", "run", "-i", "e.xyz", "-vv"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn calibrate_subcommand_parses() {
        let cli = Cli::parse_from([
            "qcdesc",
            "calibrate",
            "-i",
            "mol_boltz.json",
            "--experim",
            "shifts.csv",
        ]);
        let Commands::Calibrate(args) = cli.command else {
            panic!("expected calibrate subcommand");
        };
        assert_eq!(args.input, PathBuf::from("mol_boltz.json"));
        assert_eq!(args.experim, Some(PathBuf::from("shifts.csv")));
    }
}
