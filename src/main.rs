use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::info;

use mzfilter::process::{
    run_average_job, run_filter_job, AverageSettings, CancellationToken, FilterSettings,
    JobOutcome, JobSettings, LoggingProgress,
};

/// Filter or average the tandem mass spectra of an mzXML run
#[derive(Parser)]
#[command(name = "mzfilter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// The mzXML file to read
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// The mzXML file to write
    #[arg(value_name = "DESTINATION")]
    destination: PathBuf,

    /// The m/z accuracy, in Da unless --ppm is given
    #[arg(short, long, default_value_t = 0.5)]
    accuracy: f64,

    /// Interpret --accuracy in parts-per-million
    #[arg(long)]
    ppm: bool,
}

impl RunArgs {
    fn job_settings(&self) -> JobSettings {
        JobSettings::new(&self.source, &self.destination).with_accuracy(self.accuracy, self.ppm)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the MSn scans with a peak near a target m/z
    Filter {
        #[command(flatten)]
        run: RunArgs,

        /// The m/z to search for
        #[arg(short, long)]
        target_mz: f64,

        /// The minimum intensity of a matching peak
        #[arg(short, long, default_value_t = 0.0)]
        cutoff: f64,

        /// Interpret --cutoff as a percentage of each scan's most intense peak
        #[arg(short, long)]
        percentage: bool,

        /// Also write the MS1 scans the kept scans descend from
        #[arg(short, long)]
        keep_parent: bool,
    },

    /// Merge MSn scans of the same precursor ion into averaged scans
    Average {
        #[command(flatten)]
        run: RunArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let token = CancellationToken::new();
    let mut progress = LoggingProgress::new();
    let outcome = match cli.command {
        Commands::Filter {
            run,
            target_mz,
            cutoff,
            percentage,
            keep_parent,
        } => {
            let settings = FilterSettings::new(run.job_settings(), target_mz)
                .with_cutoff(cutoff, percentage)
                .with_parent_scan(keep_parent);
            run_filter_job(&settings, &token, &mut progress)
        }
        Commands::Average { run } => {
            let settings = AverageSettings::new(run.job_settings());
            run_average_job(&settings, &token, &mut progress)
        }
    };

    match outcome {
        JobOutcome::Completed { notices } => {
            info!("Completed with {} notices", notices.len());
            ExitCode::SUCCESS
        }
        JobOutcome::Cancelled => ExitCode::from(2),
        // Already reported through the progress sink
        JobOutcome::Failed(_) => ExitCode::FAILURE,
    }
}
