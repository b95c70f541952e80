//! Command line front end of the overlap correction pipeline.
//!
//! ```text
//! overlap_probe daily -i L1/ -c config.csv -f ov_ref.txt -o out/
//! overlap_probe model --date-start 2023-01-01 --date-stop 2023-03-31 -i out/ -c config.csv -f ov_ref.txt -o models/
//! ```
//!
//! Exit status: 0 when something was produced, even if some days or modules failed; 2 when
//! there was nothing to process or nothing came out of it; 1 on a configuration error or
//! when only failures came out.
use std::process::ExitCode;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{ArgAction, Args, Parser, Subcommand};
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};
use hifitime::Epoch;
use log::{error, info};

use overlap_probe::config::reference_overlap::ReferenceOverlap;
use overlap_probe::config::OverlapParams;
use overlap_probe::daily_processing::{collect_day_files, run_daily_batch, BatchOptions};
use overlap_probe::overlap_errors::{OverlapError, RunStatus};
use overlap_probe::temperature_model::{build_temperature_models, models_status};
use overlap_probe::temperature_model::model_file::ModelArtifact;
use overlap_probe::time::CalendarDate;

#[derive(Parser, Debug)]
#[command(author, version, about = "Ceilometer overlap function correction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log specification, e.g. `debug` or `info,overlap_probe::pre_checks=debug`
    #[arg(long, global = true, default_value = "info")]
    log: String,

    /// Also write rotated log files into this directory
    #[arg(long, global = true)]
    log_dir: Option<Utf8PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find overlap samples in L1 day-files and write one daily result per day
    Daily(DailyArgs),
    /// Fit the temperature model of every optical module from daily results
    Model(ModelArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Configuration file (`parameter,value` CSV)
    #[arg(short, long)]
    config: Utf8PathBuf,

    /// Reference overlap file
    #[arg(short = 'f', long)]
    ref_overlap: Utf8PathBuf,

    /// Output directory
    #[arg(short, long)]
    output: Utf8PathBuf,

    /// Compute without writing any artifact
    #[arg(long, action = ArgAction::SetTrue)]
    no_write: bool,
}

#[derive(Args, Debug)]
struct DailyArgs {
    /// L1 day-file or directory of day-files
    #[arg(short, long)]
    input: Utf8PathBuf,

    #[command(flatten)]
    common: CommonArgs,

    /// Skip days whose daily result already exists
    #[arg(long, action = ArgAction::SetTrue)]
    skip_existing: bool,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// First day, `YYYY-MM-DD` or `YYYY/MM/DD`
    #[arg(long)]
    date_start: CalendarDate,

    /// Last day, inclusive
    #[arg(long)]
    date_stop: CalendarDate,

    /// Directory of daily results
    #[arg(short, long)]
    input: Utf8PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Produced => ExitCode::SUCCESS,
        RunStatus::Failed => ExitCode::from(1),
        RunStatus::Nothing => ExitCode::from(2),
    }
}

fn start_logger(spec: &str, dir: Option<&Utf8PathBuf>) -> Result<LoggerHandle> {
    let logger = Logger::try_with_env_or_str(spec).context("invalid log specification")?;
    let logger = match dir {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir.as_std_path()))
            .duplicate_to_stderr(Duplicate::All)
            .rotate(
                Criterion::Size(10 * 1024 * 1024),
                Naming::Timestamps,
                Cleanup::KeepLogFiles(5),
            ),
        None => logger.log_to_stderr(),
    };
    logger.start().context("logger initialization failed")
}

fn load_inputs(common: &CommonArgs) -> Result<(OverlapParams, ReferenceOverlap)> {
    let params = OverlapParams::from_config_file(&common.config)
        .with_context(|| format!("reading configuration {}", common.config))?;
    let reference = ReferenceOverlap::from_file(&common.ref_overlap)
        .with_context(|| format!("reading reference overlap {}", common.ref_overlap))?;
    info!("parameters:\n{params:#}");
    Ok((params, reference))
}

fn run_daily(args: &DailyArgs) -> Result<RunStatus> {
    let (params, reference) = load_inputs(&args.common)?;
    let files = match collect_day_files(&args.input) {
        Ok(files) => files,
        Err(e @ OverlapError::NoData(_)) => {
            info!("{e}");
            return Ok(RunStatus::Nothing);
        }
        Err(e) => return Err(e).with_context(|| format!("listing {}", args.input)),
    };
    info!("{} day-file(s) under {}", files.len(), args.input);

    let options = BatchOptions {
        output: args.common.output.clone(),
        skip_existing: args.skip_existing,
        write: !args.common.no_write,
    };
    let report = run_daily_batch(&files, &reference, &params, &options);
    let (produced, failed) = (report.produced(), report.failed());
    info!("{produced} daily result(s), {failed} failure(s)");

    Ok(report.status())
}

fn run_model(args: &ModelArgs) -> Result<RunStatus> {
    let (params, reference) = load_inputs(&args.common)?;
    let outcomes = match build_temperature_models(
        &args.input,
        args.date_start,
        args.date_stop,
        &reference,
        &params,
    ) {
        Ok(outcomes) => outcomes,
        Err(e @ OverlapError::NoData(_)) => {
            info!("{e}");
            return Ok(RunStatus::Nothing);
        }
        Err(e) => return Err(e).context("building temperature models"),
    };

    let status = models_status(&outcomes);
    let created = Epoch::now().context("reading the system clock")?;
    let artifact = ModelArtifact::new(created, args.date_start, args.date_stop, outcomes);
    if !artifact.models.is_empty() && !args.common.no_write {
        let path = artifact
            .write_to_dir(&args.common.output)
            .with_context(|| format!("writing model into {}", args.common.output))?;
        info!("wrote {path}");
    }

    info!(
        "{} model(s), {} module(s) without a model",
        artifact.models.len(),
        artifact.failures.len()
    );
    Ok(status)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _logger = match start_logger(&cli.log, cli.log_dir.as_ref()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{e:#}");
            return exit_code(RunStatus::Failed);
        }
    };

    let outcome = match &cli.command {
        Command::Daily(args) => run_daily(args),
        Command::Model(args) => run_model(args),
    };
    match outcome {
        Ok(status) => exit_code(status),
        Err(e) => {
            error!("{e:#}");
            exit_code(RunStatus::Failed)
        }
    }
}
