#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::type_complexity)]

extern crate gnss_rs as gnss;

mod antenna;
mod cli;
mod error;
mod fd;
mod index;
mod matching;
mod merge;
mod pos;
mod processing;
mod reproject;
mod rinex;
mod runtime;
mod settings;
mod solver;
mod telemetry;
mod utils;

#[cfg(test)]
mod tests;

use std::{process::ExitCode, sync::Arc};

use env_logger::{Builder, Env, Target};

use log::{error, info, warn};

use tokio::signal;

use crate::{
    antenna::AntennaCatalog,
    cli::{Cli, Mode},
    error::Result,
    matching::{find_flights_data, find_matches_by_time_bounds},
    processing::{Processor, shrink},
    rinex::RinexParser,
    runtime::Runtime,
    settings::Settings,
};

fn antenna_catalog(settings: &Settings) -> Result<Option<AntennaCatalog>> {
    match &settings.antenna_calibration {
        Some(antex) => Ok(Some(AntennaCatalog::load(antex)?)),
        None => Ok(None),
    }
}

/// Runs the selected mode. Returns false when the processing
/// completed with errors.
async fn run(cli: &Cli, runtime: Arc<Runtime>) -> Result<bool> {
    let settings = cli.settings()?;

    match cli.mode()? {
        Mode::Match { dir, base } => {
            let data = find_flights_data(&dir)?;
            let (matches, missed) = find_matches_by_time_bounds(
                &data.rinex,
                &data.telemetry,
                base.as_deref(),
                &settings.matching,
            )?;

            for m in matches.iter() {
                info!("{} <-> {}", m.rinex.display(), m.telemetry.display());
            }

            for (reason, kind, path) in missed.entries() {
                warn!("{} {} - {}", kind, path.display(), reason);
            }

            Ok(true)
        },
        Mode::Batch { dir, base, export } => {
            let data = find_flights_data(&dir)?;
            let (matches, missed) = find_matches_by_time_bounds(
                &data.rinex,
                &data.telemetry,
                Some(&base),
                &settings.matching,
            )?;

            info!("{} flights to process", matches.len());

            let processor = Arc::new(Processor::new(settings, runtime)?);
            let report = processor.run_batch(matches, missed, &base, &export).await?;

            let succeeded = report.flights.iter().filter(|f| f.is_success()).count();
            info!("{}/{} flights processed", succeeded, report.flights.len());

            Ok(report.unexpected.is_empty())
        },
        Mode::Single {
            rover,
            base,
            telemetry,
            export,
        } => {
            let processor = Processor::new(settings, runtime)?;
            let report = processor
                .run_single(&rover, &base, &telemetry, &export)
                .await?;

            for error in report.errors.iter() {
                error!("{} - {}", report.name, error);
            }

            for output in report.outputs.iter() {
                info!("{} - generated", output.display());
            }

            Ok(report.is_success())
        },
        Mode::Shrink {
            rover,
            output,
            epochs,
        } => {
            let catalog = antenna_catalog(&settings)?;

            let shrunk = shrink(
                &rover,
                &output,
                epochs,
                settings.obs_frequency(),
                catalog.as_ref(),
            )?;

            info!("{} - generated", shrunk.rinex.display());

            for event in shrunk.missed_events.iter() {
                warn!("missed event: {}", event.data.trim_end());
            }

            for sibling in shrunk.siblings.iter() {
                info!("{} - copied", sibling.display());
            }

            Ok(true)
        },
        Mode::Cut {
            rover,
            output,
            start,
            end,
        } => {
            let catalog = antenna_catalog(&settings)?;

            let mut parser = RinexParser::open(&rover, settings.obs_frequency(), catalog.as_ref())?;
            parser.cut_by_time_bounds(&output, start, end)?;

            info!("{} - generated", output.display());
            Ok(true)
        },
    }
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let cli = Cli::new();

    let default_filter = if cli.quiet() { "warn" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_filter));

    builder
        .target(Target::Stdout)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    let runtime = match Runtime::new() {
        Ok(runtime) => Arc::new(runtime),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        },
    };

    info!("{} - application deployed", runtime.run_name());

    let signals = Arc::clone(&runtime);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(_) => {
                warn!("interrupted: stopping");
                signals.shutdown();
            },
            Err(e) => error!("signal handling error: {}", e),
        }
    });

    let status = match run(&cli, Arc::clone(&runtime)).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        },
    };

    info!("completed in {}", runtime.uptime());
    status
}
