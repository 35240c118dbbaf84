mod app;
mod color;
mod data;
mod error;
mod interaction;
mod state;
mod ui;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use app::CubeViewApp;
use clap::Parser;
use eframe::egui;
use state::ViewerState;

/// Inspect emission-line fits of an IFS data cube.
#[derive(Parser, Debug)]
#[command(name = "cubeview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Original data cube (.json or .parquet)
    datacube: PathBuf,

    /// Fit result for that cube (.json or .parquet)
    fitfile: PathBuf,

    /// Hide spaxels whose fit status is not 0
    #[arg(long = "fitstatus_mask", alias = "fitstatus-mask")]
    fitstatus_mask: bool,
}

fn load_session(cli: &Cli) -> Result<ViewerState> {
    let cube = data::loader::load_cube(&cli.datacube)?;
    log::info!(
        "Cube: {}x{} spaxels, {} wavelengths",
        cube.width(),
        cube.height(),
        cube.wavelength.len()
    );
    let fit = data::loader::load_fit(&cli.fitfile)?;
    data::loader::check_compatible(&cube, &fit).context("cube and fit do not match")?;

    Ok(ViewerState::new(
        cube,
        fit,
        cli.datacube.clone(),
        cli.fitfile.clone(),
        cli.fitstatus_mask,
    ))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let state = match load_session(&cli) {
        Ok(state) => state,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 850.0])
            .with_min_inner_size([800.0, 500.0]),
        ..Default::default()
    };

    let result = eframe::run_native(
        "Cubeview – IFS Fit Viewer",
        options,
        Box::new(|_cc| Ok(Box::new(CubeViewApp::new(state)))),
    );
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
