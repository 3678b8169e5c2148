//! Continuous capture binary: grab, save and requeue one frame at a time.
use chrono::Local;
use clap::Parser;
use optic::components::prelude::*;
use optic::devices::software::camera::{SimulatedCamera, SimulatedSystem};
use optic::error::Result;
use optic::logging::{self, error};
use std::process::ExitCode;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to a yaml parameter file, defaults are used without one.
    #[arg(short, long)]
    filepath: Option<String>,
    /// Capture from the simulated camera instead of the network.
    #[arg(long)]
    simulated: bool,
}

fn run(args: &Args) -> Result<()> {
    let parameters = match &args.filepath {
        Some(filepath) => ParameterSet::from_file(filepath)?,
        None => ParameterSet::default(),
    };
    let writer = ImageWriter::for_session(&parameters, &Local::now());

    if args.simulated {
        let mut system = SimulatedSystem::new(SimulatedCamera::new());
        CaptureController::continuous(&mut system, &parameters, &writer)?;
        return Ok(());
    }
    capture_hardware(&parameters, &writer)
}

#[cfg(feature = "aravis")]
fn capture_hardware(parameters: &ParameterSet, writer: &ImageWriter) -> Result<()> {
    let mut system = optic::devices::hardware::aravis::AravisSystem::new()?;
    CaptureController::continuous(&mut system, parameters, writer)?;
    Ok(())
}

#[cfg(not(feature = "aravis"))]
fn capture_hardware(_parameters: &ParameterSet, _writer: &ImageWriter) -> Result<()> {
    Err(optic::error::CaptureError::Backend(String::from(
        "built without the aravis feature, rebuild with --features aravis or pass --simulated",
    )))
}

fn main() -> ExitCode {
    logging::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Capture failed: {e}");
            ExitCode::FAILURE
        }
    }
}
