//! Run a trigger schedule described by a controller JSON file.
//!
//! Usage: `strobesync <controller.json>`

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};

use strobesync::Controller;
use strobesync::logging::init_logging;

fn main() -> ExitCode {
    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("Usage: strobesync <controller.json>");
        return ExitCode::FAILURE;
    };

    let mut controller = match Controller::load(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let ctx = controller.ctx();
    let guards = match init_logging(&ctx.op_dir, &ctx.op_name) {
        Ok((log_path, guards)) => {
            info!("Logging to {log_path:?}");
            guards
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let code = match controller.run() {
        Ok(summary) => {
            info!("{summary:?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    };

    // Get the final lines out before the process exits
    guards.shutdown();
    code
}
