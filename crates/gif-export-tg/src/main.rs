use futures::prelude::*;
use gif_export_tg::tracing_err;
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();

    let logging = gif_export_tg::init_logging();

    // In debug builds Ctrl+C doesn't wait for teloxide's graceful shutdown,
    // which is slow: https://github.com/teloxide/teloxide/issues/711
    let exit_code = tokio::select! {
        exit_code = run_guarded() => exit_code,
        () = force_exit_signal(), if cfg!(debug_assertions) => ExitCode::SUCCESS,
    };

    logging.shutdown().await;

    exit_code
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => eprintln!("Loaded environment from {}", path.display()),
        Err(err) if err.not_found() => eprintln!("No .env file found, using the process environment"),
        Err(err) => eprintln!("Failed to load the .env file, ignoring it: {err}"),
    }
}

/// Runs the bot, turning both errors and panics into a failure exit code
async fn run_guarded() -> ExitCode {
    let outcome = AssertUnwindSafe(async {
        let config = gif_export_tg::Config::load_or_panic();
        gif_export_tg::run(config).await
    })
    .catch_unwind()
    .await;

    match outcome {
        Ok(Ok(())) => {
            info!("Bot has shut down");
            ExitCode::SUCCESS
        }
        Ok(Err(err)) => {
            error!(err = tracing_err(&err), "Bot has stopped with an error");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!("Bot has stopped due to a panic");
            ExitCode::FAILURE
        }
    }
}

async fn force_exit_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, not waiting for the graceful shutdown"),
        Err(err) => warn!(err = tracing_err(&err), "Failed to listen for Ctrl+C"),
    }
}
