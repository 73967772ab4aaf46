//! Dental Classifier - command-line submission client
//!
//! Usage: `dental-classifier [--config-dir DIR] <image>`
//!
//! # Execution Flow
//!
//! 1. Load `classifier.yaml` from the config directory (default `config/`),
//!    with `DENTAL_<SECTION>__<KEY>` environment overrides
//! 2. Initialize logging → `<log_dir>/<log_prefix>.<date>`
//! 3. Create a current-thread tokio runtime
//! 4. Wire StateManager, SubmissionController and the console renderer
//! 5. Select the image, submit it, print the outcome
//!
//! Ctrl-C resets the controller, which cancels the submission in flight.
//! The exit code is 0 only when classification succeeded.

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use dental_classifier::ui::{ConsoleRenderer, RenderBridge};
use dental_classifier::{
    APP_NAME, ClassifierConfig, ConfigManager, HttpClassifier, Metrics, StateManager,
    SubmissionController, SubmissionPhase, VERSION,
};
use std::process::ExitCode;
use std::sync::Arc;

struct Args {
    config_dir: Utf8PathBuf,
    image: Utf8PathBuf,
}

fn parse_args() -> Result<Args> {
    let mut config_dir = Utf8PathBuf::from("config");
    let mut image = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config-dir" => {
                config_dir = args
                    .next()
                    .map(Utf8PathBuf::from)
                    .context("--config-dir requires a value")?;
            }
            "-h" | "--help" => bail!("usage: {} [--config-dir DIR] <image>", APP_NAME),
            _ if image.is_none() => image = Some(Utf8PathBuf::from(arg)),
            _ => bail!("unexpected argument '{}'", arg),
        }
    }

    let image = image.with_context(|| format!("usage: {} [--config-dir DIR] <image>", APP_NAME))?;
    Ok(Args { config_dir, image })
}

fn main() -> Result<ExitCode> {
    let args = parse_args()?;

    let config_manager = ConfigManager::new(&args.config_dir)?;
    let config = config_manager.load()?;

    let _log_guard = dental_classifier::logging::setup_logging_with_console(&config.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let succeeded = runtime.block_on(run(config, args.image))?;

    tracing::info!("Application shutdown complete");
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run(config: ClassifierConfig, image: Utf8PathBuf) -> Result<bool> {
    let state = Arc::new(StateManager::new());
    let metrics = Arc::new(Metrics::new());
    let classifier = HttpClassifier::new(&config.endpoint)?;
    let controller = Arc::new(SubmissionController::new(
        &config,
        classifier,
        Arc::clone(&state),
        Arc::clone(&metrics),
    ));

    let bridge = RenderBridge::new(
        Arc::new(ConsoleRenderer::new()),
        &state,
        tokio::runtime::Handle::current(),
    );

    let interrupt_controller = Arc::clone(&controller);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted - cancelling submission");
            interrupt_controller.reset();
        }
    });

    let session_controller = Arc::clone(&controller);
    let session = bridge.spawn_async(move || async move {
        let selection = session_controller.select_path(&image).await?;
        if selection.is_accepted() {
            session_controller.submit().await?;
        }
        Ok(())
    });
    session.await.context("Submission task panicked")?;

    // Let the render pump draw the final snapshot
    tokio::task::yield_now().await;

    interrupt.abort();
    metrics.log_summary();

    Ok(state.read(|s| s.phase == SubmissionPhase::Succeeded))
}
