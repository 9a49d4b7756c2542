mod bootstrap;

use anyhow::{Context, Result};
use coverage_core::settings::Settings;
use coverage_runtime::study_runner::StudyRunner;
use coverage_runtime::summary_builder::UserStudySummaryBuilder;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("Beiwe coverage v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Download folder: {}, output folder: {}, timezone: {}",
        settings.download_folder.display(),
        settings.output_folder.display(),
        settings.timezone
    );

    settings.validate()?;
    let normalizer = settings.normalizer()?;
    let config = settings
        .study_config()
        .context("could not load the stream configuration")?;
    tracing::debug!(streams = config.streams().len(), "stream configuration loaded");

    let builder =
        UserStudySummaryBuilder::new(settings.download_folder.clone(), config, normalizer);
    let runner = StudyRunner::new(
        builder,
        settings.output_folder.clone(),
        settings.jobs as usize,
    );
    let report = runner.run().await?;

    match &report.study_file {
        Some(path) => println!(
            "Summarized {} users ({} rows) into {}",
            report.users.len(),
            report.study_rows,
            path.display()
        ),
        None => println!("No users found in {}", settings.download_folder.display()),
    }

    if report.has_failures() {
        for f in &report.failures {
            tracing::error!(
                "user {} stream {}: {}",
                f.user_id,
                f.failure.stream,
                f.failure.error
            );
        }
        for f in &report.output_failures {
            tracing::error!("user {}: summary file not written: {}", f.user_id, f.error);
        }
        anyhow::bail!(
            "{} stream summaries failed and {} user files could not be written",
            report.failures.len(),
            report.output_failures.len()
        );
    }

    Ok(())
}
