use std::process::ExitCode;

use smartchat::settings::SettingsStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so they never interleave with the rendered frames.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let settings_store = SettingsStore::load();
    tracing::debug!(path = %settings_store.config_path().display(), "settings loaded");

    match smartchat::run(settings_store).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "smartchat exited with an error");
            eprintln!("smartchat: {error}");
            ExitCode::FAILURE
        }
    }
}
