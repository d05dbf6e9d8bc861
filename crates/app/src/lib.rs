pub mod app;
pub mod chat;
pub mod error;
pub mod session;
pub mod settings;
pub mod terminal;

use std::sync::Arc;

use smartchat_llm::AiGateway;
use smartchat_storage::FileSessionStore;
use smartchat_transport::HttpBackend;
use snafu::ResultExt;

use crate::app::{ChatAppShell, ShellDeps};
use crate::error::{AppResult, BackendSnafu, GatewaySnafu};
use crate::session::SessionContext;
use crate::settings::SettingsStore;

/// Wires the stores and clients from the loaded settings and runs the terminal shell until quit.
///
/// A missing AI credential fails here, before any view is shown.
pub async fn run(settings_store: SettingsStore) -> AppResult<()> {
    let settings = settings_store.settings();
    let store = match &settings.data_dir {
        Some(dir) => FileSessionStore::new(dir.clone()),
        None => FileSessionStore::default(),
    };
    tracing::debug!(path = %store.path().display(), "session store ready");

    let backend = HttpBackend::new(&settings.backend_host).context(BackendSnafu {
        stage: "build-backend",
    })?;
    let gateway = AiGateway::from_config(settings.to_provider_config()).context(GatewaySnafu {
        stage: "build-gateway",
    })?;
    tracing::info!(
        backend_host = %settings.backend_host,
        realtime_endpoint = %settings.realtime_endpoint(),
        provider_id = %gateway.provider_id(),
        model_id = %gateway.model(),
        "starting chat shell"
    );

    let shell = ChatAppShell::new(ShellDeps {
        session: SessionContext::new(Arc::new(store)),
        backend: Arc::new(backend),
        gateway,
        realtime_endpoint: settings.realtime_endpoint().to_string(),
        settings: settings_store,
    });
    shell.run().await
}
