use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use smartchat_llm::{DEFAULT_APP_TITLE, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_PROVIDER_ID, ProviderConfig};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_BACKEND_HOST: &str = "http://localhost:5000";
pub const DEFAULT_TRANSLATE_LANGUAGE: &str = "hi";
pub const SETTINGS_DIRECTORY_NAME: &str = "smartchat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "SMARTCHAT_";
/// Read when no key is configured anywhere else.
pub const FALLBACK_API_KEY_VAR: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_backend_host")]
    pub backend_host: String,
    /// Relay base URL; the backend host serves the relay too unless set.
    #[serde(default)]
    pub realtime_endpoint: String,
    #[serde(default = "default_provider_id")]
    pub ai_provider_id: String,
    #[serde(default)]
    pub ai_api_key: String,
    #[serde(default = "default_ai_endpoint")]
    pub ai_endpoint: String,
    #[serde(default = "default_ai_model")]
    pub ai_model: String,
    #[serde(default = "default_app_title")]
    pub ai_app_title: String,
    #[serde(default)]
    pub ai_referer: String,
    /// Where the session record lives; the platform data dir when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_translate_language")]
    pub translate_language: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            backend_host: default_backend_host(),
            realtime_endpoint: String::new(),
            ai_provider_id: default_provider_id(),
            ai_api_key: String::new(),
            ai_endpoint: default_ai_endpoint(),
            ai_model: default_ai_model(),
            ai_app_title: default_app_title(),
            ai_referer: String::new(),
            data_dir: None,
            translate_language: default_translate_language(),
        }
    }
}

impl AppSettings {
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig::new(
            &self.ai_provider_id,
            &self.ai_api_key,
            &self.ai_endpoint,
            &self.ai_model,
        )
        .with_app_title(&self.ai_app_title)
        .with_referer(&self.ai_referer)
    }

    pub fn has_api_key(&self) -> bool {
        !self.ai_api_key.trim().is_empty()
    }

    pub fn realtime_endpoint(&self) -> &str {
        if self.realtime_endpoint.is_empty() {
            &self.backend_host
        } else {
            &self.realtime_endpoint
        }
    }

    /// Fills an empty key from `fallback`.
    pub fn with_api_key_fallback(mut self, fallback: Option<String>) -> Self {
        if !self.has_api_key() {
            if let Some(key) = fallback.filter(|key| !key.trim().is_empty()) {
                self.ai_api_key = key;
            }
        }
        self.normalized()
    }

    pub fn normalized(mut self) -> Self {
        self.backend_host = non_blank_or(&self.backend_host, default_backend_host)
            .trim_end_matches('/')
            .to_string();
        self.realtime_endpoint = self.realtime_endpoint.trim().trim_end_matches('/').to_string();
        self.ai_provider_id = non_blank_or(&self.ai_provider_id, default_provider_id);
        self.ai_api_key = self.ai_api_key.trim().to_string();
        self.ai_endpoint = non_blank_or(&self.ai_endpoint, default_ai_endpoint);
        self.ai_model = non_blank_or(&self.ai_model, default_ai_model);
        self.ai_app_title = self.ai_app_title.trim().to_string();
        self.ai_referer = self.ai_referer.trim().to_string();
        self.translate_language =
            non_blank_or(&self.translate_language, default_translate_language);
        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<AppSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".smartchat"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Loads from `config_path` without consulting the process environment.
    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path, None);
        Self::with_settings(settings, config_path)
    }

    pub fn load() -> Self {
        Self::load_from(Self::default_config_path())
    }

    /// Defaults, then the settings file, then `SMARTCHAT_*` variables.
    ///
    /// `OPENROUTER_API_KEY` is consulted last and only when no key was configured.
    pub fn load_from(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path, Some(ENV_PREFIX))
            .with_api_key_fallback(std::env::var(FALLBACK_API_KEY_VAR).ok());
        Self::with_settings(settings, config_path)
    }

    fn with_settings(settings: AppSettings, config_path: PathBuf) -> Self {
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<AppSettings> {
        self.settings.load_full()
    }

    /// Persists a new translation target and swaps it into the live settings.
    ///
    /// Only file-backed values are written back; environment overrides stay in memory.
    pub fn set_translate_language(&self, language: &str) -> Result<Arc<AppSettings>, SettingsError> {
        let mut on_disk = Self::load_from_disk(&self.config_path, None);
        on_disk.translate_language = language.to_string();
        let on_disk = on_disk.normalized();
        self.persist(&on_disk)?;

        let mut live = AppSettings::clone(&self.settings.load());
        live.translate_language = on_disk.translate_language;
        let live = Arc::new(live);
        self.settings.store(live.clone());
        tracing::info!(language = %live.translate_language, "translation language updated");
        Ok(live)
    }

    fn load_from_disk(path: &Path, env_prefix: Option<&str>) -> AppSettings {
        let mut figment = Figment::from(Serialized::defaults(AppSettings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!(path = %path.display(), "settings file not found, using defaults");
        }
        if let Some(prefix) = env_prefix {
            figment = figment.merge(Env::prefixed(prefix));
        }

        match figment.extract::<AppSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "failed to parse settings, using defaults"
                );
                AppSettings::default()
            }
        }
    }

    fn persist(&self, settings: &AppSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!(path = %self.config_path.display(), "saved settings");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn non_blank_or(value: &str, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_backend_host() -> String {
    DEFAULT_BACKEND_HOST.to_string()
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

fn default_ai_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_ai_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_app_title() -> String {
    DEFAULT_APP_TITLE.to_string()
}

fn default_translate_language() -> String {
    DEFAULT_TRANSLATE_LANGUAGE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join(SETTINGS_FILE_NAME));

        let settings = store.settings();
        assert_eq!(*settings, AppSettings::default());
        assert_eq!(settings.ai_model, "mistralai/mistral-7b-instruct");
        assert_eq!(settings.realtime_endpoint(), DEFAULT_BACKEND_HOST);
        assert!(!settings.has_api_key());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{"backend_host":"https://chat.example.com/","ai_api_key":"  sk-or-1  ","translate_language":"fr"}"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path).settings();

        assert_eq!(settings.backend_host, "https://chat.example.com");
        assert_eq!(settings.realtime_endpoint(), "https://chat.example.com");
        assert_eq!(settings.ai_api_key, "sk-or-1");
        assert_eq!(settings.translate_language, "fr");
        assert_eq!(settings.ai_endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(*SettingsStore::new(path).settings(), AppSettings::default());
    }

    #[test]
    fn language_change_persists_and_swaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        let live = store.set_translate_language("  te ").unwrap();

        assert_eq!(live.translate_language, "te");
        assert_eq!(store.settings().translate_language, "te");
        assert!(!path.with_extension("json.tmp").exists());
        let reloaded = SettingsStore::new(path).settings();
        assert_eq!(reloaded.translate_language, "te");
    }

    #[test]
    fn language_change_keeps_other_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{"realtime_endpoint":"http://relay.local:7000/"}"#).unwrap();
        let store = SettingsStore::new(path.clone());

        store.set_translate_language("fr").unwrap();

        let reloaded = SettingsStore::new(path).settings();
        assert_eq!(reloaded.realtime_endpoint(), "http://relay.local:7000");
        assert_eq!(reloaded.translate_language, "fr");
    }

    #[test]
    fn environment_overrides_file_and_fallback_fills_blank_key() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"{"ai_model":"file/model","translate_language":"fr"}"#,
            )?;
            jail.set_env("SMARTCHAT_AI_MODEL", "env/model");
            jail.set_env(FALLBACK_API_KEY_VAR, "sk-fallback");
            let path = jail.directory().join(SETTINGS_FILE_NAME);

            let settings = SettingsStore::load_from(path.clone()).settings();
            assert_eq!(settings.ai_model, "env/model");
            assert_eq!(settings.translate_language, "fr");
            assert_eq!(settings.ai_api_key, "sk-fallback");

            jail.set_env("SMARTCHAT_AI_API_KEY", "sk-prefixed");
            let settings = SettingsStore::load_from(path).settings();
            assert_eq!(settings.ai_api_key, "sk-prefixed");
            Ok(())
        });
    }

    #[test]
    fn environment_secrets_are_not_written_back() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("SMARTCHAT_AI_API_KEY", "sk-secret");
            let path = jail.directory().join(SETTINGS_FILE_NAME);
            let store = SettingsStore::load_from(path.clone());

            let live = store.set_translate_language("de").expect("language persisted");

            assert_eq!(live.ai_api_key, "sk-secret");
            let written = std::fs::read_to_string(&path).expect("settings file written");
            assert!(!written.contains("sk-secret"));
            Ok(())
        });
    }

    #[test]
    fn api_key_fallback_only_fills_blank_key() {
        let filled = AppSettings::default().with_api_key_fallback(Some("sk-env".to_string()));
        assert_eq!(filled.ai_api_key, "sk-env");

        let mut configured = AppSettings::default();
        configured.ai_api_key = "sk-file".to_string();
        let kept = configured.with_api_key_fallback(Some("sk-env".to_string()));
        assert_eq!(kept.ai_api_key, "sk-file");

        let still_blank = AppSettings::default().with_api_key_fallback(Some("   ".to_string()));
        assert!(!still_blank.has_api_key());
    }

    #[test]
    fn provider_config_carries_attribution_headers() {
        let mut settings = AppSettings::default();
        settings.ai_api_key = "sk".to_string();
        settings.ai_referer = "https://smartchat.local".to_string();

        let config = settings.to_provider_config();

        assert_eq!(config.provider_id, DEFAULT_PROVIDER_ID);
        assert_eq!(config.model_id, DEFAULT_MODEL);
        assert_eq!(config.app_title.as_deref(), Some(DEFAULT_APP_TITLE));
        assert_eq!(config.referer.as_deref(), Some("https://smartchat.local"));
    }
}
