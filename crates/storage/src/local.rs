use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use super::error::{
    CreateStateDirectorySnafu, DecodeStateSnafu, EncodeStateSnafu, ReadStateSnafu,
    RemoveStateSnafu, ReplaceStateSnafu, StorageResult, WriteStateSnafu,
};
use super::types::{SESSION_STATE_KEY, SessionRecord};
use super::SessionStore;

pub const STATE_DIRECTORY_NAME: &str = "smartchat";

/// Session record persisted as one JSON document named after [`SESSION_STATE_KEY`].
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn default_state_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|path| path.join(STATE_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".smartchat"))
    }

    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let path = state_dir
            .into()
            .join(format!("{SESSION_STATE_KEY}.json"));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileSessionStore {
    fn default() -> Self {
        Self::new(Self::default_state_dir())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> StorageResult<Option<SessionRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = ?self.path, "no persisted session");
                return Ok(None);
            }
            Err(source) => {
                return Err(source).context(ReadStateSnafu {
                    stage: "load-session-read",
                    path: self.path.clone(),
                });
            }
        };

        let record = serde_json::from_str::<SessionRecord>(&content).context(DecodeStateSnafu {
            stage: "load-session-decode",
            path: self.path.clone(),
        })?;
        Ok(Some(record))
    }

    fn save(&self, record: &SessionRecord) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context(CreateStateDirectorySnafu {
                stage: "save-session-create-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string(record).context(EncodeStateSnafu {
            stage: "save-session-encode",
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteStateSnafu {
            stage: "save-session-write-temporary",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.path).context(ReplaceStateSnafu {
            stage: "save-session-rename-temporary",
            from: temp_path,
            to: self.path.clone(),
        })?;

        tracing::info!(path = ?self.path, user_id = %record.id, "persisted session");
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = ?self.path, "cleared persisted session");
                Ok(())
            }
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(source).context(RemoveStateSnafu {
                stage: "clear-session-remove",
                path: self.path.clone(),
            }),
        }
    }
}
