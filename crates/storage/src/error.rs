use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("storage id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
    #[snafu(display("failed to create local state directory at {path:?}"))]
    CreateStateDirectory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to read local state from {path:?} on `{stage}`: {source}"))]
    ReadState {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("local state at {path:?} is not a valid session record: {source}"))]
    DecodeState {
        stage: &'static str,
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("failed to encode session record on `{stage}`: {source}"))]
    EncodeState {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write local state at {path:?} on `{stage}`: {source}"))]
    WriteState {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace local state from {from:?} to {to:?} on `{stage}`: {source}"))]
    ReplaceState {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to remove local state at {path:?} on `{stage}`: {source}"))]
    RemoveState {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;
