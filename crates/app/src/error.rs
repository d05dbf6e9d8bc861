use smartchat_llm::ProviderError;
use smartchat_transport::BackendError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("AI gateway could not start on `{stage}`: {source}"))]
    Gateway {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("backend client could not start on `{stage}`: {source}"))]
    Backend {
        stage: &'static str,
        source: BackendError,
    },
    #[snafu(display("failed to read terminal input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write terminal output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;
