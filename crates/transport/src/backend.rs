use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use smartchat_storage::{SessionRecord, UserId};
use snafu::{OptionExt, ResultExt, ensure};

use super::error::{
    BackendResult, BuildClientSnafu, DecodeBodySnafu, IncompleteBodySnafu, RequestSnafu,
    UnexpectedStatusSnafu,
};
use super::types::{Contact, HistoryEntry, HistoryQuery, LoginRequest, PersistRequest};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const LOGIN_ROUTE: &str = "/api/auth/login";
pub const CONTACTS_ROUTE: &str = "/api/auth/allusers";
pub const HISTORY_ROUTE: &str = "/api/messages/getmsg";
pub const PERSIST_ROUTE: &str = "/api/messages/addmsg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Accepted(SessionRecord),
    /// The server's own explanation, shown to the user verbatim.
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    status: bool,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    user: Option<SessionRecord>,
}

/// REST collaborator that owns users and stored messages.
pub trait ChatBackend: Send + Sync {
    fn login<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, BackendResult<LoginOutcome>>;

    fn fetch_contacts<'a>(&'a self, self_id: &'a UserId) -> BoxFuture<'a, BackendResult<Vec<Contact>>>;

    fn fetch_history<'a>(
        &'a self,
        self_id: &'a UserId,
        peer_id: &'a UserId,
    ) -> BoxFuture<'a, BackendResult<Vec<HistoryEntry>>>;

    /// Stores a sent message; the acknowledgement body is not inspected.
    fn persist_message<'a>(
        &'a self,
        from: &'a UserId,
        to: &'a UserId,
        text: &'a str,
    ) -> BoxFuture<'a, BackendResult<()>>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    host: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(host: impl Into<String>) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("smartchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .context(BuildClientSnafu {
                stage: "build-backend-client",
            })?;

        Ok(Self {
            host: host.into().trim().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.host)
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
        route: &str,
        stage: &'static str,
    ) -> BackendResult<T> {
        let status = response.status();
        ensure!(
            status.is_success(),
            UnexpectedStatusSnafu {
                stage,
                route: route.to_string(),
                status: status.as_u16(),
            }
        );

        response.json::<T>().await.context(DecodeBodySnafu {
            stage,
            route: route.to_string(),
        })
    }
}

impl ChatBackend for HttpBackend {
    fn login<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, BackendResult<LoginOutcome>> {
        Box::pin(async move {
            let body = LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            };
            let response = self
                .client
                .post(self.url(LOGIN_ROUTE))
                .json(&body)
                .send()
                .await
                .context(RequestSnafu {
                    stage: "login",
                    route: LOGIN_ROUTE,
                })?;
            let reply: LoginResponse = Self::read_json(response, LOGIN_ROUTE, "login").await?;

            if !reply.status {
                return Ok(LoginOutcome::Rejected(reply.msg.unwrap_or_default()));
            }
            let user = reply.user.context(IncompleteBodySnafu {
                stage: "login",
                route: LOGIN_ROUTE,
                details: "status=true without a user document",
            })?;
            Ok(LoginOutcome::Accepted(user))
        })
    }

    fn fetch_contacts<'a>(&'a self, self_id: &'a UserId) -> BoxFuture<'a, BackendResult<Vec<Contact>>> {
        Box::pin(async move {
            let route = format!("{CONTACTS_ROUTE}/{self_id}");
            let response = self
                .client
                .get(self.url(&route))
                .send()
                .await
                .context(RequestSnafu {
                    stage: "fetch-contacts",
                    route: route.clone(),
                })?;
            Self::read_json(response, &route, "fetch-contacts").await
        })
    }

    fn fetch_history<'a>(
        &'a self,
        self_id: &'a UserId,
        peer_id: &'a UserId,
    ) -> BoxFuture<'a, BackendResult<Vec<HistoryEntry>>> {
        Box::pin(async move {
            let query = HistoryQuery {
                from: self_id.clone(),
                to: peer_id.clone(),
            };
            let response = self
                .client
                .post(self.url(HISTORY_ROUTE))
                .json(&query)
                .send()
                .await
                .context(RequestSnafu {
                    stage: "fetch-history",
                    route: HISTORY_ROUTE,
                })?;
            Self::read_json(response, HISTORY_ROUTE, "fetch-history").await
        })
    }

    fn persist_message<'a>(
        &'a self,
        from: &'a UserId,
        to: &'a UserId,
        text: &'a str,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let body = PersistRequest {
                from: from.clone(),
                to: to.clone(),
                message: text.to_string(),
            };
            let response = self
                .client
                .post(self.url(PERSIST_ROUTE))
                .json(&body)
                .send()
                .await
                .context(RequestSnafu {
                    stage: "persist-message",
                    route: PERSIST_ROUTE,
                })?;
            let status = response.status();
            ensure!(
                status.is_success(),
                UnexpectedStatusSnafu {
                    stage: "persist-message",
                    route: PERSIST_ROUTE,
                    status: status.as_u16(),
                }
            );
            Ok(())
        })
    }
}
