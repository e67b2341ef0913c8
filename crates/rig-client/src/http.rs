//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "JSON-over-HTTP transport for the remote server contract."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use crate::criteria::CriteriaQuery;
use crate::error::{RemoteError, RemoteResult};
use crate::model::{Configuration, Entity, EntityId, EntityKind, FileReference};
use crate::remote::{
    rpc, wire, AuthToken, ConfigurationScope, ContentUpload, EntityDraft, OperationStatus,
    OperationTarget, RemoteServer, UpdateReceipt, UpdateRequest,
};

/// Talks to a server exposing `POST <endpoint>/rpc/<call>` routes.
///
/// Failures reported by the server arrive as a serialized [`RemoteError`]
/// body. Connection failures map to [`RemoteError::Unavailable`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(mut endpoint: Url, request_timeout: Duration) -> RemoteResult<Self> {
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| RemoteError::Internal(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base: endpoint,
        })
    }

    fn route(&self, call: &str) -> RemoteResult<Url> {
        self.base
            .join(&format!("rpc/{call}"))
            .map_err(|err| RemoteError::Internal(format!("invalid route {call}: {err}")))
    }

    #[instrument(level = "debug", skip(self, token, body), fields(endpoint = %self.base))]
    async fn call<B, R>(&self, call: &str, token: Option<&AuthToken>, body: &B) -> RemoteResult<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(self.route(call)?).json(body);
        if let Some(token) = token {
            request = request.header(rpc::TOKEN_HEADER, token.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;
        let status = response.status();
        debug!(%status, "remote call completed");

        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|err| RemoteError::Internal(format!("malformed response: {err}")));
        }

        let raw = response
            .text()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;
        Err(decode_error(status, &raw))
    }
}

fn decode_error(status: StatusCode, raw: &str) -> RemoteError {
    if let Ok(err) = serde_json::from_str::<RemoteError>(raw) {
        return err;
    }
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::InvalidToken,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            RemoteError::Unavailable(format!("{status}: {raw}"))
        }
        StatusCode::CONFLICT => RemoteError::Conflict(raw.to_owned()),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            RemoteError::Validation(raw.to_owned())
        }
        _ => RemoteError::Internal(format!("{status}: {raw}")),
    }
}

#[async_trait]
impl RemoteServer for HttpTransport {
    fn describe(&self) -> String {
        self.base.to_string()
    }

    async fn authenticate(&self, username: &str, password: &str) -> RemoteResult<AuthToken> {
        let body = wire::LoginRequest {
            username: username.to_owned(),
            password: password.to_owned(),
        };
        let response: wire::LoginResponse = self.call(rpc::AUTHENTICATE, None, &body).await?;
        Ok(response.token)
    }

    async fn invalidate(&self, token: &AuthToken) -> RemoteResult<()> {
        self.call(rpc::INVALIDATE, Some(token), &()).await
    }

    async fn find(&self, token: &AuthToken, query: &CriteriaQuery) -> RemoteResult<Vec<Entity>> {
        self.call(rpc::FIND, Some(token), query).await
    }

    async fn create(&self, token: &AuthToken, draft: &EntityDraft) -> RemoteResult<Entity> {
        self.call(rpc::CREATE, Some(token), draft).await
    }

    async fn update(
        &self,
        token: &AuthToken,
        request: &UpdateRequest,
    ) -> RemoteResult<UpdateReceipt> {
        self.call(rpc::UPDATE, Some(token), request).await
    }

    async fn delete(&self, token: &AuthToken, kind: EntityKind, id: EntityId) -> RemoteResult<()> {
        self.call(rpc::DELETE, Some(token), &wire::DeleteRequest { kind, id })
            .await
    }

    async fn fetch_configuration(
        &self,
        token: &AuthToken,
        resource_id: EntityId,
        scope: ConfigurationScope,
    ) -> RemoteResult<Configuration> {
        let body = wire::ConfigurationRequest { resource_id, scope };
        self.call(rpc::FETCH_CONFIGURATION, Some(token), &body).await
    }

    async fn operation_status(
        &self,
        token: &AuthToken,
        target: OperationTarget,
    ) -> RemoteResult<OperationStatus> {
        self.call(rpc::OPERATION_STATUS, Some(token), &wire::StatusRequest { target })
            .await
    }

    async fn upload(
        &self,
        token: &AuthToken,
        upload: &ContentUpload,
    ) -> RemoteResult<FileReference> {
        self.call(rpc::UPLOAD, Some(token), upload).await
    }
}
