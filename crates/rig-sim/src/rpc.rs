//! ---
//! rig_section: "11-simulation"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "HTTP front-end exposing a RemoteServer over JSON remote calls."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use rig_client::remote::{rpc, wire};
use rig_client::{
    AuthToken, Configuration, ContentUpload, CriteriaQuery, Entity, EntityDraft, FileReference,
    OperationStatus, RemoteError, RemoteServer, UpdateReceipt, UpdateRequest,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

type Backend = Arc<dyn RemoteServer>;

/// Serves `POST /rpc/<call>` routes backed by any [`RemoteServer`].
#[derive(Clone)]
pub struct RpcServer {
    listen: SocketAddr,
    backend: Backend,
}

impl RpcServer {
    pub fn new(listen: SocketAddr, backend: Backend) -> Self {
        Self { listen, backend }
    }

    fn router(backend: Backend) -> Router {
        let route = |call: &str| format!("/rpc/{call}");
        Router::new()
            .route(&route(rpc::AUTHENTICATE), post(authenticate))
            .route(&route(rpc::INVALIDATE), post(invalidate))
            .route(&route(rpc::FIND), post(find))
            .route(&route(rpc::CREATE), post(create))
            .route(&route(rpc::UPDATE), post(update))
            .route(&route(rpc::DELETE), post(delete))
            .route(&route(rpc::FETCH_CONFIGURATION), post(fetch_configuration))
            .route(&route(rpc::OPERATION_STATUS), post(operation_status))
            .route(&route(rpc::UPLOAD), post(upload))
            .layer(TraceLayer::new_for_http())
            .with_state(backend)
    }

    /// Bind and serve in the background.
    pub async fn spawn(self) -> anyhow::Result<RpcServerHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let address = listener.local_addr()?;
        info!(address = %address, backend = %self.backend.describe(), "rpc server listening");

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, Self::router(self.backend)).with_graceful_shutdown(
            async move {
                let _ = shutdown_rx.changed().await;
            },
        );
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "rpc server exited with error");
            }
        });

        Ok(RpcServerHandle {
            address,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Running server; shut it down with [`RpcServerHandle::shutdown`].
pub struct RpcServerHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl RpcServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Base URL clients should use as their endpoint.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.address)
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|join| anyhow::anyhow!(join))
    }
}

struct RpcError(RemoteError);

impl From<RemoteError> for RpcError {
    fn from(err: RemoteError) -> Self {
        RpcError(err)
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RemoteError::Unauthenticated(_) | RemoteError::InvalidToken => StatusCode::UNAUTHORIZED,
            RemoteError::Validation(_) => StatusCode::BAD_REQUEST,
            RemoteError::Conflict(_) => StatusCode::CONFLICT,
            RemoteError::NotFound { .. } => StatusCode::NOT_FOUND,
            RemoteError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RemoteError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self.0)).into_response()
    }
}

type RpcResult<T> = Result<Json<T>, RpcError>;

fn token(headers: &HeaderMap) -> Result<AuthToken, RpcError> {
    headers
        .get(rpc::TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(AuthToken::new)
        .ok_or(RpcError(RemoteError::InvalidToken))
}

async fn authenticate(
    State(backend): State<Backend>,
    Json(body): Json<wire::LoginRequest>,
) -> RpcResult<wire::LoginResponse> {
    let token = backend.authenticate(&body.username, &body.password).await?;
    Ok(Json(wire::LoginResponse { token }))
}

async fn invalidate(State(backend): State<Backend>, headers: HeaderMap) -> RpcResult<()> {
    backend.invalidate(&token(&headers)?).await?;
    Ok(Json(()))
}

async fn find(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(query): Json<CriteriaQuery>,
) -> RpcResult<Vec<Entity>> {
    Ok(Json(backend.find(&token(&headers)?, &query).await?))
}

async fn create(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(draft): Json<EntityDraft>,
) -> RpcResult<Entity> {
    Ok(Json(backend.create(&token(&headers)?, &draft).await?))
}

async fn update(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(request): Json<UpdateRequest>,
) -> RpcResult<UpdateReceipt> {
    Ok(Json(backend.update(&token(&headers)?, &request).await?))
}

async fn delete(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(request): Json<wire::DeleteRequest>,
) -> RpcResult<()> {
    backend
        .delete(&token(&headers)?, request.kind, request.id)
        .await?;
    Ok(Json(()))
}

async fn fetch_configuration(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(request): Json<wire::ConfigurationRequest>,
) -> RpcResult<Configuration> {
    Ok(Json(
        backend
            .fetch_configuration(&token(&headers)?, request.resource_id, request.scope)
            .await?,
    ))
}

async fn operation_status(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(request): Json<wire::StatusRequest>,
) -> RpcResult<OperationStatus> {
    Ok(Json(
        backend
            .operation_status(&token(&headers)?, request.target)
            .await?,
    ))
}

async fn upload(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(upload): Json<ContentUpload>,
) -> RpcResult<FileReference> {
    Ok(Json(backend.upload(&token(&headers)?, &upload).await?))
}
