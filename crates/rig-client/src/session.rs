//! ---
//! rig_section: "05-remote-interfaces"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Authenticated session shared by every proxy of a run."
//! rig_version: "v0.0.0-prealpha"
//! rig_owner: "tbd"
//! ---
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult, RemoteError, RemoteResult};
use crate::remote::{AuthToken, RemoteServer};

/// Username and password for one server account.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

struct SessionInner {
    server: Arc<dyn RemoteServer>,
    endpoint: String,
    credentials: Credentials,
    token: RwLock<Option<AuthToken>>,
    established_at: RwLock<DateTime<Utc>>,
    run_active: AtomicBool,
}

/// Authenticated connection to the remote server.
///
/// Cloning is cheap and every clone shares the same token, so proxies built
/// from one session all act as the same user. A session drives at most one
/// run at a time; see [`Session::begin_run`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.inner.endpoint)
            .field("user", &self.inner.credentials.username)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Session {
    /// Authenticate against `server`.
    ///
    /// Rejected credentials and an unreachable server both surface as
    /// [`ClientError::Authentication`].
    pub async fn login(
        server: Arc<dyn RemoteServer>,
        credentials: Credentials,
    ) -> ClientResult<Self> {
        let endpoint = server.describe();
        let token = authenticate(server.as_ref(), &credentials).await?;
        info!(endpoint = %endpoint, user = %credentials.username, "session established");
        Ok(Self {
            inner: Arc::new(SessionInner {
                server,
                endpoint,
                credentials,
                token: RwLock::new(Some(token)),
                established_at: RwLock::new(Utc::now()),
                run_active: AtomicBool::new(false),
            }),
        })
    }

    /// Invalidate the token. Calling it twice is harmless.
    pub async fn logout(&self) -> ClientResult<()> {
        let token = self.inner.token.write().take();
        let Some(token) = token else {
            debug!(user = %self.username(), "logout on inactive session");
            return Ok(());
        };
        match self.inner.server.invalidate(&token).await {
            Ok(()) | Err(RemoteError::InvalidToken) => {
                info!(user = %self.username(), "session closed");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replace the token with a fresh one using the stored credentials.
    pub async fn relogin(&self) -> ClientResult<()> {
        let token = authenticate(self.inner.server.as_ref(), &self.inner.credentials).await?;
        *self.inner.token.write() = Some(token);
        *self.inner.established_at.write() = Utc::now();
        warn!(user = %self.username(), "session re-established");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.inner.token.read().is_some()
    }

    pub fn username(&self) -> &str {
        &self.inner.credentials.username
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        *self.inner.established_at.read()
    }

    /// Current token, or [`ClientError::SessionExpired`] after logout.
    pub fn token(&self) -> ClientResult<AuthToken> {
        self.inner
            .token
            .read()
            .clone()
            .ok_or(ClientError::SessionExpired)
    }

    /// Bind the session to a run. Fails with [`ClientError::SessionInUse`]
    /// while another lease is alive.
    pub fn begin_run(&self) -> ClientResult<RunLease> {
        self.inner
            .run_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClientError::SessionInUse)?;
        Ok(RunLease {
            session: self.clone(),
        })
    }

    /// Issue one authenticated call.
    pub(crate) async fn call<T, F, Fut>(&self, name: &'static str, call: F) -> ClientResult<T>
    where
        F: FnOnce(Arc<dyn RemoteServer>, AuthToken) -> Fut + Send,
        Fut: Future<Output = RemoteResult<T>> + Send,
        T: Send,
    {
        let token = self.token()?;
        let started = Instant::now();
        let result = call(self.inner.server.clone(), token).await;
        debug!(
            call = name,
            user = %self.username(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "remote call"
        );
        result.map_err(ClientError::from)
    }
}

/// Marks a session as driving a run; released on drop.
#[derive(Debug)]
pub struct RunLease {
    session: Session,
}

impl RunLease {
    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        self.session.inner.run_active.store(false, Ordering::Release);
    }
}

async fn authenticate(
    server: &dyn RemoteServer,
    credentials: &Credentials,
) -> ClientResult<AuthToken> {
    server
        .authenticate(&credentials.username, &credentials.password)
        .await
        .map_err(|err| match err {
            RemoteError::Unavailable(reason) => {
                ClientError::Authentication(format!("server unreachable: {reason}"))
            }
            other => ClientError::from(other),
        })
}
