//! The pull phase: fetching a new snapshot patch from the diff server.

use crate::error::{SyncError, SyncResult};
use crate::http::HttpClient;
use crate::protocol::{PullRequest, PullResponse};
use parking_lot::Mutex;
use tracing::debug;

/// Fetches a patch from the diff server.
///
/// Unlike pushing, any pull failure is fatal to the surrounding sync.
pub trait Puller: Send + Sync {
    /// POSTs `request` to `url`, authorized with the diff-server credential.
    fn pull(&self, request: &PullRequest, url: &str, diff_server_auth: &str)
        -> SyncResult<PullResponse>;
}

impl<P: Puller + ?Sized> Puller for std::sync::Arc<P> {
    fn pull(
        &self,
        request: &PullRequest,
        url: &str,
        diff_server_auth: &str,
    ) -> SyncResult<PullResponse> {
        (**self).pull(request, url, diff_server_auth)
    }
}

/// The default puller: POSTs a [`PullRequest`] as JSON.
pub struct HttpPuller<C: HttpClient> {
    client: C,
}

impl<C: HttpClient> HttpPuller<C> {
    /// Creates a puller over the given HTTP client.
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: HttpClient> Puller for HttpPuller<C> {
    fn pull(
        &self,
        request: &PullRequest,
        url: &str,
        diff_server_auth: &str,
    ) -> SyncResult<PullResponse> {
        debug!(url, base_state_id = %request.base_state_id, "pulling");

        let body =
            serde_json::to_vec(request).map_err(|e| SyncError::invalid_response(e.to_string()))?;

        let response = self
            .client
            .post(url, diff_server_auth, body)
            .map_err(SyncError::transport)?;

        if response.status != 200 {
            return Err(SyncError::PullStatus {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        serde_json::from_slice(&response.body).map_err(|e| {
            SyncError::invalid_response(format!("response from {url} is not valid JSON: {e}"))
        })
    }
}

/// An in-memory puller for tests.
///
/// Records every request and answers with a scripted result.
#[derive(Default)]
pub struct FakePuller {
    response: Mutex<Option<PullResponse>>,
    error: Mutex<Option<String>>,
    requests: Mutex<Vec<PullRequest>>,
}

impl FakePuller {
    /// Creates a fake puller with no scripted response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful pull response.
    pub fn set_response(&self, response: PullResponse) {
        *self.response.lock() = Some(response);
        *self.error.lock() = None;
    }

    /// Scripts a transport failure.
    pub fn set_transport_error(&self, message: impl Into<String>) {
        *self.error.lock() = Some(message.into());
    }

    /// Returns every pull request seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<PullRequest> {
        self.requests.lock().clone()
    }
}

impl Puller for FakePuller {
    fn pull(
        &self,
        request: &PullRequest,
        _url: &str,
        _diff_server_auth: &str,
    ) -> SyncResult<PullResponse> {
        self.requests.lock().push(request.clone());
        if let Some(message) = self.error.lock().clone() {
            return Err(SyncError::transport(message));
        }
        self.response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::invalid_response("no fake pull response set"))
    }
}
