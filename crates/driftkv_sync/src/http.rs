//! HTTP client abstraction for the default pusher and puller.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;

/// Enough time to move ~4 MB over a slow mobile link.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// A minimal HTTP POST client.
///
/// Implement this to swap the HTTP stack or to fake remote endpoints in
/// tests. Errors are transport-level only; a non-2xx status is returned as
/// a normal [`HttpResponse`].
pub trait HttpClient: Send + Sync {
    /// POSTs a JSON body with an `Authorization` header.
    fn post(&self, url: &str, authorization: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

/// The default blocking HTTP client.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client with the engine's request timeout.
    pub fn new() -> SyncResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, url: &str, authorization: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse { status, body })
    }
}
