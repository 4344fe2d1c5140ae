//! The push phase: sending pending mutations to the data layer.

use crate::http::HttpClient;
use crate::protocol::{BatchPushInfo, BatchPushRequest, BatchPushResponse, Mutation};
use parking_lot::Mutex;
use tracing::warn;

/// Sends pending mutations to the batch push endpoint.
///
/// Pushing is best-effort: implementations report the outcome in
/// [`BatchPushInfo`] and never fail the surrounding sync.
pub trait Pusher: Send + Sync {
    /// Pushes `pending` to `url`, authorized with the data-layer credential.
    fn push(
        &self,
        pending: &[Mutation],
        url: &str,
        data_layer_auth: &str,
        client_id: &str,
    ) -> BatchPushInfo;
}

impl<P: Pusher + ?Sized> Pusher for std::sync::Arc<P> {
    fn push(
        &self,
        pending: &[Mutation],
        url: &str,
        data_layer_auth: &str,
        client_id: &str,
    ) -> BatchPushInfo {
        (**self).push(pending, url, data_layer_auth, client_id)
    }
}

/// The default pusher: POSTs a [`BatchPushRequest`] as JSON.
pub struct HttpPusher<C: HttpClient> {
    client: C,
}

impl<C: HttpClient> HttpPusher<C> {
    /// Creates a pusher over the given HTTP client.
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: HttpClient> Pusher for HttpPusher<C> {
    fn push(
        &self,
        pending: &[Mutation],
        url: &str,
        data_layer_auth: &str,
        client_id: &str,
    ) -> BatchPushInfo {
        let mut info = BatchPushInfo::default();

        let request = BatchPushRequest {
            client_id: client_id.to_string(),
            mutations: pending.to_vec(),
        };
        let body = match serde_json::to_vec(&request) {
            Ok(body) => body,
            Err(e) => {
                info.error_message = format!("during request to {url}: {e}");
                return info;
            }
        };

        let response = match self.client.post(url, data_layer_auth, body) {
            Ok(response) => response,
            Err(e) => {
                // Transport failure: status stays 0, sync continues.
                warn!(url, error = %e, "batch push failed");
                info.error_message = format!("during request to {url}: {e}");
                return info;
            }
        };

        info.http_status_code = response.status;
        if response.status == 200 {
            match serde_json::from_slice::<BatchPushResponse>(&response.body) {
                Ok(parsed) => info.batch_push_response = parsed,
                Err(e) => {
                    info.error_message = format!("error decoding batch push response: {e}");
                }
            }
        } else {
            info.error_message = String::from_utf8_lossy(&response.body).into_owned();
        }

        info
    }
}

/// An in-memory pusher for tests.
///
/// Records every request and answers with a configured [`BatchPushInfo`].
#[derive(Default)]
pub struct FakePusher {
    response: Mutex<BatchPushInfo>,
    requests: Mutex<Vec<BatchPushRequest>>,
}

impl FakePusher {
    /// Creates a fake pusher answering with a successful empty response.
    #[must_use]
    pub fn new() -> Self {
        Self {
            response: Mutex::new(BatchPushInfo {
                http_status_code: 200,
                ..BatchPushInfo::default()
            }),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sets the push outcome.
    pub fn set_response(&self, response: BatchPushInfo) {
        *self.response.lock() = response;
    }

    /// Returns every request pushed so far.
    #[must_use]
    pub fn requests(&self) -> Vec<BatchPushRequest> {
        self.requests.lock().clone()
    }
}

impl Pusher for FakePusher {
    fn push(
        &self,
        pending: &[Mutation],
        _url: &str,
        _data_layer_auth: &str,
        client_id: &str,
    ) -> BatchPushInfo {
        self.requests.lock().push(BatchPushRequest {
            client_id: client_id.to_string(),
            mutations: pending.to_vec(),
        });
        self.response.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use parking_lot::Mutex as PMutex;

    struct ScriptedClient {
        result: PMutex<Result<HttpResponse, String>>,
        seen_auth: PMutex<Option<String>>,
    }

    impl ScriptedClient {
        fn new(result: Result<HttpResponse, String>) -> Self {
            Self {
                result: PMutex::new(result),
                seen_auth: PMutex::new(None),
            }
        }
    }

    impl HttpClient for ScriptedClient {
        fn post(
            &self,
            _url: &str,
            authorization: &str,
            _body: Vec<u8>,
        ) -> Result<HttpResponse, String> {
            *self.seen_auth.lock() = Some(authorization.to_string());
            self.result.lock().clone()
        }
    }

    fn mutations() -> Vec<Mutation> {
        vec![Mutation {
            id: 1,
            name: "setValue".into(),
            args: serde_json::json!(["k", 1]),
        }]
    }

    #[test]
    fn push_success_parses_response() {
        let client = ScriptedClient::new(Ok(HttpResponse {
            status: 200,
            body: br#"{"mutationInfos":[{"id":1,"error":"boom"}]}"#.to_vec(),
        }));
        let pusher = HttpPusher::new(client);

        let info = pusher.push(&mutations(), "http://dl/push", "auth-token", "c1");
        assert_eq!(info.http_status_code, 200);
        assert!(info.error_message.is_empty());
        assert_eq!(info.batch_push_response.mutation_infos.len(), 1);
        assert_eq!(info.batch_push_response.mutation_infos[0].error, "boom");
    }

    #[test]
    fn push_sends_data_layer_auth() {
        let client = ScriptedClient::new(Ok(HttpResponse {
            status: 200,
            body: b"{}".to_vec(),
        }));
        let pusher = HttpPusher::new(client);
        pusher.push(&mutations(), "http://dl/push", "dl-secret", "c1");
        assert_eq!(
            pusher.client.seen_auth.lock().as_deref(),
            Some("dl-secret")
        );
    }

    #[test]
    fn push_transport_failure_is_captured() {
        let client = ScriptedClient::new(Err("connection refused".into()));
        let pusher = HttpPusher::new(client);

        let info = pusher.push(&mutations(), "http://dl/push", "auth", "c1");
        assert_eq!(info.http_status_code, 0);
        assert!(info.error_message.contains("connection refused"));
        assert!(info.error_message.contains("http://dl/push"));
    }

    #[test]
    fn push_non_200_captures_body() {
        let client = ScriptedClient::new(Ok(HttpResponse {
            status: 403,
            body: b"no thanks".to_vec(),
        }));
        let pusher = HttpPusher::new(client);

        let info = pusher.push(&mutations(), "http://dl/push", "auth", "c1");
        assert_eq!(info.http_status_code, 403);
        assert_eq!(info.error_message, "no thanks");
    }

    #[test]
    fn push_garbage_200_body_is_an_error_message() {
        let client = ScriptedClient::new(Ok(HttpResponse {
            status: 200,
            body: b"not json".to_vec(),
        }));
        let pusher = HttpPusher::new(client);

        let info = pusher.push(&mutations(), "http://dl/push", "auth", "c1");
        assert_eq!(info.http_status_code, 200);
        assert!(info.error_message.contains("decoding batch push response"));
    }

    #[test]
    fn fake_pusher_records_requests() {
        let fake = FakePusher::new();
        fake.push(&mutations(), "http://x", "a", "client-9");
        let requests = fake.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].client_id, "client-9");
        assert_eq!(requests[0].mutations.len(), 1);
    }
}
