//! Delivery of a single webhook execution

use crate::headers::{
    RESPONSE_BODY_BYTES_LIMIT, RESPONSE_HEADERS_BYTES_LIMIT, truncate_bytes, write_headers,
};
use crate::{
    Encrypter, HttpClients, ResolveError, Result, TriggerResult, UrlProvider, Webhook,
    WebhookConfig, WebhookError, WebhookExecution, WebhookExecutionResult, WebhookExecutionStore,
    WebhookSignature, WebhookStore, WebhookTrigger,
};
use chrono::Utc;
use futures::FutureExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::warn;
use url::Url;

/// A payload that can be JSON encoded for delivery
pub trait JsonPayload: Send + Sync {
    /// Encode as JSON followed by a newline
    fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T: Serialize + Send + Sync + ?Sized> JsonPayload for T {
    fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Body of a delivery
#[derive(Clone, Copy)]
pub enum RequestBody<'a> {
    /// Serialized to JSON before sending
    Payload(&'a dyn JsonPayload),

    /// Sent as-is; used to replay a stored request
    Raw(&'a [u8]),
}

/// Builds, sends and records webhook deliveries
pub struct DeliveryExecutor {
    config: WebhookConfig,
    clients: HttpClients,
    webhook_store: Arc<dyn WebhookStore>,
    execution_store: Arc<dyn WebhookExecutionStore>,
    url_provider: Arc<dyn UrlProvider>,
    encrypter: Arc<dyn Encrypter>,
}

impl DeliveryExecutor {
    pub fn new(
        config: WebhookConfig,
        webhook_store: Arc<dyn WebhookStore>,
        execution_store: Arc<dyn WebhookExecutionStore>,
        url_provider: Arc<dyn UrlProvider>,
        encrypter: Arc<dyn Encrypter>,
    ) -> Result<Self> {
        config.validate()?;
        let clients = HttpClients::new(&config)?;
        Ok(Self {
            config,
            clients,
            webhook_store,
            execution_store,
            url_provider,
            encrypter,
        })
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Deliver `body` to the webhook and persist exactly one execution record.
    ///
    /// The record is written on every exit path, panics included; a panic is resumed
    /// once the record is stored.
    pub async fn execute(
        &self,
        webhook: &Webhook,
        trigger_id: &str,
        trigger_type: WebhookTrigger,
        body: RequestBody<'_>,
        retrigger_of: Option<i64>,
    ) -> TriggerResult {
        let mut execution = WebhookExecution::new(webhook.id, trigger_id, trigger_type, retrigger_of);
        let started = Instant::now();

        let outcome = AssertUnwindSafe(self.deliver(&mut execution, webhook, trigger_type, body))
            .catch_unwind()
            .await;

        self.finalize(&mut execution, webhook, started).await;

        // failures are logged once per trigger by the dispatcher
        let error = match outcome {
            Ok(result) => result.err(),
            Err(panic) => std::panic::resume_unwind(panic),
        };

        TriggerResult::executed(trigger_id, trigger_type, webhook.clone(), execution, error)
    }

    async fn deliver(
        &self,
        execution: &mut WebhookExecution,
        webhook: &Webhook,
        trigger_type: WebhookTrigger,
        body: RequestBody<'_>,
    ) -> Result<()> {
        let time_limit = self.config.delivery_timeout;
        let deadline = Instant::now() + time_limit;

        let request = match timeout_at(
            deadline,
            self.prepare_request(execution, webhook, trigger_type, body),
        )
        .await
        {
            Ok(request) => request?,
            Err(_) => return Err(time_limit_exceeded(execution, time_limit)),
        };

        let client = self.clients.select(webhook.internal, webhook.insecure);
        if let Err(err) = client.policy().check_url(request.url()) {
            execution.fail(WebhookExecutionResult::FatalError, err.to_string());
            return Err(WebhookError::DestinationBlocked(err.to_string()));
        }

        let response = match timeout_at(deadline, client.http().execute(request)).await {
            Err(_) => return Err(time_limit_exceeded(execution, time_limit)),
            Ok(Err(err)) => return Err(classify_transport_error(execution, err, time_limit)),
            Ok(Ok(response)) => response,
        };

        handle_response(execution, response, deadline).await
    }

    /// Build the outbound request and record it on the execution.
    ///
    /// The body is captured before the URL is parsed, so a bad URL still leaves a
    /// retriggerable execution behind.
    async fn prepare_request(
        &self,
        execution: &mut WebhookExecution,
        webhook: &Webhook,
        trigger_type: WebhookTrigger,
        body: RequestBody<'_>,
    ) -> Result<reqwest::Request> {
        let url = match self.url_provider.webhook_url(webhook).await {
            Ok(url) => url,
            Err(err) => {
                execution.fail(
                    WebhookExecutionResult::FatalError,
                    "webhook url is not resolvable",
                );
                return Err(WebhookError::UrlResolution(err.to_string()));
            }
        };
        execution.request.url = url.clone();

        // the stored body has to replay byte for byte, so it must be valid UTF-8
        let prepared = match body {
            RequestBody::Raw(raw) => String::from_utf8(raw.to_vec())
                .map_err(|e| format!("raw body is not valid utf-8: {}", e)),
            RequestBody::Payload(payload) => payload
                .to_json_bytes()
                .map_err(|e| format!("failed to serialize body to json: {}", e))
                .and_then(|bytes| {
                    String::from_utf8(bytes).map_err(|e| format!("json body is not valid utf-8: {}", e))
                }),
        };
        let body = match prepared {
            Ok(body) => body,
            Err(reason) => {
                // internal issue, don't expose the details
                execution.fail(
                    WebhookExecutionResult::FatalError,
                    "an error occurred preparing the request body",
                );
                return Err(WebhookError::PayloadError(reason));
            }
        };
        execution.request.body = body.clone();
        execution.retriggerable = true;

        let url = match Url::parse(&url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                return Err(request_build_failure(
                    execution,
                    format!("unsupported url scheme '{}'", url.scheme()),
                ));
            }
            Err(err) => return Err(request_build_failure(execution, err.to_string())),
        };

        let headers = self.request_headers(execution, webhook, trigger_type, body.as_bytes())?;
        execution.request.headers = write_headers(&headers);

        let mut request = reqwest::Request::new(Method::POST, url);
        *request.headers_mut() = headers;
        *request.body_mut() = Some(body.into());
        Ok(request)
    }

    fn request_headers(
        &self,
        execution: &mut WebhookExecution,
        webhook: &Webhook,
        trigger_type: WebhookTrigger,
        body: &[u8],
    ) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut custom: Vec<(HeaderName, String)> = vec![
            (USER_AGENT, self.config.user_agent()),
            (self.x_header(execution, "Trigger")?, trigger_type.to_string()),
            (
                self.x_header(execution, "Webhook-Parent-Type")?,
                webhook.parent_type.to_string(),
            ),
            (
                self.x_header(execution, "Webhook-Parent-Id")?,
                webhook.parent_id.to_string(),
            ),
            (
                self.x_header(execution, "Webhook-Identifier")?,
                webhook.identifier.clone(),
            ),
        ];

        // sign only if a secret was provided
        if webhook.has_secret() {
            let secret = match self.encrypter.decrypt(webhook.secret.as_bytes()) {
                Ok(secret) => secret,
                Err(err) => {
                    execution.fail(
                        WebhookExecutionResult::FatalError,
                        "failed to decrypt webhook secret",
                    );
                    return Err(WebhookError::Secret(format!(
                        "failed to decrypt webhook secret: {}",
                        err
                    )));
                }
            };
            let signature = WebhookSignature::new(secret).sign(body).inspect_err(|_| {
                execution.fail(
                    WebhookExecutionResult::FatalError,
                    "failed to sign the request body",
                );
            })?;
            custom.push((self.x_header(execution, "Signature")?, signature));
        }

        for (name, value) in custom {
            let value = match HeaderValue::from_str(&value) {
                Ok(value) => value,
                Err(_) => {
                    return Err(request_build_failure(
                        execution,
                        format!("invalid value for header '{}'", name),
                    ));
                }
            };
            headers.insert(name, value);
        }

        Ok(headers)
    }

    fn x_header(&self, execution: &mut WebhookExecution, name: &str) -> Result<HeaderName> {
        let header = self.config.x_header(name);
        HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
            request_build_failure(execution, format!("invalid header name '{}'", header))
        })
    }

    /// Stamp and persist the execution, then refresh the webhook's cached result.
    /// Failures are logged and never change the delivery outcome.
    async fn finalize(&self, execution: &mut WebhookExecution, webhook: &Webhook, started: Instant) {
        execution.duration = i64::try_from(started.elapsed().as_nanos()).unwrap_or(i64::MAX);
        execution.created = Utc::now().timestamp_millis();

        if let Err(err) = self.execution_store.create(execution).await {
            warn!(
                webhook_id = webhook.id,
                trigger_id = %execution.trigger_id,
                error = %err,
                "failed to store webhook execution that ended with result {}, response status '{}', error '{}'",
                execution.result,
                execution.response.status,
                execution.error
            );
        }

        if webhook.latest_execution_result == Some(execution.result) {
            return;
        }

        let result = execution.result;
        let mutate = move |hook: &mut Webhook| -> Result<()> {
            hook.latest_execution_result = Some(result);
            Ok(())
        };
        if let Err(err) = self.webhook_store.update_opt_lock(webhook, &mutate).await {
            warn!(
                webhook_id = webhook.id,
                error = %err,
                "failed to update latest execution result to {}",
                result
            );
        }
    }
}

impl std::fmt::Debug for DeliveryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn request_build_failure(execution: &mut WebhookExecution, message: String) -> WebhookError {
    execution.fail(
        WebhookExecutionResult::FatalError,
        format!("failed to create request: {}", message),
    );
    WebhookError::RequestBuild(message)
}

/// A target that doesn't respond in time is not retried
fn time_limit_exceeded(execution: &mut WebhookExecution, time_limit: Duration) -> WebhookError {
    let err = WebhookError::Timeout(time_limit);
    execution.fail(WebhookExecutionResult::FatalError, err.to_string());
    err
}

/// Classify a failure that happened before any response arrived. None of them are retried.
fn classify_transport_error(
    execution: &mut WebhookExecution,
    err: reqwest::Error,
    time_limit: Duration,
) -> WebhookError {
    if err.is_timeout() {
        return time_limit_exceeded(execution, time_limit);
    }

    match find_source::<ResolveError>(&err) {
        Some(ResolveError::NotFound(host)) => {
            let host = host.clone();
            execution.fail(
                WebhookExecutionResult::FatalError,
                format!("host '{}' was not found", host),
            );
            WebhookError::HostNotFound(host)
        }
        Some(blocked @ ResolveError::Blocked(_)) => {
            let message = blocked.to_string();
            execution.fail(WebhookExecutionResult::FatalError, message.clone());
            WebhookError::DestinationBlocked(message)
        }
        // failed lookups other than an unknown host are ordinary send failures
        Some(ResolveError::Lookup { .. }) | None => {
            execution.fail(
                WebhookExecutionResult::FatalError,
                format!("an error occurred while sending the request: {}", err),
            );
            WebhookError::HttpError(err)
        }
    }
}

fn find_source<'a, T: std::error::Error + 'static>(
    err: &'a (dyn std::error::Error + 'static),
) -> Option<&'a T> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<T>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

async fn handle_response(
    execution: &mut WebhookExecution,
    mut response: reqwest::Response,
    deadline: Instant,
) -> Result<()> {
    // store status first, classify once the body is read
    let status = response.status();
    execution.response.status_code = status.as_u16();
    execution.response.status = status_line(status);

    let headers = write_headers(response.headers());
    execution.response.headers = truncate_bytes(headers.as_bytes(), RESPONSE_HEADERS_BYTES_LIMIT);

    let body = match timeout_at(deadline, read_limited(&mut response, RESPONSE_BODY_BYTES_LIMIT)).await {
        Ok(Ok(body)) => body,
        Ok(Err(err)) => {
            return Err(response_read_failure(execution, err.to_string()));
        }
        Err(_) => {
            return Err(response_read_failure(
                execution,
                "time limit exceeded".to_string(),
            ));
        }
    };
    execution.response.body = truncate_bytes(&body, RESPONSE_BODY_BYTES_LIMIT);
    // dropping the response closes the connection
    drop(response);

    let code = status.as_u16();
    match classify_status(code) {
        (WebhookExecutionResult::Success, _) => {
            execution.succeed();
            Ok(())
        }
        (result, message) => {
            execution.fail(result, message);
            Err(WebhookError::Response {
                status: code,
                message: message.to_string(),
            })
        }
    }
}

fn response_read_failure(execution: &mut WebhookExecution, reason: String) -> WebhookError {
    let message = format!("an error occurred while reading the response body: {}", reason);
    execution.fail(WebhookExecutionResult::RetriableError, message.clone());
    WebhookError::ResponseRead(message)
}

/// Read at most `limit` bytes of the body
async fn read_limited(response: &mut reqwest::Response, limit: usize) -> reqwest::Result<Vec<u8>> {
    let mut body = Vec::new();
    while body.len() < limit {
        match response.chunk().await? {
            Some(chunk) => {
                let take = (limit - body.len()).min(chunk.len());
                body.extend_from_slice(&chunk[..take]);
            }
            None => break,
        }
    }
    Ok(body)
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

/// Map a response status code to an execution result and error message.
///
/// Checks are evaluated in order; the first match wins.
pub fn classify_status(code: u16) -> (WebhookExecutionResult, &'static str) {
    use WebhookExecutionResult::{FatalError, RetriableError, Success};

    match code {
        c if c < 200 => (FatalError, "1xx response codes are not supported"),
        c if c < 300 => (Success, ""),
        // redirects are not followed
        c if c < 400 => (FatalError, "3xx response codes are not supported"),
        408 => (RetriableError, "request timed out"),
        429 => (RetriableError, "request got throttled"),
        c if c < 500 => (
            FatalError,
            "4xx response codes are not supported (apart from 408 and 429)",
        ),
        501 => (FatalError, "remote server does not implement requested action"),
        c if c < 600 => (RetriableError, "remote server encountered an error"),
        _ => (FatalError, "response code not supported"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WebhookExecutionResult::{FatalError, RetriableError, Success};

    #[test]
    fn test_classify_status_boundaries() {
        let cases = [
            (100, FatalError),
            (199, FatalError),
            (200, Success),
            (204, Success),
            (299, Success),
            (300, FatalError),
            (302, FatalError),
            (399, FatalError),
            (400, FatalError),
            (404, FatalError),
            (407, FatalError),
            (408, RetriableError),
            (409, FatalError),
            (428, FatalError),
            (429, RetriableError),
            (430, FatalError),
            (499, FatalError),
            (500, RetriableError),
            (501, FatalError),
            (502, RetriableError),
            (503, RetriableError),
            (599, RetriableError),
            (600, FatalError),
            (999, FatalError),
        ];

        for (code, expected) in cases {
            assert_eq!(classify_status(code).0, expected, "status {}", code);
        }
    }

    #[test]
    fn test_classify_status_messages() {
        assert_eq!(classify_status(200).1, "");
        assert_eq!(classify_status(408).1, "request timed out");
        assert_eq!(classify_status(429).1, "request got throttled");
        assert_eq!(
            classify_status(501).1,
            "remote server does not implement requested action"
        );
    }

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(StatusCode::OK), "200 OK");
        assert_eq!(status_line(StatusCode::SERVICE_UNAVAILABLE), "503 Service Unavailable");
        assert_eq!(status_line(StatusCode::from_u16(599).unwrap()), "599");
    }

    #[test]
    fn test_json_payload_appends_newline() {
        let bytes = serde_json::json!({"a": 1}).to_json_bytes().unwrap();
        assert_eq!(bytes, b"{\"a\":1}\n");
    }

    #[test]
    fn test_json_payload_error() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "tuple keys are not valid json keys");
        assert!(map.to_json_bytes().is_err());
    }

    #[derive(Debug)]
    struct ConnectFailed(ResolveError);

    impl std::fmt::Display for ConnectFailed {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("connect failed")
        }
    }

    impl std::error::Error for ConnectFailed {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_find_source() {
        let err = ConnectFailed(ResolveError::NotFound("nope.invalid".to_string()));
        let found = find_source::<ResolveError>(&err);
        assert!(matches!(found, Some(ResolveError::NotFound(host)) if host == "nope.invalid"));
        assert!(find_source::<std::fmt::Error>(&err).is_none());
    }
}
