use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response};

use crate::config::PortalConfig;

/// Pooled HTTP client shared by every portal call.
///
/// Built once at startup and handed to the crawler and fetchers by
/// reference. Cookies set by the portal are kept for the lifetime of
/// the session.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    max_retries: u32,
}

/// Build the shared session. No request is made here.
pub fn get_session(config: &PortalConfig) -> Result<Session> {
    let client = Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle)
        .cookie_store(true)
        .build()
        .context("Failed to create HTTP client")?;

    Ok(Session {
        client,
        max_retries: config.max_retries,
    })
}

impl Session {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Send a request, retrying transport failures up to `max_retries` times.
    ///
    /// Connection failures are retried for any method; timeouts only for
    /// idempotent methods. Status codes are left to the caller.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let method = request_method(&request);
        let mut attempt = 0u32;
        let mut pending = request;

        loop {
            let retry = pending.try_clone();
            let result = pending.send().await;

            let err = match result {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            let retryable = err.is_connect() || (err.is_timeout() && is_idempotent(&method));

            match retry {
                Some(next) if retryable && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Transport error on attempt {}/{}: {}; retrying",
                        attempt,
                        self.max_retries + 1,
                        err
                    );
                    pending = next;
                }
                _ => {
                    return Err(err).with_context(|| {
                        format!("Request failed after {} attempt(s)", attempt + 1)
                    });
                }
            }
        }
    }
}

fn request_method(request: &RequestBuilder) -> Method {
    request
        .try_clone()
        .and_then(|builder| builder.build().ok())
        .map(|built| built.method().clone())
        .unwrap_or(Method::POST)
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}
