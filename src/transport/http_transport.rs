use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::abort::AbortSignal;
use crate::config::ServerConfig;
use crate::error::GatewayError;
use crate::protocol::error_shapes::sanitize_upstream_error;

use super::PreparedUpstream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Live upstream body, one item per received chunk.
pub type UpstreamByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// Successful upstream reply.
pub enum UpstreamReply {
    /// Fully buffered JSON body.
    Complete(Bytes),
    /// Body still arriving; consumed chunk by chunk.
    Streaming(UpstreamByteStream),
}

impl std::fmt::Debug for UpstreamReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(body) => f.debug_tuple("Complete").field(&body.len()).finish(),
            Self::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, GatewayError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout);

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| GatewayError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| GatewayError::Config(format!("Failed to build HTTP client: {err}")))
}

/// Pooled HTTP client for the upstream provider.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the client with pool sizing and timeouts from `config`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` when the proxy URL is rejected or the
    /// client cannot be constructed.
    pub fn new(config: &ServerConfig, proxy_url: Option<&str>) -> Result<Self, GatewayError> {
        let pool_idle_timeout = (config.http_pool_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(config.http_pool_idle_timeout_secs));
        let client = build_reqwest_client(
            config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            Duration::from_secs(config.timeout),
            proxy_url,
        )?;
        Ok(Self { client })
    }

    /// POST a chat-completions body upstream.
    ///
    /// With `stream` set the reply hands back the live body; otherwise the body
    /// is read to the end. The whole exchange, body read included, is raced
    /// against `signal`.
    ///
    /// # Errors
    ///
    /// - `GatewayError::Cancelled` when `signal` fires first.
    /// - `GatewayError::Upstream` for a non-2xx status, carrying the sanitized
    ///   upstream message.
    /// - `GatewayError::Transport` when the request or body read fails.
    pub async fn send_chat(
        &self,
        upstream: &PreparedUpstream,
        body: Bytes,
        stream: bool,
        signal: &AbortSignal,
    ) -> Result<UpstreamReply, GatewayError> {
        signal
            .guard(async {
                let mut request =
                    reqwest::Request::new(http::Method::POST, upstream.chat_url().clone());
                *request.headers_mut() = upstream.static_headers().clone();
                *request.body_mut() = Some(reqwest::Body::from(body));

                let response = self
                    .client
                    .execute(request)
                    .await
                    .map_err(|err| GatewayError::Transport(format!("upstream request failed: {err}")))?;

                let status = response.status();
                if !status.is_success() {
                    let body_bytes = response.bytes().await.map_err(|err| {
                        GatewayError::Transport(format!("Failed to read response body: {err}"))
                    })?;
                    return Err(GatewayError::Upstream {
                        status: status.as_u16(),
                        message: sanitize_upstream_error(&body_bytes),
                    });
                }

                if stream {
                    return Ok(UpstreamReply::Streaming(response.bytes_stream().boxed()));
                }
                let body_bytes = response.bytes().await.map_err(|err| {
                    GatewayError::Transport(format!("Failed to read response body: {err}"))
                })?;
                Ok(UpstreamReply::Complete(body_bytes))
            })
            .await
    }
}
