use crate::config::UpstreamConfig;
use crate::error::GatewayError;

/// Upstream endpoint and headers computed once at startup.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    chat_url: url::Url,
    static_headers: http::HeaderMap,
    proxy: Option<String>,
}

impl PreparedUpstream {
    /// # Errors
    ///
    /// Returns `GatewayError::Config` when the base URL does not form a valid
    /// chat-completions URL or the key is not a valid header value.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, GatewayError> {
        let base = upstream.base_url.trim().trim_end_matches('/');
        let chat_url = url::Url::parse(&format!("{base}/chat/completions")).map_err(|err| {
            GatewayError::Config(format!("invalid upstream base_url '{base}': {err}"))
        })?;

        Ok(Self {
            chat_url,
            static_headers: Self::build_headers(&upstream.api_key)?,
            proxy: normalize_proxy(upstream.proxy.as_deref()),
        })
    }

    #[must_use]
    pub fn chat_url(&self) -> &url::Url {
        &self.chat_url
    }

    #[must_use]
    pub fn static_headers(&self) -> &http::HeaderMap {
        &self.static_headers
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    fn build_headers(api_key: &str) -> Result<http::HeaderMap, GatewayError> {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        let mut bearer = http::HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| {
                GatewayError::Config("upstream.api_key is not a valid header value".to_string())
            })?;
        bearer.set_sensitive(true);
        headers.insert(http::header::AUTHORIZATION, bearer);
        Ok(headers)
    }
}

fn normalize_proxy(proxy: Option<&str>) -> Option<String> {
    proxy.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
