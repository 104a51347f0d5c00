use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::signer::{HttpMethod, SignedRequest};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON. An empty body is `null`; anything else unparseable is
    /// a `BadResponse` for `exchange`.
    pub fn json(&self, exchange: &'static str) -> Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body).map_err(|_| Error::bad_response(exchange, &self.body))
    }
}

/// Executes signed requests. Timeouts, retries and connection handling are
/// the implementation's business; adapters only see the status and body.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: SignedRequest) -> Result<HttpResponse>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(agent) = user_agent {
            builder = builder.user_agent(agent.to_string());
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: SignedRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        };

        debug!("{} {}", request.method, request.url);

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_is_null() {
        assert_eq!(HttpResponse::new(204, "").json("test").unwrap(), Value::Null);
    }

    #[test]
    fn test_html_body_is_bad_response() {
        let err = HttpResponse::new(502, "<html>bad gateway</html>")
            .json("test")
            .unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::BadResponse));
    }

    #[tokio::test]
    async fn test_mock_transport_echoes() {
        let mut mock = MockTransport::new();
        mock.expect_execute()
            .withf(|req| req.method == HttpMethod::Get && req.url.ends_with("/time"))
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, r#"{"serverTime":1}"#)));

        let resp = mock
            .execute(SignedRequest::new(HttpMethod::Get, "https://x/time"))
            .await
            .unwrap();
        assert!(resp.is_success());
    }
}
