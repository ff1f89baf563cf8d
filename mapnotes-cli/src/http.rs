//! Transport HTTP basé sur reqwest

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use mapnotes::{ApiError, HttpRequest, HttpResponse, Method, Transport};
use tracing::debug;

use crate::config::ApiConfig;

/// Client HTTP vers le serveur d'annotations
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, ApiError>> {
        Box::pin(async move {
            debug!(method = %request.method, url = %request.url(), "HTTP request");

            let mut builder = self
                .client
                .request(method(request.method), format!("{}{}", self.base_url, request.path))
                .query(&request.query);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(ApiError::transport)?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(ApiError::transport)?;
            debug!(status, bytes = body.len(), "HTTP response");

            Ok(HttpResponse::new(status, body))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_method_mapping() {
        assert_eq!(method(Method::Get), reqwest::Method::GET);
        assert_eq!(method(Method::Post), reqwest::Method::POST);
        assert_eq!(method(Method::Delete), reqwest::Method::DELETE);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let transport = HttpTransport::new(&ApiConfig {
            base_url: "http://127.0.0.1:9".into(),
            secret: None,
            timeout: Duration::from_secs(2),
            user_agent: "test".into(),
        })
        .unwrap();

        let err = transport
            .send(HttpRequest::get("/v1/layers"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(err.status(), None);
    }
}
