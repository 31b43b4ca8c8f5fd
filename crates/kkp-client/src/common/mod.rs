//! Common utilities for the KKP API client
//!
//! Provides the authenticated HTTP wrapper and status/decoding handling
//! shared by every endpoint.

use crate::error::KkpError;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use std::fmt;
use tracing::debug;

/// HTTP client wrapper with authentication
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: String,
    extra_headers: Vec<(String, String)>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("extra_headers", &self.extra_headers.len())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            extra_headers: Vec::new(),
        }
    }

    /// Attach headers that are sent with every request
    #[must_use]
    pub fn with_extra_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.extra_headers = headers;
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.build_url(path);
        debug!("{} {}", method, url);

        let mut builder = self
            .client
            .request(method, &url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json");
        for (name, value) in &self.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    /// Send a GET without interpreting the status code
    pub async fn get_raw(&self, path: &str) -> Result<Response, KkpError> {
        self.request(Method::GET, path)
            .send()
            .await
            .map_err(KkpError::Http)
    }

    /// Make a GET request and decode the JSON body
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, KkpError> {
        let response = self.get_raw(path).await?;
        let response = check_status(response, "GET", path).await?;
        decode(response, path).await
    }

    /// Make a GET request and return the body as text
    pub async fn get_text(&self, path: &str) -> Result<String, KkpError> {
        let response = self.get_raw(path).await?;
        let response = check_status(response, "GET", path).await?;
        response.text().await.map_err(KkpError::Http)
    }

    /// Make a POST request
    pub async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, KkpError> {
        self.send_json(Method::POST, path, body).await
    }

    /// Make a PATCH request with a JSON merge patch body
    pub async fn patch<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, KkpError> {
        self.send_json(Method::PATCH, path, body).await
    }

    /// Make a PUT request
    pub async fn put<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, KkpError> {
        self.send_json(Method::PUT, path, body).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), KkpError> {
        let response = self
            .request(Method::DELETE, path)
            .send()
            .await
            .map_err(KkpError::Http)?;
        check_status(response, "DELETE", path).await?;
        Ok(())
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, KkpError> {
        debug!("{} {} with body: {}", method, path, body);
        let label = method.to_string();
        let content_type = if method == Method::PATCH {
            "application/merge-patch+json"
        } else {
            "application/json"
        };

        let response = self
            .request(method, path)
            .header("Content-Type", content_type)
            .body(serde_json::to_vec(body)?)
            .send()
            .await
            .map_err(KkpError::Http)?;

        let response = check_status(response, &label, path).await?;
        decode(response, path).await
    }
}

/// Map a non-success status to the matching `KkpError`
async fn check_status(response: Response, method: &str, path: &str) -> Result<Response, KkpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        404 => Err(KkpError::NotFound(format!("{} {} - {}", method, path, body))),
        401 | 403 => Err(KkpError::Authentication(format!(
            "{} {} failed: {} - {}",
            method, path, status, body
        ))),
        code => Err(KkpError::Api {
            status: code,
            message: format!("{} {} failed: {} - {}", method, path, status, body),
        }),
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response, path: &str) -> Result<T, KkpError> {
    let text = response.text().await.map_err(KkpError::Http)?;
    serde_json::from_str(&text).map_err(|e| {
        KkpError::Decode(format!(
            "{}: {} - Response (first 500 chars): {}",
            path,
            e,
            text.chars().take(500).collect::<String>()
        ))
    })
}
