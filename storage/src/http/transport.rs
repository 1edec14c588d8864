use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest_middleware::ClientWithMiddleware as Client;
use token_source::TokenSource;

use crate::http::Error;
use crate::option::Options;

/// A request relative to the service endpoint.
///
/// `path` is already escaped, `query` is not.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: vec![],
            headers: vec![],
            body: Bytes::new(),
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Appends every option as a query parameter.
    pub fn options(mut self, options: &Options) -> Self {
        for (key, value) in options.query_pairs() {
            self.query.push((key.to_string(), value));
        }
        self
    }

    pub fn header(mut self, key: &str, value: impl ToString) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn json<T: serde::Serialize>(self, value: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn header_value(&self, key: &str) -> Option<&str> {
        find_header(&self.headers, key)
    }

    /// The path and the encoded query string, as it appears in a request line.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{}", self.path, query)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: vec![],
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, key: &str, value: impl ToString) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header_value(&self, key: &str) -> Option<&str> {
        find_header(&self.headers, key)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Sends one request to the service and returns whatever status it answered with.
///
/// Only failures to obtain a response at all are errors.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error>;
}

#[derive(Clone)]
pub struct HttpTransport {
    endpoint: String,
    http: Client,
    ts: Option<Arc<dyn TokenSource>>,
}

impl Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("anonymous", &self.ts.is_none())
            .finish()
    }
}

impl HttpTransport {
    pub fn new(endpoint: &str, http: Client, ts: Option<Arc<dyn TokenSource>>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
            ts,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        let url = format!("{}{}", self.endpoint, request.path_and_query());
        tracing::trace!("{} {}", request.method, url);
        let mut builder = self
            .http
            .request(request.method, url)
            .header("X-Goog-Api-Client", "rust")
            .header(reqwest::header::USER_AGENT, "storage-rpc");
        if let Some(ts) = &self.ts {
            let token = ts.token().await.map_err(Error::TokenSource)?;
            builder = builder.header(reqwest::header::AUTHORIZATION, token);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        let response = builder.body(request.body).send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await?;
        Ok(TransportResponse { status, headers, body })
    }
}
