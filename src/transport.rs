//! HTTP transport behind the dispatcher.
//!
//! The dispatcher hands every planned request to a [`Transport`] as an
//! [`OutgoingRequest`]. [`HttpTransport`] is the reqwest implementation used
//! in production; tests plug in scripted transports instead.

use async_trait::async_trait;
use reqwest::{
    header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE},
    multipart::{Form, Part},
    Body, Client, ClientBuilder, StatusCode,
};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::config::Config;
use crate::constants::{default_headers, FILES_FIELD};

/// Body of an attachment part.
#[derive(Debug)]
pub enum FileContent {
    /// Open handle, streamed and closed together with the request.
    Handle { file: tokio::fs::File, len: u64 },
    Bytes(Vec<u8>),
}

impl FileContent {
    pub fn len(&self) -> u64 {
        match self {
            Self::Handle { len, .. } => *len,
            Self::Bytes(bytes) => bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the whole content into memory, consuming any open handle.
    pub async fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Handle { mut file, len } => {
                let mut buf = Vec::with_capacity(len as usize);
                file.read_to_end(&mut buf).await?;
                Ok(buf)
            }
            Self::Bytes(bytes) => Ok(bytes),
        }
    }
}

#[derive(Debug)]
pub struct OutgoingFile {
    pub filename: String,
    pub mime_type: String,
    pub content: FileContent,
}

/// One request, ready for the wire.
#[derive(Debug)]
pub struct OutgoingRequest {
    pub url: String,
    pub token: String,
    /// Destination and body fields, in insertion order.
    pub fields: Vec<(&'static str, String)>,
    pub file: Option<OutgoingFile>,
}

impl OutgoingRequest {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_multipart(&self) -> bool {
        self.file.is_some()
    }

    /// The fields as a JSON object, used when no file is attached.
    pub fn json_body(&self) -> Value {
        fields_to_json(&self.fields)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Raw result of fetching a remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("{0}")]
    Network(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = error_chain(&err);
        if err.is_timeout() {
            Self::Timeout(message)
        } else {
            Self::Network(message)
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit one request and return the raw response.
    ///
    /// A response with any status is `Ok`; only failures to obtain a
    /// response are errors.
    async fn execute(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError>;

    /// Fetch a remote file.
    async fn download(&self, url: &str) -> Result<Download, TransportError> {
        Err(TransportError::Network(format!(
            "downloading {url} is not supported by this transport"
        )))
    }
}

/// reqwest-backed transport configured from a [`Config`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let mut builder = ClientBuilder::new()
            .timeout(config.timeout())
            .default_headers(default_headers())
            .danger_accept_invalid_certs(config.insecure_tls());

        builder = match config.proxy_url() {
            Some(proxy) => builder.proxy(reqwest::Proxy::all(proxy)?),
            // ignore HTTP_PROXY and friends from the environment
            None => builder.no_proxy(),
        };

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError> {
        let builder = self.client.post(&request.url).bearer_auth(&request.token);

        let builder = match request.file {
            Some(file) => {
                let part = match file.content {
                    FileContent::Handle { file: handle, len } => {
                        Part::stream_with_length(Body::wrap_stream(ReaderStream::new(handle)), len)
                    }
                    FileContent::Bytes(bytes) => Part::bytes(bytes),
                };
                let part = part.file_name(file.filename).mime_str(&file.mime_type)?;

                let mut form = Form::new();
                for (name, value) in request.fields {
                    form = form.text(name, value);
                }
                builder.multipart(form.part(FILES_FIELD, part))
            }
            None => {
                let body = fields_to_json(&request.fields);
                builder
                    .header(CONTENT_TYPE, "application/json; charset=utf-8")
                    .body(body.to_string())
            }
        };

        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok(TransportResponse { status, body })
    }

    async fn download(&self, url: &str) -> Result<Download, TransportError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let header = |name: HeaderName| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let content_disposition = header(CONTENT_DISPOSITION);
        let bytes = resp.bytes().await?.to_vec();
        Ok(Download {
            status,
            content_type,
            content_disposition,
            bytes,
        })
    }
}

fn fields_to_json(fields: &[(&'static str, String)]) -> Value {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
        .collect();
    Value::Object(map)
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
