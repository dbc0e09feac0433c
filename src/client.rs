use crate::config::{Config, ConfigBuilder};
use crate::constants::*;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, TracingSink};
use crate::error::{Error, Result, SendError};
use crate::models::{Attachment, MessageFormat, SendOutcome, WebexFile, WebexMessage};
use crate::plan::{RequestPlan, RequestUnit, UnitState};
use crate::transport::{
    FileContent, HttpTransport, OutgoingFile, OutgoingRequest, Transport, TransportError,
};
use regex::Regex;
use reqwest::{multipart::Part, StatusCode, Url};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Client that delivers messages and attachments to one Webex destination.
///
/// `send` takes `&self`, so one client can serve concurrent callers; every
/// call builds its own plan and opens its own file handles. Settings change
/// through the `set_*` methods, which replace the whole config at once.
pub struct WebexClient {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    custom_transport: bool,
    sink: Arc<dyn DiagnosticSink>,
    endpoint: String,
}

impl WebexClient {
    pub fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(&config).map_err(Error::Http)?;
        Ok(Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            custom_transport: false,
            sink: Arc::new(TracingSink),
            endpoint: WEBEX_API_MESSAGES.to_string(),
        })
    }

    /// Client that sends through `transport` instead of reqwest.
    ///
    /// The transport is kept across config changes.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            custom_transport: true,
            sink: Arc::new(TracingSink),
            endpoint: WEBEX_API_MESSAGES.to_string(),
        }
    }

    /// Replace the sink that receives verbose diagnostics.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Post to `endpoint` instead of the public Webex messages API.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build a new config from the current one and swap it in.
    ///
    /// On error nothing changes: neither the config nor the HTTP client.
    pub fn reconfigure<F>(&mut self, update: F) -> Result<()>
    where
        F: FnOnce(ConfigBuilder) -> ConfigBuilder,
    {
        let config = update(self.config.to_builder()).build()?;
        let transport: Arc<dyn Transport> = if self.custom_transport {
            Arc::clone(&self.transport)
        } else {
            Arc::new(HttpTransport::new(&config).map_err(Error::Http)?)
        };
        self.config = Arc::new(config);
        self.transport = transport;
        Ok(())
    }

    pub fn set_format(&mut self, format: MessageFormat) -> Result<()> {
        self.reconfigure(|b| b.format(format))
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.reconfigure(|b| b.timeout(timeout))
    }

    pub fn set_proxy(&mut self, proxy: Option<String>) -> Result<()> {
        self.reconfigure(|b| b.proxy(proxy))
    }

    pub fn set_insecure_tls(&mut self, insecure: bool) -> Result<()> {
        self.reconfigure(|b| b.insecure_tls(insecure))
    }

    pub fn set_verbose(&mut self, verbose: bool) -> Result<()> {
        self.reconfigure(|b| b.verbose(verbose))
    }

    pub fn set_token(&mut self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        self.reconfigure(|b| b.token(token))
    }

    pub fn set_destination(&mut self, destination: impl Into<String>) -> Result<()> {
        let destination = destination.into();
        self.reconfigure(|b| b.destination(destination))
    }

    /// Send `message` and the files at `files`.
    ///
    /// With no files one request carries the message. Otherwise the message
    /// goes with the first file and each further file is sent on its own, in
    /// order. Stops at the first failed request.
    pub async fn send<P: AsRef<Path>>(
        &self,
        message: Option<&str>,
        files: &[P],
    ) -> std::result::Result<SendOutcome, SendError> {
        let attachments = files
            .iter()
            .map(|p| Attachment::Path(p.as_ref().to_path_buf()))
            .collect();
        self.send_attachments(message, attachments).await
    }

    /// Like [`send`](Self::send), for any mix of path and in-memory attachments.
    pub async fn send_attachments(
        &self,
        message: Option<&str>,
        attachments: Vec<Attachment>,
    ) -> std::result::Result<SendOutcome, SendError> {
        let message = message.filter(|m| !m.is_empty());
        if message.is_none() && attachments.is_empty() {
            return Err(SendError::InvalidInput);
        }

        for attachment in &attachments {
            let checked = match attachment {
                Attachment::Path(path) => ensure_readable(path).await.map_err(|r| (path.clone(), r)),
                Attachment::File(file) => ensure_valid_mime(&file.mime_type)
                    .map_err(|r| (PathBuf::from(&file.filename), r)),
            };
            checked.map_err(|(path, reason)| SendError::AttachmentUnreadable {
                path,
                reason,
                unit_index: None,
                completed: Vec::new(),
            })?;
        }

        let config = Arc::clone(&self.config);
        let transport = Arc::clone(&self.transport);
        let plan = RequestPlan::build(&config, message, attachments);
        debug!(
            units = plan.len(),
            destination = %config.destination(),
            "dispatching webex message"
        );

        let dispatch = Dispatch {
            config: &config,
            transport: transport.as_ref(),
            sink: config.verbose().then_some(self.sink.as_ref()),
            endpoint: &self.endpoint,
            states: vec![UnitState::Pending; plan.len()],
            completed: Vec::with_capacity(plan.len()),
        };
        dispatch.run(plan).await
    }

    pub fn create_file_from_bytes(
        &self,
        filename: impl Into<String>,
        blob: Vec<u8>,
        mime_type: Option<&str>,
    ) -> WebexFile {
        let filename = filename.into();
        let mime_type = mime_type
            .map(str::to_string)
            .unwrap_or_else(|| guess_mime_type(&filename).to_string());
        WebexFile {
            filename,
            blob,
            mime_type,
        }
    }

    pub async fn create_file_from_path(&self, path: impl AsRef<Path>) -> Result<WebexFile> {
        let path = path.as_ref();
        let unreadable = |reason: String| {
            Error::Send(SendError::AttachmentUnreadable {
                path: path.to_path_buf(),
                reason,
                unit_index: None,
                completed: Vec::new(),
            })
        };
        ensure_readable(path).await.map_err(unreadable)?;
        let blob = tokio::fs::read(path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        let filename = Attachment::Path(path.to_path_buf()).filename();
        Ok(self.create_file_from_bytes(filename, blob, None))
    }

    /// Download `url` through this client's transport into a [`WebexFile`].
    ///
    /// The filename comes from `Content-Disposition`, then the last URL path
    /// segment; the MIME type from `Content-Type`, then the filename.
    pub async fn create_file_from_url(&self, url: &str) -> Result<WebexFile> {
        let download = self
            .transport
            .download(url)
            .await
            .map_err(|e| Error::Download {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        if !download.status.is_success() {
            return Err(Error::Download {
                url: url.to_string(),
                message: format!("unexpected status {}", download.status),
            });
        }

        let filename = download
            .content_disposition
            .as_deref()
            .and_then(filename_from_content_disposition)
            .or_else(|| filename_from_url(url))
            .unwrap_or_else(|| FALLBACK_FILENAME.to_string());
        let mime_type = download
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .map(str::to_string);

        Ok(self.create_file_from_bytes(filename, download.bytes, mime_type.as_deref()))
    }
}

struct Dispatch<'a> {
    config: &'a Config,
    transport: &'a dyn Transport,
    sink: Option<&'a dyn DiagnosticSink>,
    endpoint: &'a str,
    states: Vec<UnitState>,
    completed: Vec<WebexMessage>,
}

enum UnitFailure {
    Unreadable { path: PathBuf, reason: String },
    Transport(TransportError),
    Status { status: StatusCode, body: String },
    Malformed { status: StatusCode, body: String, reason: String },
}

impl UnitFailure {
    fn into_send_error(self, unit_index: usize, completed: Vec<WebexMessage>) -> SendError {
        match self {
            Self::Unreadable { path, reason } => SendError::AttachmentUnreadable {
                path,
                reason,
                unit_index: Some(unit_index),
                completed,
            },
            Self::Transport(TransportError::Timeout(_)) => SendError::Timeout {
                unit_index,
                completed,
            },
            Self::Transport(TransportError::Network(message)) => SendError::Network {
                unit_index,
                message,
                completed,
            },
            Self::Status { status, body } => SendError::Api {
                unit_index,
                status,
                body,
                completed,
            },
            Self::Malformed {
                status,
                body,
                reason,
            } => SendError::MalformedResponse {
                unit_index,
                status,
                body,
                reason,
                completed,
            },
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Unreadable { path, reason } => format!("{}: {reason}", path.display()),
            Self::Transport(err) => err.to_string(),
            Self::Status { status, body } => format!("status {status}: {body}"),
            Self::Malformed { reason, .. } => format!("malformed response: {reason}"),
        }
    }
}

impl Dispatch<'_> {
    async fn run(mut self, plan: RequestPlan) -> std::result::Result<SendOutcome, SendError> {
        let total = plan.len();
        for unit in plan.into_units() {
            let index = unit.index;
            self.states[index] = UnitState::InFlight;

            match self.execute(unit, total).await {
                Ok(record) => {
                    self.states[index] = UnitState::Succeeded;
                    self.completed.push(record);
                }
                Err(failure) => {
                    self.states[index] = UnitState::Failed;
                    warn!(index, total, error = %failure.describe(), "webex request failed");
                    self.emit(|| DiagnosticEvent::RequestFailed {
                        index,
                        error: failure.describe(),
                    });
                    self.abort_remaining(index + 1);
                    self.finish();
                    return Err(failure.into_send_error(index, self.completed));
                }
            }
        }

        debug!(units = total, "webex message delivered");
        self.finish();
        Ok(SendOutcome::from_records(self.completed))
    }

    /// Send one unit. Its file handle lives inside the request and is closed
    /// when the transport returns.
    async fn execute(
        &self,
        unit: RequestUnit,
        total: usize,
    ) -> std::result::Result<WebexMessage, UnitFailure> {
        let attachment_name = unit.attachment.as_ref().map(Attachment::filename);
        let message_len = unit.body.as_ref().map_or(0, String::len);

        let mut fields = vec![(
            unit.destination.field_name(),
            unit.destination.value().to_string(),
        )];
        if let (Some(body), Some(format)) = (unit.body, unit.format) {
            fields.push((format.field_name(), body));
        }
        let file = match unit.attachment {
            Some(attachment) => Some(open_attachment(attachment).await?),
            None => None,
        };

        let request = OutgoingRequest {
            url: self.endpoint.to_string(),
            token: self.config.token().to_string(),
            fields,
            file,
        };

        debug!(index = unit.index, total, multipart = request.is_multipart(), "sending webex request");
        self.emit(|| DiagnosticEvent::RequestStarted {
            index: unit.index,
            total,
            url: self.endpoint.to_string(),
            destination: unit.destination.to_string(),
            attachment: attachment_name,
            message_len,
        });

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(UnitFailure::Transport)?;
        self.emit(|| DiagnosticEvent::ResponseReceived {
            index: unit.index,
            status: response.status.as_u16(),
            body: response.body.clone(),
        });

        if !response.status.is_success() {
            return Err(UnitFailure::Status {
                status: response.status,
                body: response.body,
            });
        }
        parse_message(response.status, response.body)
    }

    fn abort_remaining(&mut self, from: usize) {
        for index in from..self.states.len() {
            self.states[index] = UnitState::Aborted;
            self.emit(|| DiagnosticEvent::Aborted { index });
        }
        if from < self.states.len() {
            debug!(
                aborted = self.states.len() - from,
                "skipping remaining webex requests"
            );
        }
    }

    fn finish(&self) {
        self.emit(|| DiagnosticEvent::Finished {
            states: self.states.clone(),
        });
    }

    fn emit(&self, event: impl FnOnce() -> DiagnosticEvent) {
        if let Some(sink) = self.sink {
            sink.record(&event());
        }
    }
}

fn parse_message(
    status: StatusCode,
    body: String,
) -> std::result::Result<WebexMessage, UnitFailure> {
    let malformed = |body: String, reason: String| UnitFailure::Malformed {
        status,
        body,
        reason,
    };
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(map)) => Ok(WebexMessage::from(map)),
        Ok(_) => Err(malformed(body, "expected a JSON object".to_string())),
        Err(e) => Err(malformed(body, e.to_string())),
    }
}

async fn ensure_readable(path: &Path) -> std::result::Result<(), String> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| e.to_string())?;
    if !meta.is_file() {
        return Err("not a regular file".to_string());
    }
    tokio::fs::File::open(path)
        .await
        .map(drop)
        .map_err(|e| e.to_string())
}

/// Same parse the multipart part applies when the request is built.
fn ensure_valid_mime(mime_type: &str) -> std::result::Result<(), String> {
    Part::bytes(Vec::new())
        .mime_str(mime_type)
        .map(drop)
        .map_err(|_| format!("invalid MIME type {mime_type:?}"))
}

async fn open_attachment(attachment: Attachment) -> std::result::Result<OutgoingFile, UnitFailure> {
    let filename = attachment.filename();
    match attachment {
        Attachment::Path(path) => {
            let unreadable = |reason: String| UnitFailure::Unreadable {
                path: path.clone(),
                reason,
            };
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| unreadable(e.to_string()))?;
            let meta = file.metadata().await.map_err(|e| unreadable(e.to_string()))?;
            if !meta.is_file() {
                return Err(unreadable("not a regular file".to_string()));
            }
            Ok(OutgoingFile {
                mime_type: guess_mime_type(&filename).to_string(),
                filename,
                content: FileContent::Handle {
                    file,
                    len: meta.len(),
                },
            })
        }
        Attachment::File(file) => Ok(OutgoingFile {
            filename,
            mime_type: file.mime_type,
            content: FileContent::Bytes(file.blob),
        }),
    }
}

fn guess_mime_type(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "json" => "application/json",
        "xml" => "application/xml",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => FALLBACK_MIME_TYPE,
    }
}

static EXTENDED_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\*\s*=\s*(?:[\w-]+'[\w-]*')?"?([^";]+)"?"#)
        .expect("filename* pattern compiles")
});

static PLAIN_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*"?([^";]+)"?"#)
        .expect("filename pattern compiles")
});

fn filename_from_content_disposition(header: &str) -> Option<String> {
    EXTENDED_FILENAME
        .captures(header)
        .or_else(|| PLAIN_FILENAME.captures(header))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// Build a client for `config` and send once.
pub async fn notify<P: AsRef<Path>>(
    config: Config,
    message: Option<&str>,
    files: &[P],
) -> Result<SendOutcome> {
    let client = WebexClient::new(config)?;
    Ok(client.send(message, files).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Download, TransportResponse};
    use async_trait::async_trait;

    struct StaticDownload(Download);

    #[async_trait]
    impl Transport for StaticDownload {
        async fn execute(
            &self,
            _request: OutgoingRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            Err(TransportError::Network("not used".into()))
        }

        async fn download(&self, _url: &str) -> std::result::Result<Download, TransportError> {
            Ok(self.0.clone())
        }
    }

    fn config() -> Config {
        Config::builder("dummy_token", "room123").build().unwrap()
    }

    fn client_with_download(download: Download) -> WebexClient {
        WebexClient::with_transport(config(), Arc::new(StaticDownload(download)))
    }

    #[test]
    fn mime_type_is_guessed_from_extension() {
        assert_eq!(guess_mime_type("a.PNG"), "image/png");
        assert_eq!(guess_mime_type("fruits.jpg"), "image/jpeg");
        assert_eq!(guess_mime_type("hello.pdf"), "application/pdf");
        assert_eq!(guess_mime_type("noext"), "application/octet-stream");
    }

    #[test]
    fn content_disposition_filename_variants() {
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="from_cd.png""#).as_deref(),
            Some("from_cd.png")
        );
        assert_eq!(
            filename_from_content_disposition("inline; filename=plain.txt").as_deref(),
            Some("plain.txt")
        );
        assert_eq!(
            filename_from_content_disposition("attachment; filename*=UTF-8''report.pdf").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(filename_from_content_disposition("attachment"), None);
    }

    #[test]
    fn url_filename_uses_last_path_segment() {
        assert_eq!(
            filename_from_url("https://example.com/path/to/fruits.jpg").as_deref(),
            Some("fruits.jpg")
        );
        assert_eq!(filename_from_url("https://example.com/"), None);
    }

    #[test]
    fn create_file_from_bytes_keeps_or_guesses_mime() {
        let client = WebexClient::new(config()).unwrap();
        let f = client.create_file_from_bytes("hello.txt", b"hello world".to_vec(), Some("text/x-custom"));
        assert_eq!(f.filename, "hello.txt");
        assert_eq!(f.blob, b"hello world");
        assert_eq!(f.mime_type, "text/x-custom");
        assert_eq!(f.extension().as_deref(), Some("txt"));

        let f = client.create_file_from_bytes("image.png", b"\x89PNG\r\n\x1a\n".to_vec(), None);
        assert_eq!(f.mime_type, "image/png");
        assert_eq!(f.extension().as_deref(), Some("png"));
    }

    #[tokio::test]
    async fn create_file_from_path_reads_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.pdf");
        std::fs::write(&path, b"%PDF-1.4 sample").unwrap();

        let client = WebexClient::new(config()).unwrap();
        let f = client.create_file_from_path(&path).await.unwrap();
        assert_eq!(f.filename, "hello.pdf");
        assert_eq!(f.mime_type, "application/pdf");
        assert_eq!(f.blob, b"%PDF-1.4 sample");

        let err = client
            .create_file_from_path(dir.path().join("missing.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Send(SendError::AttachmentUnreadable { .. })));
    }

    #[tokio::test]
    async fn create_file_from_url_prefers_content_disposition() {
        let client = client_with_download(Download {
            status: StatusCode::OK,
            content_type: Some("image/png".into()),
            content_disposition: Some(r#"attachment; filename="from_cd.png""#.into()),
            bytes: b"\x89PNG\r\n\x1a\nPNG-DATA".to_vec(),
        });
        let f = client
            .create_file_from_url("https://example.com/download?id=123")
            .await
            .unwrap();
        assert_eq!(f.filename, "from_cd.png");
        assert_eq!(f.mime_type, "image/png");
        assert_eq!(f.extension().as_deref(), Some("png"));
    }

    #[tokio::test]
    async fn create_file_from_url_falls_back_to_path_and_guess() {
        let client = client_with_download(Download {
            status: StatusCode::OK,
            content_type: Some("image/jpeg; charset=binary".into()),
            content_disposition: None,
            bytes: b"\xff\xd8\xffJPEG-DATA".to_vec(),
        });
        let f = client
            .create_file_from_url("https://example.com/path/to/fruits.jpg")
            .await
            .unwrap();
        assert_eq!(f.filename, "fruits.jpg");
        assert_eq!(f.mime_type, "image/jpeg");

        let client = client_with_download(Download {
            status: StatusCode::OK,
            content_type: None,
            content_disposition: None,
            bytes: vec![1, 2, 3],
        });
        let f = client.create_file_from_url("https://example.com/").await.unwrap();
        assert_eq!(f.filename, FALLBACK_FILENAME);
        assert_eq!(f.mime_type, FALLBACK_MIME_TYPE);
    }

    #[tokio::test]
    async fn create_file_from_url_rejects_error_status() {
        let client = client_with_download(Download {
            status: StatusCode::NOT_FOUND,
            content_type: None,
            content_disposition: None,
            bytes: vec![],
        });
        let err = client
            .create_file_from_url("https://example.com/missing.png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Download { .. }));
    }

    #[test]
    fn failed_reconfigure_keeps_previous_settings() {
        let mut client = WebexClient::new(config()).unwrap();
        client.set_format(MessageFormat::Text).unwrap();
        client.set_proxy(Some("http://proxy.local:8080".into())).unwrap();

        let err = client.set_timeout(Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(client.config().format(), MessageFormat::Text);
        assert_eq!(client.config().proxy_url(), Some("http://proxy.local:8080"));
        assert_eq!(client.config().timeout(), Duration::from_secs(10));

        assert!(client.set_token("").is_err());
        assert_eq!(client.config().token(), "dummy_token");
    }

    #[test]
    fn set_destination_re_infers_kind() {
        let mut client = WebexClient::new(config()).unwrap();
        assert!(!client.config().destination().is_email());
        client.set_destination("user@example.com").unwrap();
        assert!(client.config().destination().is_email());
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        assert!(matches!(
            parse_message(StatusCode::OK, "not json".into()),
            Err(UnitFailure::Malformed { .. })
        ));
        assert!(matches!(
            parse_message(StatusCode::OK, "[1,2]".into()),
            Err(UnitFailure::Malformed { .. })
        ));
        let record = parse_message(StatusCode::OK, r#"{"id":"m1"}"#.into()).ok().unwrap();
        assert_eq!(record.id.as_deref(), Some("m1"));
    }
}
