//! HTTP client for the backend REST API.
//!
//! This module provides a typed client for the data-file, model, client and
//! agent endpoints of the model-management backend.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::{Stream, TryStreamExt};
use model_console_core::Frame;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::types::{
    AgentHealth, ApiErrorResponse, BindDataFileRequest, BindModelRequest, ChatReply, ChatRequest,
    Client as ConsoleClient, CreateClientRequest, DataEnvelope, DataFile, DataPreview,
    EvaluateRequest, EvaluateResponse, Health, MessageResponse, Model, ModelUpdate, ModelUpload,
    ResourceId, SessionHistory, SessionList, TrainRequest, TrainResult,
};

/// Message used when an error response carries no text.
pub const FALLBACK_ERROR: &str = "请求失败";

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Reading an upload or writing a download failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Text suitable for the status bar.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

type Result<T> = std::result::Result<T, ClientError>;

/// Client for the backend REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the backend (e.g., "http://localhost:5000")
    /// * `timeout` - Bound on each request, including reading the body
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Handle API error responses.
    async fn handle_error(response: Response) -> ClientError {
        let status = response.status().as_u16();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(err) => err.into_message(),
            Err(_) => None,
        };
        ClientError::Api {
            status,
            message: message.unwrap_or_else(|| FALLBACK_ERROR.to_string()),
        }
    }

    /// Send a request and decode a successful JSON body.
    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// Send a request and unwrap the `data` of its envelope.
    async fn send_data<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let body: DataEnvelope<T> = Self::send_json(request).await?;
        Ok(body.data)
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Check backend health.
    pub async fn health(&self) -> Result<Health> {
        Self::send_json(self.client.get(self.url("/health"))).await
    }

    // =========================================================================
    // Data File Operations
    // =========================================================================

    /// List all data files.
    pub async fn list_datafiles(&self) -> Result<Vec<DataFile>> {
        Self::send_data(self.client.get(self.url("/api/datafiles/"))).await
    }

    /// Get one data file.
    pub async fn get_datafile(&self, id: ResourceId) -> Result<DataFile> {
        Self::send_data(self.client.get(self.url(&format!("/api/datafiles/{id}")))).await
    }

    /// Upload a CSV file.
    pub async fn upload_datafile(&self, path: &Path, description: &str) -> Result<DataFile> {
        let part = file_part(path, "text/csv").await?;
        let form = Form::new()
            .part("file", part)
            .text("description", description.to_string());

        Self::send_data(
            self.client
                .post(self.url("/api/datafiles/"))
                .multipart(form),
        )
        .await
    }

    /// Preview the first `rows` rows of a data file.
    pub async fn preview_datafile(&self, id: ResourceId, rows: u32) -> Result<DataPreview> {
        let url = self.url(&format!("/api/datafiles/{id}/preview"));
        Self::send_data(self.client.get(url).query(&[("rows", rows)])).await
    }

    /// Download a data file into `dir`, returning the written path.
    pub async fn download_datafile(&self, id: ResourceId, dir: &Path) -> Result<PathBuf> {
        let url = self.url(&format!("/api/datafiles/{id}/download"));
        self.download(&url, dir, &format!("datafile_{id}.csv")).await
    }

    /// Delete a data file.
    pub async fn delete_datafile(&self, id: ResourceId) -> Result<MessageResponse> {
        Self::send_json(self.client.delete(self.url(&format!("/api/datafiles/{id}")))).await
    }

    // =========================================================================
    // Model Operations
    // =========================================================================

    /// List all models.
    pub async fn list_models(&self) -> Result<Vec<Model>> {
        Self::send_data(self.client.get(self.url("/api/models/"))).await
    }

    /// Get one model.
    pub async fn get_model(&self, id: ResourceId) -> Result<Model> {
        Self::send_data(self.client.get(self.url(&format!("/api/models/{id}")))).await
    }

    /// Upload a serialized model with its metadata.
    pub async fn upload_model(&self, path: &Path, upload: &ModelUpload) -> Result<Model> {
        let part = file_part(path, "application/octet-stream").await?;
        let form = Form::new()
            .part("file", part)
            .text("model_name", upload.model_name.clone())
            .text("data_count", upload.data_count.to_string())
            .text("description", upload.description.clone().unwrap_or_default())
            .text("model_type", upload.model_type.clone().unwrap_or_default());

        Self::send_data(self.client.post(self.url("/api/models/")).multipart(form)).await
    }

    /// Update model metadata.
    pub async fn update_model(&self, id: ResourceId, update: &ModelUpdate) -> Result<Model> {
        Self::send_data(
            self.client
                .put(self.url(&format!("/api/models/{id}")))
                .json(update),
        )
        .await
    }

    /// Download a model into `dir`, returning the written path.
    pub async fn download_model(&self, id: ResourceId, dir: &Path) -> Result<PathBuf> {
        let url = self.url(&format!("/api/models/{id}/download"));
        self.download(&url, dir, &format!("model_{id}.pkl")).await
    }

    /// Delete a model.
    pub async fn delete_model(&self, id: ResourceId) -> Result<MessageResponse> {
        Self::send_json(self.client.delete(self.url(&format!("/api/models/{id}")))).await
    }

    // =========================================================================
    // Client Operations
    // =========================================================================

    /// List all clients.
    pub async fn list_clients(&self) -> Result<Vec<ConsoleClient>> {
        Self::send_data(self.client.get(self.url("/api/clients/"))).await
    }

    /// Get one client.
    pub async fn get_client(&self, id: ResourceId) -> Result<ConsoleClient> {
        Self::send_data(self.client.get(self.url(&format!("/api/clients/{id}")))).await
    }

    /// Create a client.
    pub async fn create_client(&self, request: &CreateClientRequest) -> Result<ConsoleClient> {
        Self::send_data(self.client.post(self.url("/api/clients/")).json(request)).await
    }

    /// Delete a client.
    pub async fn delete_client(&self, id: ResourceId) -> Result<MessageResponse> {
        Self::send_json(self.client.delete(self.url(&format!("/api/clients/{id}")))).await
    }

    /// Bind a data file to a client.
    pub async fn bind_datafile(
        &self,
        id: ResourceId,
        datafile_id: ResourceId,
    ) -> Result<ConsoleClient> {
        let url = self.url(&format!("/api/clients/{id}/bind-datafile"));
        Self::send_data(
            self.client
                .post(url)
                .json(&BindDataFileRequest { datafile_id }),
        )
        .await
    }

    /// Remove a client's data file binding.
    pub async fn unbind_datafile(&self, id: ResourceId) -> Result<ConsoleClient> {
        let url = self.url(&format!("/api/clients/{id}/unbind-datafile"));
        Self::send_data(self.client.post(url)).await
    }

    /// Bind a model to a client.
    pub async fn bind_model(&self, id: ResourceId, model_id: ResourceId) -> Result<ConsoleClient> {
        let url = self.url(&format!("/api/clients/{id}/bind-model"));
        Self::send_data(self.client.post(url).json(&BindModelRequest { model_id })).await
    }

    /// Remove a client's model binding.
    pub async fn unbind_model(&self, id: ResourceId) -> Result<ConsoleClient> {
        let url = self.url(&format!("/api/clients/{id}/unbind-model"));
        Self::send_data(self.client.post(url)).await
    }

    /// Train a model on the client's data file.
    pub async fn train_client(&self, id: ResourceId, request: &TrainRequest) -> Result<TrainResult> {
        let url = self.url(&format!("/api/clients/{id}/train"));
        Self::send_data(self.client.post(url).json(request)).await
    }

    /// Ask several clients' models for a prediction and combine them.
    pub async fn evaluate(&self, request: &EvaluateRequest) -> Result<EvaluateResponse> {
        Self::send_json(
            self.client
                .post(self.url("/api/clients/evaluate"))
                .json(request),
        )
        .await
    }

    // =========================================================================
    // Agent Operations
    // =========================================================================

    /// One non-streaming chat exchange.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        Self::send_json(self.client.post(self.url("/api/agent/chat")).json(request)).await
    }

    /// Open a streaming chat exchange and decode its body into frames.
    ///
    /// A non-success status is an error before any frame is produced. Read
    /// errors later in the body end the frame stream with `ClientError::Http`.
    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<impl Stream<Item = Result<Frame>>> {
        let response = self
            .client
            .post(self.url("/api/agent/chat-stream"))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        Ok(model_console_core::frames(response.bytes_stream()).map_err(ClientError::from))
    }

    /// List agent sessions held by the backend.
    pub async fn list_sessions(&self) -> Result<SessionList> {
        Self::send_json(self.client.get(self.url("/api/agent/sessions"))).await
    }

    /// Get the history of one agent session.
    pub async fn get_session(&self, session_id: &str) -> Result<SessionHistory> {
        let url = self.session_url(session_id);
        Self::send_json(self.client.get(url)).await
    }

    /// Delete an agent session.
    pub async fn delete_session(&self, session_id: &str) -> Result<MessageResponse> {
        let url = self.session_url(session_id);
        Self::send_json(self.client.delete(url)).await
    }

    /// Session ids are opaque and may contain reserved characters.
    fn session_url(&self, session_id: &str) -> String {
        self.url(&format!(
            "/api/agent/sessions/{}",
            urlencoding::encode(session_id)
        ))
    }

    /// Check agent health.
    pub async fn agent_health(&self) -> Result<AgentHealth> {
        Self::send_json(self.client.get(self.url("/api/agent/health"))).await
    }

    // =========================================================================
    // Utility
    // =========================================================================

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn download(&self, url: &str, dir: &Path, fallback_name: &str) -> Result<PathBuf> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename)
            .unwrap_or_else(|| fallback_name.to_string());
        let bytes = response.bytes().await?;

        let target = dir.join(name);
        tokio::fs::write(&target, &bytes).await?;
        tracing::debug!(path = %target.display(), bytes = bytes.len(), "Saved download");
        Ok(target)
    }
}

/// Read a file into a multipart part named after it.
async fn file_part(path: &Path, mime: &str) -> Result<Part> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
    Ok(Part::bytes(bytes).file_name(name).mime_str(mime)?)
}

/// File name from a `Content-Disposition` header, reduced to its last path
/// component. `filename*` (RFC 5987) wins over `filename`.
fn attachment_filename(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in header.split(';').map(str::trim) {
        if let Some(value) = param.strip_prefix("filename*=") {
            let encoded = value.split_once("''").map_or(value, |(_, rest)| rest);
            extended = urlencoding::decode(encoded.trim_matches('"'))
                .ok()
                .map(Cow::into_owned);
        } else if let Some(value) = param.strip_prefix("filename=") {
            plain = Some(value.trim_matches('"').to_string());
        }
    }

    extended
        .or(plain)
        .and_then(|name| {
            Path::new(&name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use model_console_core::FrameKind;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    // =========================================================================
    // Error Handling Tests
    // =========================================================================

    #[tokio::test]
    async fn api_error_uses_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/datafiles/9"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "文件不存在"})))
            .mount(&server)
            .await;

        let err = client_for(&server).get_datafile(9).await.unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "文件不存在");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn api_error_without_body_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/models/"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server).list_models().await.unwrap_err();
        assert_eq!(err.user_message(), FALLBACK_ERROR);
    }

    #[tokio::test]
    async fn unparseable_success_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let err = client_for(&server).health().await.unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
    }

    // =========================================================================
    // Resource Tests
    // =========================================================================

    #[tokio::test]
    async fn list_datafiles_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/datafiles/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "获取成功",
                "data": [{"id": 1, "filename": "a.csv", "file_size": 12}],
                "total": 1
            })))
            .mount(&server)
            .await;

        let files = client_for(&server).list_datafiles().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "a.csv");
    }

    #[tokio::test]
    async fn preview_sends_row_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/datafiles/2/preview"))
            .and(query_param("rows", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "filename": "a.csv", "total_rows": 300, "columns": ["城市", "面积"],
                    "preview_rows": 20, "preview_data": [{"城市": "大连", "面积": 35.7}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let preview = client_for(&server).preview_datafile(2, 20).await.unwrap();
        assert_eq!(preview.total_rows, 300);
        assert_eq!(preview.columns, vec!["城市", "面积"]);
    }

    #[tokio::test]
    async fn bind_model_posts_model_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/clients/3/bind-model"))
            .and(body_json(json!({"model_id": 7})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "绑定成功",
                "data": {"id": 3, "name": "c", "model_id": 7}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).bind_model(3, 7).await.unwrap();
        assert_eq!(client.model_id, Some(7));
    }

    #[tokio::test]
    async fn evaluate_posts_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/clients/evaluate"))
            .and(body_json(json!({"client_ids": [1], "house_data": {"城市": "南京"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "评测完成",
                "summary": {"total": 1, "success": 0, "error": 0, "skipped": 1},
                "results": [{"client_id": 1, "client_name": "a", "status": "skipped",
                             "prediction": null, "error": "该客户端未绑定模型"}],
                "federated_results": {"error": "No valid prediction results found", "status": "failed", "result": null}
            })))
            .mount(&server)
            .await;

        let request = crate::forms::evaluate_request(&[1], r#"{"城市":"南京"}"#).unwrap();
        let response = client_for(&server).evaluate(&request).await.unwrap();
        assert_eq!(response.summary.skipped, 1);
    }

    #[tokio::test]
    async fn upload_datafile_sends_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/datafiles/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "message": "上传成功",
                "data": {"id": 5, "filename": "houses.csv", "file_size": 8}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("houses.csv");
        std::fs::write(&file, "a,b\n1,2\n").unwrap();

        let uploaded = client_for(&server)
            .upload_datafile(&file, "test data")
            .await
            .unwrap();
        assert_eq!(uploaded.id, 5);

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"file\"; filename=\"houses.csv\""));
        assert!(body.contains("test data"));
    }

    #[tokio::test]
    async fn upload_of_missing_file_is_io_error() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .upload_datafile(Path::new("/nonexistent/x.csv"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[tokio::test]
    async fn download_uses_attachment_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/datafiles/4/download"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "content-disposition",
                        "attachment; filename=data.csv; filename*=UTF-8''%E6%88%BF%E4%BB%B7.csv",
                    )
                    .set_body_bytes(b"x,y\n".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let saved = client_for(&server)
            .download_datafile(4, dir.path())
            .await
            .unwrap();

        assert_eq!(saved, dir.path().join("房价.csv"));
        assert_eq!(std::fs::read(&saved).unwrap(), b"x,y\n");
    }

    #[tokio::test]
    async fn download_without_header_uses_fallback_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/models/2/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let saved = client_for(&server).download_model(2, dir.path()).await.unwrap();
        assert_eq!(saved, dir.path().join("model_2.pkl"));
    }

    // =========================================================================
    // Agent Tests
    // =========================================================================

    #[tokio::test]
    async fn chat_stream_yields_frames() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"type\":\"session\",\"session_id\":\"s1\"}\n\n",
            "data: {\"type\":\"content\",\"content\":\"Hi\"}\n\n",
            "data: {\"type\":\"done\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/agent/chat-stream"))
            .and(body_json(json!({"message": "hello", "session_id": null})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_raw(sse, "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = ChatRequest {
            message: "hello".to_string(),
            session_id: None,
        };
        let frames: Vec<_> = client_for(&server)
            .chat_stream(&request)
            .await
            .unwrap()
            .collect()
            .await;

        let kinds: Vec<_> = frames.into_iter().map(|f| f.unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![
                FrameKind::Session,
                FrameKind::Content("Hi".to_string()),
                FrameKind::Done
            ]
        );
    }

    #[tokio::test]
    async fn chat_stream_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agent/chat-stream"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": "消息不能为空", "status": "failed"})),
            )
            .mount(&server)
            .await;

        let request = ChatRequest {
            message: String::new(),
            session_id: None,
        };
        let result = client_for(&server).chat_stream(&request).await;
        match result {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "消息不能为空");
            }
            Err(other) => panic!("Expected Api error, got {other:?}"),
            Ok(_) => panic!("Expected Api error"),
        }
    }

    #[tokio::test]
    async fn list_sessions_deserializes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agent/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sessions": [{"session_id": "s1", "created_at": "2024-05-01T10:00:00", "message_count": 4}],
                "total": 1,
                "status": "success"
            })))
            .mount(&server)
            .await;

        let list = client_for(&server).list_sessions().await.unwrap();
        assert_eq!(list.total, 1);
        assert_eq!(list.sessions[0].message_count, 4);
    }

    // =========================================================================
    // Content-Disposition Tests
    // =========================================================================

    #[test]
    fn attachment_filename_variants() {
        assert_eq!(
            attachment_filename("attachment; filename=\"a b.csv\"").as_deref(),
            Some("a b.csv")
        );
        assert_eq!(
            attachment_filename("attachment; filename*=UTF-8''%E6%A8%A1%E5%9E%8B").as_deref(),
            Some("模型")
        );
        assert_eq!(
            attachment_filename("attachment; filename=\"../../etc/passwd\"").as_deref(),
            Some("passwd")
        );
        assert_eq!(attachment_filename("inline"), None);
    }

    #[test]
    fn attachment_filename_decodes_extended_name() {
        assert_eq!(
            attachment_filename("attachment; filename*=UTF-8''%E6%88%BF%E4%BB%B7.csv").as_deref(),
            Some("房价.csv")
        );
        // Not UTF-8 once decoded, so the plain name is used.
        assert_eq!(
            attachment_filename("attachment; filename=\"b.csv\"; filename*=UTF-8''%FF.csv")
                .as_deref(),
            Some("b.csv")
        );
    }

    #[tokio::test]
    async fn session_id_is_encoded_in_path() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/agent/sessions/a%2Fb%3Fx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "会话已删除"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/agent/sessions/a%2Fb%3Fx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session_id": "a/b?x",
                "messages": [{"role": "user", "content": "hi"}],
                "message_count": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let history = client.get_session("a/b?x").await.unwrap();
        assert_eq!(history.session_id, "a/b?x");
        assert_eq!(history.messages.len(), 1);
        client.delete_session("a/b?x").await.unwrap();
    }
}
