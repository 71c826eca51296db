//! API request and response types for the backend client.
//!
//! These types mirror the JSON served by the model-management backend.
//! Fields the backend sometimes omits or sends as `null` are `Option`s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a data file, model or client.
pub type ResourceId = u64;

// =============================================================================
// Envelopes
// =============================================================================

/// Success envelope: `{message, data, total?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    /// Human-readable status line.
    #[serde(default)]
    pub message: Option<String>,
    /// Payload.
    pub data: T,
    /// Item count for list endpoints.
    #[serde(default)]
    pub total: Option<u64>,
}

/// Body of responses that only carry a status line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable status line.
    #[serde(default)]
    pub message: Option<String>,
}

/// Error response from the API. Either field may carry the text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error text.
    #[serde(default)]
    pub error: Option<String>,
    /// Alternative error text.
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorResponse {
    /// The error text, preferring `error` over `message`.
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        self.error
            .filter(|e| !e.is_empty())
            .or(self.message.filter(|m| !m.is_empty()))
    }
}

/// Backend health: `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// "healthy" when the backend is up.
    pub status: String,
    /// Server time.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Status line.
    #[serde(default)]
    pub message: Option<String>,
}

impl Health {
    /// Returns true if the backend reports itself healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

// =============================================================================
// Data Files
// =============================================================================

/// A CSV data file stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    /// Identifier.
    pub id: ResourceId,
    /// Original file name.
    pub filename: String,
    /// Size in bytes.
    #[serde(default)]
    pub file_size: Option<u64>,
    /// Upload time as formatted by the backend.
    #[serde(default)]
    pub upload_time: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// First rows of a data file: `GET /api/datafiles/{id}/preview`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPreview {
    /// File name.
    pub filename: String,
    /// Rows in the whole file.
    pub total_rows: u64,
    /// Column names in file order.
    pub columns: Vec<String>,
    /// Rows included in this preview.
    pub preview_rows: u32,
    /// Row records keyed by column name.
    #[serde(default)]
    pub preview_data: Vec<Map<String, Value>>,
}

// =============================================================================
// Models
// =============================================================================

/// A trained model stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Identifier.
    pub id: ResourceId,
    /// Display name.
    pub model_name: String,
    /// Size of the serialized model in bytes.
    #[serde(default)]
    pub model_size: Option<u64>,
    /// Number of rows the model was trained on.
    #[serde(default)]
    pub data_count: Option<u64>,
    /// Upload time as formatted by the backend.
    #[serde(default)]
    pub upload_time: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Framework or algorithm, e.g. "lightgbm".
    #[serde(default)]
    pub model_type: Option<String>,
}

/// Metadata sent with a model upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelUpload {
    /// Display name.
    pub model_name: String,
    /// Number of training rows.
    pub data_count: u64,
    /// Free-form description.
    pub description: Option<String>,
    /// Framework or algorithm.
    pub model_type: Option<String>,
}

/// Partial update: `PUT /api/models/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUpdate {
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// New training row count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_count: Option<u64>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New model type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
}

// =============================================================================
// Clients
// =============================================================================

/// Summary of the data file bound to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundDataFile {
    /// Identifier.
    pub id: ResourceId,
    /// File name.
    pub filename: String,
    /// Size in bytes.
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Summary of the model bound to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundModel {
    /// Identifier.
    pub id: ResourceId,
    /// Display name.
    pub model_name: String,
    /// Training row count.
    #[serde(default)]
    pub data_count: Option<u64>,
    /// Framework or algorithm.
    #[serde(default)]
    pub model_type: Option<String>,
}

/// A named client binding one data file and one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    /// Identifier.
    pub id: ResourceId,
    /// Display name.
    pub name: String,
    /// Bound data file.
    #[serde(default)]
    pub datafile_id: Option<ResourceId>,
    /// Bound model.
    #[serde(default)]
    pub model_id: Option<ResourceId>,
    /// Creation time as formatted by the backend.
    #[serde(default)]
    pub created_time: Option<String>,
    /// Last update time as formatted by the backend.
    #[serde(default)]
    pub updated_time: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Details of the bound data file.
    #[serde(default)]
    pub datafile_info: Option<BoundDataFile>,
    /// Details of the bound model.
    #[serde(default)]
    pub model_info: Option<BoundModel>,
}

/// Request to create a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClientRequest {
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Request to bind a data file to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindDataFileRequest {
    /// Data file to bind.
    pub datafile_id: ResourceId,
}

/// Request to bind a model to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindModelRequest {
    /// Model to bind.
    pub model_id: ResourceId,
}

/// Options for training a client's model. The backend fills in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainRequest {
    /// Name for the resulting model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Model type label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    /// Description for the resulting model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Row counts reported by a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingInfo {
    /// Rows read from the data file.
    pub data_rows: u64,
    /// Rows left after preprocessing.
    pub processed_rows: u64,
}

/// Result of `POST /api/clients/{id}/train`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResult {
    /// The client, now bound to the new model.
    pub client: Client,
    /// The newly stored model.
    pub model: Model,
    /// Row counts.
    pub training_info: TrainingInfo,
}

// =============================================================================
// Evaluation
// =============================================================================

/// Request a prediction from several clients' models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateRequest {
    /// Clients whose models take part.
    pub client_ids: Vec<ResourceId>,
    /// Feature record of the house to price.
    pub house_data: Map<String, Value>,
}

/// Outcome of one client's prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// The model produced a prediction.
    Success,
    /// Prediction failed.
    Error,
    /// The client has no model bound.
    Skipped,
    /// A status this console does not know.
    #[serde(other)]
    Unknown,
}

impl EvaluationStatus {
    /// Display string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }
}

/// Prediction made by one client's model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Model name.
    #[serde(default)]
    pub model_name: Option<String>,
    /// Training rows of the model, used as its weight.
    #[serde(default)]
    pub data_count: Option<u64>,
    /// Model type.
    #[serde(default)]
    pub model_type: Option<String>,
    /// Predicted price per square metre.
    #[serde(default)]
    pub unit_price: Option<f64>,
    /// Predicted total price, when the floor area is known.
    #[serde(default)]
    pub total_price: Option<f64>,
}

/// Per-client entry of an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEvaluation {
    /// Client identifier.
    pub client_id: ResourceId,
    /// Client name.
    pub client_name: String,
    /// Outcome.
    pub status: EvaluationStatus,
    /// Prediction, on success.
    #[serde(default)]
    pub prediction: Option<Prediction>,
    /// Reason, on error or skip.
    #[serde(default)]
    pub error: Option<String>,
}

/// Counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Clients evaluated.
    pub total: u32,
    /// Successful predictions.
    pub success: u32,
    /// Failed predictions.
    pub error: u32,
    /// Clients without a model.
    pub skipped: u32,
}

/// A client's share of the federated prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipatingClient {
    /// Client identifier.
    pub client_id: ResourceId,
    /// Client name.
    pub client_name: String,
    /// Weight in rows.
    pub data_count: u64,
    /// Weight as reported by the backend.
    pub weight_ratio: f64,
}

/// Data-count weighted average over successful predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederatedAggregate {
    /// Weighted average total price.
    pub weighted_average_total_price: f64,
    /// Weighted average unit price.
    pub weighted_average_unit_price: f64,
    /// Sum of weights.
    pub total_data_count: u64,
    /// Clients that contributed.
    pub participating_clients: Vec<ParticipatingClient>,
}

/// Federated result, or why there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FederatedResult {
    /// At least one client contributed.
    Aggregate(FederatedAggregate),
    /// No client produced a usable prediction.
    Failed {
        /// Reason.
        error: String,
        /// Backend status label, normally "failed".
        #[serde(default)]
        status: Option<String>,
    },
}

/// Result of `POST /api/clients/evaluate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateResponse {
    /// Status line.
    #[serde(default)]
    pub message: Option<String>,
    /// Counts per outcome.
    pub summary: EvaluationSummary,
    /// Per-client entries.
    pub results: Vec<ClientEvaluation>,
    /// Combined prediction.
    pub federated_results: FederatedResult,
}

// =============================================================================
// Agent
// =============================================================================

/// Request for one chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Operator message.
    pub message: String,
    /// Conversation to continue; `null` starts a new one.
    pub session_id: Option<String>,
}

/// Non-streaming chat reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatReply {
    /// Conversation identifier.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Reply text.
    #[serde(default)]
    pub response: Option<String>,
    /// Reply text, under its alternative key.
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatReply {
    /// Reply text from `response`, else `message`, else empty.
    #[must_use]
    pub fn text(&self) -> &str {
        self.response
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.message.as_deref())
            .unwrap_or_default()
    }
}

/// One entry of `GET /api/agent/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: String,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Operator and assistant messages in the session.
    #[serde(default)]
    pub message_count: u64,
}

/// Response for listing agent sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionList {
    /// Sessions.
    pub sessions: Vec<SessionSummary>,
    /// Count.
    #[serde(default)]
    pub total: u64,
}

/// One message in a session history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// "user" or "assistant".
    pub role: String,
    /// Text. Tool-call turns have none.
    #[serde(default)]
    pub content: Option<String>,
}

/// Response for `GET /api/agent/sessions/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHistory {
    /// Session identifier.
    pub session_id: String,
    /// Messages in order.
    pub messages: Vec<HistoryMessage>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Message count.
    #[serde(default)]
    pub message_count: u64,
}

/// Response for `GET /api/agent/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    /// Service name.
    pub service: String,
    /// "healthy" when the agent is up.
    pub status: String,
    /// Sessions held in memory.
    #[serde(default)]
    pub active_sessions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Envelope Tests
    // =========================================================================

    #[test]
    fn datafile_list_deserializes() {
        let json = r#"{
            "message": "获取成功",
            "data": [{"id":1,"filename":"dalian.csv","file_size":2048,"upload_time":"2024-05-01 10:00:00","description":null}],
            "total": 1
        }"#;
        let body: DataEnvelope<Vec<DataFile>> = serde_json::from_str(json).unwrap();

        assert_eq!(body.total, Some(1));
        assert_eq!(body.data[0].filename, "dalian.csv");
        assert_eq!(body.data[0].file_size, Some(2048));
        assert!(body.data[0].description.is_none());
    }

    #[test]
    fn api_error_prefers_error_field() {
        let both: ApiErrorResponse =
            serde_json::from_str(r#"{"error":"文件不存在","message":"x"}"#).unwrap();
        assert_eq!(both.into_message().as_deref(), Some("文件不存在"));

        let only_message: ApiErrorResponse =
            serde_json::from_str(r#"{"message":"会话不存在"}"#).unwrap();
        assert_eq!(only_message.into_message().as_deref(), Some("会话不存在"));

        let empty: ApiErrorResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.into_message().is_none());
    }

    // =========================================================================
    // Client Tests
    // =========================================================================

    #[test]
    fn client_with_bindings_deserializes() {
        let json = r#"{
            "id": 3, "name": "client-a", "datafile_id": 1, "model_id": 7,
            "created_time": "2024-05-01 10:00:00", "updated_time": null, "description": "",
            "datafile_info": {"id": 1, "filename": "a.csv", "file_size": 10},
            "model_info": {"id": 7, "model_name": "m", "data_count": 500, "model_type": "lightgbm"}
        }"#;
        let client: Client = serde_json::from_str(json).unwrap();

        assert_eq!(client.model_id, Some(7));
        assert_eq!(client.datafile_info.unwrap().filename, "a.csv");
        assert_eq!(client.model_info.unwrap().data_count, Some(500));
    }

    #[test]
    fn unbound_client_deserializes() {
        let client: Client =
            serde_json::from_str(r#"{"id":4,"name":"b","datafile_id":null,"model_id":null}"#)
                .unwrap();
        assert!(client.datafile_id.is_none());
        assert!(client.model_info.is_none());
    }

    #[test]
    fn train_request_omits_unset_fields() {
        let request = TrainRequest {
            model_name: Some("m1".to_string()),
            ..TrainRequest::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"model_name": "m1"}));
    }

    #[test]
    fn model_update_omits_unset_fields() {
        let update = ModelUpdate {
            data_count: Some(10),
            ..ModelUpdate::default()
        };
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"data_count":10}"#
        );
    }

    // =========================================================================
    // Evaluation Tests
    // =========================================================================

    #[test]
    fn evaluation_with_aggregate_deserializes() {
        let json = r#"{
            "message": "评测完成",
            "summary": {"total": 2, "success": 1, "error": 0, "skipped": 1},
            "results": [
                {"client_id": 1, "client_name": "a", "status": "success",
                 "prediction": {"model_name": "m", "data_count": 100, "model_type": "lightgbm",
                                "unit_price": 20000.5, "total_price": 1500000.0},
                 "error": null},
                {"client_id": 2, "client_name": "b", "status": "skipped",
                 "prediction": null, "error": "该客户端未绑定模型"}
            ],
            "federated_results": {
                "weighted_average_total_price": 1500000.0,
                "weighted_average_unit_price": 20000.5,
                "total_data_count": 100,
                "participating_clients": [
                    {"client_id": 1, "client_name": "a", "data_count": 100, "weight_ratio": 1.0}
                ]
            }
        }"#;
        let response: EvaluateResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.summary.skipped, 1);
        assert_eq!(response.results[1].status, EvaluationStatus::Skipped);
        match response.federated_results {
            FederatedResult::Aggregate(aggregate) => {
                assert_eq!(aggregate.total_data_count, 100);
                assert_eq!(aggregate.participating_clients.len(), 1);
            }
            FederatedResult::Failed { .. } => panic!("Expected Aggregate"),
        }
    }

    #[test]
    fn evaluation_with_failed_federation_deserializes() {
        let json = r#"{
            "summary": {"total": 1, "success": 0, "error": 1, "skipped": 0},
            "results": [{"client_id": 1, "client_name": "a", "status": "error", "error": "预测失败: x"}],
            "federated_results": {"error": "No valid prediction results found", "status": "failed", "result": null}
        }"#;
        let response: EvaluateResponse = serde_json::from_str(json).unwrap();

        match response.federated_results {
            FederatedResult::Failed { error, status } => {
                assert_eq!(error, "No valid prediction results found");
                assert_eq!(status.as_deref(), Some("failed"));
            }
            FederatedResult::Aggregate(_) => panic!("Expected Failed"),
        }
    }

    #[test]
    fn unknown_evaluation_status_is_tolerated() {
        let status: EvaluationStatus = serde_json::from_str(r#""pending""#).unwrap();
        assert_eq!(status, EvaluationStatus::Unknown);
    }

    // =========================================================================
    // Agent Tests
    // =========================================================================

    #[test]
    fn chat_reply_text_prefers_response() {
        let reply: ChatReply =
            serde_json::from_str(r#"{"session_id":"s","response":"hi","message":"x"}"#).unwrap();
        assert_eq!(reply.text(), "hi");

        let reply: ChatReply = serde_json::from_str(r#"{"message":"hello"}"#).unwrap();
        assert_eq!(reply.text(), "hello");

        let reply: ChatReply = serde_json::from_str(r#"{"session_id":"s"}"#).unwrap();
        assert_eq!(reply.text(), "");
    }

    #[test]
    fn chat_request_sends_null_session() {
        let request = ChatRequest {
            message: "hi".to_string(),
            session_id: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["session_id"], Value::Null);
    }

    #[test]
    fn session_history_skips_missing_content() {
        let json = r#"{"session_id":"s","messages":[{"role":"user","content":"q"},{"role":"assistant","content":null}],"message_count":2}"#;
        let history: SessionHistory = serde_json::from_str(json).unwrap();
        assert_eq!(history.messages.len(), 2);
        assert!(history.messages[1].content.is_none());
    }
}
