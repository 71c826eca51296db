//! Validation of operator input before it is sent to the backend.
//!
//! Every check returns a [`ValidationError`] naming the offending field, so
//! the console can reject a form without making a request.

use std::path::Path;

use serde_json::{Map, Value};

use crate::types::{EvaluateRequest, ModelUpdate, ModelUpload, ResourceId, TrainRequest};

/// Input rejected before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Form field at fault.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

/// Trimmed non-empty text of a required field.
fn required(field: &'static str, value: &str, message: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(ValidationError::new(field, message))
    } else {
        Ok(value.to_string())
    }
}

/// Trimmed text of an optional field, `None` when blank.
fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Positive row count.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the value is blank, not a whole number,
/// or zero.
pub fn parse_data_count(value: &str) -> Result<u64> {
    let value = required("data_count", value, "请输入训练数据量")?;
    match value.parse::<u64>() {
        Ok(0) => Err(ValidationError::new("data_count", "训练数据量必须大于 0")),
        Ok(n) => Ok(n),
        Err(_) => Err(ValidationError::new(
            "data_count",
            format!("训练数据量必须是整数: {value}"),
        )),
    }
}

/// Check that a data-file upload is a CSV file.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the path is blank or lacks a `.csv`
/// extension.
pub fn validate_csv_path(path: &str) -> Result<&Path> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("file", "请选择文件"));
    }
    let path = Path::new(trimmed);
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        Ok(path)
    } else {
        Err(ValidationError::new("file", "只支持CSV文件"))
    }
}

/// Check that a model upload names a file.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the path is blank.
pub fn validate_model_path(path: &str) -> Result<&Path> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        Err(ValidationError::new("file", "请选择文件"))
    } else {
        Ok(Path::new(trimmed))
    }
}

/// Build the metadata of a model upload.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the name is blank or the row count is
/// not a positive integer.
pub fn model_upload(
    model_name: &str,
    data_count: &str,
    description: &str,
    model_type: &str,
) -> Result<ModelUpload> {
    Ok(ModelUpload {
        model_name: required("model_name", model_name, "请输入模型名称")?,
        data_count: parse_data_count(data_count)?,
        description: optional(description),
        model_type: optional(model_type),
    })
}

/// Build a model edit. Name and row count stay required, as on upload.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the name is blank or the row count is
/// not a positive integer.
pub fn model_update(
    model_name: &str,
    data_count: &str,
    description: &str,
    model_type: &str,
) -> Result<ModelUpdate> {
    Ok(ModelUpdate {
        model_name: Some(required("model_name", model_name, "请输入模型名称")?),
        data_count: Some(parse_data_count(data_count)?),
        description: Some(description.trim().to_string()),
        model_type: Some(model_type.trim().to_string()),
    })
}

/// Validate a client name.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the name is blank.
pub fn client_name(name: &str) -> Result<String> {
    required("name", name, "请输入客户端名称")
}

/// Build training options.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the model name or type is blank.
pub fn train_request(model_name: &str, model_type: &str, description: &str) -> Result<TrainRequest> {
    Ok(TrainRequest {
        model_name: Some(required("model_name", model_name, "请输入模型名称")?),
        model_type: Some(required("model_type", model_type, "请输入模型类型")?),
        description: optional(description),
    })
}

/// Parse the house record typed by the operator.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the text is blank, not JSON, or not a
/// JSON object.
pub fn parse_house_data(input: &str) -> Result<Map<String, Value>> {
    let input = required("house_data", input, "请输入待预测的数据")?;
    match serde_json::from_str::<Value>(&input) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ValidationError::new(
            "house_data",
            "house_data 必须是 JSON 对象",
        )),
        Err(e) => Err(ValidationError::new(
            "house_data",
            format!("JSON格式错误: {e}"),
        )),
    }
}

/// Build an evaluation request for the selected clients.
///
/// # Errors
///
/// Returns a [`ValidationError`] if no client is selected or the house
/// record is invalid.
pub fn evaluate_request(client_ids: &[ResourceId], house_data: &str) -> Result<EvaluateRequest> {
    if client_ids.is_empty() {
        return Err(ValidationError::new("client_ids", "请至少选择一个客户端"));
    }
    Ok(EvaluateRequest {
        client_ids: client_ids.to_vec(),
        house_data: parse_house_data(house_data)?,
    })
}
