//! Text reports shown in the popup: previews, evaluations and details.

use serde_json::Value;

use crate::types::{
    AgentHealth, Client, DataFile, DataPreview, EvaluateResponse, FederatedResult, Model,
    SessionHistory, SessionList,
};

/// A titled block of lines for the report popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Popup title.
    pub title: String,
    /// Body lines.
    pub lines: Vec<String>,
}

fn or_dash(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("-")
}

fn price(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

/// Human-readable byte count.
#[must_use]
pub fn format_size(bytes: Option<u64>) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let Some(bytes) = bytes else {
        return "-".to_string();
    };
    #[allow(clippy::cast_precision_loss)]
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Table of the first rows of a data file.
#[must_use]
pub fn preview(preview: &DataPreview) -> Report {
    let mut lines = vec![
        format!("文件: {}", preview.filename),
        format!(
            "总行数: {}  显示: {}  列数: {}",
            preview.total_rows,
            preview.preview_data.len(),
            preview.columns.len()
        ),
        String::new(),
    ];

    let rows: Vec<Vec<String>> = preview
        .preview_data
        .iter()
        .map(|record| {
            preview
                .columns
                .iter()
                .map(|column| record.get(column).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = preview
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let render = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    lines.push(render(&preview.columns));
    lines.push(
        widths
            .iter()
            .map(|&w| "-".repeat(w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    lines.extend(rows.iter().map(|row| render(row)));

    Report {
        title: format!("预览: {}", preview.filename),
        lines,
    }
}

/// Per-client predictions and the federated result.
#[must_use]
pub fn evaluation(response: &EvaluateResponse) -> Report {
    let summary = &response.summary;
    let mut lines = vec![
        response.message.clone().unwrap_or_else(|| "评测完成".to_string()),
        format!(
            "总计 {}  成功 {}  失败 {}  跳过 {}",
            summary.total, summary.success, summary.error, summary.skipped
        ),
        String::new(),
        "联邦加权结果".to_string(),
    ];

    match &response.federated_results {
        FederatedResult::Aggregate(aggregate) => {
            lines.push(format!(
                "  加权平均总价: {:.2}",
                aggregate.weighted_average_total_price
            ));
            lines.push(format!(
                "  加权平均单价: {:.2}",
                aggregate.weighted_average_unit_price
            ));
            lines.push(format!("  总数据量: {}", aggregate.total_data_count));
            lines.push("  参与客户端:".to_string());
            for client in &aggregate.participating_clients {
                lines.push(format!(
                    "    #{} {}  数据量 {}  权重 {:.1}%",
                    client.client_id,
                    client.client_name,
                    client.data_count,
                    client.weight_ratio * 100.0
                ));
            }
        }
        FederatedResult::Failed { error, .. } => {
            lines.push(format!("  无可用结果: {error}"));
        }
    }

    lines.push(String::new());
    lines.push("各客户端结果".to_string());
    for result in &response.results {
        let head = format!(
            "  #{} {} [{}]",
            result.client_id,
            result.client_name,
            result.status.as_str()
        );
        match (&result.prediction, &result.error) {
            (Some(prediction), _) => lines.push(format!(
                "{head} 模型 {} ({})  数据量 {}  单价 {}  总价 {}",
                or_dash(prediction.model_name.as_deref()),
                or_dash(prediction.model_type.as_deref()),
                prediction
                    .data_count
                    .map_or_else(|| "-".to_string(), |c| c.to_string()),
                price(prediction.unit_price),
                price(prediction.total_price),
            )),
            (None, Some(error)) => lines.push(format!("{head} {error}")),
            (None, None) => lines.push(head),
        }
    }

    Report {
        title: "评估结果".to_string(),
        lines,
    }
}

/// Details of one data file.
#[must_use]
pub fn datafile(file: &DataFile) -> Report {
    Report {
        title: format!("数据文件 #{}", file.id),
        lines: vec![
            format!("文件名: {}", file.filename),
            format!("大小: {}", format_size(file.file_size)),
            format!("上传时间: {}", or_dash(file.upload_time.as_deref())),
            format!("描述: {}", or_dash(file.description.as_deref())),
        ],
    }
}

/// Details of one model.
#[must_use]
pub fn model(model: &Model) -> Report {
    Report {
        title: format!("模型 #{}", model.id),
        lines: vec![
            format!("名称: {}", model.model_name),
            format!("类型: {}", or_dash(model.model_type.as_deref())),
            format!(
                "训练数据量: {}",
                model
                    .data_count
                    .map_or_else(|| "-".to_string(), |c| c.to_string())
            ),
            format!("大小: {}", format_size(model.model_size)),
            format!("上传时间: {}", or_dash(model.upload_time.as_deref())),
            format!("描述: {}", or_dash(model.description.as_deref())),
        ],
    }
}

/// Details of one client and its bindings.
#[must_use]
pub fn client(client: &Client) -> Report {
    let datafile = client.datafile_info.as_ref().map_or_else(
        || "未绑定".to_string(),
        |f| format!("#{} {} ({})", f.id, f.filename, format_size(f.file_size)),
    );
    let model = client.model_info.as_ref().map_or_else(
        || "未绑定".to_string(),
        |m| {
            format!(
                "#{} {} ({}, 数据量 {})",
                m.id,
                m.model_name,
                or_dash(m.model_type.as_deref()),
                m.data_count.map_or_else(|| "-".to_string(), |c| c.to_string())
            )
        },
    );

    Report {
        title: format!("客户端 #{}", client.id),
        lines: vec![
            format!("名称: {}", client.name),
            format!("描述: {}", or_dash(client.description.as_deref())),
            format!("数据文件: {datafile}"),
            format!("模型: {model}"),
            format!("创建时间: {}", or_dash(client.created_time.as_deref())),
            format!("更新时间: {}", or_dash(client.updated_time.as_deref())),
        ],
    }
}

/// Agent status, its sessions and the history of the current one.
#[must_use]
pub fn agent(health: &AgentHealth, sessions: &SessionList, current: Option<&SessionHistory>) -> Report {
    let mut lines = vec![
        format!("服务: {}  状态: {}", health.service, health.status),
        format!("活动会话: {}", health.active_sessions),
        String::new(),
        format!("会话列表 ({})", sessions.total),
    ];
    for session in &sessions.sessions {
        lines.push(format!(
            "  {}  {}  消息 {}",
            session.session_id,
            or_dash(session.created_at.as_deref()),
            session.message_count
        ));
    }

    if let Some(history) = current {
        lines.push(String::new());
        lines.push(format!(
            "当前会话 {} ({} 条消息)",
            history.session_id, history.message_count
        ));
        for message in &history.messages {
            if let Some(content) = message.content.as_deref().filter(|c| !c.is_empty()) {
                let first_line = content.lines().next().unwrap_or_default();
                lines.push(format!("  [{}] {first_line}", message.role));
            }
        }
    }

    Report {
        title: "助手会话".to_string(),
        lines,
    }
}
