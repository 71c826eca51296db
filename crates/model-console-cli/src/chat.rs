//! Chat exchange driver.
//!
//! Each exchange runs as one spawned task. It opens the chat request, reads
//! the reply and forwards what it learns to the UI loop as [`ChatEvent`]s.
//! The UI applies them to its transcript in arrival order.

use futures::StreamExt;
use model_console_core::{ExchangeMode, Frame};
use tokio::sync::mpsc;

use crate::client::{ApiClient, ClientError};
use crate::types::ChatRequest;

/// Capacity of the channel between exchange tasks and the UI loop.
pub const CHAT_CHANNEL_CAPACITY: usize = 32;

/// Events from an exchange task.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A decoded frame of a streaming reply.
    Frame(Frame),
    /// The streaming body ended without a transport error.
    Finished,
    /// A non-streaming reply arrived.
    Reply {
        /// Session the backend assigned.
        session_id: Option<String>,
        /// Reply text.
        text: String,
    },
    /// The exchange failed in transport and must be rolled back.
    Failed(String),
}

/// Spawn an exchange task.
///
/// Exactly one of `Finished`, `Reply` or `Failed` is sent last, unless the
/// receiver has gone away.
pub fn spawn_exchange(
    client: ApiClient,
    request: ChatRequest,
    mode: ExchangeMode,
    tx: mpsc::Sender<ChatEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { run_exchange(&client, &request, mode, &tx).await })
}

/// Run one exchange to completion, reporting over `tx`.
pub async fn run_exchange(
    client: &ApiClient,
    request: &ChatRequest,
    mode: ExchangeMode,
    tx: &mpsc::Sender<ChatEvent>,
) {
    tracing::debug!(
        mode = %mode,
        session_id = ?request.session_id,
        len = request.message.len(),
        "Starting chat exchange"
    );

    let outcome = match mode {
        ExchangeMode::Stream => stream_reply(client, request, tx).await,
        ExchangeMode::Normal => normal_reply(client, request, tx).await,
    };

    if let Err(e) = outcome {
        tracing::error!(error = %e, mode = %mode, "Chat exchange failed");
        let _ = tx.send(ChatEvent::Failed(e.user_message())).await;
    }
}

async fn stream_reply(
    client: &ApiClient,
    request: &ChatRequest,
    tx: &mpsc::Sender<ChatEvent>,
) -> Result<(), ClientError> {
    let frames = client.chat_stream(request).await?;
    let mut frames = std::pin::pin!(frames);

    let mut count = 0usize;
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        count += 1;
        if tx.send(ChatEvent::Frame(frame)).await.is_err() {
            tracing::debug!("Chat receiver dropped, abandoning stream");
            return Ok(());
        }
    }

    tracing::debug!(frames = count, "Chat stream ended");
    let _ = tx.send(ChatEvent::Finished).await;
    Ok(())
}

async fn normal_reply(
    client: &ApiClient,
    request: &ChatRequest,
    tx: &mpsc::Sender<ChatEvent>,
) -> Result<(), ClientError> {
    let reply = client.chat(request).await?;
    let _ = tx
        .send(ChatEvent::Reply {
            text: reply.text().to_string(),
            session_id: reply.session_id,
        })
        .await;
    Ok(())
}
