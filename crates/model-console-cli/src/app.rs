//! Application state.
//!
//! This module holds the console state and coordinates between the UI, the
//! REST client and chat exchanges. Resource operations are awaited inline by
//! the event loop. Chat exchanges run on their own task and report back
//! through [`ChatEvent`]s, which are folded into the transcript here.

use std::collections::BTreeSet;

use model_console_core::{
    ExchangeMode, FrameEffect, Transcript, TranscriptError, EXCHANGE_FAILED,
};
use tokio::sync::mpsc;

use crate::chat::{self, ChatEvent};
use crate::client::{ApiClient, ClientError};
use crate::config::ConsoleConfig;
use crate::forms::{self, ValidationError};
use crate::report::{self, Report};
use crate::types::{ChatRequest, Client, CreateClientRequest, DataFile, Model, ResourceId};

/// Error from an operator action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The backend call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Input was rejected before dispatch.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl ActionError {
    /// Text suitable for the status bar.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Client(e) => e.user_message(),
            Self::Invalid(e) => e.to_string(),
        }
    }
}

// =============================================================================
// Text Input
// =============================================================================

/// Single-line text buffer with a cursor counted in characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    value: String,
    cursor: usize,
}

impl TextInput {
    /// Create an input holding `value` with the cursor at the end.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let cursor = value.chars().count();
        Self { value, cursor }
    }

    /// Current text.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Cursor position in characters.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn byte_index(&self) -> usize {
        self.value
            .char_indices()
            .nth(self.cursor)
            .map_or(self.value.len(), |(i, _)| i)
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index();
        self.value.insert(at, c);
        self.cursor += 1;
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let at = self.byte_index();
            self.value.remove(at);
        }
    }

    /// Delete the character at the cursor.
    pub fn delete_char_forward(&mut self) {
        if self.cursor < self.value.chars().count() {
            let at = self.byte_index();
            self.value.remove(at);
        }
    }

    /// Move cursor left.
    pub fn move_cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Move cursor right.
    pub fn move_cursor_right(&mut self) {
        if self.cursor < self.value.chars().count() {
            self.cursor += 1;
        }
    }

    /// Move cursor to the start.
    pub fn move_cursor_start(&mut self) {
        self.cursor = 0;
    }

    /// Move cursor to the end.
    pub fn move_cursor_end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    /// Take the current text (clears it).
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.value)
    }
}

// =============================================================================
// Modes
// =============================================================================

/// Which UI column has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    /// Left column: resource panel.
    #[default]
    Resources,
    /// Right column: chat area with input.
    Chat,
}

/// Resource list shown in the left column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceTab {
    /// Uploaded CSV files.
    #[default]
    DataFiles,
    /// Stored models.
    Models,
    /// Clients and their bindings.
    Clients,
}

impl ResourceTab {
    /// All tabs in display order.
    pub const ALL: [Self; 3] = [Self::DataFiles, Self::Models, Self::Clients];

    /// Tab title.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::DataFiles => "数据文件",
            Self::Models => "模型",
            Self::Clients => "客户端",
        }
    }

    /// The tab to the right, wrapping around.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::DataFiles => Self::Models,
            Self::Models => Self::Clients,
            Self::Clients => Self::DataFiles,
        }
    }
}

/// What a form dialog submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    /// Upload a CSV data file.
    UploadDataFile,
    /// Upload a model file.
    UploadModel,
    /// Edit a model's metadata.
    EditModel(ResourceId),
    /// Create a client.
    CreateClient,
    /// Train a client's model.
    TrainClient(ResourceId),
    /// Evaluate the marked clients.
    Evaluate,
}

impl FormKind {
    /// Dialog title.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::UploadDataFile => "上传数据文件",
            Self::UploadModel => "上传模型",
            Self::EditModel(_) => "编辑模型",
            Self::CreateClient => "新建客户端",
            Self::TrainClient(_) => "训练模型",
            Self::Evaluate => "联邦评估",
        }
    }

    /// Field labels in order.
    #[must_use]
    pub const fn labels(self) -> &'static [&'static str] {
        match self {
            Self::UploadDataFile => &["文件路径 (.csv)", "描述"],
            Self::UploadModel => &["文件路径", "模型名称", "训练数据量", "模型类型", "描述"],
            Self::EditModel(_) => &["模型名称", "训练数据量", "模型类型", "描述"],
            Self::CreateClient => &["客户端名称", "描述"],
            Self::TrainClient(_) => &["模型名称", "模型类型", "描述"],
            Self::Evaluate => &["房屋数据 (JSON)"],
        }
    }
}

/// A multi-field dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    /// What the form submits.
    pub kind: FormKind,
    /// One input per label.
    pub fields: Vec<TextInput>,
    /// Field with the cursor.
    pub active: usize,
}

impl Form {
    /// Empty form.
    #[must_use]
    pub fn new(kind: FormKind) -> Self {
        Self::with_values(kind, &[])
    }

    /// Form with leading fields prefilled.
    #[must_use]
    pub fn with_values(kind: FormKind, values: &[&str]) -> Self {
        let fields = (0..kind.labels().len())
            .map(|i| TextInput::new(values.get(i).copied().unwrap_or_default()))
            .collect();
        Self {
            kind,
            fields,
            active: 0,
        }
    }

    /// Text of field `i`.
    #[must_use]
    pub fn value(&self, i: usize) -> &str {
        self.fields.get(i).map_or("", TextInput::value)
    }

    /// The field with the cursor.
    pub fn active_mut(&mut self) -> &mut TextInput {
        &mut self.fields[self.active]
    }

    /// Move to the next field, wrapping.
    pub fn next_field(&mut self) {
        self.active = (self.active + 1) % self.fields.len();
    }

    /// Move to the previous field, wrapping.
    pub fn prev_field(&mut self) {
        self.active = self.active.checked_sub(1).unwrap_or(self.fields.len() - 1);
    }
}

/// What a picker binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickKind {
    /// Bind a data file.
    DataFile,
    /// Bind a model.
    Model,
}

/// A list dialog choosing what to bind to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picker {
    /// What is being bound.
    pub kind: PickKind,
    /// Client receiving the binding.
    pub client_id: ResourceId,
    /// Candidates as (id, label).
    pub options: Vec<(ResourceId, String)>,
    /// Highlighted option.
    pub selected: usize,
}

/// A resource awaiting delete confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    /// A data file.
    DataFile(ResourceId, String),
    /// A model.
    Model(ResourceId, String),
    /// A client.
    Client(ResourceId, String),
}

impl DeleteTarget {
    /// Prompt text.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::DataFile(_, name) => format!("数据文件 '{name}'"),
            Self::Model(_, name) => format!("模型 '{name}'"),
            Self::Client(_, name) => format!("客户端 '{name}'"),
        }
    }
}

/// Input mode for dialogs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InputMode {
    /// Normal operation mode.
    #[default]
    Normal,
    /// Filling in a form.
    Form(Form),
    /// Confirming a delete.
    ConfirmingDelete(DeleteTarget),
    /// Choosing what to bind.
    Picking(Picker),
    /// Reading a report.
    Report {
        /// Report shown.
        report: Report,
        /// First visible line.
        scroll: usize,
    },
}

// =============================================================================
// App
// =============================================================================

/// Application state.
pub struct App {
    /// HTTP client for the backend.
    client: ApiClient,
    /// Console configuration.
    config: ConsoleConfig,
    /// Where exchange tasks report.
    chat_tx: mpsc::Sender<ChatEvent>,
    /// Data files.
    pub datafiles: Vec<DataFile>,
    /// Models.
    pub models: Vec<Model>,
    /// Clients.
    pub clients: Vec<Client>,
    /// Selected data file index.
    pub selected_datafile: Option<usize>,
    /// Selected model index.
    pub selected_model: Option<usize>,
    /// Selected client index.
    pub selected_client: Option<usize>,
    /// Clients marked for evaluation.
    pub marked_clients: BTreeSet<ResourceId>,
    /// Resource tab shown.
    pub tab: ResourceTab,
    /// Which panel has focus.
    pub focus: Focus,
    /// Conversation with the assistant.
    pub transcript: Transcript,
    /// Delivery mode for the next exchange.
    pub chat_mode: ExchangeMode,
    /// Chat input buffer.
    pub input: TextInput,
    /// Current input mode.
    pub input_mode: InputMode,
    /// Chat scroll position, in lines from the bottom.
    pub chat_scroll: usize,
    /// Status message to display.
    pub status_message: Option<String>,
    /// Error message to display.
    pub error_message: Option<String>,
    /// Last refresh error to display to user.
    pub refresh_error: Option<String>,
    /// Backend health from the last refresh.
    pub backend_healthy: Option<bool>,
    /// Replies finalized while the chat was not focused.
    pub unread: usize,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Animation frame counter for loading indicators.
    pub animation_frame: usize,
}

impl App {
    /// Create a new application.
    #[must_use]
    pub fn new(client: ApiClient, config: ConsoleConfig, chat_tx: mpsc::Sender<ChatEvent>) -> Self {
        Self {
            client,
            chat_mode: config.chat_mode,
            config,
            chat_tx,
            datafiles: Vec::new(),
            models: Vec::new(),
            clients: Vec::new(),
            selected_datafile: None,
            selected_model: None,
            selected_client: None,
            marked_clients: BTreeSet::new(),
            tab: ResourceTab::DataFiles,
            focus: Focus::Resources,
            transcript: Transcript::new(),
            input: TextInput::default(),
            input_mode: InputMode::Normal,
            chat_scroll: 0,
            status_message: None,
            error_message: None,
            refresh_error: None,
            backend_healthy: None,
            unread: 0,
            should_quit: false,
            animation_frame: 0,
        }
    }

    /// Tick the animation frame (call on each render).
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Get current spinner character for loading animation.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    /// Get the backend URL for display.
    #[must_use]
    pub fn api_url(&self) -> &str {
        self.client.base_url()
    }

    /// Returns true while a chat exchange is in flight.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.transcript.is_sending()
    }

    /// Set the status message (also clears any error).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.error_message = None;
    }

    /// Set the error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Clear the error message.
    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    // =========================================================================
    // Focus and Navigation
    // =========================================================================

    /// Focus a panel. Focusing the chat marks replies as read.
    pub fn set_focus(&mut self, focus: Focus) {
        self.focus = focus;
        if focus == Focus::Chat {
            self.unread = 0;
        }
    }

    /// Show the next resource tab.
    pub fn next_tab(&mut self) {
        self.tab = self.tab.next();
    }

    fn selection(&mut self) -> (&mut Option<usize>, usize) {
        match self.tab {
            ResourceTab::DataFiles => (&mut self.selected_datafile, self.datafiles.len()),
            ResourceTab::Models => (&mut self.selected_model, self.models.len()),
            ResourceTab::Clients => (&mut self.selected_client, self.clients.len()),
        }
    }

    /// Move selection up in the current list.
    pub fn select_prev(&mut self) {
        let (selected, len) = self.selection();
        if len == 0 {
            return;
        }

        *selected = Some(match *selected {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        });
    }

    /// Move selection down in the current list.
    pub fn select_next(&mut self) {
        let (selected, len) = self.selection();
        if len == 0 {
            return;
        }

        *selected = Some(match *selected {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        });
    }

    /// Get the selected data file.
    #[must_use]
    pub fn selected_datafile(&self) -> Option<&DataFile> {
        self.selected_datafile.and_then(|i| self.datafiles.get(i))
    }

    /// Get the selected model.
    #[must_use]
    pub fn selected_model(&self) -> Option<&Model> {
        self.selected_model.and_then(|i| self.models.get(i))
    }

    /// Get the selected client.
    #[must_use]
    pub fn selected_client(&self) -> Option<&Client> {
        self.selected_client.and_then(|i| self.clients.get(i))
    }

    // =========================================================================
    // Chat Scrolling
    // =========================================================================

    /// Scroll chat up (view older messages).
    pub fn scroll_chat_up(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_add(amount);
    }

    /// Scroll chat down (view newer messages).
    pub fn scroll_chat_down(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_sub(amount);
    }

    // =========================================================================
    // Dialogs
    // =========================================================================

    /// Open a report popup.
    pub fn open_report(&mut self, report: Report) {
        self.input_mode = InputMode::Report { report, scroll: 0 };
    }

    /// Close any dialog.
    pub fn close_dialog(&mut self) {
        self.input_mode = InputMode::Normal;
    }

    /// Scroll the report popup.
    pub fn scroll_report(&mut self, delta: isize) {
        if let InputMode::Report { report, scroll } = &mut self.input_mode {
            let max = report.lines.len().saturating_sub(1);
            *scroll = scroll.saturating_add_signed(delta).min(max);
        }
    }

    /// Open the upload form for the current tab.
    pub fn begin_upload(&mut self) {
        let kind = match self.tab {
            ResourceTab::DataFiles => FormKind::UploadDataFile,
            ResourceTab::Models => FormKind::UploadModel,
            ResourceTab::Clients => FormKind::CreateClient,
        };
        self.input_mode = InputMode::Form(Form::new(kind));
    }

    /// Open the new-client form.
    pub fn begin_create_client(&mut self) {
        self.input_mode = InputMode::Form(Form::new(FormKind::CreateClient));
    }

    /// Open the edit form for the selected model.
    pub fn begin_edit_model(&mut self) {
        let Some(model) = self.selected_model() else {
            self.set_error("请先选择模型");
            return;
        };
        let data_count = model.data_count.map(|c| c.to_string()).unwrap_or_default();
        let form = Form::with_values(
            FormKind::EditModel(model.id),
            &[
                model.model_name.as_str(),
                data_count.as_str(),
                model.model_type.as_deref().unwrap_or_default(),
                model.description.as_deref().unwrap_or_default(),
            ],
        );
        self.input_mode = InputMode::Form(form);
    }

    /// Open the training form for the selected client.
    pub fn begin_train(&mut self) {
        let Some((id, has_data)) = self
            .selected_client()
            .map(|c| (c.id, c.datafile_id.is_some()))
        else {
            self.set_error("请先选择客户端");
            return;
        };
        if !has_data {
            self.set_error("该客户端未绑定数据文件，无法训练");
            return;
        }
        let default_name = format!("client_{id}_model");
        let form = Form::with_values(FormKind::TrainClient(id), &[default_name.as_str(), "lightgbm"]);
        self.input_mode = InputMode::Form(form);
    }

    /// Open the evaluation form for the marked clients.
    pub fn begin_evaluate(&mut self) {
        if self.marked_clients.is_empty() {
            self.set_error("请至少选择一个客户端");
            return;
        }
        self.input_mode = InputMode::Form(Form::new(FormKind::Evaluate));
    }

    /// Ask to delete the selected resource.
    pub fn begin_delete(&mut self) {
        let target = match self.tab {
            ResourceTab::DataFiles => self
                .selected_datafile()
                .map(|f| DeleteTarget::DataFile(f.id, f.filename.clone())),
            ResourceTab::Models => self
                .selected_model()
                .map(|m| DeleteTarget::Model(m.id, m.model_name.clone())),
            ResourceTab::Clients => self
                .selected_client()
                .map(|c| DeleteTarget::Client(c.id, c.name.clone())),
        };
        match target {
            Some(target) => self.input_mode = InputMode::ConfirmingDelete(target),
            None => self.set_error("未选择任何项目"),
        }
    }

    /// Open a picker binding a data file or model to the selected client.
    pub fn begin_bind(&mut self, kind: PickKind) {
        let Some(client_id) = self.selected_client().map(|c| c.id) else {
            self.set_error("请先选择客户端");
            return;
        };
        let options: Vec<(ResourceId, String)> = match kind {
            PickKind::DataFile => self
                .datafiles
                .iter()
                .map(|f| (f.id, format!("#{} {}", f.id, f.filename)))
                .collect(),
            PickKind::Model => self
                .models
                .iter()
                .map(|m| (m.id, format!("#{} {}", m.id, m.model_name)))
                .collect(),
        };
        if options.is_empty() {
            self.set_error(match kind {
                PickKind::DataFile => "没有可绑定的数据文件",
                PickKind::Model => "没有可绑定的模型",
            });
            return;
        }
        self.input_mode = InputMode::Picking(Picker {
            kind,
            client_id,
            options,
            selected: 0,
        });
    }

    /// Move the picker highlight.
    pub fn move_picker(&mut self, down: bool) {
        if let InputMode::Picking(picker) = &mut self.input_mode {
            let len = picker.options.len();
            picker.selected = if down {
                (picker.selected + 1) % len
            } else {
                picker.selected.checked_sub(1).unwrap_or(len - 1)
            };
        }
    }

    /// Mark or unmark the selected client for evaluation.
    pub fn toggle_mark_selected_client(&mut self) {
        if let Some(id) = self.selected_client().map(|c| c.id) {
            if !self.marked_clients.remove(&id) {
                self.marked_clients.insert(id);
            }
        }
    }

    // =========================================================================
    // API Operations
    // =========================================================================

    /// Refresh health and every resource list.
    pub async fn refresh_all(&mut self) -> Result<(), ClientError> {
        match self.client.health().await {
            Ok(health) => self.backend_healthy = Some(health.is_healthy()),
            Err(e) => {
                self.backend_healthy = Some(false);
                return Err(e);
            }
        }
        self.refresh_datafiles().await?;
        self.refresh_models().await?;
        self.refresh_clients().await?;
        Ok(())
    }

    /// Refresh the data file list.
    pub async fn refresh_datafiles(&mut self) -> Result<(), ClientError> {
        self.datafiles = self.client.list_datafiles().await?;
        clamp_selection(&mut self.selected_datafile, self.datafiles.len());
        Ok(())
    }

    /// Refresh the model list.
    pub async fn refresh_models(&mut self) -> Result<(), ClientError> {
        self.models = self.client.list_models().await?;
        clamp_selection(&mut self.selected_model, self.models.len());
        Ok(())
    }

    /// Refresh the client list. Marks of deleted clients are dropped.
    pub async fn refresh_clients(&mut self) -> Result<(), ClientError> {
        self.clients = self.client.list_clients().await?;
        clamp_selection(&mut self.selected_client, self.clients.len());
        let ids: BTreeSet<ResourceId> = self.clients.iter().map(|c| c.id).collect();
        self.marked_clients.retain(|id| ids.contains(id));
        Ok(())
    }

    /// Show details of the selected resource, fetched fresh.
    pub async fn show_selected_details(&mut self) -> Result<(), ActionError> {
        let report = match self.tab {
            ResourceTab::DataFiles => match self.selected_datafile().map(|f| f.id) {
                Some(id) => report::datafile(&self.client.get_datafile(id).await?),
                None => return Ok(()),
            },
            ResourceTab::Models => match self.selected_model().map(|m| m.id) {
                Some(id) => report::model(&self.client.get_model(id).await?),
                None => return Ok(()),
            },
            ResourceTab::Clients => match self.selected_client().map(|c| c.id) {
                Some(id) => report::client(&self.client.get_client(id).await?),
                None => return Ok(()),
            },
        };
        self.open_report(report);
        Ok(())
    }

    /// Preview the selected data file.
    pub async fn preview_selected(&mut self) -> Result<(), ClientError> {
        let Some(id) = self.selected_datafile().map(|f| f.id) else {
            self.set_error("请先选择数据文件");
            return Ok(());
        };
        let preview = self
            .client
            .preview_datafile(id, self.config.preview_rows())
            .await?;
        self.open_report(report::preview(&preview));
        Ok(())
    }

    /// Download the selected data file or model.
    pub async fn download_selected(&mut self) -> Result<(), ClientError> {
        let dir = self.config.download_dir.clone();
        let saved = match self.tab {
            ResourceTab::DataFiles => match self.selected_datafile().map(|f| f.id) {
                Some(id) => self.client.download_datafile(id, &dir).await?,
                None => return Ok(()),
            },
            ResourceTab::Models => match self.selected_model().map(|m| m.id) {
                Some(id) => self.client.download_model(id, &dir).await?,
                None => return Ok(()),
            },
            ResourceTab::Clients => {
                self.set_error("客户端不支持下载");
                return Ok(());
            }
        };
        self.set_status(format!("已保存到 {}", saved.display()));
        Ok(())
    }

    /// Delete the resource awaiting confirmation.
    pub async fn confirm_delete(&mut self) -> Result<(), ClientError> {
        let InputMode::ConfirmingDelete(target) = std::mem::take(&mut self.input_mode) else {
            return Ok(());
        };
        match &target {
            DeleteTarget::DataFile(id, _) => {
                self.client.delete_datafile(*id).await?;
                self.refresh_datafiles().await?;
            }
            DeleteTarget::Model(id, _) => {
                self.client.delete_model(*id).await?;
                self.refresh_models().await?;
            }
            DeleteTarget::Client(id, _) => {
                self.client.delete_client(*id).await?;
                self.refresh_clients().await?;
            }
        }
        self.set_status(format!("已删除{}", target.describe()));
        Ok(())
    }

    /// Bind the picked data file or model.
    pub async fn confirm_pick(&mut self) -> Result<(), ClientError> {
        let InputMode::Picking(picker) = std::mem::take(&mut self.input_mode) else {
            return Ok(());
        };
        let Some((id, label)) = picker.options.get(picker.selected).cloned() else {
            return Ok(());
        };
        let client = match picker.kind {
            PickKind::DataFile => self.client.bind_datafile(picker.client_id, id).await?,
            PickKind::Model => self.client.bind_model(picker.client_id, id).await?,
        };
        self.set_status(format!("已将 {label} 绑定到 {}", client.name));
        self.replace_client(client);
        Ok(())
    }

    /// Remove the selected client's data file or model binding.
    pub async fn unbind_selected(&mut self, kind: PickKind) -> Result<(), ClientError> {
        let Some(id) = self.selected_client().map(|c| c.id) else {
            self.set_error("请先选择客户端");
            return Ok(());
        };
        let client = match kind {
            PickKind::DataFile => self.client.unbind_datafile(id).await?,
            PickKind::Model => self.client.unbind_model(id).await?,
        };
        self.set_status(format!("已解除 {} 的绑定", client.name));
        self.replace_client(client);
        Ok(())
    }

    fn replace_client(&mut self, client: Client) {
        if let Some(slot) = self.clients.iter_mut().find(|c| c.id == client.id) {
            *slot = client;
        }
    }

    /// Submit the open form. The form stays open if the action fails.
    pub async fn submit_form(&mut self) -> Result<(), ActionError> {
        let InputMode::Form(form) = &self.input_mode else {
            return Ok(());
        };
        let form = form.clone();
        self.run_form(&form).await?;
        if self.input_mode == InputMode::Form(form) {
            self.input_mode = InputMode::Normal;
        }
        Ok(())
    }

    async fn run_form(&mut self, form: &Form) -> Result<(), ActionError> {
        match form.kind {
            FormKind::UploadDataFile => {
                let path = forms::validate_csv_path(form.value(0))?;
                let file = self
                    .client
                    .upload_datafile(path, form.value(1).trim())
                    .await?;
                self.set_status(format!("已上传 {}", file.filename));
                self.refresh_datafiles().await?;
            }
            FormKind::UploadModel => {
                let path = forms::validate_model_path(form.value(0))?;
                let upload = forms::model_upload(
                    form.value(1),
                    form.value(2),
                    form.value(4),
                    form.value(3),
                )?;
                let model = self.client.upload_model(path, &upload).await?;
                self.set_status(format!("已上传模型 {}", model.model_name));
                self.refresh_models().await?;
            }
            FormKind::EditModel(id) => {
                let update = forms::model_update(
                    form.value(0),
                    form.value(1),
                    form.value(3),
                    form.value(2),
                )?;
                let model = self.client.update_model(id, &update).await?;
                self.set_status(format!("已更新模型 {}", model.model_name));
                self.refresh_models().await?;
            }
            FormKind::CreateClient => {
                let request = CreateClientRequest {
                    name: forms::client_name(form.value(0))?,
                    description: Some(form.value(1).trim().to_string())
                        .filter(|d| !d.is_empty()),
                };
                let client = self.client.create_client(&request).await?;
                self.set_status(format!("已创建客户端 {}", client.name));
                self.refresh_clients().await?;
                self.tab = ResourceTab::Clients;
                self.selected_client = self.clients.iter().position(|c| c.id == client.id);
            }
            FormKind::TrainClient(id) => {
                let request = forms::train_request(form.value(0), form.value(1), form.value(2))?;
                let result = self.client.train_client(id, &request).await?;
                self.set_status(format!(
                    "训练完成: 模型 {} (数据 {} 行, 处理后 {} 行)",
                    result.model.model_name,
                    result.training_info.data_rows,
                    result.training_info.processed_rows
                ));
                self.replace_client(result.client);
                self.refresh_models().await?;
            }
            FormKind::Evaluate => {
                let ids: Vec<ResourceId> = self.marked_clients.iter().copied().collect();
                let request = forms::evaluate_request(&ids, form.value(0))?;
                let response = self.client.evaluate(&request).await?;
                self.open_report(report::evaluation(&response));
            }
        }
        Ok(())
    }

    /// Show agent health, sessions and the current session's history.
    pub async fn show_agent_report(&mut self) -> Result<(), ClientError> {
        let health = self.client.agent_health().await?;
        let sessions = self.client.list_sessions().await?;
        let current = match self.transcript.session_id() {
            Some(id) => match self.client.get_session(id).await {
                Ok(history) => Some(history),
                Err(e) => {
                    tracing::warn!(error = %e, session_id = id, "Could not load session history");
                    None
                }
            },
            None => None,
        };
        self.open_report(report::agent(&health, &sessions, current.as_ref()));
        Ok(())
    }

    // =========================================================================
    // Chat
    // =========================================================================

    /// Send the chat input as a new exchange.
    pub fn send_message(&mut self) {
        let text = self.input.value().to_string();
        match self.transcript.begin_exchange(&text, self.chat_mode) {
            Ok(message) => {
                self.input.take();
                self.chat_scroll = 0;
                let request = ChatRequest {
                    message,
                    session_id: self.transcript.session_id().map(String::from),
                };
                chat::spawn_exchange(
                    self.client.clone(),
                    request,
                    self.chat_mode,
                    self.chat_tx.clone(),
                );
            }
            Err(TranscriptError::EmptyMessage) => {}
            Err(TranscriptError::ExchangeInFlight) => self.set_error("正在等待回复"),
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Apply an event from the exchange task.
    ///
    /// Returns true if the UI should redraw immediately.
    pub fn handle_chat_event(&mut self, event: ChatEvent) -> bool {
        match event {
            ChatEvent::Frame(frame) => match self.transcript.apply(&frame) {
                FrameEffect::Updated => true,
                FrameEffect::Unchanged | FrameEffect::Completed => false,
                FrameEffect::Notice(message) => {
                    self.set_error(message);
                    true
                }
            },
            ChatEvent::Finished => {
                if self.transcript.finish_stream().is_ok() {
                    self.reply_finalized();
                }
                true
            }
            ChatEvent::Reply { session_id, text } => {
                if self
                    .transcript
                    .complete_reply(session_id.as_deref(), &text)
                    .is_ok()
                {
                    self.reply_finalized();
                }
                true
            }
            ChatEvent::Failed(reason) => {
                tracing::debug!(reason = %reason, "Rolling back chat exchange");
                if self.transcript.fail_exchange().is_ok() {
                    self.set_error(EXCHANGE_FAILED);
                }
                true
            }
        }
    }

    fn reply_finalized(&mut self) {
        if self.focus != Focus::Chat {
            self.unread += 1;
        }
    }

    /// Switch between streaming and non-streaming replies.
    pub fn toggle_chat_mode(&mut self) {
        self.chat_mode = self.chat_mode.toggled();
        self.set_status(format!("对话模式: {}", self.chat_mode));
    }

    /// Discard the conversation and its backend session.
    pub async fn clear_chat(&mut self) {
        if self.is_sending() {
            self.set_error("正在等待回复");
            return;
        }
        if let Some(id) = self.transcript.session_id().map(String::from) {
            if let Err(e) = self.client.delete_session(&id).await {
                tracing::warn!(error = %e, session_id = %id, "Could not delete agent session");
            }
        }
        self.transcript.clear();
        self.chat_scroll = 0;
        self.unread = 0;
        self.set_status("对话已清空");
    }
}

/// Keep a selection inside a list of `len` items.
fn clamp_selection(selected: &mut Option<usize>, len: usize) {
    *selected = match *selected {
        _ if len == 0 => None,
        Some(i) if i >= len => Some(len - 1),
        None => Some(0),
        keep => keep,
    };
}
