//! # Session State
//!
//! Every uploaded file owns a [`FileState`]: the table read at ingestion, the cleaning
//! operations applied so far and the user's current choices. User interactions arrive
//! as [`Event`]s; each one updates a single file and yields an immutable [`Snapshot`].
//! The working table is always rebuilt by replaying the applied operations on the
//! ingested table, so rendering the same state twice gives the same result.
use crate::chart::bar_chart;
use crate::chart::BarChart;
use crate::cleaning::CleaningOperation;
use crate::error::ResultMessage;
use crate::error::SweeperError;
use crate::export::convert;
use crate::export::ArtifactInfo;
use crate::export::ConversionTarget;
use crate::export::DownloadArtifact;
use crate::spreadsheet::read_table;
use crate::spreadsheet::UploadedFile;
use crate::table::Column;
use crate::table::Table;
use crate::table::Value;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("File '{0}' not found")]
    FileNotFound(Uuid),

    #[error("No converted file is ready for '{0}'")]
    NoArtifact(String),
}

/// Identity of an upload: re-sending a file with the same name and size is the same file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FileKey {
    pub name: String,
    pub size: usize,
}

impl From<&UploadedFile> for FileKey {
    fn from(file: &UploadedFile) -> Self {
        FileKey {
            name: file.name.to_owned(),
            size: file.size(),
        }
    }
}

/// A user interaction with one file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SetCleaning { enabled: bool },
    RemoveDuplicates,
    FillMissing,
    SelectColumns { columns: Vec<String> },
    SetVisualization { enabled: bool },
    SetTarget { target: ConversionTarget },
    Convert,
}

/// Outcome message of the last event, shown next to the file.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "level", content = "text", rename_all = "snake_case")]
pub enum Message {
    Success(String),
    Error(String),
}

#[derive(Clone, Debug)]
pub struct FileState {
    pub id: Uuid,
    pub key: FileKey,
    ingested: Table,
    operations: Vec<CleaningOperation>,
    cleaning_enabled: bool,
    /// `None` selects every column in table order
    selection: Option<Vec<String>>,
    visualization_enabled: bool,
    target: ConversionTarget,
    artifact: Option<DownloadArtifact>,
    message: Option<Message>,
}

impl FileState {
    fn new(key: FileKey, ingested: Table) -> Self {
        FileState {
            id: Uuid::new_v4(),
            key,
            ingested,
            operations: Vec::new(),
            cleaning_enabled: false,
            selection: None,
            visualization_enabled: false,
            target: ConversionTarget::default(),
            artifact: None,
            message: None,
        }
    }

    /// The ingested table with every applied cleaning operation replayed in order.
    pub fn cleaned(&self) -> Table {
        self.operations
            .iter()
            .fold(self.ingested.clone(), |table, operation| operation.apply(&table).0)
    }

    pub fn selection(&self) -> Vec<String> {
        match &self.selection {
            Some(columns) => columns.to_owned(),
            None => self.ingested.column_names(),
        }
    }

    /// The cleaned table restricted to the selected columns.
    pub fn selected(&self) -> Result<Table, SweeperError> {
        Ok(self.cleaned().select(&self.selection())?)
    }

    fn apply(&mut self, event: Event) -> Result<String, SweeperError> {
        if !matches!(event, Event::Convert) {
            self.artifact = None;
        }
        match event {
            Event::SetCleaning { enabled } => {
                self.cleaning_enabled = enabled;
                Ok(format!("Cleaning {}", if enabled { "enabled" } else { "disabled" }))
            }
            Event::RemoveDuplicates => self.clean(CleaningOperation::RemoveDuplicates),
            Event::FillMissing => self.clean(CleaningOperation::FillMissing),
            Event::SelectColumns { columns } => {
                self.ingested.select(&columns)?;
                let count = columns.len();
                self.selection = Some(columns);
                Ok(format!("Selected {count} columns"))
            }
            Event::SetVisualization { enabled } => {
                self.visualization_enabled = enabled;
                Ok(format!("Visualization {}", if enabled { "enabled" } else { "disabled" }))
            }
            Event::SetTarget { target } => {
                self.target = target;
                Ok(format!("Conversion target set to {target}"))
            }
            Event::Convert => {
                let artifact = convert(&self.selected()?, &self.key.name, self.target)?;
                let message = format!("{} converted to {}: {}", self.key.name, self.target, artifact.file_name);
                self.artifact = Some(artifact);
                Ok(message)
            }
        }
    }

    fn clean(&mut self, operation: CleaningOperation) -> Result<String, SweeperError> {
        if !self.cleaning_enabled {
            return Ok("Cleaning is disabled; enable it to apply cleaning operations".to_owned());
        }
        let (_, report) = operation.apply(&self.cleaned());
        self.operations.push(operation);
        Ok(report.to_string())
    }

    pub fn snapshot(&self, preview_rows: usize) -> Snapshot {
        let cleaned = self.cleaned();
        let selection = self.selection();
        let (chart, chart_error) = match (self.visualization_enabled, selection.is_empty()) {
            (true, false) => match cleaned.select(&selection).map(|table| bar_chart(&table)) {
                Ok(Ok(chart)) => (Some(chart), None),
                Ok(Err(error)) => (None, Some(error.to_string())),
                Err(error) => (None, Some(error.to_string())),
            },
            _ => (None, None),
        };
        Snapshot {
            id: self.id,
            file_name: self.key.name.to_owned(),
            size: self.key.size,
            columns: cleaned.columns().to_vec(),
            rows: cleaned.height(),
            preview: cleaned.head(preview_rows).to_vec(),
            cleaning_enabled: self.cleaning_enabled,
            operations: self.operations.to_owned(),
            selection,
            visualization_enabled: self.visualization_enabled,
            chart,
            chart_error,
            target: self.target,
            artifact: self.artifact.as_ref().map(DownloadArtifact::info),
            message: self.message.to_owned(),
        }
    }
}

/// Immutable view of one file after an event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub file_name: String,
    pub size: usize,
    /// Schema of the cleaned table, before column selection
    pub columns: Vec<Column>,
    pub rows: usize,
    pub preview: Vec<Vec<Value>>,
    pub cleaning_enabled: bool,
    pub operations: Vec<CleaningOperation>,
    pub selection: Vec<String>,
    pub visualization_enabled: bool,
    pub chart: Option<BarChart>,
    pub chart_error: Option<String>,
    pub target: ConversionTarget,
    pub artifact: Option<ArtifactInfo>,
    pub message: Option<Message>,
}

/// Result of uploading one file.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    Accepted { snapshot: Snapshot },
    Rejected { file_name: String, error: String },
}

/// An uploaded file parsed without touching any session.
#[derive(Debug)]
pub struct ParsedUpload {
    key: FileKey,
    table: Result<Table, String>,
}

impl ParsedUpload {
    pub fn read(file: UploadedFile) -> Self {
        ParsedUpload {
            key: FileKey::from(&file),
            table: read_table(&file).with_prefix(&file.name).map_err(|error| error.to_string()),
        }
    }
}

/// All files of one user, in upload order.
#[derive(Clone, Debug)]
pub struct Session {
    files: Vec<FileState>,
    preview_rows: usize,
}

impl Session {
    pub fn new(preview_rows: usize) -> Self {
        Session {
            files: Vec::new(),
            preview_rows,
        }
    }

    /// Ingests a file. A file already present under the same key keeps its state.
    /// A file that cannot be read is rejected without affecting the others.
    pub fn upload(&mut self, file: UploadedFile) -> UploadOutcome {
        let key = FileKey::from(&file);
        match self.existing(&key) {
            Some(outcome) => outcome,
            None => self.accept(ParsedUpload::read(file)),
        }
    }

    /// Adds a file parsed by [`ParsedUpload::read`], keeping the state of a file
    /// already present under the same key.
    pub fn accept(&mut self, upload: ParsedUpload) -> UploadOutcome {
        if let Some(outcome) = self.existing(&upload.key) {
            return outcome;
        }
        match upload.table {
            Ok(table) => {
                let name = upload.key.name.to_owned();
                let mut state = FileState::new(upload.key, table);
                state.message = Some(Message::Success(format!("{name} uploaded")));
                let snapshot = state.snapshot(self.preview_rows);
                self.files.push(state);
                UploadOutcome::Accepted { snapshot }
            }
            Err(error) => {
                warn!(file = %upload.key.name, "rejected upload: {error}");
                UploadOutcome::Rejected {
                    file_name: upload.key.name,
                    error,
                }
            }
        }
    }

    fn existing(&self, key: &FileKey) -> Option<UploadOutcome> {
        let state = self.files.iter().find(|state| &state.key == key)?;
        info!(file = %key.name, "file already uploaded, keeping its state");
        Some(UploadOutcome::Accepted {
            snapshot: state.snapshot(self.preview_rows),
        })
    }

    pub fn upload_all(&mut self, files: impl IntoIterator<Item = UploadedFile>) -> Vec<UploadOutcome> {
        files.into_iter().map(|file| self.upload(file)).collect()
    }

    /// Applies an event to one file. Failures of the event itself are reported in the
    /// snapshot's message; only an unknown file is an error.
    pub fn apply(&mut self, id: Uuid, event: Event) -> Result<Snapshot, SessionError> {
        let preview_rows = self.preview_rows;
        let state = self.state_mut(id)?;
        info!(file = %state.key.name, ?event, "applying event");
        let result = state.apply(event);
        state.message = Some(match result {
            Ok(message) => Message::Success(message),
            Err(error) => {
                warn!(file = %state.key.name, "event failed: {error}");
                Message::Error(error.to_string())
            }
        });
        Ok(state.snapshot(preview_rows))
    }

    pub fn snapshot(&self, id: Uuid) -> Result<Snapshot, SessionError> {
        Ok(self.state(id)?.snapshot(self.preview_rows))
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.files.iter().map(|state| state.snapshot(self.preview_rows)).collect()
    }

    pub fn remove(&mut self, id: Uuid) -> Result<(), SessionError> {
        let index = self
            .files
            .iter()
            .position(|state| state.id == id)
            .ok_or(SessionError::FileNotFound(id))?;
        let state = self.files.remove(index);
        info!(file = %state.key.name, "removed file");
        Ok(())
    }

    /// The artifact prepared by the last `Convert` event of a file.
    pub fn artifact(&self, id: Uuid) -> Result<&DownloadArtifact, SessionError> {
        let state = self.state(id)?;
        state
            .artifact
            .as_ref()
            .ok_or_else(|| SessionError::NoArtifact(state.key.name.to_owned()))
    }

    pub fn state(&self, id: Uuid) -> Result<&FileState, SessionError> {
        self.files
            .iter()
            .find(|state| state.id == id)
            .ok_or(SessionError::FileNotFound(id))
    }

    fn state_mut(&mut self, id: Uuid) -> Result<&mut FileState, SessionError> {
        self.files
            .iter_mut()
            .find(|state| state.id == id)
            .ok_or(SessionError::FileNotFound(id))
    }
}
