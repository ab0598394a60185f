use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

// Newtype wrappers for type safety

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One of the three processing perspectives applied to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Learning,
    Qa,
    System,
}

impl View {
    /// All registered views, in canonical order.
    pub const ALL: [View; 3] = [View::Learning, View::Qa, View::System];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Learning => "learning",
            View::Qa => "qa",
            View::System => "system",
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "learning" => Ok(View::Learning),
            "qa" => Ok(View::Qa),
            "system" => Ok(View::System),
            other => Err(format!("unknown view: {}", other)),
        }
    }
}

/// Detected file type of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Pdf,
    Docx,
    Pptx,
    Markdown,
    Text,
}

impl FileType {
    /// Detect a file type from the filename extension.
    ///
    /// Returns `None` for unknown extensions. `.doc` is deliberately not
    /// mapped: legacy Word binaries are rejected at upload with a
    /// convert-to-docx hint.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit('.').next()?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            "pptx" => Some(FileType::Pptx),
            "md" | "markdown" => Some(FileType::Markdown),
            "txt" => Some(FileType::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Pptx => "pptx",
            FileType::Markdown => "md",
            FileType::Text => "txt",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// High-level document status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Timeout,
    LowQuality,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Timeout => "timeout",
            DocumentStatus::LowQuality => "low_quality",
        }
    }

    /// Terminal failure statuses are sticky until a user-initiated retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Completed
                | DocumentStatus::Failed
                | DocumentStatus::Timeout
                | DocumentStatus::LowQuality
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            "timeout" => Ok(DocumentStatus::Timeout),
            "low_quality" => Ok(DocumentStatus::LowQuality),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

/// Status of a single processing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "timeout" => Ok(TaskStatus::Timeout),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// Coarse stage label of a processing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    Extract,
    Identify,
    Process,
}

impl TaskStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStage::Extract => "extract",
            TaskStage::Identify => "identify",
            TaskStage::Process => "process",
        }
    }
}

impl std::fmt::Display for TaskStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extract" => Ok(TaskStage::Extract),
            "identify" => Ok(TaskStage::Identify),
            "process" => Ok(TaskStage::Process),
            other => Err(format!("unknown task stage: {}", other)),
        }
    }
}

/// How the view profile was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Rule,
    Ai,
    Hybrid,
    None,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Rule => "rule",
            DetectionMethod::Ai => "ai",
            DetectionMethod::Hybrid => "hybrid",
            DetectionMethod::None => "none",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DetectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(DetectionMethod::Rule),
            "ai" => Ok(DetectionMethod::Ai),
            "hybrid" => Ok(DetectionMethod::Hybrid),
            "none" => Ok(DetectionMethod::None),
            other => Err(format!("unknown detection method: {}", other)),
        }
    }
}

/// An uploaded document and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub blob_path: String,
    pub file_size: u64,
    pub file_type: FileType,
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        filename: impl Into<String>,
        blob_path: impl Into<String>,
        file_size: u64,
        file_type: FileType,
    ) -> Self {
        Self {
            id: DocumentId::new(),
            filename: filename.into(),
            blob_path: blob_path.into(),
            file_size,
            file_type,
            status: DocumentStatus::Pending,
            uploaded_at: Utc::now(),
        }
    }
}

/// A single worker-side execution of a document.
///
/// Retries create new rows; the most recent task is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingTask {
    pub id: TaskId,
    pub document_id: DocumentId,
    pub stage: TaskStage,
    pub status: TaskStatus,
    pub progress: u8,
    pub current_stage: String,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProcessingTask {
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            id: TaskId::new(),
            document_id,
            stage: TaskStage::Extract,
            status: TaskStatus::Pending,
            progress: 0,
            current_stage: "queued".to_string(),
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// A numbered, position-bounded fragment of preprocessed text.
///
/// Segment ids are 1-based and are the stable referent used in LLM prompts
/// and source citations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: u32,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// View-agnostic artifacts of a document, written once per successful
/// extraction and read by every view processor and the view-switch fast path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntermediateResult {
    pub document_id: DocumentId,
    pub raw_text: String,
    pub preprocessed_text: String,
    pub segments: Vec<Segment>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl IntermediateResult {
    pub fn new(
        document_id: DocumentId,
        raw_text: impl Into<String>,
        preprocessed_text: impl Into<String>,
        segments: Vec<Segment>,
    ) -> Self {
        Self {
            document_id,
            raw_text: raw_text.into(),
            preprocessed_text: preprocessed_text.into(),
            segments,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Per-document view detection outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentViewProfile {
    pub document_id: DocumentId,
    pub primary_view: View,
    pub enabled_views: Vec<View>,
    pub detection_scores: BTreeMap<View, f64>,
    pub detection_method: DetectionMethod,
    pub confidence: f64,
}

impl DocumentViewProfile {
    pub fn is_enabled(&self, view: View) -> bool {
        self.enabled_views.contains(&view)
    }
}

/// A committed per-view artifact. Unique per (document_id, view).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub document_id: DocumentId,
    pub view: View,
    pub result_data: serde_json::Value,
    pub is_primary: bool,
    pub processing_time_seconds: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingResult {
    pub fn new(
        document_id: DocumentId,
        view: View,
        result_data: serde_json::Value,
        is_primary: bool,
        processing_time_seconds: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            document_id,
            view,
            result_data,
            is_primary,
            processing_time_seconds,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Append-only record of a single LLM invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiCallMetric {
    pub call_type: String,
    pub status: String,
    pub response_time_ms: u64,
    pub error_type: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl AiCallMetric {
    pub fn success(call_type: impl Into<String>, response_time_ms: u64, retry_count: u32) -> Self {
        Self {
            call_type: call_type.into(),
            status: "success".to_string(),
            response_time_ms,
            error_type: None,
            retry_count,
            created_at: Utc::now(),
        }
    }

    pub fn failure(
        call_type: impl Into<String>,
        response_time_ms: u64,
        error_type: impl Into<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            call_type: call_type.into(),
            status: "failure".to_string(),
            response_time_ms,
            error_type: Some(error_type.into()),
            retry_count,
            created_at: Utc::now(),
        }
    }
}

/// Append-only quality record for a completed view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResultQuality {
    pub document_id: DocumentId,
    pub view: View,
    pub field_completeness: f64,
    pub confidence_avg: f64,
    pub confidence_min: f64,
    pub confidence_max: f64,
    pub sources_count: u32,
    pub sources_completeness: f64,
    pub quality_score: f64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_uniqueness() {
        let a = DocumentId::new();
        let b = DocumentId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_view_round_trip() {
        for view in View::ALL {
            let parsed: View = view.as_str().parse().unwrap();
            assert_eq!(parsed, view);
        }
        assert!("video".parse::<View>().is_err());
    }

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_filename("slides.PPTX"), Some(FileType::Pptx));
        assert_eq!(FileType::from_filename("notes.md"), Some(FileType::Markdown));
        assert_eq!(FileType::from_filename("legacy.doc"), None);
        assert_eq!(FileType::from_filename("archive.tar.gz"), None);
    }

    #[test]
    fn test_status_terminality() {
        assert!(DocumentStatus::LowQuality.is_terminal());
        assert!(!DocumentStatus::Processing.is_terminal());
        assert!(TaskStatus::Timeout.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(DocumentStatus::LowQuality.as_str(), "low_quality");
        assert_eq!(
            serde_json::to_string(&DocumentStatus::LowQuality).unwrap(),
            "\"low_quality\""
        );
    }

    #[test]
    fn test_new_document_is_pending() {
        let doc = Document::new("guide.pdf", "/blobs/x", 1024, FileType::Pdf);
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.file_type, FileType::Pdf);
    }

    #[test]
    fn test_profile_enabled_lookup() {
        let mut scores = BTreeMap::new();
        scores.insert(View::Learning, 0.8);
        let profile = DocumentViewProfile {
            document_id: DocumentId::new(),
            primary_view: View::Learning,
            enabled_views: vec![View::Learning, View::System],
            detection_scores: scores,
            detection_method: DetectionMethod::Rule,
            confidence: 0.8,
        };
        assert!(profile.is_enabled(View::System));
        assert!(!profile.is_enabled(View::Qa));
    }
}
