//! Messaging envelope between the host UI and the engine.
//!
//! Requests arrive as `{"action": "...", "payload": {...}}` and every
//! request gets a `Response`; failures never escape as panics or bare
//! errors, they become `success: false` with a machine-readable code.

use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, ErrorCode, Result};
use crate::orchestrator::Orchestrator;
use crate::repository::{SectionQuery, SectionRepository};
use crate::section::{HeadingSection, SectionRecord};

/// Raw wire shape of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Kebab-case action name.
    pub action: String,
    /// Action-specific payload; absent for actions that take none.
    #[serde(default)]
    pub payload: Value,
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Store a section record.
    AddSection(SectionRecord),
    /// List stored sections.
    GetSections(SectionQuery),
    /// Delete a stored section.
    RemoveSection {
        /// Section id.
        id: String,
    },
    /// Delete every stored section.
    ClearAll,
    /// Collect every section on the current page.
    CollectAllOnPage,
    /// Collect the heading matched by a CSS selector.
    CollectOneBySelector {
        /// CSS selector of the heading.
        selector: String,
    },
    /// Toggle the highlight on collectable headings.
    HighlightCollectable {
        /// On or off.
        enabled: bool,
    },
    /// Page snapshot.
    GetPageInfo,
}

#[derive(Deserialize)]
struct IdPayload {
    id: String,
}

#[derive(Deserialize)]
struct SelectorPayload {
    selector: String,
}

#[derive(Deserialize)]
struct HighlightPayload {
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn payload<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Validation(format!("bad payload: {e}")))
}

impl Request {
    /// Decode an envelope.
    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        let Envelope { action, payload: body } = envelope;
        let request = match action.as_str() {
            "add-section" => Self::AddSection(payload(body)?),
            "get-sections" => {
                let query = if body.is_null() {
                    SectionQuery::default()
                } else {
                    payload(body)?
                };
                Self::GetSections(query)
            }
            "remove-section" => Self::RemoveSection {
                id: payload::<IdPayload>(body)?.id,
            },
            "clear-all" => Self::ClearAll,
            "collect-all-on-page" => Self::CollectAllOnPage,
            "collect-one-by-selector" => Self::CollectOneBySelector {
                selector: payload::<SelectorPayload>(body)?.selector,
            },
            "highlight-collectable" => {
                let enabled = body.is_null() || payload::<HighlightPayload>(body)?.enabled;
                Self::HighlightCollectable { enabled }
            }
            "get-page-info" => Self::GetPageInfo,
            other => return Err(Error::Validation(format!("unknown action {other:?}"))),
        };
        Ok(request)
    }

    /// Decode a JSON request.
    ///
    /// # Example
    ///
    /// ```rust
    /// use heading_harvest::messaging::Request;
    ///
    /// let request = Request::from_json(r#"{"action":"remove-section","payload":{"id":"s-1"}}"#)?;
    /// assert_eq!(request, Request::RemoveSection { id: "s-1".to_string() });
    /// # Ok::<(), heading_harvest::Error>(())
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_str(json).map_err(|e| Error::Validation(format!("malformed request: {e}")))?;
        Self::from_envelope(envelope)
    }

    /// Action name on the wire.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::AddSection(_) => "add-section",
            Self::GetSections(_) => "get-sections",
            Self::RemoveSection { .. } => "remove-section",
            Self::ClearAll => "clear-all",
            Self::CollectAllOnPage => "collect-all-on-page",
            Self::CollectOneBySelector { .. } => "collect-one-by-selector",
            Self::HighlightCollectable { .. } => "highlight-collectable",
            Self::GetPageInfo => "get-page-info",
        }
    }
}

/// Error half of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Result of handling a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the request succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Details on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// Success carrying `data`.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: (!data.is_null()).then_some(data),
            error: None,
        }
    }

    /// Failure describing `err`.
    #[must_use]
    pub fn err(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ResponseError {
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }
}

impl From<Result<Value>> for Response {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::err(&err),
        }
    }
}

/// Dispatches requests to the repository and, when a page is attached, to
/// its orchestrator.
pub struct MessageHandler {
    repository: Rc<dyn SectionRepository>,
    orchestrator: Option<Rc<Orchestrator>>,
}

impl std::fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHandler")
            .field("page_attached", &self.orchestrator.is_some())
            .finish_non_exhaustive()
    }
}

impl MessageHandler {
    /// Handler for storage-only actions.
    #[must_use]
    pub fn new(repository: Rc<dyn SectionRepository>) -> Self {
        Self {
            repository,
            orchestrator: None,
        }
    }

    /// Handler that also serves page actions through `orchestrator`.
    #[must_use]
    pub fn with_orchestrator(repository: Rc<dyn SectionRepository>, orchestrator: Rc<Orchestrator>) -> Self {
        Self {
            repository,
            orchestrator: Some(orchestrator),
        }
    }

    /// Decode and handle a JSON request.
    pub async fn handle_json(&self, json: &str) -> Response {
        match Request::from_json(json) {
            Ok(request) => self.handle(request).await,
            Err(err) => {
                log::debug!("rejected request: {err}");
                Response::err(&err)
            }
        }
    }

    /// Handle a decoded request.
    pub async fn handle(&self, request: Request) -> Response {
        let action = request.action();
        let response = Response::from(self.dispatch(request).await);
        if let Some(error) = &response.error {
            log::warn!("{action} failed: {}", error.message);
        }
        response
    }

    fn page(&self) -> Result<&Orchestrator> {
        self.orchestrator
            .as_deref()
            .ok_or_else(|| Error::Structure("no page attached".to_string()))
    }

    async fn dispatch(&self, request: Request) -> Result<Value> {
        match request {
            Request::AddSection(record) => {
                let section = HeadingSection::from_record(&record)?;
                if let Some(existing) = self
                    .repository
                    .find_duplicate_section(&section.duplicate_key())
                    .await?
                {
                    return Ok(json!({ "id": existing.section_id(), "duplicate": true }));
                }
                let id = section.section_id().to_string();
                self.repository.add_section(section).await?;
                Ok(json!({ "id": id, "duplicate": false }))
            }
            Request::GetSections(query) => {
                let page = self.repository.query_sections(&query).await?;
                let records: Vec<SectionRecord> = page.sections.iter().map(HeadingSection::to_record).collect();
                Ok(json!({ "sections": records, "total": page.total, "hasMore": page.has_more }))
            }
            Request::RemoveSection { id } => {
                let removed = self.repository.remove_section(&id).await?;
                Ok(json!({ "removed": removed }))
            }
            Request::ClearAll => {
                self.repository.clear_all_sections().await?;
                Ok(Value::Null)
            }
            Request::CollectAllOnPage => {
                let report = self.page()?.collect_all().await?;
                Ok(serde_json::to_value(report)?)
            }
            Request::CollectOneBySelector { selector } => {
                let section = self.page()?.collect_by_selector(&selector).await?;
                Ok(serde_json::to_value(section.to_record())?)
            }
            Request::HighlightCollectable { enabled } => {
                let count = self.page()?.highlight_collectable(enabled);
                Ok(json!({ "highlighted": count }))
            }
            Request::GetPageInfo => Ok(serde_json::to_value(self.page()?.page_info())?),
        }
    }
}
