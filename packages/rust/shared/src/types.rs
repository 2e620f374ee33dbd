//! Core domain types for storypub: parsed story fields, the remote
//! `rm_story` record, the write payload, and the publish outcome.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoryPubError};

/// Maximum length (in characters) of `short_description` on the remote record.
pub const MAX_SHORT_DESCRIPTION_CHARS: usize = 160;

// ---------------------------------------------------------------------------
// StoryFields
// ---------------------------------------------------------------------------

/// Fields recovered from a markdown user story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryFields {
    /// Full, untruncated title.
    pub title: String,
    /// Description text (raw markdown or rendered HTML).
    pub description: String,
    /// Acceptance criteria, when the document has a non-empty section for them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,
}

// ---------------------------------------------------------------------------
// RemoteRecord
// ---------------------------------------------------------------------------

/// A record in the remote `rm_story` table.
///
/// Every field defaults so that a response lacking a `result` object
/// still deserializes into an empty record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    #[serde(default)]
    pub sys_id: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,
}

impl RemoteRecord {
    /// `sys_id`, if the store returned one.
    pub fn sys_id(&self) -> Option<&str> {
        non_empty(&self.sys_id)
    }

    /// Human-facing record number (e.g. `STRY0010001`), if the store returned one.
    pub fn number(&self) -> Option<&str> {
        non_empty(&self.number)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

// ---------------------------------------------------------------------------
// StoryPayload
// ---------------------------------------------------------------------------

/// Optional record fields supplied alongside the markdown.
#[derive(Debug, Clone, Default)]
pub struct PayloadExtras {
    pub priority: Option<String>,
    /// User `sys_id`.
    pub assigned_to: Option<String>,
    /// Product `sys_id`.
    pub product: Option<String>,
    pub story_points: Option<String>,
    /// Arbitrary fields merged last; may override anything above.
    pub additional: Option<Value>,
}

/// JSON body of a create or update request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryPayload {
    pub short_description: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoryPayload {
    /// Build a payload from parsed fields, truncating the title to
    /// [`MAX_SHORT_DESCRIPTION_CHARS`].
    pub fn from_fields(fields: &StoryFields) -> Self {
        Self {
            short_description: truncate_chars(&fields.title, MAX_SHORT_DESCRIPTION_CHARS),
            description: fields.description.clone(),
            acceptance_criteria: fields.acceptance_criteria.clone(),
            extra: Map::new(),
        }
    }

    /// Merge optional record fields into the payload.
    ///
    /// `additional` must be a JSON object. Its keys are applied last and
    /// replace any same-named field, including the core three.
    pub fn with_extras(mut self, extras: &PayloadExtras) -> Result<Self> {
        let named = [
            ("priority", &extras.priority),
            ("assigned_to", &extras.assigned_to),
            ("product", &extras.product),
            ("story_points", &extras.story_points),
        ];
        for (key, value) in named {
            if let Some(value) = value {
                self.extra.insert(key.into(), Value::String(value.clone()));
            }
        }

        match &extras.additional {
            None => {}
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    match key.as_str() {
                        "short_description" | "description" | "acceptance_criteria" => {
                            self.override_core(key, value)?;
                        }
                        _ => {
                            self.extra.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            Some(_) => {
                return Err(StoryPubError::validation(
                    "additional payload must be a JSON object",
                ));
            }
        }

        Ok(self)
    }

    fn override_core(&mut self, key: &str, value: &Value) -> Result<()> {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Null if key == "acceptance_criteria" => {
                self.acceptance_criteria = None;
                return Ok(());
            }
            other => {
                return Err(StoryPubError::validation(format!(
                    "additional field `{key}` must be a string, got {other}"
                )));
            }
        };
        match key {
            "short_description" => self.short_description = text,
            "description" => self.description = text,
            _ => self.acceptance_criteria = Some(text),
        }
        Ok(())
    }
}

/// Keep at most `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ---------------------------------------------------------------------------
// PublishResult
// ---------------------------------------------------------------------------

/// Outcome of a publish: which record the story now lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub sys_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    pub url: String,
    /// Set when a matching record existed and was left untouched.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub existing: bool,
}
