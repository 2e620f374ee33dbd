//! ServiceNow Table API client for the `rm_story` collection.
//!
//! Search, create, and update stories with per-request basic auth. The
//! existence check also tries the legacy `User Story: <title>` naming so
//! that stories published under the old convention are updated in place
//! instead of duplicated.

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use storypub_shared::{RemoteRecord, Result, StoryPayload, StoryPubError};

/// Table API path of the story collection.
const STORY_TABLE_PATH: &str = "/api/now/table/rm_story";

/// Title prefix used by records published under the old convention.
pub const LEGACY_TITLE_PREFIX: &str = "User Story: ";

/// User-Agent string for Table API requests.
const USER_AGENT: &str = concat!("storypub/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// URL helpers
// ---------------------------------------------------------------------------

/// Reduce a configured instance value to `scheme://host[:port]`.
///
/// Accepts full UI URLs (`https://acme.service-now.com/now/nav/ui/home`)
/// and bare hostnames (`acme.service-now.com`, assumed https).
pub fn normalize_instance_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoryPubError::MissingInstanceUrl);
    }

    if let Ok(url) = Url::parse(raw) {
        if let Some(host) = url.host_str() {
            return Ok(match url.port() {
                Some(port) => format!("{}://{host}:{port}", url.scheme()),
                None => format!("{}://{host}", url.scheme()),
            });
        }
    }

    if raw.contains('.') {
        return Ok(format!("https://{raw}"));
    }

    Err(StoryPubError::InvalidInstanceUrl {
        url: raw.to_string(),
    })
}

/// Link to a story in the instance UI.
pub fn record_url(base_url: &str, sys_id: &str) -> String {
    format!("{base_url}/nav_to.do?uri=rm_story.do?sys_id={sys_id}")
}

fn api(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ---------------------------------------------------------------------------
// Response envelopes
// ---------------------------------------------------------------------------

/// `{"result": [...]}` from a list query.
#[derive(Debug, Deserialize)]
struct ListEnvelope {
    #[serde(default)]
    result: Value,
}

/// `{"result": {...}}` from a create or update.
#[derive(Debug, Deserialize)]
struct RecordEnvelope {
    #[serde(default)]
    result: Option<RemoteRecord>,
}

/// Outcome of an existence check, keeping the legacy fallback's failure visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistingLookup {
    /// A record matched; `legacy` is set when it matched the prefixed title.
    Found { record: RemoteRecord, legacy: bool },
    NotFound,
    /// Nothing matched the current title and the legacy query itself failed.
    LegacyLookupFailed { reason: String },
}

impl ExistingLookup {
    /// The matched record, treating a failed legacy query as no match.
    pub fn into_record(self) -> Option<RemoteRecord> {
        match self {
            Self::Found { record, .. } => Some(record),
            Self::NotFound | Self::LegacyLookupFailed { .. } => None,
        }
    }
}

/// A failed query: HTTP status when a response arrived, plus body or transport message.
struct QueryError {
    status: Option<u16>,
    body: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Basic-auth credentials for the instance.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Table API client bound to one instance and one set of credentials.
///
/// Holds no request state; build one per session.
#[derive(Debug, Clone)]
pub struct StoryClient {
    http: Client,
    base_url: String,
    credentials: Credentials,
}

impl StoryClient {
    /// Create a client for an already-normalized base URL.
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StoryPubError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Find a story whose `short_description` is exactly `title`, falling
    /// back to the legacy prefixed title.
    ///
    /// A failure of the primary query is [`StoryPubError::SearchFailed`];
    /// a failure of the legacy query counts as "no match".
    pub async fn find_existing_story(&self, title: &str) -> Result<Option<RemoteRecord>> {
        Ok(self.find_existing_story_detailed(title).await?.into_record())
    }

    /// Like [`find_existing_story`](Self::find_existing_story), but reports a
    /// failed legacy query as [`ExistingLookup::LegacyLookupFailed`].
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn find_existing_story_detailed(&self, title: &str) -> Result<ExistingLookup> {
        let primary = self
            .search(title)
            .await
            .map_err(|e| StoryPubError::SearchFailed {
                status: e.status,
                body: e.body,
            })?;
        if let Some(record) = primary {
            debug!(sys_id = %record.sys_id, "found story by title");
            return Ok(ExistingLookup::Found {
                record,
                legacy: false,
            });
        }

        let legacy_title = format!("{LEGACY_TITLE_PREFIX}{title}");
        match self.search(&legacy_title).await {
            Ok(Some(record)) => {
                info!(sys_id = %record.sys_id, "found story under legacy title");
                Ok(ExistingLookup::Found {
                    record,
                    legacy: true,
                })
            }
            Ok(None) => Ok(ExistingLookup::NotFound),
            Err(e) => {
                let reason = match e.status {
                    Some(status) => format!("{status} {}", e.body),
                    None => e.body,
                };
                warn!(%reason, "legacy title search failed, treating as no match");
                Ok(ExistingLookup::LegacyLookupFailed { reason })
            }
        }
    }

    /// Create a story. A response without a `result` yields an empty record.
    #[instrument(skip(self, payload), fields(base_url = %self.base_url, title = %payload.short_description))]
    pub async fn create_story(&self, payload: &StoryPayload) -> Result<RemoteRecord> {
        let url = api(&self.base_url, STORY_TABLE_PATH);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| StoryPubError::Network(format!("create failed: {e}")))?;

        let record = read_record(response, "create").await?;
        info!(sys_id = %record.sys_id, number = %record.number, "created story");
        Ok(record)
    }

    /// Patch the story `sys_id`. Same empty-result tolerance as create.
    #[instrument(skip(self, payload), fields(base_url = %self.base_url))]
    pub async fn update_story(&self, sys_id: &str, payload: &StoryPayload) -> Result<RemoteRecord> {
        let url = api(&self.base_url, &format!("{STORY_TABLE_PATH}/{sys_id}"));
        let response = self
            .http
            .patch(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| StoryPubError::Network(format!("update failed: {e}")))?;

        let record = read_record(response, "update").await?;
        info!(number = %record.number, "updated story");
        Ok(record)
    }

    /// One exact-match query, limited to a single result.
    async fn search(&self, short_description: &str) -> std::result::Result<Option<RemoteRecord>, QueryError> {
        let url = api(&self.base_url, STORY_TABLE_PATH);
        let query = format!("short_description={short_description}");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(&[("sysparm_query", query.as_str()), ("sysparm_limit", "1")])
            .send()
            .await
            .map_err(|e| QueryError {
                status: e.status().map(|s| s.as_u16()),
                body: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| QueryError {
            status: Some(status.as_u16()),
            body: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(QueryError {
                status: Some(status.as_u16()),
                body,
            });
        }

        // A body that is not a result list is treated as no match.
        let Ok(ListEnvelope { result }) = serde_json::from_str::<ListEnvelope>(&body) else {
            return Ok(None);
        };
        let Value::Array(mut rows) = result else {
            return Ok(None);
        };
        if rows.is_empty() {
            return Ok(None);
        }

        serde_json::from_value(rows.swap_remove(0))
            .map(Some)
            .map_err(|e| QueryError {
                status: Some(status.as_u16()),
                body: format!("unexpected record shape: {e}"),
            })
    }
}

/// Check the status of a create/update response and pull out its record.
async fn read_record(response: Response, action: &str) -> Result<RemoteRecord> {
    let status: StatusCode = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| StoryPubError::Network(format!("{action} failed: {status} {e}")))?;

    if !status.is_success() {
        return Err(StoryPubError::Network(format!(
            "{action} failed: {status} {body}"
        )));
    }

    Ok(serde_json::from_str::<RecordEnvelope>(&body)
        .ok()
        .and_then(|envelope| envelope.result)
        .unwrap_or_default())
}
