//! End-to-end `publish` workflow: file → fields → search → create or update → notify.

use std::path::PathBuf;

use tracing::{info, instrument};

use storypub_markdown::ParseOptions;
use storypub_servicenow::{Credentials, StoryClient, normalize_instance_url, record_url};
use storypub_shared::{
    EnvSnapshot, HostSecrets, HostSettings, PayloadExtras, PublishResult, RemoteRecord,
    ResolvedConfig, Result, StoryFields, StoryPayload, StoryPubError, resolve_config,
};

use crate::notify::{Notice, Notifier};

/// Per-invocation inputs for a publish.
#[derive(Debug, Clone, Default)]
pub struct PublishInputs {
    /// Markdown story to publish.
    pub file_path: PathBuf,
    /// Overrides the configured update toggle when set.
    pub update_if_exists: Option<bool>,
    /// Optional record fields merged into the payload.
    pub extras: PayloadExtras,
}

/// Resolve configuration from host settings/secrets and the environment,
/// then publish.
///
/// Fails before any I/O when the file path, instance, or credentials are missing.
pub async fn execute_publish(
    settings: &HostSettings,
    secrets: &HostSecrets,
    env: &EnvSnapshot,
    inputs: &PublishInputs,
    notifier: &dyn Notifier,
) -> Result<PublishResult> {
    if inputs.file_path.as_os_str().is_empty() {
        return Err(StoryPubError::missing_input("file path is required"));
    }
    let config = resolve_config(settings, secrets, env)?;
    publish_story(&config, inputs, notifier).await
}

/// Build the create/update body: truncated title, description, optional
/// acceptance criteria, then any extras.
pub fn build_payload(fields: &StoryFields, extras: &PayloadExtras) -> Result<StoryPayload> {
    StoryPayload::from_fields(fields).with_extras(extras)
}

/// Publish one story file with an already-resolved configuration.
///
/// 1. Validate the file and instance URL
/// 2. Parse the file (no network activity before this succeeds)
/// 3. Search for an existing story by title (with legacy fallback)
/// 4. Create, update, or skip
/// 5. Notify exactly once and return the record descriptor
#[instrument(skip_all, fields(path = %inputs.file_path.display()))]
pub async fn publish_story(
    config: &ResolvedConfig,
    inputs: &PublishInputs,
    notifier: &dyn Notifier,
) -> Result<PublishResult> {
    let path = &inputs.file_path;
    if path.as_os_str().is_empty() {
        return Err(StoryPubError::missing_input("file path is required"));
    }
    if !path.is_file() {
        return Err(StoryPubError::missing_input(format!(
            "file not found: {}",
            path.display()
        )));
    }
    let base_url = normalize_instance_url(&config.instance)?;

    let opts = ParseOptions {
        render_html: config.send_as_html,
    };
    let fields = storypub_markdown::parse_story_file(path, &opts)?;
    let payload = build_payload(&fields, &inputs.extras)?;

    let client = StoryClient::new(
        base_url.clone(),
        Credentials {
            username: config.username.clone(),
            password: config.password.clone(),
        },
    )?;

    info!(title = %fields.title, %base_url, "publishing story");
    let existing = client.find_existing_story(&fields.title).await?;
    let update_if_exists = inputs.update_if_exists.unwrap_or(config.update_if_exists);

    let written = match &existing {
        None => {
            let created = client.create_story(&payload).await?;
            let url = record_url(&base_url, &created.sys_id);
            notifier.notify(
                &format!("Created story {}", created.number),
                &Notice::success(url),
            );
            created
        }
        Some(found) if update_if_exists => {
            let updated = client.update_story(&found.sys_id, &payload).await?;
            let url = record_url(&base_url, updated.sys_id().unwrap_or(found.sys_id.as_str()));
            notifier.notify(
                &format!("Updated story {}", updated.number().unwrap_or(found.number.as_str())),
                &Notice::success(url),
            );
            updated
        }
        Some(found) => {
            let url = record_url(&base_url, &found.sys_id);
            info!(sys_id = %found.sys_id, "story exists and updates are disabled, skipping");
            notifier.notify(
                &format!(
                    "Story already exists ({}). Re-run with update enabled to update it.",
                    found.number
                ),
                &Notice::info(url.clone()),
            );
            return Ok(PublishResult {
                sys_id: found.sys_id.clone(),
                number: found.number().map(String::from),
                url,
                existing: true,
            });
        }
    };

    Ok(combine(&base_url, &written, existing.as_ref()))
}

/// Prefer the written record's identifiers, falling back to the pre-existing one.
fn combine(base_url: &str, written: &RemoteRecord, existing: Option<&RemoteRecord>) -> PublishResult {
    let sys_id = written
        .sys_id()
        .or_else(|| existing.and_then(RemoteRecord::sys_id))
        .unwrap_or_default()
        .to_string();
    let number = written
        .number()
        .or_else(|| existing.and_then(RemoteRecord::number))
        .map(String::from);

    PublishResult {
        url: record_url(base_url, &sys_id),
        sys_id,
        number,
        existing: false,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::notify::{NoticeKind, SilentNotifier};

    const TABLE: &str = "/api/now/table/rm_story";

    const STORY: &str = "\
# User Story: Reset password

**Description:**
Let users reset a forgotten password.

**Acceptance Criteria:**
- A reset link is emailed
";

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Notice)>>,
    }

    impl Notifier for Recorder {
        fn notify(&self, message: &str, notice: &Notice) {
            self.seen
                .lock()
                .unwrap()
                .push((message.to_string(), notice.clone()));
        }
    }

    impl Recorder {
        fn take(&self) -> Vec<(String, Notice)> {
            std::mem::take(&mut *self.seen.lock().unwrap())
        }
    }

    fn config(server: &MockServer, update_if_exists: bool) -> ResolvedConfig {
        ResolvedConfig {
            instance: server.uri(),
            username: "admin".into(),
            password: "secret".into(),
            send_as_html: false,
            update_if_exists,
        }
    }

    fn write_story(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("story.md");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn inputs(path: PathBuf) -> PublishInputs {
        PublishInputs {
            file_path: path,
            ..Default::default()
        }
    }

    fn empty_list() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"result": []}))
    }

    fn found(sys_id: &str, number: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "result": [{"sys_id": sys_id, "number": number, "short_description": "Reset password"}]
        }))
    }

    async fn mount_search(server: &MockServer, title: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(TABLE))
            .and(query_param("sysparm_query", format!("short_description={title}")))
            .respond_with(response)
            .mount(server)
            .await;
    }

    async fn forbid_writes(server: &MockServer) {
        for verb in ["POST", "PATCH"] {
            Mock::given(method(verb))
                .respond_with(ResponseTemplate::new(500))
                .expect(0)
                .mount(server)
                .await;
        }
    }

    #[tokio::test]
    async fn creates_when_absent() {
        let server = MockServer::start().await;
        mount_search(&server, "Reset password", empty_list()).await;
        mount_search(&server, "User Story: Reset password", empty_list()).await;

        Mock::given(method("POST"))
            .and(path(TABLE))
            .and(body_partial_json(json!({
                "short_description": "Reset password",
                "description": "Let users reset a forgotten password.",
                "acceptance_criteria": "- A reset link is emailed"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "result": {"sys_id": "new1", "number": "STRY0010002"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = write_story(dir.path(), STORY);
        let recorder = Recorder::default();

        let result = publish_story(&config(&server, true), &inputs(file), &recorder)
            .await
            .unwrap();

        let url = format!("{}/nav_to.do?uri=rm_story.do?sys_id=new1", server.uri());
        assert_eq!(
            result,
            PublishResult {
                sys_id: "new1".into(),
                number: Some("STRY0010002".into()),
                url: url.clone(),
                existing: false,
            }
        );

        let seen = recorder.take();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "Created story STRY0010002");
        assert_eq!(seen[0].1, Notice::success(url));
    }

    #[tokio::test]
    async fn updates_when_present() {
        let server = MockServer::start().await;
        mount_search(&server, "Reset password", found("abc123", "STRY0010001")).await;

        Mock::given(method("PATCH"))
            .and(path(format!("{TABLE}/abc123")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"sys_id": "abc123", "number": "STRY0010001"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = write_story(dir.path(), STORY);
        let recorder = Recorder::default();

        let result = publish_story(&config(&server, true), &inputs(file), &recorder)
            .await
            .unwrap();
        assert_eq!(result.sys_id, "abc123");
        assert!(!result.existing);

        let seen = recorder.take();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "Updated story STRY0010001");
        assert_eq!(seen[0].1.kind, NoticeKind::Success);
    }

    #[tokio::test]
    async fn update_with_empty_result_falls_back_to_existing_ids() {
        let server = MockServer::start().await;
        mount_search(&server, "Reset password", empty_list()).await;
        mount_search(
            &server,
            "User Story: Reset password",
            found("legacy9", "STRY0000009"),
        )
        .await;

        Mock::given(method("PATCH"))
            .and(path(format!("{TABLE}/legacy9")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = write_story(dir.path(), STORY);

        let result = publish_story(&config(&server, true), &inputs(file), &SilentNotifier)
            .await
            .unwrap();
        assert_eq!(result.sys_id, "legacy9");
        assert_eq!(result.number.as_deref(), Some("STRY0000009"));
        assert!(result.url.ends_with("sys_id=legacy9"));
    }

    #[tokio::test]
    async fn skips_when_updates_disabled() {
        let server = MockServer::start().await;
        mount_search(&server, "Reset password", found("abc123", "STRY0010001")).await;
        forbid_writes(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let file = write_story(dir.path(), STORY);
        let recorder = Recorder::default();

        let inputs = PublishInputs {
            file_path: file,
            update_if_exists: Some(false),
            ..Default::default()
        };
        let result = publish_story(&config(&server, true), &inputs, &recorder)
            .await
            .unwrap();

        assert!(result.existing);
        assert_eq!(result.sys_id, "abc123");
        assert_eq!(result.number.as_deref(), Some("STRY0010001"));

        let seen = recorder.take();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.contains("already exists (STRY0010001)"));
        assert_eq!(seen[0].1.kind, NoticeKind::Info);
    }

    #[tokio::test]
    async fn configured_update_toggle_applies_when_input_unset() {
        let server = MockServer::start().await;
        mount_search(&server, "Reset password", found("abc123", "STRY0010001")).await;
        forbid_writes(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let file = write_story(dir.path(), STORY);

        let result = publish_story(&config(&server, false), &inputs(file), &SilentNotifier)
            .await
            .unwrap();
        assert!(result.existing);
    }

    #[tokio::test]
    async fn publishing_twice_creates_once_then_updates() {
        let server = MockServer::start().await;

        // First search sees nothing; later searches see the created record.
        Mock::given(method("GET"))
            .and(path(TABLE))
            .and(query_param("sysparm_query", "short_description=Reset password"))
            .respond_with(empty_list())
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        mount_search(&server, "Reset password", found("new1", "STRY0010002")).await;
        mount_search(&server, "User Story: Reset password", empty_list()).await;

        Mock::given(method("POST"))
            .and(path(TABLE))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "result": {"sys_id": "new1", "number": "STRY0010002"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("{TABLE}/new1")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"sys_id": "new1", "number": "STRY0010002"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = write_story(dir.path(), STORY);
        let cfg = config(&server, true);

        let first = publish_story(&cfg, &inputs(file.clone()), &SilentNotifier)
            .await
            .unwrap();
        let second = publish_story(&cfg, &inputs(file), &SilentNotifier)
            .await
            .unwrap();
        assert_eq!(first.sys_id, second.sys_id);
    }

    #[tokio::test]
    async fn extras_reach_the_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(empty_list())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"priority": "2", "u_team": "identity"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "result": {"sys_id": "new1", "number": "STRY0010002"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = write_story(dir.path(), STORY);
        let inputs = PublishInputs {
            file_path: file,
            update_if_exists: None,
            extras: PayloadExtras {
                priority: Some("2".into()),
                additional: Some(json!({"u_team": "identity"})),
                ..Default::default()
            },
        };

        publish_story(&config(&server, true), &inputs, &SilentNotifier)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn search_failure_aborts_without_notifying() {
        let server = MockServer::start().await;
        mount_search(
            &server,
            "Reset password",
            ResponseTemplate::new(401).set_body_string("User Not Authenticated"),
        )
        .await;
        forbid_writes(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let file = write_story(dir.path(), STORY);
        let recorder = Recorder::default();

        let err = publish_story(&config(&server, true), &inputs(file), &recorder)
            .await
            .unwrap_err();
        assert!(matches!(err, StoryPubError::SearchFailed { status: Some(401), .. }));
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn blank_file_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(empty_list())
            .expect(0)
            .mount(&server)
            .await;
        forbid_writes(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let file = write_story(dir.path(), "\n   \n");

        let err = publish_story(&config(&server, true), &inputs(file), &SilentNotifier)
            .await
            .unwrap_err();
        assert!(matches!(err, StoryPubError::NoTitleFound));
    }

    #[tokio::test]
    async fn missing_file_is_missing_input() {
        let server = MockServer::start().await;
        let err = publish_story(
            &config(&server, true),
            &inputs(PathBuf::from("/nonexistent/story.md")),
            &SilentNotifier,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoryPubError::MissingInput { .. }));
    }

    #[tokio::test]
    async fn execute_publish_validates_before_io() {
        let settings = HostSettings {
            instance: Some("acme.service-now.com".into()),
            ..Default::default()
        };

        let err = execute_publish(
            &settings,
            &HostSecrets::default(),
            &EnvSnapshot::default(),
            &PublishInputs::default(),
            &SilentNotifier,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("file path is required"));

        let err = execute_publish(
            &settings,
            &HostSecrets::default(),
            &EnvSnapshot::default(),
            &inputs(PathBuf::from("story.md")),
            &SilentNotifier,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoryPubError::MissingInput { .. }));
    }

    #[tokio::test]
    async fn execute_publish_uses_env_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(found("abc123", "STRY0010001"))
            .mount(&server)
            .await;
        forbid_writes(&server).await;

        let dir = tempfile::tempdir().unwrap();
        let file = write_story(dir.path(), STORY);
        let env = EnvSnapshot::from_pairs([
            ("SN_INSTANCE", server.uri()),
            ("SN_USERNAME", "admin".to_string()),
            ("SN_PASSWORD", "secret".to_string()),
            ("SN_UPDATE_IF_EXISTS", "false".to_string()),
        ]);

        let result = execute_publish(
            &HostSettings::default(),
            &HostSecrets::default(),
            &env,
            &inputs(file),
            &SilentNotifier,
        )
        .await
        .unwrap();
        assert!(result.existing);
    }

    #[test]
    fn closures_are_notifiers() {
        let count = std::sync::atomic::AtomicUsize::new(0);
        let notifier = |_: &str, _: &Notice| {
            count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        };
        notifier.notify("hi", &Notice::info("https://x.com"));
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
