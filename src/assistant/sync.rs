//! Reconcile a local [`AssistantConfig`] with its remote assistant.
//!
//! The cache decides which of three paths is taken: no record creates the
//! assistant. A changed fingerprint updates it and bumps the version suffix
//! of its remote name. A matching one only checks that the remote still
//! exists. A remote that has gone missing is recreated under the next version.

use chrono::Utc;
use tracing::{debug, info, warn};

use super::cache::{AssistantCache, AssistantRecord};
use super::config::AssistantConfig;
use crate::error::{PaiprogError, Result};
use crate::openai::OpenAiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SyncState {
    Created,
    Updated,
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub remote_id: String,
    pub name: String,
    pub version: u32,
    pub state: SyncState,
}

/// Make sure the remote assistant matches `config`, creating or updating it
/// as needed, and return the id to run against.
pub async fn sync_assistant(
    client: &OpenAiClient,
    cache: &dyn AssistantCache,
    config: &AssistantConfig,
) -> Result<SyncOutcome> {
    let fingerprint = config.fingerprint()?;

    let Some(stored) = cache.load(&config.name)? else {
        return create(client, cache, config, fingerprint, 0).await;
    };

    if stored.fingerprint != fingerprint {
        let version = stored.version + 1;
        debug!(name = %config.name, version, "assistant config changed");
        let request = config.to_request(config.remote_name(version));
        return match client.update_assistant(&stored.remote_id, &request).await {
            Ok(remote) => {
                save(cache, config, &remote.id, fingerprint, version)?;
                info!(name = %config.name, remote_id = %remote.id, version, "updated assistant");
                Ok(outcome(config, remote.id, version, SyncState::Updated))
            }
            Err(err) if is_not_found(&err) => {
                warn!(remote_id = %stored.remote_id, "cached assistant is gone remotely, recreating");
                create(client, cache, config, fingerprint, version).await
            }
            Err(err) => Err(err),
        };
    }

    match client.retrieve_assistant(&stored.remote_id).await {
        Ok(remote) => Ok(outcome(config, remote.id, stored.version, SyncState::Cached)),
        Err(err) if is_not_found(&err) => {
            warn!(remote_id = %stored.remote_id, "cached assistant is gone remotely, recreating");
            create(client, cache, config, fingerprint, stored.version + 1).await
        }
        Err(err) => Err(err),
    }
}

async fn create(
    client: &OpenAiClient,
    cache: &dyn AssistantCache,
    config: &AssistantConfig,
    fingerprint: String,
    version: u32,
) -> Result<SyncOutcome> {
    let remote = client
        .create_assistant(&config.to_request(config.remote_name(version)))
        .await?;
    save(cache, config, &remote.id, fingerprint, version)?;
    info!(name = %config.name, remote_id = %remote.id, version, "created assistant");
    Ok(outcome(config, remote.id, version, SyncState::Created))
}

fn save(
    cache: &dyn AssistantCache,
    config: &AssistantConfig,
    remote_id: &str,
    fingerprint: String,
    version: u32,
) -> Result<()> {
    cache.save(&AssistantRecord {
        name: config.name.clone(),
        remote_id: remote_id.to_string(),
        fingerprint,
        serialized_config: serde_json::to_string(&config.serialized())?,
        version,
        saved_at: Utc::now(),
    })
}

fn outcome(config: &AssistantConfig, remote_id: String, version: u32, state: SyncState) -> SyncOutcome {
    SyncOutcome {
        remote_id,
        name: config.name.clone(),
        version,
        state,
    }
}

fn is_not_found(err: &PaiprogError) -> bool {
    matches!(err, PaiprogError::Api { status: 404, .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::FileAssistantCache;
    use crate::config::AssistantSettings;
    use crate::tools::builtin::ls_tool;
    use crate::tools::ToolRegistry;
    use crate::util::retry::RetryPolicy;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn setup(server: &MockServer) -> (TempDir, FileAssistantCache, OpenAiClient, AssistantConfig) {
        let dir = TempDir::new().unwrap();
        let cache = FileAssistantCache::new(dir.path());
        let client = OpenAiClient::new("sk-test", Some(server.uri())).with_retry_policy(RetryPolicy::none());
        let registry = ToolRegistry::new(vec![ls_tool()]).unwrap();
        let config = AssistantConfig::new(&AssistantSettings::default(), &registry);
        (dir, cache, client, config)
    }

    fn assistant(id: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "id": id, "model": "gpt-4o" }))
    }

    #[tokio::test]
    async fn first_sync_creates_version_zero() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assistants"))
            .and(body_partial_json(json!({ "name": "baseAssistant - v0", "model": "gpt-4o" })))
            .respond_with(assistant("asst_1"))
            .expect(1)
            .mount(&server)
            .await;
        let (_dir, cache, client, config) = setup(&server);

        let outcome = sync_assistant(&client, &cache, &config).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome {
                remote_id: "asst_1".into(),
                name: "baseAssistant".into(),
                version: 0,
                state: SyncState::Created,
            }
        );
        let record = cache.load("baseAssistant").unwrap().unwrap();
        assert_eq!(record.remote_id, "asst_1");
        assert_eq!(record.fingerprint, config.fingerprint().unwrap());
    }

    #[tokio::test]
    async fn unchanged_config_verifies_remote_and_reuses_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assistants"))
            .respond_with(assistant("asst_1"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/assistants/asst_1"))
            .respond_with(assistant("asst_1"))
            .expect(1)
            .mount(&server)
            .await;
        let (_dir, cache, client, config) = setup(&server);

        sync_assistant(&client, &cache, &config).await.unwrap();
        let outcome = sync_assistant(&client, &cache, &config).await.unwrap();

        assert_eq!(outcome.state, SyncState::Cached);
        assert_eq!(outcome.version, 0);
        assert_eq!(outcome.remote_id, "asst_1");
    }

    #[tokio::test]
    async fn changed_config_bumps_version_and_updates_remote() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assistants"))
            .respond_with(assistant("asst_1"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/assistants/asst_1"))
            .and(body_partial_json(json!({ "name": "baseAssistant - v1", "model": "gpt-4-turbo-preview" })))
            .respond_with(assistant("asst_1"))
            .expect(1)
            .mount(&server)
            .await;
        let (_dir, cache, client, mut config) = setup(&server);

        sync_assistant(&client, &cache, &config).await.unwrap();
        config.model = "gpt-4-turbo-preview".into();
        let outcome = sync_assistant(&client, &cache, &config).await.unwrap();

        assert_eq!(outcome.state, SyncState::Updated);
        assert_eq!(outcome.version, 1);
        assert_eq!(cache.load("baseAssistant").unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn deleted_remote_is_recreated_with_next_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assistants/asst_old"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "message": "No assistant found" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/assistants"))
            .and(body_partial_json(json!({ "name": "baseAssistant - v3" })))
            .respond_with(assistant("asst_new"))
            .expect(1)
            .mount(&server)
            .await;
        let (_dir, cache, client, config) = setup(&server);
        cache
            .save(&AssistantRecord {
                name: config.name.clone(),
                remote_id: "asst_old".into(),
                fingerprint: config.fingerprint().unwrap(),
                serialized_config: config.serialized().to_string(),
                version: 2,
                saved_at: Utc::now(),
            })
            .unwrap();

        let outcome = sync_assistant(&client, &cache, &config).await.unwrap();

        assert_eq!(outcome.state, SyncState::Created);
        assert_eq!(outcome.remote_id, "asst_new");
        assert_eq!(outcome.version, 3);
    }

    #[tokio::test]
    async fn remote_failure_leaves_cache_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assistants"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (_dir, cache, client, config) = setup(&server);

        let err = sync_assistant(&client, &cache, &config).await.unwrap_err();

        assert!(matches!(err, PaiprogError::Api { status: 500, .. }));
        assert!(cache.load("baseAssistant").unwrap().is_none());
    }
}
