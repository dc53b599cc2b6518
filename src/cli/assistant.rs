//! `paiprog assistant` subcommands.

use crate::assistant::{sync_assistant, AssistantCache, AssistantConfig, FileAssistantCache};
use crate::config::PaiprogConfig;
use crate::error::Result;
use crate::openai::OpenAiClient;

use super::{build_registry, load_config};

pub(crate) fn client_for(config: &PaiprogConfig) -> Result<OpenAiClient> {
    Ok(OpenAiClient::new(
        config.require_api_key()?,
        config.base_url.clone(),
    ))
}

pub async fn handle_sync() -> Result<()> {
    let config = load_config()?;
    let client = client_for(&config)?;
    let registry = build_registry(&config)?;
    let cache = FileAssistantCache::new(config.assistant_cache_dir());

    let outcome = sync_assistant(
        &client,
        &cache,
        &AssistantConfig::new(&config.assistant, &registry),
    )
    .await?;
    println!(
        "{} {} (v{}, {})",
        outcome.name, outcome.remote_id, outcome.version, outcome.state
    );
    Ok(())
}

pub async fn handle_list() -> Result<()> {
    let config = load_config()?;
    let client = client_for(&config)?;
    let cache = FileAssistantCache::new(config.assistant_cache_dir());

    let cached = cache.list()?;
    for remote in client.list_assistants().await? {
        let local = cached
            .iter()
            .find(|record| record.remote_id == remote.id)
            .map(|record| format!(" [cached as {} v{}]", record.name, record.version))
            .unwrap_or_default();
        println!(
            "{}  {}  {}{local}",
            remote.id,
            remote.name.as_deref().unwrap_or("(unnamed)"),
            remote.model
        );
    }
    Ok(())
}

pub async fn handle_delete(id: &str) -> Result<()> {
    let config = load_config()?;
    let client = client_for(&config)?;
    let cache = FileAssistantCache::new(config.assistant_cache_dir());

    let status = client.delete_assistant(id).await?;
    for record in cache.list()?.iter().filter(|r| r.remote_id == id) {
        cache.remove(&record.name)?;
    }
    if status.deleted {
        println!("Deleted {id}");
    } else {
        println!("{id} was not deleted");
    }
    Ok(())
}
