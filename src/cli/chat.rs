//! Interactive chat loop.

use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::assistant::{sync_assistant, AssistantConfig, FileAssistantCache};
use crate::error::Result;
use crate::run::{DriverContext, PollingTransport, RunDriver, RunTransport, StreamingTransport};

use super::assistant::client_for;
use super::render::TurnRenderer;
use super::{build_registry, load_config, ChatArgs};

pub async fn handle_chat(args: ChatArgs) -> Result<()> {
    let mut config = load_config()?;
    config.apply_overrides(args.assistant, args.model);

    let client = client_for(&config)?;
    let registry = build_registry(&config)?;
    let cache = FileAssistantCache::new(config.assistant_cache_dir());
    let synced = sync_assistant(
        &client,
        &cache,
        &AssistantConfig::new(&config.assistant, &registry),
    )
    .await?;
    info!(remote_id = %synced.remote_id, version = synced.version, state = %synced.state, "assistant ready");

    let thread = client.create_thread().await?;
    let transport: Arc<dyn RunTransport> = if args.poll {
        Arc::new(PollingTransport::new(client).with_interval(config.poll_interval))
    } else {
        Arc::new(StreamingTransport::new(client))
    };
    let driver = RunDriver::new(DriverContext {
        transport,
        thread_id: thread.id,
        assistant_id: synced.remote_id,
        registry,
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut renderer = TurnRenderer::new();
    let mut stdout = std::io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            writeln!(stdout)?;
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut turn = driver.send_message(line)?;
        loop {
            tokio::select! {
                next = turn.next() => match next {
                    Some(Ok(event)) => renderer.render(&event.event, &mut stdout)?,
                    Some(Err(err)) => {
                        warn!(error = %err, "turn failed");
                        writeln!(stdout, "\nError: {err}")?;
                        break;
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    // The stream keeps running until the run reports its terminal state.
                    driver.interrupt().await;
                }
            }
        }
    }
}
