//! paiprog CLI binary entry point.

use clap::Parser;
use paiprog::cli::{AssistantCommands, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Chat(args) => paiprog::cli::chat::handle_chat(args).await,
        Commands::Assistant(args) => match args.command {
            AssistantCommands::Sync => paiprog::cli::assistant::handle_sync().await,
            AssistantCommands::List => paiprog::cli::assistant::handle_list().await,
            AssistantCommands::Delete(delete) => {
                paiprog::cli::assistant::handle_delete(&delete.id).await
            }
        },
        Commands::Tools => paiprog::cli::handle_tools(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PAIPROG_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
