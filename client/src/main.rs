use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use client::api::TwinApi;
use client::config::ClientConfig;
use client::output::{AudioOutput, RodioOutput};
use client::session::{Session, SessionEvent};
use twin_core::Mode;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let _ = dotenv::dotenv();

    let config = ClientConfig::from_env();
    info!(server = %config.server_url, "starting twin client");

    let output: Option<Arc<dyn AudioOutput>> = match RodioOutput::new() {
        Ok(output) => Some(Arc::new(output)),
        Err(e) => {
            warn!(error = %e, "audio output unavailable, running text-only");
            None
        }
    };

    let (session, mut events) = Session::spawn(config.ws_url(), config.open_timeout(), output);
    let api = TwinApi::new(config.server_url.clone());

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Accepted { id } => debug!(%id, "speech request accepted"),
                SessionEvent::Busy { .. } => warn!("still speaking, skipping audio for this reply"),
                SessionEvent::Skipped { reason } => debug!(reason, "speech skipped"),
                SessionEvent::Playing { id, samples } => debug!(%id, samples, "playing reply"),
                SessionEvent::Done { id } => debug!(%id, "finished playing"),
                SessionEvent::Failed { id, error } => warn!(%id, %error, "speech failed"),
            }
        }
    });

    println!("Connected to {}", config.server_url);
    println!("Commands: /agents, /switch <name>, /mode <conversation|storytelling>, /save, /quit");

    let mut mode = Mode::Conversation;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await.context("reading stdin")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input == "/quit" {
            break;
        } else if input == "/agents" {
            match api.agents().await {
                Ok(list) => {
                    println!("agents: {} (current: {})", list.agents.join(", "), list.current_agent)
                }
                Err(e) => eprintln!("error: {e}"),
            }
        } else if let Some(name) = input.strip_prefix("/switch ") {
            match api.switch_agent(name.trim()).await {
                Ok(reply) => println!("{}", reply.message),
                Err(e) => eprintln!("error: {e}"),
            }
        } else if let Some(raw) = input.strip_prefix("/mode ") {
            mode = Mode::parse(raw);
            println!("mode: {}", mode.as_str());
        } else if input == "/save" {
            match api.save_conversation().await {
                Ok(reply) => println!("{}", reply.message),
                Err(e) => eprintln!("error: {e}"),
            }
        } else if input.starts_with('/') {
            println!("unknown command: {input}");
        } else {
            match api.chat(input, mode).await {
                Ok(reply) => {
                    println!("{}: {}", reply.agent, reply.response);
                    session.request_playback(reply.response);
                }
                Err(e) => eprintln!("error: {e}"),
            }
        }
    }

    session.shutdown();
    Ok(())
}
