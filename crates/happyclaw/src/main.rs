// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bundled CLI front-end for local smoke-testing: a convenience wrapper over
//! `spawn` plus local-mode stdio, not a new protocol. The library API this
//! binary links against is meant for a future host crate to embed directly.

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::error;

use happyclaw::api::{CallerContext, ReadParams, SendParams, SpawnParams, ToolSurface};
use happyclaw::config::Config;
use happyclaw::logging;
use happyclaw::manager::SessionManager;
use happyclaw::model::{Mode, SessionEvent};
use happyclaw::provider::mcp::McpProvider;
use happyclaw::provider::pty::PtyProvider;
use happyclaw::provider::Provider;

/// The user driving the bundled front-end directly from a terminal.
const LOCAL_USER: &str = "local";

#[tokio::main]
async fn main() {
    let config = Config::parse();
    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }
    logging::init(&config);

    if let Err(e) = run(config).await {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> happyclaw::error::Result<()> {
    let shutdown = CancellationToken::new();
    let providers = build_providers(&config);
    let manager = SessionManager::new(&config, providers);
    manager.spawn_health_checker(config.health_interval(), shutdown.clone());

    let surface = ToolSurface::new(manager.clone());
    let ctx = CallerContext { user_id: LOCAL_USER.to_string() };

    let _events = manager.event_bus().subscribe_all(Arc::new(|batch: Vec<SessionEvent>| {
        for event in batch {
            println!("[{:?}] {}", event.kind, event.summary);
        }
    }));

    // `Mode::Remote` here, not `Mode::Local`: local mode means the child's own
    // stdio is attached straight to the human terminal, which would require
    // exposing the provider's raw master fd through this trait object. This
    // wrapper instead drives the session through the same send/read surface
    // a remote bridge would use, just fed by its own stdin/stdout loop.
    let record = if let Some(session_id) = &config.resume {
        surface
            .resume(&ctx, happyclaw::api::ResumeParams { session_id: session_id.clone(), mode: Mode::Remote })
            .await?
    } else {
        let cwd = config
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| std::path::PathBuf::from("."));
        surface
            .spawn(
                &ctx,
                SpawnParams { provider: config.provider.clone(), cwd: cwd.display().to_string(), mode: Mode::Remote },
            )
            .await?
    };
    println!("session {} ready ({:?} mode, provider {})", record.id, record.mode, record.provider);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => {
                match line {
                    Ok(Some(input)) if input == "/quit" => break,
                    Ok(Some(input)) => {
                        if let Err(e) = surface.send(&ctx, SendParams { session_id: record.id.clone(), input }).await {
                            eprintln!("send failed: {e}");
                            continue;
                        }
                        let page = surface.read(&ctx, ReadParams { session_id: record.id.clone(), cursor: None, limit: None })?;
                        for message in page.messages {
                            println!("{:?}: {}", message.kind, message.content);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("stdin read error: {e}");
                        break;
                    }
                }
            }
        }
    }

    surface.stop(&ctx, happyclaw::api::StopParams { session_id: record.id, force: false }).await?;
    Ok(())
}

/// Build the subset of providers the command-line front-end can drive
/// directly. The SDK provider needs a concrete `HandleFactory` supplied by
/// an embedding host at link time, so it is not available here.
fn build_providers(config: &Config) -> HashMap<&'static str, Arc<dyn Provider>> {
    let mut providers: HashMap<&'static str, Arc<dyn Provider>> = HashMap::new();
    let command = config.command.clone();
    let pty_command: happyclaw::provider::pty::CommandBuilder = Arc::new({
        let command = command.clone();
        move |_id, _opts| command.clone()
    });
    providers.insert("pty", Arc::new(PtyProvider::new(pty_command).with_size(config.pty_cols, config.pty_rows)));

    let mcp_command: happyclaw::provider::mcp::CommandBuilder = Arc::new(move |_id, _opts| command.clone());
    providers.insert(
        "mcp",
        Arc::new(McpProvider::new(mcp_command).with_request_timeout(config.mcp_timeout())),
    );
    providers
}
