//! taskboard - demo session against the in-memory remote
//!
//! Usage: `taskboard [config.json]`. Logging is opt-in via RUST_LOG.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use taskboard_core::app::{App, AppBuilder, BoardConfig};
use taskboard_core::domain::{Assignee, PipelineStage, SpaceId, TaskDraft};
use taskboard_core::impls::InMemoryRemote;
use taskboard_core::store::StoreEvent;
use taskboard_core::time_ago;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn load_config() -> Result<BoardConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(BoardConfig::default());
    };
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    BoardConfig::from_json_str(&raw).with_context(|| format!("loading {path}"))
}

fn print_board(app: &App, space_id: SpaceId) {
    for stage in PipelineStage::ALL {
        println!("  [{stage}]");
        for task in app.store.tasks_in_stage(space_id, stage) {
            let names: Vec<&str> = task.assignees.iter().map(|a| a.initials.as_str()).collect();
            println!("    {} {} ({})", task.id, task.title, names.join(", "));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = load_config()?;

    // (A) リモートとユーザーを用意
    let remote = Arc::new(InMemoryRemote::new());
    let ana = remote.register_profile("ana@example.com", "Ana Lee").await;
    let bo = remote.register_profile("bo@example.com", "Bo Chen").await;

    let owner = AppBuilder::new(remote.clone(), ana)
        .config(config.clone())
        .build()?;
    let teammate = AppBuilder::new(remote.clone(), bo).config(config).build()?;

    // (B) ストアの変更を非同期に購読
    let mut events = owner.store.watch();
    let watcher = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::TaskMoved { task, from, to }) => {
                    println!("  event: {} moved {from} -> {to}", task.title)
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => println!("  event: skipped {n}"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // (C) スペース作成と招待
    let space = owner
        .gateway
        .create_space(owner.gateway.new_space("Launch"))
        .await?;
    let link = owner.invites.create_general_invite_link(space.id).await?;
    println!("invite link: {link}");
    let invite = teammate.invites.resolve_link(&link).await?;
    let membership = teammate.invites.accept_invite(invite.id).await?;
    println!("{} joined as {}", teammate.actor.name, membership.role);

    // (D) タスク作成と移動
    let report = owner
        .gateway
        .create_task(
            space.id,
            PipelineStage::Todo,
            TaskDraft::new("Write report")
                .description("Quarterly numbers")
                .assignee(Assignee::new("Bo Chen").with_email("bo@example.com")),
        )
        .await?;
    println!("created {} (remote: {:?})", report.task.id, report.remote.remote_id());
    owner
        .gateway
        .create_task(
            space.id,
            PipelineStage::InProgress,
            TaskDraft::new("Book venue").assignee(Assignee::new("Ana Lee")),
        )
        .await?;
    owner
        .gateway
        .move_task(space.id, report.task.id, PipelineStage::Todo, PipelineStage::Review)
        .await;
    owner
        .gateway
        .move_task(space.id, report.task.id, PipelineStage::Review, PipelineStage::Done)
        .await;

    println!("board {}:", space.name);
    print_board(&owner, space.id);

    println!("activity:");
    let now = Utc::now();
    for entry in owner.activity.entries() {
        println!("  {} ({})", entry.summary(), time_ago(entry.at, now));
    }

    println!("{}'s inbox:", teammate.actor.name);
    for notification in teammate.inbox.list().await? {
        println!("  {:?}", notification.kind);
        teammate.inbox.mark_read(notification.id).await?;
    }

    drop(owner);
    watcher.await?;
    Ok(())
}
