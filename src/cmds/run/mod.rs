// This file is part of mediasort.
// Copyright (c) 2026 The mediasort Authors; see AUTHORS and LICENSE.
// SPDX-License-Identifier: MIT

//! `mediasort run`: one full ingestion pass — provision the destination
//! forum group and its topics, sweep the destination (unless configured
//! off), scan every configured or discovered source chat, then print the
//! shutdown summary.

pub mod config;

use base::clock::RealClocks;
use base::shutdown;
use base::{bail_t, ErrorKind, Error, ResultExt as _};
use bpaf::Bpaf;
use engine::audit::AuditLog;
use engine::chat::process::ProcessClient;
use engine::chat::ChatClient;
use engine::model::ChatKind;
use engine::report::RunSummary;
use engine::store::Store;
use engine::topic_cache::TopicCache;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use self::config::{load_config, ForumGroupCache};

/// Execute one full ingestion pass against the configured sources and
/// destination.
#[derive(Bpaf, Debug)]
#[bpaf(command("run"))]
pub struct Args {
    /// Path to the TOML configuration file.
    #[bpaf(long, argument("PATH"), fallback("/etc/mediasort.toml".into()))]
    pub config: PathBuf,
}

/// How many chats to ask for when the configured source set is empty/wildcard.
const MAX_ACCESSIBLE_CHATS: usize = 1_000;

pub fn run(args: Args) -> Result<i32, Error> {
    let (settings, config) = load_config(&args.config)?;
    config.validate()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .err_kind(ErrorKind::Internal)?;
    rt.block_on(async_run(settings, config))
}

async fn async_run(
    settings: config::RunSettings,
    config: engine::config::Config,
) -> Result<i32, Error> {
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let mut shutdown_tx = Some(shutdown_tx);

    let mut int = signal(SignalKind::interrupt()).err_kind(ErrorKind::Internal)?;
    let mut term = signal(SignalKind::terminate()).err_kind(ErrorKind::Internal)?;

    tokio::pin! {
        let inner = inner(settings, config, shutdown_rx);
    }

    tokio::select! {
        _ = int.recv() => {
            info!("received SIGINT; shutting down gracefully. \
                   Send another SIGINT or SIGTERM to shut down immediately.");
            shutdown_tx.take();
        },
        _ = term.recv() => {
            info!("received SIGTERM; shutting down gracefully. \
                   Send another SIGINT or SIGTERM to shut down immediately.");
            shutdown_tx.take();
        },
        result = &mut inner => return result,
    }

    tokio::select! {
        _ = int.recv() => bail_t!(Cancelled, "immediate shutdown due to second signal (SIGINT)"),
        _ = term.recv() => bail_t!(Cancelled, "immediate shutdown due to second signal (SIGTERM)"),
        result = &mut inner => result,
    }
}

async fn inner(
    settings: config::RunSettings,
    config: engine::config::Config,
    shutdown_rx: shutdown::Receiver,
) -> Result<i32, Error> {
    let _lock = super::open_dir(&settings.data_dir, super::OpenMode::ReadWrite)?;
    let store = Store::open(&settings.data_dir.join("processed-messages.db"))?;
    let audit_log = AuditLog::new(settings.data_dir.join("forwarding-log.json"));
    let cache_path = settings.data_dir.join("forum-group-cache.json");
    let mut cache = ForumGroupCache::load(&cache_path);

    let clocks = RealClocks {};
    let client: Arc<ProcessClient> = Arc::new(ProcessClient::spawn(
        &settings.chat_command,
        &settings.chat_args,
    )?);

    let dest_chat_id = match cache.group_id {
        Some(id) => id,
        None => {
            let id = client
                .provision_forum_group(&config.sorted_group_name)
                .await
                .err_kind(ErrorKind::Unavailable)?;
            cache.group_id = Some(id);
            cache.save(&cache_path)?;
            id
        }
    };

    let mut topic_anchors = HashMap::new();
    for keyword in &config.video_matches {
        let topic_id = match cache.topics.get(keyword) {
            Some(&id) => id,
            None => {
                let id = client
                    .provision_topic(dest_chat_id, keyword)
                    .await
                    .err_kind(ErrorKind::Unavailable)?;
                cache.topics.insert(keyword.clone(), id);
                cache.save(&cache_path)?;
                id
            }
        };
        topic_anchors.insert(keyword.clone(), topic_id);
    }
    info!(
        dest_chat_id,
        topics = topic_anchors.len(),
        "destination forum group and topics provisioned"
    );

    let mut summary = RunSummary::new();

    if config.skip_cleanup {
        info!("skipCleanup is set; not running the cleanup sweeper");
    } else {
        let result = engine::sweeper::sweep(client.as_ref(), &clocks, &shutdown_rx, &config, dest_chat_id)
            .await?;
        info!(
            exclusions_deleted = result.exclusions_deleted,
            duplicates_deleted = result.duplicates_deleted,
            "cleanup sweep complete"
        );
        summary.record_deletions(result.exclusions_deleted + result.duplicates_deleted);
    }

    let sources = resolve_sources(client.as_ref(), &config).await?;
    info!(count = sources.len(), "scanning source chat(s)");

    let mut forwarded_so_far = 0u64;
    for (source_chat_id, source_group) in sources {
        if shutdown_rx.check().is_err() {
            break;
        }
        let topic_cache = TopicCache::new(client.clone());
        let result = engine::scanner::scan_source(
            client.as_ref(),
            &clocks,
            &shutdown_rx,
            &store,
            &audit_log,
            &topic_cache,
            &config,
            source_chat_id,
            &source_group,
            dest_chat_id,
            &topic_anchors,
            forwarded_so_far,
            &mut summary,
        )
        .await;
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!(source_chat_id, source_group = %source_group, error = %e, "source scan failed; skipping to next source");
                continue;
            }
        };
        forwarded_so_far = result.total_forwarded_after;
        if result.cap_reached {
            info!(max_forwards = config.max_forwards, "forward cap reached; stopping scan");
            break;
        }
    }

    info!("{summary}");
    Ok(0)
}

/// Resolves the configured `source_groups` into `(chatId, displayName)`
/// pairs, falling back to every accessible group/channel (excluding the
/// destination chat itself) when the list is empty.
async fn resolve_sources<C: ChatClient + ?Sized>(
    client: &C,
    config: &engine::config::Config,
) -> Result<Vec<(i64, String)>, Error> {
    if !config.source_groups.is_empty() {
        return Ok(config
            .source_groups
            .iter()
            .map(|&id| (id, id.to_string()))
            .collect());
    }
    let chats = client
        .list_accessible_chats(MAX_ACCESSIBLE_CHATS)
        .await
        .err_kind(ErrorKind::Unavailable)?;
    let sources: Vec<(i64, String)> = chats
        .into_iter()
        .filter(|c| matches!(c.kind, ChatKind::Group | ChatKind::Channel))
        .map(|c| (c.id, c.title))
        .collect();
    if sources.is_empty() {
        warn!("no accessible source chats found");
    }
    Ok(sources)
}
