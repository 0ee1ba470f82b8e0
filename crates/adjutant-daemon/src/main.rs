use std::sync::Arc;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

mod router;
mod supervisor;
mod watchdog;

use adjutant_bot::{BotAdapter, BotContext};
use adjutant_classifier::ClassifierPipeline;
use adjutant_conversation::context::DynamicContext;
use adjutant_conversation::tools::{
    memory::{GetChatSummaryTool, SearchMemoryTool},
    settings::{ManageWhitelistTool, UpdatePreferencesTool},
    tasks::{CancelTaskTool, CompleteTaskTool, CreateTaskTool, ListTasksTool, UpdateTaskTool},
    Tool,
};
use adjutant_conversation::{ConversationHandler, Reporter};
use adjutant_core::config::AdjutantConfig;
use adjutant_core::notify::NotifySender;
use adjutant_ingest::{AccountListener, EntityResolver, Ingestor};
use adjutant_llm::LlmRouter;
use adjutant_scheduler::{system_jobs, SchedulerEngine};
use adjutant_store::Store;
use adjutant_tasks::TaskEngine;

#[derive(Parser)]
#[command(name = "adjutant", about = "Personal executive-assistant daemon")]
struct Args {
    /// Path to adjutant.toml (default: ~/.adjutant/adjutant.toml).
    #[arg(long)]
    config: Option<String>,
}

/// Transports implementing [`AccountListener`] register here. The core ships
/// none: the MTProto client is deployment-specific and linked in by the
/// integration crate.
fn configured_listeners(_config: &AdjutantConfig) -> Vec<Arc<dyn AccountListener>> {
    Vec::new()
}

/// Title resolution without a connected transport falls back to ids.
struct NoResolver;

#[async_trait::async_trait]
impl EntityResolver for NoResolver {
    async fn resolve_title(&self, _id: i64) -> Option<String> {
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adjutant=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = match AdjutantConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config load failed: {e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(2);
    }

    info!("adjutant starting");

    // 1. Store + migrations.
    let store = Store::open(&config.database.path)?;

    // 2. One notification sink for every component.
    let (notify, notify_rx) = NotifySender::channel(256);

    // 3. Long-lived components, wired at construction.
    let llm = Arc::new(LlmRouter::new(
        &config.llm,
        store.settings(),
        notify.clone(),
    ));
    let engine = Arc::new(TaskEngine::new(
        store.tasks(),
        store.messages(),
        llm.clone(),
        notify.clone(),
        config.owner.tz_offset_hours,
    ));
    let classifier = Arc::new(ClassifierPipeline::new(
        store.messages(),
        store.confidence(),
        store.settings(),
        engine.clone(),
        llm.clone(),
        notify.clone(),
        config.limits.clone(),
        config.telegram.owner_id,
        config.owner.tz_offset_hours,
    ));

    let mut account_labels = vec![config.telegram.account_label.clone()];
    if let Some(secondary) = &config.telegram.secondary {
        account_labels.push(secondary.account_label.clone());
    }
    let tools: Vec<Box<dyn Tool>> = vec![
        Box::new(CreateTaskTool::new(
            engine.clone(),
            config.owner.tz_offset_hours,
        )),
        Box::new(ListTasksTool::new(
            engine.clone(),
            config.owner.tz_offset_hours,
        )),
        Box::new(CompleteTaskTool::new(engine.clone())),
        Box::new(CancelTaskTool::new(engine.clone())),
        Box::new(UpdateTaskTool::new(
            engine.clone(),
            config.owner.tz_offset_hours,
        )),
        Box::new(SearchMemoryTool::new(
            store.messages(),
            config.owner.tz_offset_hours,
        )),
        Box::new(GetChatSummaryTool::new(
            store.messages(),
            config.owner.tz_offset_hours,
        )),
        Box::new(ManageWhitelistTool::new(store.settings())),
        Box::new(UpdatePreferencesTool::new(store.settings())),
    ];
    let conversation = Arc::new(ConversationHandler::new(
        store.conversation(),
        store.messages(),
        store.settings(),
        llm.clone(),
        tools,
        DynamicContext {
            owner: config.owner.clone(),
            schedule: config.schedule.clone(),
            account_labels,
        },
        config.telegram.owner_id,
        config.limits.conversation_window,
    ));
    let reporter = Arc::new(Reporter::new(
        store.messages(),
        store.settings(),
        store.summaries(),
        engine.clone(),
        llm.clone(),
        notify.clone(),
        config.owner.clone(),
        config.telegram.owner_id,
    ));

    // 4. Shutdown signal shared by every loop.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 5. Classifier worker behind its mpsc.
    let (classify_tx, classify_rx) = mpsc::channel(256);
    tokio::spawn(classifier.clone().run_worker(classify_rx, shutdown_rx.clone()));
    tokio::spawn(supervisor::heartbeat_loop(
        store.health(),
        "classifier",
        shutdown_rx.clone(),
    ));

    // 6. Control-channel bot.
    let bot_id = config
        .telegram
        .bot_token
        .split(':')
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0);
    let bot_ctx = Arc::new(BotContext::new(
        engine.clone(),
        conversation.clone(),
        classifier.clone(),
        reporter.clone(),
        llm.clone(),
        store.settings(),
        store.health(),
        store.confidence(),
        store.messages(),
        config.telegram.owner_id,
        config.owner.tz_offset_hours,
    ));
    let adapter = BotAdapter::new(&config.telegram.bot_token, bot_ctx);
    tokio::spawn(adapter.run(notify_rx));
    tokio::spawn(supervisor::heartbeat_loop(
        store.health(),
        "bot",
        shutdown_rx.clone(),
    ));

    // 7. Resilient ingest per configured account.
    let ingestor = Arc::new(Ingestor::new(
        store.messages(),
        store.settings(),
        engine.clone(),
        llm.clone(),
        notify.clone(),
        classify_tx,
        Arc::new(NoResolver),
        config.telegram.owner_id,
        bot_id,
    ));
    let (events_tx, mut events_rx) = mpsc::channel(512);
    {
        let ingestor = ingestor.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                ingestor.handle_event(event).await;
            }
        });
    }
    let listeners = configured_listeners(&config);
    if listeners.is_empty() {
        warn!("no upstream transport linked — ingest idle, bot and scheduler stay up");
    }
    for listener in listeners {
        tokio::spawn(supervisor::run_resilient_listener(
            listener,
            events_tx.clone(),
            store.health(),
            notify.clone(),
            shutdown_rx.clone(),
        ));
    }

    // 8. Scheduler + job router + watchdog.
    let (fired_tx, fired_rx) = mpsc::channel(64);
    let scheduler = SchedulerEngine::new(
        system_jobs(&config.schedule),
        config.owner.tz_offset_hours,
        fired_tx,
    );
    tokio::spawn(scheduler.run(shutdown_rx.clone()));

    let job_router = Arc::new(router::JobRouter {
        engine: engine.clone(),
        classifier: classifier.clone(),
        conversation: conversation.clone(),
        reporter,
        health: store.health(),
    });
    tokio::spawn(job_router.run(fired_rx, shutdown_rx.clone()));

    tokio::spawn(watchdog::Watchdog::new(store.health(), notify.clone()).run(shutdown_rx));

    info!("all modules started");

    // 9. Wait for SIGINT/SIGTERM, then tear down in reverse order.
    wait_for_signal().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    classifier.abort_deferrals();

    // Let in-flight store and LLM calls finish best-effort.
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    info!("adjutant stopped");
    Ok(())
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable — Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
