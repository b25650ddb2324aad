use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use jmpdf_core::{
    audit::AuditLogger,
    config::Config,
    job::{AlbumJob, JobConfig},
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    ports::AlbumFetcher,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    /// Empty admits every chat.
    pub allowed_chats: Vec<i64>,
    pub job: Arc<AlbumJob>,
    pub messenger: Arc<dyn MessagingPort>,
    pub audit: Arc<AuditLogger>,
}

pub async fn run_polling(cfg: Arc<Config>, fetcher: Arc<dyn AlbumFetcher>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed; continuing"),
    }
    tracing::info!(
        work_dir = %cfg.work_dir.display(),
        downloader = %cfg.downloader_path.display(),
        allowed_chats = cfg.telegram_allowed_chats.len(),
        "configuration loaded"
    );

    // Every outbound call goes through the throttle; the adapter still retries once on RetryAfter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let job = Arc::new(AlbumJob::new(
        JobConfig::from(cfg.as_ref()),
        fetcher,
        messenger.clone(),
    ));

    let state = Arc::new(AppState {
        allowed_chats: cfg.telegram_allowed_chats.clone(),
        job,
        messenger,
        audit: Arc::new(AuditLogger::new(
            cfg.audit_log_path.clone(),
            cfg.audit_log_json,
        )),
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
