use jmpdf_core::{
    album::AlbumId,
    audit::AuditEvent,
    domain::{ChatId, CommandEvent},
    job::JobReport,
    security::is_authorized,
};

use crate::router::AppState;

pub const ALBUM_COMMAND: &str = "jm";

pub const USAGE: &str = "Use `/jm <album_id>` to download and send a comic in PDF format.";

pub const MSG_UNAUTHORIZED: &str = "无权使用此机器人，请联系管理员。";

/// Split a command message into `(name, args)`.
///
/// Accepts `/cmd args` and `/cmd@botname args`. `jm` is matched as a prefix,
/// so `/jm350234` is the album command with `350234` as its argument. Without
/// the leading slash only the album command is recognized, and an inline
/// argument must start with a digit, so ordinary chatter is never a command.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    let (slashed, body) = match text.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let mut parts = body.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim();
    let name = first.split('@').next().unwrap_or("");

    if let Some(inline) = strip_album_prefix(name) {
        if !slashed && !inline.is_empty() && !inline.starts_with(char::is_numeric) {
            return None;
        }
        let args = [inline, rest]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        return Some((ALBUM_COMMAND.to_string(), args));
    }

    if !slashed || name.is_empty() {
        return None;
    }
    Some((name.to_lowercase(), rest.to_string()))
}

fn strip_album_prefix(name: &str) -> Option<&str> {
    let head = name.get(..ALBUM_COMMAND.len())?;
    head.eq_ignore_ascii_case(ALBUM_COMMAND)
        .then(|| &name[ALBUM_COMMAND.len()..])
}

/// Run one parsed command. Unknown commands are ignored, known ones from
/// chats outside the allowlist are refused.
pub async fn dispatch(state: &AppState, cmd: &str, event: CommandEvent) {
    if !matches!(cmd, ALBUM_COMMAND | "start" | "help") {
        return;
    }

    if !is_authorized(event.chat_id, &state.allowed_chats) {
        state.audit.record(AuditEvent::unauthorized(
            event.chat_id.0,
            event.user_id.0,
            event.username.as_deref(),
        ));
        reply(state, event.chat_id, MSG_UNAUTHORIZED).await;
        return;
    }

    match cmd {
        ALBUM_COMMAND => handle_album(state, &event).await,
        _ => reply(state, event.chat_id, USAGE).await,
    }
}

async fn reply(state: &AppState, chat_id: ChatId, text: &str) {
    if let Err(e) = state.messenger.send_text(chat_id, text).await {
        tracing::warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
    }
}

async fn handle_album(state: &AppState, event: &CommandEvent) {
    if let Some(album_id) = AlbumId::extract(&event.args) {
        state.audit.record(AuditEvent::request(
            event.chat_id.0,
            event.user_id.0,
            event.username.as_deref(),
            album_id.as_str(),
        ));
    }

    let report = state.job.handle(event).await;
    record_outcome(state, event, &report);
}

fn record_outcome(state: &AppState, event: &CommandEvent, report: &JobReport) {
    let Some(album_id) = &report.album_id else {
        return;
    };

    for folder in report.folders.iter().filter(|f| f.delivered()) {
        let document = folder
            .document
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        state.audit.record(AuditEvent::delivered(
            event.chat_id.0,
            event.user_id.0,
            album_id.as_str(),
            &document,
            folder.pages.unwrap_or_default(),
        ));
    }

    if let Some(err) = &report.error {
        state.audit.record(AuditEvent::failed(
            event.chat_id.0,
            event.user_id.0,
            album_id.as_str(),
            &err.to_string(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;

    use jmpdf_core::{
        audit::AuditLogger,
        domain::{ChatKind, UserId},
        job::{AlbumJob, JobConfig, MSG_NO_FOLDERS},
        messaging::{
            port::MessagingPort,
            types::{ChatAction, MessagingCapabilities},
        },
        ports::{AlbumFetcher, FetchOutput, FetchRequest},
        Result,
    };

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    /// Downloads nothing, so every album job ends with "no folders".
    #[derive(Default)]
    struct EmptyFetcher {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlbumFetcher for EmptyFetcher {
        async fn fetch(&self, req: FetchRequest) -> Result<FetchOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(req.album_id.as_str().to_string());
            Ok(FetchOutput {
                folders: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct Replies {
        texts: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl MessagingPort for Replies {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_chat_actions: false,
                max_message_len: 4096,
                max_upload_bytes: u64::MAX,
            }
        }

        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
            self.texts.lock().unwrap().push((chat_id.0, text.to_string()));
            Ok(())
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            Ok(())
        }

        async fn upload_private_file(&self, _u: UserId, _f: &Path, _n: &str) -> Result<()> {
            Ok(())
        }

        async fn upload_group_file(&self, _g: ChatId, _f: &Path, _n: &str) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        root: PathBuf,
        state: AppState,
        fetcher: Arc<EmptyFetcher>,
        replies: Arc<Replies>,
    }

    impl Harness {
        fn new(prefix: &str, allowed_chats: Vec<i64>) -> Self {
            let root = tmp(prefix);
            std::fs::create_dir_all(&root).unwrap();
            let fetcher = Arc::new(EmptyFetcher::default());
            let replies = Arc::new(Replies::default());
            let job = AlbumJob::new(
                JobConfig::new(root.join("work")),
                fetcher.clone(),
                replies.clone(),
            );
            let state = AppState {
                allowed_chats,
                job: Arc::new(job),
                messenger: replies.clone(),
                audit: Arc::new(AuditLogger::new(root.join("audit.log"), true)),
            };
            Self {
                root,
                state,
                fetcher,
                replies,
            }
        }

        fn texts(&self) -> Vec<(i64, String)> {
            self.replies.texts.lock().unwrap().clone()
        }

        fn audit_log(&self) -> String {
            std::fs::read_to_string(self.root.join("audit.log")).unwrap_or_default()
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    fn event(chat_id: i64, args: &str) -> CommandEvent {
        CommandEvent {
            chat_id: ChatId(chat_id),
            chat: ChatKind::Private,
            user_id: UserId(chat_id),
            username: Some("reader".to_string()),
            args: args.to_string(),
        }
    }

    #[test]
    fn parses_slash_commands() {
        assert_eq!(
            parse_command("/jm 12345 please"),
            Some(("jm".to_string(), "12345 please".to_string()))
        );
        assert_eq!(
            parse_command("/JM@comic_bot   777 "),
            Some(("jm".to_string(), "777".to_string()))
        );
        assert_eq!(
            parse_command("/help"),
            Some(("help".to_string(), String::new()))
        );
    }

    #[test]
    fn album_command_is_a_prefix() {
        assert_eq!(
            parse_command("/jm350234"),
            Some(("jm".to_string(), "350234".to_string()))
        );
        assert_eq!(
            parse_command("jm350234"),
            Some(("jm".to_string(), "350234".to_string()))
        );
        assert_eq!(
            parse_command("/jm@bot 1"),
            Some(("jm".to_string(), "1".to_string()))
        );
        assert_eq!(
            parse_command("/Jm12@bot 34"),
            Some(("jm".to_string(), "12 34".to_string()))
        );
        assert_eq!(
            parse_command("jm１２３"),
            Some(("jm".to_string(), "１２３".to_string()))
        );
    }

    #[test]
    fn bare_album_command_is_accepted() {
        assert_eq!(
            parse_command("jm 12345 please"),
            Some(("jm".to_string(), "12345 please".to_string()))
        );
        assert_eq!(
            parse_command("jm abc"),
            Some(("jm".to_string(), "abc".to_string()))
        );
    }

    #[test]
    fn ordinary_text_is_not_a_command() {
        assert_eq!(parse_command("hello there"), None);
        assert_eq!(parse_command("help"), None);
        assert_eq!(parse_command("jmx 1"), None);
        assert_eq!(parse_command("jmeter 5.6 is out"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn args_feed_album_id_extraction() {
        let (_, args) = parse_command("/jm@bot123 456").unwrap();
        assert_eq!(AlbumId::extract(&args).unwrap().as_str(), "456");

        let (_, args) = parse_command("/jm350234").unwrap();
        assert_eq!(AlbumId::extract(&args).unwrap().as_str(), "350234");
    }

    #[tokio::test]
    async fn album_command_runs_the_job_and_audits_it() {
        let h = Harness::new("jmpdf-cmd-album", Vec::new());

        let (cmd, args) = parse_command("/jm350234").unwrap();
        dispatch(&h.state, &cmd, event(7, &args)).await;

        assert_eq!(*h.fetcher.calls.lock().unwrap(), vec!["350234".to_string()]);
        assert_eq!(
            h.texts(),
            vec![
                (7, "正在下载漫画ID: 350234...".to_string()),
                (7, MSG_NO_FOLDERS.to_string()),
            ]
        );
        let log = h.audit_log();
        assert!(log.contains(r#""event":"request""#), "{log}");
        assert!(log.contains(r#""event":"failed""#), "{log}");
    }

    #[tokio::test]
    async fn chats_outside_the_allowlist_are_refused_through_the_messenger() {
        let h = Harness::new("jmpdf-cmd-unauth", vec![-100]);

        dispatch(&h.state, ALBUM_COMMAND, event(7, "350234")).await;

        assert!(h.fetcher.calls.lock().unwrap().is_empty());
        assert_eq!(h.texts(), vec![(7, MSG_UNAUTHORIZED.to_string())]);
        assert!(h.audit_log().contains(r#""event":"unauthorized""#));
    }

    #[tokio::test]
    async fn help_replies_with_usage_through_the_messenger() {
        let h = Harness::new("jmpdf-cmd-help", Vec::new());

        dispatch(&h.state, "help", event(7, "")).await;
        dispatch(&h.state, "start", event(8, "")).await;
        dispatch(&h.state, "settings", event(9, "")).await;

        assert_eq!(
            h.texts(),
            vec![(7, USAGE.to_string()), (8, USAGE.to_string())]
        );
    }
}
