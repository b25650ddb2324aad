//! One `jm` command, end to end: fetch → (per folder) convert → deliver → clean up.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tracing::Instrument;

use crate::{
    album::AlbumId,
    audit::truncate_text,
    cleanup::{remove_dir, FolderCleanup, RemovePolicy},
    config::{Config, DEFAULT_MAX_UPLOAD_BYTES},
    convert::{images_to_pdf, ConvertOutcome, DEFAULT_IMAGE_EXTENSION},
    delivery::{deliver, DeliveryError, DeliveryTarget},
    domain::CommandEvent,
    errors::Error,
    messaging::port::MessagingPort,
    ports::{AlbumFetcher, FetchRequest},
};

pub const MSG_INVALID_ID: &str = "无效的漫画ID，请检查您的输入。";
pub const MSG_NO_FOLDERS: &str = "未找到有效的文件夹，请检查下载是否成功。";
pub const MSG_UNSUPPORTED_CHAT: &str = "不支持的会话类型，无法发送文件。";

static JOB_COUNTER: AtomicUsize = AtomicUsize::new(1);

#[derive(Clone, Debug)]
pub struct JobConfig {
    /// Per-job staging directories are created under `<work_dir>/jobs/`.
    pub work_dir: PathBuf,
    pub image_extension: String,
    pub max_upload_bytes: u64,
    pub remove_policy: RemovePolicy,
}

impl JobConfig {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            image_extension: DEFAULT_IMAGE_EXTENSION.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            remove_policy: RemovePolicy::default(),
        }
    }
}

impl From<&Config> for JobConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            work_dir: cfg.work_dir.clone(),
            image_extension: cfg.image_extension.clone(),
            max_upload_bytes: cfg.max_upload_bytes,
            remove_policy: cfg.remove_policy,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{}", MSG_INVALID_ID)]
    InvalidAlbumId,

    #[error("{}", MSG_UNSUPPORTED_CHAT)]
    UnsupportedChat,

    #[error("{0}")]
    Fetch(Error),

    #[error("{}", MSG_NO_FOLDERS)]
    NoFolders,

    #[error("文件夹 {folder} 的 PDF 生成失败，请稍后再试。")]
    ConversionFailed { folder: String },

    #[error("{0}")]
    Convert(Error),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// Final reply for the whole command, if one is still owed.
    ///
    /// Conversion failures were already announced for their folder.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::InvalidAlbumId | Self::UnsupportedChat | Self::NoFolders => {
                Some(self.to_string())
            }
            Self::ConversionFailed { .. } => None,
            other => Some(format!("发生错误：{other}")),
        }
    }
}

/// States one album folder moves through. `CleanedUp` is the only terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FolderState {
    Pending,
    Converting,
    Converted,
    ConversionFailed,
    Delivering,
    Delivered,
    DeliveryFailed,
    CleanedUp,
}

#[derive(Clone, Debug)]
pub struct FolderReport {
    pub folder: PathBuf,
    pub document: PathBuf,
    pub pages: Option<usize>,
    /// Every state visited, in order, starting at `Pending`.
    pub history: Vec<FolderState>,
}

impl FolderReport {
    fn new(folder: &Path) -> Self {
        Self {
            folder: folder.to_path_buf(),
            document: document_path(folder),
            pages: None,
            history: vec![FolderState::Pending],
        }
    }

    fn enter(&mut self, state: FolderState) {
        tracing::debug!(folder = %self.folder.display(), ?state, "folder state");
        self.history.push(state);
    }

    pub fn state(&self) -> FolderState {
        self.history
            .last()
            .copied()
            .unwrap_or(FolderState::Pending)
    }

    pub fn delivered(&self) -> bool {
        self.history.contains(&FolderState::Delivered)
    }
}

#[derive(Debug, Default)]
pub struct JobReport {
    pub album_id: Option<AlbumId>,
    pub folders: Vec<FolderReport>,
    pub error: Option<JobError>,
}

/// `<folder>.pdf`, next to the folder.
pub fn document_path(folder: &Path) -> PathBuf {
    let mut name = folder.file_name().unwrap_or_default().to_os_string();
    name.push(".pdf");
    folder.with_file_name(name)
}

fn folder_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| folder.display().to_string())
}

/// Runs `jm` commands against a fetcher and a messenger.
pub struct AlbumJob {
    cfg: JobConfig,
    fetcher: Arc<dyn AlbumFetcher>,
    messenger: Arc<dyn MessagingPort>,
}

impl AlbumJob {
    pub fn new(
        cfg: JobConfig,
        fetcher: Arc<dyn AlbumFetcher>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            cfg,
            fetcher,
            messenger,
        }
    }

    /// Handle one command. Every reply goes to the originating chat; the
    /// returned report describes what happened to each album folder.
    pub async fn handle(&self, event: &CommandEvent) -> JobReport {
        let mut report = JobReport::default();

        let Some(album_id) = AlbumId::extract(&event.args) else {
            self.reply(event, MSG_INVALID_ID).await;
            report.error = Some(JobError::InvalidAlbumId);
            return report;
        };
        report.album_id = Some(album_id.clone());

        let span = tracing::info_span!(
            "album_job",
            album_id = %album_id,
            chat_id = event.chat_id.0,
            user_id = event.user_id.0
        );

        async {
            let result = match DeliveryTarget::from_event(event) {
                Some(target) => {
                    let staging = self.staging_dir(&album_id);
                    let result = self
                        .run(event, target, &album_id, &staging, &mut report)
                        .await;
                    remove_dir(&staging).await;
                    result
                }
                None => Err(JobError::UnsupportedChat),
            };

            match result {
                Ok(()) => tracing::info!(folders = report.folders.len(), "album job finished"),
                Err(e) => {
                    tracing::warn!(error = %e, "album job failed");
                    if let Some(msg) = e.user_message() {
                        self.reply(event, &msg).await;
                    }
                    report.error = Some(e);
                }
            }
        }
        .instrument(span)
        .await;

        report
    }

    async fn run(
        &self,
        event: &CommandEvent,
        target: DeliveryTarget,
        album_id: &AlbumId,
        staging: &Path,
        report: &mut JobReport,
    ) -> Result<(), JobError> {
        self.reply(event, &format!("正在下载漫画ID: {album_id}..."))
            .await;

        tokio::fs::create_dir_all(staging).await?;
        let output = self
            .fetcher
            .fetch(FetchRequest {
                album_id: album_id.clone(),
                dest_dir: staging.to_path_buf(),
            })
            .await
            .map_err(JobError::Fetch)?;

        if output.folders.is_empty() {
            return Err(JobError::NoFolders);
        }
        tracing::info!(folders = output.folders.len(), "album downloaded");

        let mut pending = output.folders.into_iter();
        while let Some(folder) = pending.next() {
            let (folder_report, result) = self.process_folder(event, target, &folder).await;
            report.folders.push(folder_report);

            if let Err(e) = result {
                // Abandon the rest, but never leave their files behind.
                for rest in pending {
                    let mut skipped = FolderReport::new(&rest);
                    FolderCleanup::new(&rest, &skipped.document, self.cfg.remove_policy)
                        .run()
                        .await;
                    skipped.enter(FolderState::CleanedUp);
                    report.folders.push(skipped);
                }
                return Err(e);
            }
        }

        Ok(())
    }

    async fn process_folder(
        &self,
        event: &CommandEvent,
        target: DeliveryTarget,
        folder: &Path,
    ) -> (FolderReport, Result<(), JobError>) {
        let mut rep = FolderReport::new(folder);
        let cleanup = FolderCleanup::new(folder, &rep.document, self.cfg.remove_policy);
        let name = folder_name(folder);

        let result = self.convert_and_deliver(target, folder, &mut rep).await;
        match &result {
            Ok(()) => {}
            Err(e @ JobError::ConversionFailed { .. }) => {
                self.reply(event, &e.to_string()).await;
            }
            Err(e) => {
                self.reply(event, &format!("处理文件夹 {name} 时发生错误：{e}"))
                    .await;
            }
        }

        cleanup.run().await;
        rep.enter(FolderState::CleanedUp);
        (rep, result)
    }

    async fn convert_and_deliver(
        &self,
        target: DeliveryTarget,
        folder: &Path,
        rep: &mut FolderReport,
    ) -> Result<(), JobError> {
        rep.enter(FolderState::Converting);

        let extension = self.cfg.image_extension.clone();
        let (src, dst) = (folder.to_path_buf(), rep.document.clone());
        let converted = tokio::task::spawn_blocking(move || images_to_pdf(&src, &dst, &extension))
            .await
            .map_err(|e| Error::External(format!("conversion task failed: {e}")))
            .and_then(|r| r);

        let pages = match converted {
            Ok(ConvertOutcome::Written { pages }) if rep.document.exists() => pages,
            Ok(_) => {
                rep.enter(FolderState::ConversionFailed);
                return Err(JobError::ConversionFailed {
                    folder: folder_name(folder),
                });
            }
            Err(e) => {
                rep.enter(FolderState::ConversionFailed);
                return Err(JobError::Convert(e));
            }
        };
        rep.pages = Some(pages);
        rep.enter(FolderState::Converted);
        tracing::info!(folder = %folder.display(), pages, "document built");

        rep.enter(FolderState::Delivering);
        match deliver(
            self.messenger.as_ref(),
            target,
            &rep.document,
            self.cfg.max_upload_bytes,
        )
        .await
        {
            Ok(()) => {
                rep.enter(FolderState::Delivered);
                Ok(())
            }
            Err(e) => {
                rep.enter(FolderState::DeliveryFailed);
                Err(e.into())
            }
        }
    }

    fn staging_dir(&self, album_id: &AlbumId) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let n = JOB_COUNTER.fetch_add(1, Ordering::SeqCst);
        self.cfg
            .work_dir
            .join("jobs")
            .join(format!("{album_id}-{ts}-{n}"))
    }

    async fn reply(&self, event: &CommandEvent, text: &str) {
        // Downloader errors can carry a long stderr tail.
        let limit = self.messenger.capabilities().max_message_len;
        let text = truncate_text(text, limit.saturating_sub(3));
        if let Err(e) = self.messenger.send_text(event.chat_id, &text).await {
            tracing::warn!(chat_id = event.chat_id.0, error = %e, "failed to send reply");
        }
    }
}
