//! Album downloader adapter.
//!
//! Drives an external downloader program (the `jmcomic` CLI by default) as a
//! child process, then reports the album folders it left in the destination.

use std::{
    collections::{HashSet, VecDeque},
    path::PathBuf,
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;

use jmpdf_core::{
    config::Config,
    errors::Error,
    locator::{default_ignored_folders, find_target_folders},
    ports::{AlbumFetcher, FetchOutput, FetchRequest},
    Result,
};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::Mutex,
};

const STDERR_TAIL_MAX_BYTES: usize = 16 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 200;
/// How long to wait for the pipes to reach EOF once the child has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct CommandFetcherConfig {
    pub program: PathBuf,
    /// Passed before the album id.
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
    pub ignored_folders: HashSet<String>,
}

impl CommandFetcherConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
            ignored_folders: default_ignored_folders(),
        }
    }
}

impl From<&Config> for CommandFetcherConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            program: cfg.downloader_path.clone(),
            args: cfg.downloader_args.clone(),
            timeout: cfg.fetch_timeout,
            ignored_folders: cfg.ignored_folders.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CommandFetcher {
    cfg: CommandFetcherConfig,
}

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        // +1 for the '\n' we join with later.
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

impl CommandFetcher {
    pub fn new(cfg: CommandFetcherConfig) -> Self {
        Self { cfg }
    }

    fn command(&self, req: &FetchRequest) -> Command {
        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(&self.cfg.args)
            .arg(req.album_id.as_str())
            .current_dir(&req.dest_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AlbumFetcher for CommandFetcher {
    async fn fetch(&self, req: FetchRequest) -> Result<FetchOutput> {
        tracing::info!(
            program = %self.cfg.program.display(),
            album_id = %req.album_id,
            dest = %req.dest_dir.display(),
            "starting downloader"
        );

        let mut child = self.command(&req).spawn().map_err(|e| {
            Error::External(format!(
                "failed to start downloader {}: {e}",
                self.cfg.program.display()
            ))
        })?;

        let stderr_tail: Arc<Mutex<StderrTail>> = Arc::new(Mutex::new(StderrTail::default()));

        // Drain both pipes in background to avoid blocking on a full pipe.
        let mut drains = Vec::with_capacity(2);
        if let Some(stderr) = child.stderr.take() {
            let tail = stderr_tail.clone();
            drains.push(tokio::spawn(async move {
                let mut r = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = r.next_line().await {
                    tail.lock().await.push_line(line);
                }
            }));
        }
        if let Some(stdout) = child.stdout.take() {
            drains.push(tokio::spawn(async move {
                let mut r = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = r.next_line().await {
                    tracing::debug!(target: "jmpdf_fetcher::downloader", "{line}");
                }
            }));
        }

        let status = match self.cfg.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(Error::External(format!(
                        "download timed out after {}s",
                        limit.as_secs()
                    )));
                }
            },
            None => child.wait().await?,
        };

        // A grandchild may still hold the pipes open; do not wait on it forever.
        for drain in drains {
            if tokio::time::timeout(DRAIN_GRACE, drain).await.is_err() {
                tracing::debug!("downloader output still open after exit");
            }
        }

        if !status.success() {
            let stderr = stderr_tail.lock().await.snapshot();
            if !stderr.trim().is_empty() {
                return Err(Error::External(format!(
                    "downloader exited with status {status}\nstderr (tail):\n{stderr}"
                )));
            }
            return Err(Error::External(format!(
                "downloader exited with status {status}"
            )));
        }

        let folders = find_target_folders(&req.dest_dir, &self.cfg.ignored_folders)?;
        tracing::info!(album_id = %req.album_id, folders = folders.len(), "downloader finished");
        Ok(FetchOutput { folders })
    }
}
