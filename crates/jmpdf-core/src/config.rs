use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    cleanup::RemovePolicy,
    convert::DEFAULT_IMAGE_EXTENSION,
    errors::Error,
    locator::default_ignored_folders,
    Result,
};

/// Bot API upload ceiling for documents.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    /// Empty means every chat may use the bot.
    pub telegram_allowed_chats: Vec<i64>,

    // Downloader
    pub work_dir: PathBuf,
    pub downloader_path: PathBuf,
    pub downloader_args: Vec<String>,
    pub fetch_timeout: Option<Duration>,
    pub ignored_folders: HashSet<String>,

    // Conversion / delivery
    pub image_extension: String,
    pub max_upload_bytes: u64,

    // Cleanup
    pub remove_policy: RemovePolicy,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let telegram_allowed_chats = parse_csv_i64(env_str("TELEGRAM_ALLOWED_CHATS"));

        // Album folders are created relative to the working dir, like the downloader expects.
        let work_dir = match env_path("JM_WORK_DIR") {
            Some(p) => p,
            None => env::current_dir()?,
        };
        fs::create_dir_all(&work_dir)?;

        let downloader_path = env_path("JM_DOWNLOADER_PATH")
            .or_else(|| which_in_path("jmcomic"))
            .unwrap_or_else(|| PathBuf::from("jmcomic"));
        let downloader_args = env_str("JM_DOWNLOADER_ARGS")
            .map(|s| s.split_whitespace().map(|a| a.to_string()).collect())
            .unwrap_or_default();
        let fetch_timeout = env_u64("JM_FETCH_TIMEOUT_SECS")
            .filter(|s| *s > 0)
            .map(Duration::from_secs);
        let ignored_folders =
            parse_csv_set(env_str("JM_IGNORED_FOLDERS")).unwrap_or_else(default_ignored_folders);

        let image_extension = env_str("JM_IMAGE_EXTENSION")
            .and_then(non_empty)
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string());
        let max_upload_bytes = env_u64("JM_MAX_UPLOAD_BYTES").unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let defaults = RemovePolicy::default();
        let remove_policy = RemovePolicy {
            attempts: env_u32("JM_REMOVE_ATTEMPTS").unwrap_or(defaults.attempts).max(1),
            backoff: env_u64("JM_REMOVE_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
        };

        let audit_log_path = PathBuf::from(
            env_str("AUDIT_LOG_PATH").unwrap_or("/tmp/jmpdf-audit.log".to_string()),
        );
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_chats,
            work_dir,
            downloader_path,
            downloader_args,
            fetch_timeout,
            ignored_folders,
            image_extension,
            max_upload_bytes,
            remove_policy,
            audit_log_path,
            audit_log_json,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn parse_csv_set(v: Option<String>) -> Option<HashSet<String>> {
    let v = v?;
    let out = v
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect::<HashSet<_>>();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        let candidate = dir.join(binary);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable_file(p: &Path) -> bool {
    if !p.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = fs::metadata(p) {
            return (md.permissions().mode() & 0o111) != 0;
        }
    }
    true
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_strips_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\nTELEGRAM_BOT_TOKEN=\"abc:def\"\n\nJM_IMAGE_EXTENSION='jpg'\nnot a pair\n=nokey\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_BOT_TOKEN".to_string(), "abc:def".to_string()),
                ("JM_IMAGE_EXTENSION".to_string(), "jpg".to_string()),
            ]
        );
    }

    #[test]
    fn csv_helpers_drop_blanks_and_garbage() {
        assert_eq!(
            parse_csv_i64(Some(" -100, 5,,x ".to_string())),
            vec![-100, 5]
        );
        assert!(parse_csv_i64(None).is_empty());

        let set = parse_csv_set(Some("src, .venv ,".to_string())).unwrap();
        assert!(set.contains("src") && set.contains(".venv"));
        assert_eq!(set.len(), 2);
        assert!(parse_csv_set(Some(" , ".to_string())).is_none());
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool("Yes"));
        assert!(parse_bool(" 1 "));
        assert!(!parse_bool("off"));
    }
}
