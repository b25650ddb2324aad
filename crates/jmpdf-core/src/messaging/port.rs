use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, UserId},
    messaging::types::{ChatAction, MessagingCapabilities},
    Result,
};

/// Chat-platform port: plain replies plus the two file-upload calls.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    /// Upload `file` into the private conversation with `user_id`.
    async fn upload_private_file(&self, user_id: UserId, file: &Path, name: &str) -> Result<()>;

    /// Upload `file` into the group conversation `group_id`.
    async fn upload_group_file(&self, group_id: ChatId, file: &Path, name: &str) -> Result<()>;
}
