//! Sending a finished document back to whoever asked for it.

use std::path::Path;

use crate::{
    domain::{ChatId, ChatKind, CommandEvent, UserId},
    messaging::{port::MessagingPort, types::ChatAction},
};

/// Where a document goes, resolved once from the originating event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryTarget {
    Private { user_id: UserId },
    Group { group_id: ChatId },
}

impl DeliveryTarget {
    /// `None` for conversation kinds that have no upload call.
    pub fn from_event(event: &CommandEvent) -> Option<Self> {
        match event.chat {
            ChatKind::Private => Some(Self::Private {
                user_id: event.user_id,
            }),
            ChatKind::Group => Some(Self::Group {
                group_id: event.chat_id,
            }),
            ChatKind::Other => None,
        }
    }
}

/// Any upload failure, carrying the underlying message.
#[derive(Debug, thiserror::Error)]
#[error("发送PDF文件失败：{0}")]
pub struct DeliveryError(pub String);

/// Upload `document` to `target` with exactly one platform call.
pub async fn deliver(
    messenger: &dyn MessagingPort,
    target: DeliveryTarget,
    document: &Path,
    max_bytes: u64,
) -> Result<(), DeliveryError> {
    let name = document
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "album.pdf".to_string());

    let caps = messenger.capabilities();
    let max_bytes = max_bytes.min(caps.max_upload_bytes);
    let size = tokio::fs::metadata(document)
        .await
        .map_err(|e| DeliveryError(e.to_string()))?
        .len();
    if size > max_bytes {
        return Err(DeliveryError(format!(
            "文件过大（{size} 字节，上限 {max_bytes} 字节）"
        )));
    }

    if caps.supports_chat_actions {
        let chat_id = match target {
            DeliveryTarget::Private { user_id } => ChatId(user_id.0),
            DeliveryTarget::Group { group_id } => group_id,
        };
        let _ = messenger
            .send_chat_action(chat_id, ChatAction::UploadDocument)
            .await;
    }

    let res = match target {
        DeliveryTarget::Private { user_id } => {
            messenger.upload_private_file(user_id, document, &name).await
        }
        DeliveryTarget::Group { group_id } => {
            messenger.upload_group_file(group_id, document, &name).await
        }
    };
    res.map_err(|e| DeliveryError(e.to_string()))?;

    tracing::info!(file = %name, size, ?target, "document delivered");
    Ok(())
}
