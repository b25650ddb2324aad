/// Outgoing "chat action" (status indicator shown while work is in progress).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    UploadDocument,
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_chat_actions: bool,
    /// Longest text reply, in characters.
    pub max_message_len: usize,
    /// Largest file the platform accepts for upload.
    pub max_upload_bytes: u64,
}
