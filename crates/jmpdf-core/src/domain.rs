/// Platform user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Platform chat id (numeric). Groups and private chats share this space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Kind of conversation a command arrived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    /// Channels and anything else the platform may add later.
    Other,
}

/// Inbound chat command plus sender context. Read-only input to a job.
#[derive(Clone, Debug)]
pub struct CommandEvent {
    pub chat_id: ChatId,
    pub chat: ChatKind,
    pub user_id: UserId,
    pub username: Option<String>,
    /// Message body after the command word.
    pub args: String,
}
