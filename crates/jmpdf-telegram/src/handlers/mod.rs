//! Telegram update handlers.
//!
//! Messages that are not commands are ignored; commands are checked against
//! the chat allowlist and then dispatched in `commands`.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use jmpdf_core::domain::{ChatId, ChatKind, CommandEvent, UserId};

use crate::router::AppState;

mod commands;

use commands::parse_command;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some((cmd, args)) = parse_command(text) else {
        return Ok(());
    };
    let Some(user) = msg.from() else {
        return Ok(());
    };

    let event = CommandEvent {
        chat_id: ChatId(msg.chat.id.0),
        chat: chat_kind(&msg.chat),
        user_id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        args,
    };
    commands::dispatch(&state, &cmd, event).await;
    Ok(())
}

fn chat_kind(chat: &teloxide::types::Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_group() || chat.is_supergroup() {
        ChatKind::Group
    } else {
        ChatKind::Other
    }
}
