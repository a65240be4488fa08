use async_trait::async_trait;
use grabcore::download::sink::{SinkError, UpdateSink};
use teloxide::prelude::*;
use teloxide::types::MessageId;

/// Edits one status message in place.
#[derive(Clone)]
pub struct TelegramSink {
    bot: Bot,
    chat_id: ChatId,
    message_id: MessageId,
}

impl TelegramSink {
    pub fn new(bot: Bot, chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            message_id,
        }
    }
}

#[async_trait]
impl UpdateSink for TelegramSink {
    async fn update(&self, text: &str) -> Result<(), SinkError> {
        match self.bot.edit_message_text(self.chat_id, self.message_id, text).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let error_str = e.to_string();
                // Same text as before
                if error_str.contains("message is not modified") {
                    return Ok(());
                }
                Err(SinkError(error_str))
            }
        }
    }
}
