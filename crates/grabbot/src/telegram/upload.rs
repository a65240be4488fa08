use async_trait::async_trait;
use grabcore::download::upload::{DeliveryMode, Uploader};
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::InputFile;

/// Sends finished files back to the requester's chat.
#[derive(Clone)]
pub struct TelegramUploader {
    bot: Bot,
}

impl TelegramUploader {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Uploader for TelegramUploader {
    async fn upload(&self, requester_id: i64, path: &Path, title: &str, mode: DeliveryMode) -> Result<(), String> {
        let chat_id = ChatId(requester_id);
        let file = InputFile::file(path.to_path_buf());
        log::info!("Sending {} to {} as {}", path.display(), requester_id, mode);

        let result = match mode {
            DeliveryMode::Video => self
                .bot
                .send_video(chat_id, file)
                .caption(title)
                .supports_streaming(true)
                .await
                .map(|_| ()),
            DeliveryMode::Audio => self.bot.send_audio(chat_id, file).title(title).await.map(|_| ()),
            DeliveryMode::Document => self.bot.send_document(chat_id, file).caption(title).await.map(|_| ()),
        };

        result.map_err(|e| e.to_string())
    }
}
