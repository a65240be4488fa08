//! Handler tree for the dispatcher.
//!
//! Two branches:
//! - text messages carrying a link start a session and show the quality menu
//! - callback queries from that menu run the download in the background

use std::sync::Arc;

use grabcore::download::probe::{describe, parse_user_input, Prober, CLOSE_CALLBACK};
use grabcore::download::sink::UpdateSink;
use grabcore::Orchestrator;
use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::MessageId;

use super::keyboard::quality_keyboard;
use super::sink::TelegramSink;

/// Error type used by every endpoint.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

const PROCESSING_TEXT: &str = "⏳ Processing your link...";
const USAGE_TEXT: &str = r#"Send me a link to a video. Add "| name" after it to rename the file."#;

/// Everything the handlers need, cloned into each endpoint.
#[derive(Clone)]
pub struct HandlerDeps {
    pub orchestrator: Arc<Orchestrator>,
    pub prober: Arc<Prober>,
}

impl HandlerDeps {
    pub fn new(orchestrator: Arc<Orchestrator>, prober: Arc<Prober>) -> Self {
        Self { orchestrator, prober }
    }
}

pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    dptree::entry()
        .branch(message_handler(deps.clone()))
        .branch(callback_handler(deps))
}

fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move { handle_link(&bot, &msg, &deps).await.map_err(|e| Box::new(e) as HandlerError) }
        })
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move { handle_callback(bot, q, &deps).await.map_err(|e| Box::new(e) as HandlerError) }
    })
}

async fn handle_link(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> ResponseResult<()> {
    let chat_id = msg.chat.id;
    let text = msg.text().unwrap_or_default();

    let Some((url, custom_name)) = parse_user_input(text) else {
        bot.send_message(chat_id, USAGE_TEXT).await?;
        return Ok(());
    };

    let status = bot.send_message(chat_id, PROCESSING_TEXT).await?;

    match deps.prober.start_session(chat_id.0, &url, custom_name).await {
        Ok(probed) => {
            bot.edit_message_text(chat_id, status.id, describe(&probed.session.metadata))
                .reply_markup(quality_keyboard(&probed.options))
                .await?;
        }
        Err(e) => {
            log::warn!("Probe failed for {} ({}): {}", chat_id, url, e);
            bot.edit_message_text(chat_id, status.id, format!("❌ Could not read this link.\n{}", e))
                .await?;
        }
    }
    Ok(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, deps: &HandlerDeps) -> ResponseResult<()> {
    bot.answer_callback_query(q.id.clone()).await?;

    let (Some(data), Some(message)) = (q.data.clone(), q.message.as_ref()) else {
        return Ok(());
    };
    let chat_id = message.chat().id;
    let message_id: MessageId = message.id();

    if data == CLOSE_CALLBACK {
        bot.delete_message(chat_id, message_id).await?;
        return Ok(());
    }

    let sink: Arc<dyn UpdateSink> = Arc::new(TelegramSink::new(bot.clone(), chat_id, message_id));
    let orchestrator = Arc::clone(&deps.orchestrator);

    // Downloads can take minutes; keep the dispatcher free.
    tokio::spawn(async move {
        match orchestrator.run(chat_id.0, &data, sink).await {
            Ok(delivery) => log::info!(
                "Delivered {} ({} bytes, {}) to {}",
                delivery.file_name,
                delivery.size,
                delivery.strategy,
                chat_id
            ),
            Err(e) => log::debug!("Callback {} for {} ended with {}", data, chat_id, e.subcategory()),
        }
    });

    Ok(())
}
