//! Telegram Bot integration
//!
//! Thin transport around [`Pipeline`]: turns text messages into
//! [`InboundRequest`]s and sends the single reply back. In groups only
//! messages that mention the bot are handled, and replies are threaded to
//! the originating message.
//!
//! Uses explicit Dispatcher pattern for reliable message polling.

use anyhow::{Context, Result};
use std::sync::Arc;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::{MessageId, ParseMode, ReplyParameters, Update},
};

use crate::delivery::{
    markdown_to_telegram_html, split_message, Reply, GENERIC_FAILURE_TEXT, MAX_MESSAGE_LEN,
};
use crate::error::PipelineError;
use crate::matching::FormatMode;
use crate::pipeline::{InboundRequest, Outcome, Pipeline};
use crate::whitelist::ChatKind;

/// Shared handler state
pub struct BotData {
    pipeline: Pipeline,
    bot_username: String,
}

/// Resolve the bot's username, preferring the configured one
pub async fn resolve_username(bot: &Bot, configured: Option<&str>) -> Result<String> {
    if let Some(name) = configured {
        return Ok(name.to_string());
    }

    let me = bot.get_me().await.context("getMe failed while resolving bot username")?;
    me.user
        .username
        .clone()
        .context("bot account has no username; set BOT_USERNAME")
}

/// Run Telegram bot with explicit Dispatcher for reliable polling
pub async fn run_telegram_bot(bot: Bot, pipeline: Pipeline, bot_username: String) -> Result<()> {
    tracing::info!("Bot username: @{}", bot_username);

    let data = Arc::new(BotData {
        pipeline,
        bot_username,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(message_handler));

    tracing::info!("Starting dispatcher with long polling...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![data])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in message handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::warn!("Dispatcher stopped");
    Ok(())
}

/// Message handler endpoint for the dispatcher
async fn message_handler(bot: Bot, msg: Message, data: Arc<BotData>) -> ResponseResult<()> {
    let Some(request) = inbound_request(&msg, &data) else {
        return Ok(());
    };

    tracing::info!(
        ">>> Message received: user={}, chat={}, kind={:?}",
        request.user_id,
        request.chat_id,
        request.chat_kind
    );

    // Run in its own task so a panic inside the pipeline still gets a reply
    let pipeline = data.pipeline.clone();
    let outcome = match tokio::spawn(async move { pipeline.process(&request).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let err = PipelineError::Internal(e.to_string());
            tracing::error!("Pipeline task failed: {}", err.detail());
            Outcome::Failed(err)
        }
    };

    let reply = Reply::from_outcome(&outcome, &data.bot_username);
    let thread_to = (!msg.chat.is_private()).then_some(msg.id);

    if let Err(e) = send_reply(&bot, msg.chat.id, thread_to, &reply).await {
        tracing::error!("Failed to deliver reply to chat {}: {}", msg.chat.id.0, e);
        if let Err(e) = send_plain(&bot, msg.chat.id, thread_to, GENERIC_FAILURE_TEXT).await {
            tracing::error!("Failed to send failure notice to chat {}: {}", msg.chat.id.0, e);
        }
    }

    Ok(())
}

/// Text messages with a sender; group messages must mention the bot
fn inbound_request(msg: &Message, data: &BotData) -> Option<InboundRequest> {
    let text = msg.text()?;
    let user = msg.from.as_ref()?;

    let chat_kind = if msg.chat.is_private() {
        ChatKind::Direct
    } else {
        ChatKind::Group
    };

    if chat_kind == ChatKind::Group && !data.pipeline.classifier().mentions_bot(text) {
        return None;
    }

    Some(InboundRequest {
        chat_id: msg.chat.id.0,
        user_id: user.id.0 as i64,
        chat_kind,
        text: text.to_string(),
    })
}

/// Send a reply, splitting long bodies. Rich text goes out as HTML and
/// falls back to plain text if Telegram rejects the markup.
async fn send_reply(
    bot: &Bot,
    chat_id: ChatId,
    thread_to: Option<MessageId>,
    reply: &Reply,
) -> ResponseResult<()> {
    for chunk in split_message(&reply.text, MAX_MESSAGE_LEN) {
        match reply.format {
            FormatMode::Rich => {
                let html = markdown_to_telegram_html(chunk);
                let mut request = bot.send_message(chat_id, html).parse_mode(ParseMode::Html);
                if let Some(id) = thread_to {
                    request = request.reply_parameters(ReplyParameters::new(id));
                }

                if let Err(e) = request.await {
                    tracing::warn!("HTML reply rejected, resending as plain text: {}", e);
                    send_plain(bot, chat_id, thread_to, chunk).await?;
                }
            }
            FormatMode::Plain => send_plain(bot, chat_id, thread_to, chunk).await?,
        }
    }

    Ok(())
}

async fn send_plain(
    bot: &Bot,
    chat_id: ChatId,
    thread_to: Option<MessageId>,
    text: &str,
) -> ResponseResult<()> {
    let mut request = bot.send_message(chat_id, text);
    if let Some(id) = thread_to {
        request = request.reply_parameters(ReplyParameters::new(id));
    }
    request.await?;
    Ok(())
}
