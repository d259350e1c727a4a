//! Response Delivery
//!
//! Fixed user-facing texts and the mapping from a pipeline [`Outcome`] to the
//! single [`Reply`] sent back. Also the Telegram HTML conversion and message
//! splitting used when the reply is rich text.

use crate::matching::FormatMode;
use crate::pipeline::Outcome;
use crate::whitelist::ChatKind;

pub const DENIED_TEXT: &str = "Этот бот доступен только в авторизованном чате сообщества.";
pub const EMPTY_QUERY_DIRECT_TEXT: &str =
    "Пожалуйста, укажите запрос. Например: найди мне iOS разработчика";
/// Sent when a reply was produced but could not be delivered
pub const GENERIC_FAILURE_TEXT: &str =
    "Не удалось обработать ваш запрос. Пожалуйста, попробуйте позже.";
pub const SERVICE_UNAVAILABLE_TEXT: &str =
    "Сервис временно недоступен. Пожалуйста, попробуйте позже.";
/// Read-path (HTTP) text when the dataset cannot be loaded
pub const DATA_SOURCE_UNAVAILABLE_TEXT: &str =
    "⚠️ Unable to access the expert database. Please try again later.";

/// Telegram allows 4096 characters per message, counted after entity parsing
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Group usage hint, naming the bot
pub fn empty_query_group_text(bot_username: &str) -> String {
    format!(
        "Пожалуйста, укажите запрос. Например: @{} найди мне iOS разработчика",
        bot_username.trim_start_matches('@')
    )
}

/// Usage hint for the given chat kind
pub fn usage_text(chat_kind: ChatKind, bot_username: &str) -> String {
    match chat_kind {
        ChatKind::Group => empty_query_group_text(bot_username),
        ChatKind::Direct => EMPTY_QUERY_DIRECT_TEXT.to_string(),
    }
}

/// One outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub format: FormatMode,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: FormatMode::Plain,
        }
    }

    /// Map a pipeline outcome to its reply. Failure detail is dropped here.
    pub fn from_outcome(outcome: &Outcome, bot_username: &str) -> Self {
        match outcome {
            Outcome::Denied => Reply::plain(DENIED_TEXT),
            Outcome::EmptyQuery(kind) | Outcome::Help(kind) => {
                Reply::plain(usage_text(*kind, bot_username))
            }
            Outcome::Matched(response) => Reply {
                text: response.body.clone(),
                format: response.format,
            },
            Outcome::Failed(err) => Reply::plain(err.envelope().user_message),
        }
    }
}

/// Convert model Markdown (`**bold**`, `` `code` ``, fenced blocks) to Telegram HTML
pub fn markdown_to_telegram_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 100);
    let mut chars = text.chars().peekable();
    let mut in_code_block = false;
    let mut in_inline_code = false;
    let mut in_bold = false;

    while let Some(c) = chars.next() {
        if c == '`' {
            if chars.peek() == Some(&'`') {
                chars.next();
                if chars.peek() == Some(&'`') {
                    chars.next();

                    if in_code_block {
                        result.push_str("</code></pre>");
                        in_code_block = false;
                    } else {
                        // Skip language identifier (```text)
                        while let Some(&ch) = chars.peek() {
                            if ch == '\n' {
                                chars.next();
                                break;
                            } else if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        result.push_str("<pre><code>");
                        in_code_block = true;
                    }
                    continue;
                }
                // Empty inline code span
                if !in_code_block {
                    continue;
                }
            }

            if !in_code_block {
                result.push_str(if in_inline_code { "</code>" } else { "<code>" });
                in_inline_code = !in_inline_code;
                continue;
            }
        }

        if c == '*' && chars.peek() == Some(&'*') && !in_code_block && !in_inline_code {
            chars.next();
            result.push_str(if in_bold { "</b>" } else { "<b>" });
            in_bold = !in_bold;
            continue;
        }

        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            _ => result.push(c),
        }
    }

    // Close any unclosed tags
    if in_bold {
        result.push_str("</b>");
    }
    if in_inline_code {
        result.push_str("</code>");
    }
    if in_code_block {
        result.push_str("</code></pre>");
    }

    result
}

/// Split text into chunks of at most `max` bytes on char boundaries,
/// preferring the last newline inside the window.
pub fn split_message(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max {
            chunks.push(remaining);
            break;
        }

        let hard = remaining
            .char_indices()
            .take_while(|(i, c)| i + c.len_utf8() <= max)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or_else(|| remaining.chars().next().map(char::len_utf8).unwrap_or(1));

        let split_at = remaining[..hard]
            .rfind('\n')
            .filter(|&i| i > 0)
            .map(|i| i + 1)
            .unwrap_or(hard);

        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        remaining = rest;
    }

    chunks
}
