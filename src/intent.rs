//! Query Intent Classifier
//!
//! Turns raw message text into an [`ExtractedQuery`]: strips the bot mention
//! in group chats, trims, and detects an "all results" request.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::whitelist::ChatKind;

/// Result ceiling for an ordinary request
pub const DEFAULT_RESULT_CEILING: usize = 5;

/// Result ceiling when the user asks for everything
pub const ALL_RESULTS_CEILING: usize = 20;

/// Synonyms for "show everything". Add new phrasings here.
const ALL_RESULTS_PATTERNS: &[&str] = &[
    // English
    r"\b(show|list|give|find|get)\s+(me\s+)?(all|everyone|everybody)\b",
    r"\ball\s+(of\s+them|results|matches|candidates|experts|people)\b",
    r"\bfull\s+list\b",
    // Russian
    r"\b(покажи|покажите|дай|дайте|выведи|выведите|найди|найдите)\s+(мне\s+)?(всех|все|всё)\b",
    r"\bсписок\s+всех\b",
    r"\bвсе\s+(результаты|варианты|совпадения)\b",
    r"\bполный\s+список\b",
    // Ukrainian
    r"\b(покажи|дай|знайди)\s+(мені\s+)?(всіх|усіх)\b",
];

static ALL_RESULTS_REGEXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    ALL_RESULTS_PATTERNS
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).expect("static pattern compiles"))
        .collect()
});

/// Normalized user request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedQuery {
    pub raw: String,
    pub text: String,
    pub all_results: bool,
}

impl ExtractedQuery {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of candidates the matching service should return at most
    pub fn result_ceiling(&self) -> usize {
        if self.all_results {
            ALL_RESULTS_CEILING
        } else {
            DEFAULT_RESULT_CEILING
        }
    }
}

/// Mention-aware query extractor
#[derive(Debug, Clone)]
pub struct QueryIntentClassifier {
    mention: Regex,
}

impl QueryIntentClassifier {
    /// Build for the given bot username (with or without the leading `@`)
    pub fn new(bot_username: &str) -> Self {
        let token = format!("@{}", bot_username.trim_start_matches('@'));
        // Trailing boundary so `@name` does not match `@name2` or `@name_team`
        let mention = Regex::new(&format!(r"(?i){}\b", regex::escape(&token)))
            .expect("escaped literal always compiles");
        Self { mention }
    }

    pub fn extract(&self, raw: &str, chat_kind: ChatKind) -> ExtractedQuery {
        let text = match chat_kind {
            ChatKind::Group => self.mention.replace_all(raw, "").trim().to_string(),
            ChatKind::Direct => raw.trim().to_string(),
        };
        let all_results = is_all_results(&text);

        ExtractedQuery {
            raw: raw.to_string(),
            text,
            all_results,
        }
    }

    /// Whether a group message addresses the bot at all
    pub fn mentions_bot(&self, raw: &str) -> bool {
        self.mention.is_match(raw)
    }
}

/// Check text against the fixed "show everything" synonym list
pub fn is_all_results(text: &str) -> bool {
    ALL_RESULTS_REGEXES.iter().any(|re| re.is_match(text))
}
