//! Matching request builder
//!
//! One request per user query: policy instructions go into the system block,
//! the literal query and the whole dataset go into the user message. No rows
//! are filtered or ranked locally.

use crate::dataset::CachedDataset;

/// Canned reply the model must use when nobody fits
pub const NO_MATCH_TEXT: &str = "Совпадений не найдено. Попробуйте переформулировать запрос.";

/// Payload sent to the matching service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: usize,
}

/// Canned note for results cut off at the ceiling
pub fn many_matches_text(ceiling: usize) -> String {
    format!(
        "Показаны {} наиболее подходящих специалистов. Чтобы увидеть больше, напишите «покажи всех» и ваш запрос.",
        ceiling
    )
}

/// Build the system instructions for a given result ceiling
pub fn system_instructions(ceiling: usize) -> String {
    format!(
        r#"You match community members to a help request using the expert table provided by the user.

Rules:
- Return at most {ceiling} people, best match first.
- Reply in the same language as the request.
- Use exactly this layout for every person, separated by a blank line:
  **Name:** <full name>
  **Graduation:** <graduation year / class>
  **City:** <city>
  **Contacts:** <contacts>
  **Expertise:** <one sentence on what they can help with>
- Add a short explanation line only when the match is not obvious from their expertise.
- Use only people present in the table. Never invent contacts.
- If nobody matches, reply with exactly: "{no_match}"
- If more than {ceiling} people match, list the best {ceiling} and end with: "{many}""#,
        ceiling = ceiling,
        no_match = NO_MATCH_TEXT,
        many = many_matches_text(ceiling),
    )
}

/// Render the dataset for the prompt, header row first
fn render_dataset(dataset: &CachedDataset) -> String {
    dataset
        .data
        .iter()
        .map(|row| row.join(" | "))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_match_request(
    query: &str,
    dataset: &CachedDataset,
    ceiling: usize,
    max_tokens: usize,
) -> MatchRequest {
    let prompt = format!(
        "Request:\n{}\n\nExpert table ({} records, first line is the header):\n{}",
        query,
        dataset.record_count(),
        render_dataset(dataset)
    );

    MatchRequest {
        system: system_instructions(ceiling),
        prompt,
        max_tokens,
    }
}
