//! Whitelist / Authorization Gate
//!
//! Two disjoint id sets loaded once at startup:
//! - **Groups**: chat ids of community group chats (usually negative)
//! - **Users**: user ids allowed to talk to the bot in direct messages
//!
//! The whitelist is an immutable value handed to [`Whitelist::authorize`];
//! nothing here consults global state.

use std::collections::HashSet;

/// Errors raised while loading whitelist configuration
#[derive(Debug, thiserror::Error)]
pub enum WhitelistError {
    #[error("invalid id {value:?} in {list}: expected a decimal integer")]
    InvalidId { list: &'static str, value: String },
}

/// Kind of chat an update arrived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// One-to-one chat with the bot
    Direct,
    /// Group, supergroup or channel
    Group,
}

/// Identity of one inbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationContext {
    pub chat_id: i64,
    pub user_id: i64,
    pub chat_kind: ChatKind,
}

/// Result of the authorization gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Denied,
}

impl Authorization {
    pub fn is_authorized(self) -> bool {
        self == Authorization::Authorized
    }
}

/// Immutable authorization policy
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    groups: HashSet<i64>,
    users: HashSet<i64>,
}

impl Whitelist {
    pub fn new(
        groups: impl IntoIterator<Item = i64>,
        users: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            groups: groups.into_iter().collect(),
            users: users.into_iter().collect(),
        }
    }

    /// Parse the two comma-separated id lists from configuration.
    ///
    /// Blank entries are skipped; anything else that is not a decimal
    /// integer fails the load.
    pub fn parse(groups: &str, users: &str) -> Result<Self, WhitelistError> {
        Ok(Self {
            groups: parse_ids(groups, "ALLOWED_GROUP_IDS")?,
            users: parse_ids(users, "ALLOWED_USER_IDS")?,
        })
    }

    /// Check a request against the set selected by its chat kind.
    pub fn authorize(&self, ctx: &AuthorizationContext) -> Authorization {
        let allowed = match ctx.chat_kind {
            ChatKind::Group => self.groups.contains(&ctx.chat_id),
            ChatKind::Direct => self.users.contains(&ctx.user_id),
        };

        if allowed {
            Authorization::Authorized
        } else {
            Authorization::Denied
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

fn parse_ids(raw: &str, list: &'static str) -> Result<HashSet<i64>, WhitelistError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| WhitelistError::InvalidId {
                list,
                value: s.to_string(),
            })
        })
        .collect()
}
