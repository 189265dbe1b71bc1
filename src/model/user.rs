//! User model for tasktrail.
//!
//! User id 0 is reserved: as an actor it means "anonymous", and as a
//! capability-grant subject it holds the everyone-baseline.

use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,

    /// Unique login name (sanitized, max 32 chars)
    pub user_name: String,

    /// Hex SHA-256 of the password
    #[serde(skip_serializing)]
    pub user_pass: String,

    /// Display name (max 100 chars)
    pub real_name: String,

    pub email_address: String,

    pub jabber_id: String,

    /// Preferred notification channel (0 = none, 1 = email, 2 = jabber, 3 = both)
    pub notify_type: i64,

    pub account_enabled: bool,

    /// Listing page size preference
    pub tasks_perpage: i64,

    /// Registration timestamp (Unix milliseconds)
    pub register_date: i64,

    /// Offset from UTC in hours
    pub time_zone: i64,
}

/// Payload for registering a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub user_name: String,
    /// Plain-text password; empty means "autogenerate one"
    pub password: String,
    pub real_name: String,
    pub email_address: String,
    pub jabber_id: String,
    pub notify_type: i64,
    pub time_zone: i64,
}

impl NewUser {
    #[must_use]
    pub fn new(user_name: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    #[must_use]
    pub fn with_real_name(mut self, real_name: &str) -> Self {
        self.real_name = real_name.to_string();
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: &str) -> Self {
        self.email_address = email.to_string();
        self
    }

    #[must_use]
    pub fn with_jabber(mut self, jabber_id: &str) -> Self {
        self.jabber_id = jabber_id.to_string();
        self
    }

    #[must_use]
    pub const fn with_notify_type(mut self, notify_type: i64) -> Self {
        self.notify_type = notify_type;
        self
    }
}

/// Sanitize a username: trim, cap at 32 chars, collapse control
/// characters and whitespace runs, then keep only alphanumerics and
/// underscores.
#[must_use]
pub fn clean_username(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw.trim());
    let capped: String = collapsed.chars().take(32).collect();
    capped
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Sanitize a display name: trim, cap at 100 chars, collapse control
/// characters and whitespace runs.
#[must_use]
pub fn clean_real_name(raw: &str) -> String {
    collapse_whitespace(raw.trim()).chars().take(100).collect()
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_gap = false;
    for c in s.chars() {
        if c.is_whitespace() || c.is_control() {
            if !in_gap {
                out.push(' ');
            }
            in_gap = true;
        } else {
            out.push(c);
            in_gap = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_username_strips_specials() {
        assert_eq!(clean_username("  anna lee  "), "annalee");
        assert_eq!(clean_username("bob!@#$%"), "bob");
        assert_eq!(clean_username("under_score"), "under_score");
    }

    #[test]
    fn test_clean_username_caps_length() {
        let long = "x".repeat(50);
        assert_eq!(clean_username(&long).len(), 32);
    }

    #[test]
    fn test_clean_real_name_collapses_runs() {
        assert_eq!(clean_real_name("Anna\t\t Lee\x01Smith"), "Anna Lee Smith");
    }
}
