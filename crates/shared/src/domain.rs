use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Institution label used when the widget metadata carries no name.
pub const UNKNOWN_INSTITUTION: &str = "Unknown Institution";

/// Display marker for a transaction without a category.
pub const CATEGORY_NOT_AVAILABLE: &str = "N/A";

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

macro_rules! string_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
string_id_newtype!(ItemId);
string_id_newtype!(AccountId);
string_id_newtype!(TransactionId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub mask: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One successful linking of one institution for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub institution: String,
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Category {
    Known(String),
    NotAvailable,
}

impl Category {
    pub fn as_known(&self) -> Option<&str> {
        match self {
            Self::Known(name) => Some(name),
            Self::NotAvailable => None,
        }
    }
}

impl From<Option<String>> for Category {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) if !name.trim().is_empty() => Self::Known(name),
            _ => Self::NotAvailable,
        }
    }
}

impl From<Category> for Option<String> {
    fn from(value: Category) -> Self {
        match value {
            Category::Known(name) => Some(name),
            Category::NotAvailable => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_known().unwrap_or(CATEGORY_NOT_AVAILABLE))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub date: DateTime<Utc>,
    pub name: String,
    /// Signed as reported by the backend.
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: Category,
    pub pending: bool,
}

/// Short-lived credential that authorizes one widget presentation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkToken(String);

impl LinkToken {
    const PREVIEW_CHARS: usize = 20;

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn preview(&self) -> String {
        let head: String = self.0.chars().take(Self::PREVIEW_CHARS).collect();
        format!("{head}...")
    }
}

impl fmt::Debug for LinkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkToken({})", self.preview())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_category_is_not_available() {
        assert_eq!(Category::from(Some("  ".to_string())), Category::NotAvailable);
        assert_eq!(Category::from(None), Category::NotAvailable);
        assert_eq!(Category::NotAvailable.to_string(), "N/A");
        assert_eq!(Category::from(Some("Travel".into())).to_string(), "Travel");
    }

    #[test]
    fn link_token_debug_only_shows_preview() {
        let token = LinkToken::new("link-sandbox-0123456789abcdefghijkl");
        assert_eq!(token.preview(), "link-sandbox-0123456...");
        assert!(!format!("{token:?}").contains("abcdefghijkl"));
    }
}
