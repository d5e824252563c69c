//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., passing a
//! `LinkId` where a `ClickId` is expected) and make signatures self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                $name(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id!(
    /// A tenant. Every cache key, queue, and counter is scoped by workspace.
    WorkspaceId
);

string_id!(
    /// A short link (`domain/key`) owned by a workspace.
    LinkId
);

string_id!(
    /// The correlation id linking a conversion back to its originating click.
    ///
    /// Globally unique and never reused once recorded.
    ClickId
);

string_id!(
    /// Internal id of a customer row.
    CustomerId
);

string_id!(
    /// The caller's own identifier for a customer (user id, email, ...).
    ExternalId
);

string_id!(
    /// A payment provider invoice id, used as the sale idempotency key.
    InvoiceId
);

string_id!(
    /// An anonymous visitor id (first-party cookie) used for thank-you page hits.
    AnonymousId
);

string_id!(
    /// An outbound webhook registration.
    WebhookId
);

impl ClickId {
    /// Generates a fresh click id (`clk_` followed by 32 hex characters).
    pub fn generate() -> Self {
        ClickId(format!("clk_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl CustomerId {
    /// Generates a fresh customer id (`cus_` followed by 32 hex characters).
    pub fn generate() -> Self {
        CustomerId(format!("cus_{}", uuid::Uuid::new_v4().simple()))
    }
}

/// An ISO 4217 currency code, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

/// A currency code that is not three ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid currency code: {0:?}")]
pub struct InvalidCurrency(pub String);

impl Currency {
    /// Parses a currency code, accepting any case.
    pub fn parse(s: &str) -> Result<Self, InvalidCurrency> {
        let trimmed = s.trim();
        if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Currency(trimmed.to_ascii_uppercase()))
        } else {
            Err(InvalidCurrency(s.to_string()))
        }
    }

    pub fn usd() -> Self {
        Currency("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = InvalidCurrency;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Currency::parse(&s)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
