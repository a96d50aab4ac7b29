use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::schema::ScoreKey;

/// Plain non-negative integer, at most three digits. Empty is allowed so a
/// cleared cell still matches while the user is typing.
const ENTRY_PATTERN: &str = r"^[0-9]{0,3}$";

fn entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ENTRY_PATTERN).expect("entry pattern compiles"))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Marks must be between 0 and {max}")]
    OutOfRange { max: u32, value: u32 },
    #[error("field {key} is not editable")]
    NotEditable { key: ScoreKey },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::OutOfRange { .. } => "validation_failed",
            ValidationError::NotEditable { .. } => "not_editable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Accepted(u32),
    /// Nothing typed yet; keep the cell as it is.
    Pending,
    /// Not an entry at all (letters, signs, too many digits); dropped silently.
    Ignored,
    Rejected(ValidationError),
}

impl Validation {
    pub fn status(&self) -> &'static str {
        match self {
            Validation::Accepted(_) => "accepted",
            Validation::Pending => "pending",
            Validation::Ignored => "ignored",
            Validation::Rejected(_) => "rejected",
        }
    }
}

pub fn validate(raw: &str, max: u32) -> Validation {
    let t = raw.trim();
    if !entry_re().is_match(t) {
        return Validation::Ignored;
    }
    if t.is_empty() {
        return Validation::Pending;
    }
    // At most three ASCII digits, so this cannot overflow.
    let Ok(value) = t.parse::<u32>() else {
        return Validation::Ignored;
    };
    if value > max {
        return Validation::Rejected(ValidationError::OutOfRange { max, value });
    }
    Validation::Accepted(value)
}
