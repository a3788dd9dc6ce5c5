//! Remote protocol limits for names and titles.
//!
//! Each check truncates to the protocol length first and then trims, so an
//! overlong name is shortened rather than rejected.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub const NOTEBOOK_NAME_LEN_MAX: usize = 100;
pub const TAG_NAME_LEN_MAX: usize = 100;
pub const NOTE_TITLE_LEN_MAX: usize = 255;

static NOTEBOOK_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\p{Cc}\p{Z}]([^\p{Cc}\p{Zl}\p{Zp}]{0,98}[^\p{Cc}\p{Z}])?$")
        .expect("notebook name pattern")
});

static TAG_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^,\p{Cc}\p{Z}]([^,\p{Cc}\p{Zl}\p{Zp}]{0,98}[^,\p{Cc}\p{Z}])?$")
        .expect("tag name pattern")
});

static NOTE_TITLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\p{Cc}\p{Z}]([^\p{Cc}\p{Zl}\p{Zp}]{0,253}[^\p{Cc}\p{Z}])?$")
        .expect("note title pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is empty")]
    Empty { field: &'static str },
    #[error("{field} contains characters the remote service does not accept: {value:?}")]
    InvalidCharacters { field: &'static str, value: String },
}

pub fn notebook_name(name: &str) -> Result<String, ValidationError> {
    check("notebook name", name, NOTEBOOK_NAME_LEN_MAX, &NOTEBOOK_NAME_PATTERN)
}

/// Stacks share the notebook name rules.
pub fn notebook_stack(stack: &str) -> Result<String, ValidationError> {
    check("notebook stack", stack, NOTEBOOK_NAME_LEN_MAX, &NOTEBOOK_NAME_PATTERN)
}

pub fn tag_name(name: &str) -> Result<String, ValidationError> {
    check("tag name", name, TAG_NAME_LEN_MAX, &TAG_NAME_PATTERN)
}

pub fn note_title(title: &str) -> Result<String, ValidationError> {
    check("note title", title, NOTE_TITLE_LEN_MAX, &NOTE_TITLE_PATTERN)
}

fn check(
    field: &'static str,
    value: &str,
    max_chars: usize,
    pattern: &Regex,
) -> Result<String, ValidationError> {
    let truncated: String = value.chars().take(max_chars).collect();
    let trimmed = truncated.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if !pattern.is_match(trimmed) {
        return Err(ValidationError::InvalidCharacters {
            field,
            value: trimmed.to_string(),
        });
    }
    Ok(trimmed.to_string())
}
