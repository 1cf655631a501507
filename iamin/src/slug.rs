//! Public slugs: short, URL-safe, assigned once at creation.

use crate::error::DomainError;
use rand::Rng;
use rand::distributions::Alphanumeric;

const TITLE_PART_MAX: usize = 40;
const SUFFIX_LEN: usize = 6;

/// Accepted length of a host-chosen slug.
pub const CUSTOM_LEN: std::ops::RangeInclusive<usize> = 3..=60;

/// How many generated slugs to try before giving up.
pub const GENERATE_ATTEMPTS: usize = 3;

/// Lowercase ASCII alphanumerics from `title`, words joined by single hyphens.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len().min(TITLE_PART_MAX));
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
        if out.len() >= TITLE_PART_MAX {
            break;
        }
    }
    out.truncate(TITLE_PART_MAX);
    out.trim_end_matches('-').to_string()
}

/// Slug from `title` plus a random suffix, e.g. `rooftop-party-k3x9qa`.
#[must_use]
pub fn generate(title: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|b| char::from(b).to_ascii_lowercase())
        .take(SUFFIX_LEN)
        .collect();
    let base = slugify(title);
    if base.is_empty() {
        suffix
    } else {
        format!("{base}-{suffix}")
    }
}

/// Check a host-chosen slug.
///
/// # Errors
///
/// [`DomainError::Validation`] on `slug` when the length is out of range or
/// it contains anything but `a-z`, `0-9` and inner hyphens.
pub fn validate_custom(slug: &str) -> Result<String, DomainError> {
    let slug = slug.trim().to_ascii_lowercase();
    if !CUSTOM_LEN.contains(&slug.len()) {
        return Err(DomainError::validation(
            "slug",
            format!(
                "Link must be {} to {} characters",
                CUSTOM_LEN.start(),
                CUSTOM_LEN.end()
            ),
        ));
    }
    let allowed = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !allowed || slug.starts_with('-') || slug.ends_with('-') {
        return Err(DomainError::validation(
            "slug",
            "Use lowercase letters, numbers and hyphens only",
        ));
    }
    Ok(slug)
}
