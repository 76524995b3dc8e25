//! URL slug generation.
//!
//! Slugs become URL path segments, so they must match
//! `^[a-z0-9]+(-[a-z0-9]+)*$`. Uniqueness within an organization is checked by
//! the gateway at write time; [`slugify`] with `force_unique` only makes
//! collisions between freshly created pages unlikely.

use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use regex::Regex;

/// Slug used when a title has nothing left after stripping.
pub const FALLBACK_SLUG: &str = "untitled-page";

/// Characters outside `[a-z0-9\s-]`.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static DISALLOWED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static HYPHENS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static VALID_SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap());

/// Last time token handed out; keeps suffixes strictly increasing per process.
static LAST_TIME_TOKEN: AtomicI64 = AtomicI64::new(0);

/// Turn a title into a URL-safe slug.
///
/// Non-ASCII letters are dropped rather than transliterated, which can leave
/// nothing behind; such titles fall back to [`FALLBACK_SLUG`].
///
/// ```rust
/// use pagesmith_core::slug::{slugify, FALLBACK_SLUG};
///
/// assert_eq!(slugify("Grace Community Church!", false), "grace-community-church");
/// assert_eq!(slugify("   ", false), FALLBACK_SLUG);
/// assert_ne!(slugify("About", true), slugify("About", true));
/// ```
#[must_use]
pub fn slugify(title: &str, force_unique: bool) -> String {
    let lowered = title.to_lowercase();
    let stripped = DISALLOWED_RE.replace_all(&lowered, "");
    let hyphenated = WHITESPACE_RE.replace_all(&stripped, "-");
    let collapsed = HYPHENS_RE.replace_all(&hyphenated, "-");
    let trimmed = collapsed.trim_matches('-');

    let base = if trimmed.is_empty() {
        FALLBACK_SLUG
    } else {
        trimmed
    };

    if force_unique {
        format!("{base}-{}-{}", time_token(), random_token())
    } else {
        base.to_string()
    }
}

/// Whether `slug` is usable as a URL path segment.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    VALID_SLUG_RE.is_match(slug)
}

/// Base-36 millisecond clock, bumped when two calls land in the same millisecond.
fn time_token() -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_TIME_TOKEN.load(Ordering::Relaxed);
    let token = loop {
        let next = now.max(last + 1);
        match LAST_TIME_TOKEN.compare_exchange_weak(
            last,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break next,
            Err(observed) => last = observed,
        }
    };
    to_base36(token.unsigned_abs())
}

fn random_token() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..6].to_string()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[usize::try_from(n % 36).unwrap_or_default()]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
