//! Naming rules for buckets and object keys.
//!
//! Both checks are pure predicates and are the only admission gate before a
//! name is turned into a path or written to a catalog. Rules follow the
//! [Amazon S3 bucket naming rules](https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html)
//! with a stricter character set for keys, since keys double as file names.

use regex::Regex;
use std::{net::IpAddr, sync::LazyLock};

use super::layout::OBJECT_CATALOG_FILE;

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const OBJECT_KEY_MIN_LEN: usize = 1;
const OBJECT_KEY_MAX_LEN: usize = 1024;

const RESERVED_PREFIXES: [&str; 4] = ["xn--", "sthree-", "sthree-configurator", "amzn-s3-demo-"];
const RESERVED_SUFFIXES: [&str; 4] = ["-s3alias", "--ol-s3", ".mrap", "--x-s3"];

/// Characters S3 tells clients to avoid in keys.
const FORBIDDEN_KEY_CHARS: [char; 14] = [
    '\\', '{', '}', '^', '%', '`', ']', '"', '>', '[', '<', '#', '|', '~',
];

/// Characters that would need escaping in a URL or path.
const ESCAPED_KEY_CHARS: [char; 11] = ['&', '$', '@', '=', ';', '/', ':', '+', ' ', ',', '?'];

/// Keys that would shadow bookkeeping files in a bucket directory.
const RESERVED_KEYS: [&str; 1] = [OBJECT_CATALOG_FILE];

static BUCKET_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9\-.]*[a-z0-9]$").expect("bucket name pattern is valid")
});

static OBJECT_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9\-_.]*[a-z0-9]$").expect("object key pattern is valid")
});

/// Validate a bucket name.
///
/// Rules:
/// - 3-63 characters
/// - lowercase letters, digits, dots and hyphens, starting and ending with a
///   letter or digit
/// - no two adjacent characters drawn from `.` and `-`
/// - not an IPv4 or IPv6 literal
/// - no reserved prefix or suffix
pub fn validate_bucket_name(name: &str) -> bool {
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&name.len()) {
        return false;
    }
    if !BUCKET_NAME_PATTERN.is_match(name) || is_ip_literal(name) || has_adjacent_separators(name) {
        return false;
    }
    !has_reserved_prefix(name) && !has_reserved_suffix(name)
}

/// Validate an object key.
///
/// Rules:
/// - 1-1024 bytes, lowercase letters, digits, `-`, `_` and `.`, starting and
///   ending with a letter or digit
/// - no `..`, not `soap` in any case, not an IP literal
/// - none of the forbidden or escape-requiring characters
/// - no reserved prefix or suffix, and not a bookkeeping file name
pub fn validate_object_key(key: &str) -> bool {
    if !(OBJECT_KEY_MIN_LEN..=OBJECT_KEY_MAX_LEN).contains(&key.len()) {
        return false;
    }
    if !OBJECT_KEY_PATTERN.is_match(key) {
        return false;
    }
    if key.contains(FORBIDDEN_KEY_CHARS) || key.contains(ESCAPED_KEY_CHARS) {
        return false;
    }
    if key.contains("..") || key.eq_ignore_ascii_case("soap") || is_ip_literal(key) {
        return false;
    }
    if RESERVED_KEYS.contains(&key) {
        return false;
    }
    !has_reserved_prefix(key) && !has_reserved_suffix(key)
}

fn is_ip_literal(name: &str) -> bool {
    name.parse::<IpAddr>().is_ok()
}

fn has_adjacent_separators(name: &str) -> bool {
    name.as_bytes()
        .windows(2)
        .any(|pair| matches!(pair, [b'.' | b'-', b'.' | b'-']))
}

fn has_reserved_prefix(name: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

fn has_reserved_suffix(name: &str) -> bool {
    RESERVED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}
