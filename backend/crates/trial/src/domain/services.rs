//! Domain Services
//!
//! Pure domain logic: token derivation, credential naming, referrer matching.

use chrono::{DateTime, Utc};
use http::Uri;
use platform::crypto::{random_base36, random_token, sha256, to_base36};

use crate::domain::value_objects::TokenHash;

/// Entropy of a verification token (256 bits)
pub const TOKEN_ENTROPY_BYTES: usize = 32;

/// Random suffix length of generated usernames
const USERNAME_SUFFIX_LEN: usize = 6;

/// Generate a fresh verification token and its digest
pub fn issue_token() -> (String, TokenHash) {
    let token = random_token(TOKEN_ENTROPY_BYTES);
    let hash = hash_token(&token);
    (token, hash)
}

/// Digest a presented token for lookup
pub fn hash_token(token: &str) -> TokenHash {
    TokenHash::from_bytes(sha256(token.as_bytes()))
}

/// `trial_<base36 ms timestamp><random base36>`
pub fn generate_username(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().max(0) as u64;
    format!(
        "trial_{}{}",
        to_base36(millis),
        random_base36(USERNAME_SUFFIX_LEN)
    )
}

/// Lowercased host of an absolute referrer URI
pub fn referrer_host(referrer: &str) -> Option<String> {
    let uri: Uri = referrer.trim().parse().ok()?;
    uri.scheme()?;
    let host = uri.host()?.trim_end_matches('.').to_ascii_lowercase();
    (!host.is_empty()).then_some(host)
}

/// `host` equals `allowed` or is a subdomain of it (both already lowercased)
pub fn host_matches(host: &str, allowed: &str) -> bool {
    host == allowed
        || host
            .strip_suffix(allowed)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
