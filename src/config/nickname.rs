//! Anonymous login nickname generator.
//!
//! Twitch accepts any `justinfan<digits>` login without a PASS, granting
//! read-only access to public chat. Used when no credential is configured.

use rand::RngExt;

const ANONYMOUS_PREFIX: &str = "justinfan";

/// Generate an anonymous nickname like `justinfan48213`.
pub fn generate_nickname() -> String {
    let mut rng = rand::rng();
    let num: u32 = rng.random_range(10_000..100_000);
    format!("{}{}", ANONYMOUS_PREFIX, num)
}

/// Whether `nickname` is an anonymous read-only login.
pub fn is_anonymous(nickname: &str) -> bool {
    nickname
        .strip_prefix(ANONYMOUS_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}
