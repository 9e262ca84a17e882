//! Local password generation.
//!
//! Draws from printable ASCII (`!` through `~`) minus the policy's excluded
//! characters. The backslash is never drawn.

use crate::config::PasswordPolicy;
use crate::error::{Result, RotationError};
use rand::seq::SliceRandom;

/// Generate a random password according to `policy`
pub fn generate(policy: &PasswordPolicy) -> Result<String> {
    let excluded = policy.excluded_characters();
    let alphabet: Vec<char> = ('!'..='~')
        .filter(|c| !excluded.contains(*c))
        .collect();

    if alphabet.is_empty() {
        return Err(RotationError::precondition(
            "password policy excludes every printable character",
        ));
    }
    if policy.length == 0 {
        return Err(RotationError::precondition("password length must be positive"));
    }

    let mut rng = rand::thread_rng();
    let password = (0..policy.length)
        .filter_map(|_| alphabet.choose(&mut rng).copied())
        .collect();
    Ok(password)
}
