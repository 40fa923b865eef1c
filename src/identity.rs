//! Ambient user identity.

use nix::unistd::{getuid, User};

/// Name of the user running this process.
///
/// Looks up the real uid in the user database first, then falls back to
/// `$USER` and `$LOGNAME`.
pub fn current_user() -> Option<String> {
    match User::from_uid(getuid()) {
        Ok(Some(user)) if !user.name.is_empty() => return Some(user.name),
        Ok(_) => tracing::debug!("No user database entry for uid {}", getuid()),
        Err(e) => tracing::debug!("User database lookup failed: {}", e),
    }

    from_env(|key| std::env::var(key).ok())
}

fn from_env(var: impl Fn(&str) -> Option<String>) -> Option<String> {
    ["USER", "LOGNAME"]
        .into_iter()
        .filter_map(|key| var(key))
        .find(|name| !name.is_empty())
}
