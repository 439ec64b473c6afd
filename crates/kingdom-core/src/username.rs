/// Canonical form of a username as used for on-disk and remote keys:
/// spaces become underscores and the result is lowercased.
pub fn normalize_username(user: &str) -> String {
    user.replace(' ', "_").to_lowercase()
}
