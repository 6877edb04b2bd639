use fred::types::Key;

/// Separator between the parts of a key.
pub const KEY_SEPARATOR: &str = "::::";

/// Characters with a special meaning in `SCAN MATCH` patterns.
const GLOB_SPECIAL_CHARS: [char; 5] = ['*', '?', '[', ']', '\\'];

/// Key of a Redis entry written by the sink.
///
/// Documents live under `<database>::::<collection>::::<id>`. Every collection also has a marker
/// entry under `<database>::::<collection>` recording that it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisKey(String);

impl RedisKey {
    pub fn document(database: &str, collection: &str, id: &str) -> Self {
        Self(format!(
            "{database}{KEY_SEPARATOR}{collection}{KEY_SEPARATOR}{id}"
        ))
    }

    pub fn collection_marker(database: &str, collection: &str) -> Self {
        Self(format!("{database}{KEY_SEPARATOR}{collection}"))
    }

    /// `SCAN` pattern matching every document of a collection, but not its marker.
    ///
    /// Glob characters in the names are escaped, so they only match themselves.
    pub fn collection_pattern(database: &str, collection: &str) -> String {
        format!(
            "{}{KEY_SEPARATOR}{}{KEY_SEPARATOR}*",
            escape_glob(database),
            escape_glob(collection)
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape_glob(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if GLOB_SPECIAL_CHARS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

impl From<RedisKey> for Key {
    fn from(val: RedisKey) -> Self {
        Key::from(val.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_keys_are_matched_by_collection_pattern() {
        let key = RedisKey::document("app", "users", "42");
        let pattern = RedisKey::collection_pattern("app", "users");

        assert_eq!(key.as_str(), "app::::users::::42");
        assert!(key.as_str().starts_with(pattern.trim_end_matches('*')));
    }

    #[test]
    fn marker_is_not_matched_by_collection_pattern() {
        let marker = RedisKey::collection_marker("app", "users");
        let pattern = RedisKey::collection_pattern("app", "users");

        assert_eq!(marker.as_str(), "app::::users");
        assert!(!marker.as_str().starts_with(pattern.trim_end_matches('*')));
    }

    #[test]
    fn glob_characters_in_names_are_escaped() {
        assert_eq!(
            RedisKey::collection_pattern("db", "d*"),
            r"db::::d\*::::*"
        );
        assert_eq!(
            RedisKey::collection_pattern("d?b", r"[a]\b"),
            r"d\?b::::\[a\]\\b::::*"
        );
    }
}
