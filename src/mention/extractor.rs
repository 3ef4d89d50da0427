use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;

use super::EntityKind;

/// `@name`, `@team:slug` or `@player:slug`. Boundaries the regex crate cannot express
/// (no look-around) are checked in [`accept`].
static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

fn token_regex() -> &'static Regex {
    TOKEN_REGEX.get_or_init(|| {
        Regex::new(r"@(?:(team|player):)?([A-Za-z0-9_]+)").expect("mention token regex compiles")
    })
}

/// One mention token found in a text blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    /// Token exactly as written, e.g. `@team:tsm`.
    pub raw: String,
    /// Entity kind the token refers to.
    pub kind: EntityKind,
    /// Name or slug after the prefix.
    pub identifier: String,
    /// Byte offset of the `@` in the scanned text.
    pub offset: usize,
}

impl Token {
    /// Key used to match tokens regardless of identifier case.
    pub fn key(&self) -> (EntityKind, String) {
        (self.kind, self.identifier.to_ascii_lowercase())
    }

    /// Byte range covered by the token in the scanned text.
    pub fn span(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.raw.len()
    }
}

/// Scan `text` and return every well-formed token in order of appearance.
///
/// Duplicates are kept; use [`unique_tokens`] before resolving.
pub fn extract_tokens(text: &str) -> Vec<Token> {
    token_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let identifier = caps.get(2)?;
            let kind = match caps.get(1).map(|m| m.as_str()) {
                Some("team") => EntityKind::Team,
                Some("player") => EntityKind::Player,
                _ => EntityKind::User,
            };

            if !accept(text, whole.start(), whole.end(), kind) {
                return None;
            }

            Some(Token {
                raw: whole.as_str().to_owned(),
                kind,
                identifier: identifier.as_str().to_owned(),
                offset: whole.start(),
            })
        })
        .collect()
}

/// Drop repeated tokens, keeping the first occurrence of each `(kind, identifier)`.
pub fn unique_tokens(tokens: Vec<Token>) -> Vec<Token> {
    let mut seen: IndexMap<(EntityKind, String), Token> = IndexMap::new();
    for token in tokens {
        seen.entry(token.key()).or_insert(token);
    }
    seen.into_values().collect()
}

fn accept(text: &str, start: usize, end: usize, kind: EntityKind) -> bool {
    // Emails and handles glued to a preceding word are not mentions.
    if let Some(before) = text[..start].chars().next_back() {
        if before.is_ascii_alphanumeric() || before == '_' || before == '.' {
            return false;
        }
    }

    // `@foo:bar` with an unknown type, or `@a@b`.
    if kind == EntityKind::User {
        if let Some(after) = text[end..].chars().next() {
            if after == ':' || after == '@' {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raws(text: &str) -> Vec<String> {
        extract_tokens(text).into_iter().map(|t| t.raw).collect()
    }

    #[test]
    fn text_without_tokens_yields_nothing() {
        assert!(extract_tokens("").is_empty());
        assert!(extract_tokens("No mentions in this sentence.").is_empty());
        assert!(extract_tokens("50% off @ the store, @!, @ @").is_empty());
    }

    #[test]
    fn finds_all_three_kinds_with_offsets() {
        let text = "Great game @team:tsm and @player:shroud! gg @alice";
        let tokens = extract_tokens(text);
        assert_eq!(tokens.len(), 3);

        assert_eq!(tokens[0].kind, EntityKind::Team);
        assert_eq!(tokens[0].identifier, "tsm");
        assert_eq!(tokens[0].offset, 11);
        assert_eq!(&text[tokens[0].span()], "@team:tsm");

        assert_eq!(tokens[1].kind, EntityKind::Player);
        assert_eq!(tokens[1].identifier, "shroud");
        assert_eq!(&text[tokens[1].span()], "@player:shroud");

        assert_eq!(tokens[2].kind, EntityKind::User);
        assert_eq!(tokens[2].raw, "@alice");
    }

    #[test]
    fn emails_are_not_mentions() {
        assert!(extract_tokens("write to admin@example.com").is_empty());
        assert!(extract_tokens("first.last@host").is_empty());
    }

    #[test]
    fn unknown_type_prefix_is_ignored() {
        assert!(extract_tokens("hello @coach:bob").is_empty());
        assert!(extract_tokens("@a@b").is_empty());
        // An empty typed identifier is not a bare `@team` mention either.
        assert!(extract_tokens("@team: nothing").is_empty());
    }

    #[test]
    fn punctuation_bounds_tokens() {
        assert_eq!(raws("(@alice), @bob. @carol!"), ["@alice", "@bob", "@carol"]);
        assert_eq!(raws("@user_1's take"), ["@user_1"]);
    }

    #[test]
    fn duplicates_are_kept_then_deduped_case_insensitively() {
        let tokens = extract_tokens("@team:tsm vs @team:TSM and @team:tsm again");
        assert_eq!(tokens.len(), 3);

        let unique = unique_tokens(tokens);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].raw, "@team:tsm");
    }

    #[test]
    fn offsets_are_byte_offsets_in_unicode_text() {
        let text = "Ça va @élodie? @bob";
        let tokens = extract_tokens(text);
        // `é` is outside the identifier class, so `@élodie` never matches.
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].raw, "@bob");
        assert_eq!(&text[tokens[0].span()], "@bob");
    }
}
