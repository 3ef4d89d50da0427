use std::collections::HashMap;

use super::{EntityKind, EntityRef, extractor::extract_tokens};

/// Resolved target for tokens of one `(kind, identifier)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionLink {
    /// Token text the link was stored for, e.g. `@team:tsm`.
    pub mention_text: String,
    /// Entity the token resolves to.
    pub target: EntityRef,
    /// Name shown as the anchor title.
    pub display_name: String,
}

impl MentionLink {
    fn key(&self) -> Option<(EntityKind, String)> {
        extract_tokens(&self.mention_text)
            .into_iter()
            .next()
            .map(|token| token.key())
    }
}

/// Rewrite every linked token in `text` into an anchor, escaping everything else.
///
/// Tokens are found with the same scan as extraction and matched against `links`
/// by kind and case-insensitive identifier, so edits made after the links were stored
/// never shift a replacement. Tokens without a link stay plain text. When two links
/// share a key the earlier one wins, so callers list stored links before aliases.
pub fn render_mentions(text: &str, links: &[MentionLink], base_url: &str) -> String {
    let mut lookup: HashMap<(EntityKind, String), &MentionLink> = HashMap::new();
    for link in links {
        if let Some(key) = link.key() {
            lookup.entry(key).or_insert(link);
        }
    }

    let mut output = String::with_capacity(text.len() + links.len() * 96);
    let mut cursor = 0;

    for token in extract_tokens(text) {
        let Some(link) = lookup.get(&token.key()) else {
            continue;
        };

        let span = token.span();
        push_escaped(&mut output, &text[cursor..span.start]);
        push_anchor(&mut output, &token.raw, link, base_url);
        cursor = span.end;
    }

    push_escaped(&mut output, &text[cursor..]);
    output
}

fn push_anchor(output: &mut String, raw: &str, link: &MentionLink, base_url: &str) {
    let kind = link.target.kind.as_str();
    output.push_str("<a href=\"");
    push_escaped(output, base_url.trim_end_matches('/'));
    push_escaped(output, &link.target.profile_path());
    output.push_str("\" class=\"mention mention-");
    output.push_str(kind);
    output.push_str("\" data-mention-id=\"");
    output.push_str(&link.target.id.to_string());
    output.push_str("\" data-mention-type=\"");
    output.push_str(kind);
    output.push_str("\" title=\"");
    push_escaped(output, &link.display_name);
    output.push_str("\">");
    push_escaped(output, raw);
    output.push_str("</a>");
}

fn push_escaped(output: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#39;"),
            other => output.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(text: &str, kind: EntityKind, id: i64, name: &str) -> MentionLink {
        MentionLink {
            mention_text: text.into(),
            target: EntityRef::new(kind, id),
            display_name: name.into(),
        }
    }

    #[test]
    fn replaces_resolved_tokens_and_keeps_surrounding_text() {
        let links = vec![
            link("@team:tsm", EntityKind::Team, 3, "TSM"),
            link("@player:shroud", EntityKind::Player, 9, "Michael Grzesiek"),
        ];
        let html = render_mentions("Great game @team:tsm and @player:shroud!", &links, "");

        assert_eq!(
            html,
            "Great game <a href=\"/teams/3\" class=\"mention mention-team\" \
             data-mention-id=\"3\" data-mention-type=\"team\" title=\"TSM\">@team:tsm</a> and \
             <a href=\"/players/9\" class=\"mention mention-player\" data-mention-id=\"9\" \
             data-mention-type=\"player\" title=\"Michael Grzesiek\">@player:shroud</a>!"
        );
        assert_eq!(html.matches("class=\"mention ").count(), 2);
    }

    #[test]
    fn unresolved_tokens_stay_plain() {
        let links = vec![link("@alice", EntityKind::User, 1, "alice")];
        let html = render_mentions("@alice meets @bob and @team:ghost", &links, "");

        assert!(html.starts_with("<a href=\"/users/1\""));
        assert!(html.ends_with("</a> meets @bob and @team:ghost"));
    }

    #[test]
    fn matching_ignores_identifier_case_and_repeats_links() {
        let links = vec![link("@team:tsm", EntityKind::Team, 3, "TSM")];
        let html = render_mentions("@team:TSM then @team:tsm", &links, "https://hub.gg/");

        assert_eq!(html.matches("href=\"https://hub.gg/teams/3\"").count(), 2);
        assert!(html.contains(">@team:TSM</a>"));
    }

    #[test]
    fn earlier_links_win_on_shared_keys() {
        let links = vec![
            link("@player:shroud", EntityKind::Player, 1, "Grzesiek"),
            link("@player:SHROUD", EntityKind::Player, 2, "Impostor"),
        ];
        let html = render_mentions("gg @player:Shroud", &links, "");

        assert!(html.contains("href=\"/players/1\""));
        assert!(html.contains("title=\"Grzesiek\""));
        assert!(!html.contains("Impostor"));
    }

    #[test]
    fn surrounding_markup_is_escaped() {
        let links = vec![link("@alice", EntityKind::User, 1, "<b>alice</b>")];
        let html = render_mentions("<script>x</script> & @alice", &links, "");

        assert!(html.starts_with("&lt;script&gt;x&lt;/script&gt; &amp; <a "));
        assert!(html.contains("title=\"&lt;b&gt;alice&lt;/b&gt;\""));
    }

    #[test]
    fn text_without_links_is_only_escaped() {
        assert_eq!(render_mentions("plain \"text\"", &[], ""), "plain &quot;text&quot;");
    }
}
