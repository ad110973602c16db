use std::collections::HashSet;

use crate::images::{ImageRecord, ImageRegistry};

use super::tokenizer::{tokenize, Token, TOKEN_PREFIX};

/// Renders the current-format token for `id`.
pub fn placeholder(id: &str) -> String {
    format!("{TOKEN_PREFIX}{id}]")
}

/// Every id referenced by a current-format token, left to right, duplicates included.
pub fn extract_ids(body: &str) -> Vec<String> {
    tokenize(body)
        .filter_map(|token| match token {
            Token::Placeholder { id, .. } => Some(id.to_string()),
            _ => None,
        })
        .collect()
}

/// Ids in order of first appearance. This is the ordering positional URL
/// pairing works against.
pub fn distinct_ids(body: &str) -> Vec<&str> {
    let mut seen = HashSet::new();
    tokenize(body)
        .filter_map(|token| match token {
            Token::Placeholder { id, .. } if seen.insert(id) => Some(id),
            _ => None,
        })
        .collect()
}

pub fn has_legacy_tokens(body: &str) -> bool {
    tokenize(body).any(|token| matches!(token, Token::Legacy { .. }))
}

/// Rewrites every `[IMAGE:<url>|<description>]` into `[IMAGE:<id>]`.
///
/// A legacy token reuses the record that already carries its url; otherwise a
/// record is appended. Bodies without legacy tokens come back unchanged, which
/// makes the migration idempotent.
pub fn migrate_legacy(body: &str, registry: &ImageRegistry) -> (String, ImageRegistry) {
    let mut registry = registry.clone();
    if !has_legacy_tokens(body) {
        return (body.to_string(), registry);
    }

    let mut migrated = String::with_capacity(body.len());
    for token in tokenize(body) {
        match token {
            Token::Legacy {
                url, description, ..
            } => {
                let id = match registry.find_by_url(url) {
                    Some(record) => record.id.clone(),
                    None => registry.insert(url, description),
                };
                migrated.push_str(&placeholder(&id));
            }
            other => migrated.push_str(&body[other.span()]),
        }
    }

    (migrated, registry)
}

/// Drops placeholders that have no matching entry in `valid_urls`.
///
/// Pairing is positional: the n-th distinct id in the body pairs with the n-th
/// url. Tokens whose id ranks at or beyond `valid_urls.len()` are removed, so an
/// empty list removes every placeholder. Trailing whitespace is trimmed only
/// when something was removed.
pub fn strip_orphans<S: AsRef<str>>(body: &str, valid_urls: &[S]) -> String {
    let keep: HashSet<&str> = distinct_ids(body)
        .into_iter()
        .take(valid_urls.len())
        .collect();

    let (mut stripped, removed) = retain_placeholders(body, |id| keep.contains(id));
    if removed {
        stripped.truncate(stripped.trim_end().len());
    }
    stripped
}

/// Id-based counterpart of [`strip_orphans`]: removes tokens whose id has no
/// resolved record in `registry`.
pub fn strip_unresolved(body: &str, registry: &ImageRegistry) -> String {
    let (mut stripped, removed) =
        retain_placeholders(body, |id| registry.get(id).is_some_and(ImageRecord::is_resolved));
    if removed {
        stripped.truncate(stripped.trim_end().len());
    }
    stripped
}

/// Splices a token for `id` at a character offset.
///
/// The offset is validated by clamping into `[0, chars(body)]`: anything past
/// the end inserts at the end, so a stale cursor never loses the token.
pub fn insert_at(body: &str, cursor: usize, id: &str) -> String {
    splice(body, cursor, &placeholder(id))
}

/// Inserts arbitrary `text` at a character offset clamped to `[0, chars(body)]`.
pub fn splice(body: &str, cursor: usize, text: &str) -> String {
    let byte_offset = body
        .char_indices()
        .nth(cursor)
        .map(|(index, _)| index)
        .unwrap_or(body.len());

    let mut spliced = String::with_capacity(body.len() + text.len());
    spliced.push_str(&body[..byte_offset]);
    spliced.push_str(text);
    spliced.push_str(&body[byte_offset..]);
    spliced
}

/// Removes every current-format token referencing `id`; other text is untouched.
pub fn remove_references(body: &str, id: &str) -> String {
    retain_placeholders(body, |candidate| candidate != id).0
}

fn retain_placeholders<F>(body: &str, mut keep: F) -> (String, bool)
where
    F: FnMut(&str) -> bool,
{
    let mut out = String::with_capacity(body.len());
    let mut removed = false;
    for token in tokenize(body) {
        match token {
            Token::Placeholder { id, .. } if !keep(id) => removed = true,
            other => out.push_str(&body[other.span()]),
        }
    }
    (out, removed)
}

/// Display-ready view of a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Image(&'a ImageRecord),
    /// Token whose record is missing or has no url yet. `description` is present
    /// when the record exists, so a UI can prompt for the url of a known image.
    Unresolved {
        id: &'a str,
        description: Option<&'a str>,
    },
}

/// Resolves each placeholder against `registry`. Legacy tokens are left as
/// text; bodies are expected to be migrated before display.
pub fn segments<'a>(body: &'a str, registry: &'a ImageRegistry) -> Vec<Segment<'a>> {
    tokenize(body)
        .map(|token| match token {
            Token::Placeholder { id, .. } => match registry.get(id) {
                Some(record) if record.is_resolved() => Segment::Image(record),
                Some(record) => Segment::Unresolved {
                    id,
                    description: Some(record.description.as_str()),
                },
                None => Segment::Unresolved {
                    id,
                    description: None,
                },
            },
            Token::Text { text, .. } => Segment::Text(text),
            Token::Legacy { span, .. } => Segment::Text(&body[span]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_ids_keeps_order_and_duplicates() {
        let body = "[IMAGE:b] text [IMAGE:a] [IMAGE:b] [IMAGE:bad";
        assert_eq!(extract_ids(body), vec!["b", "a", "b"]);
        assert_eq!(distinct_ids(body), vec!["b", "a"]);
    }

    #[test]
    fn extract_then_insert_round_trips_ids() {
        let body = "intro [IMAGE:one] mid [IMAGE:two]\n[IMAGE:three]";
        let ids = extract_ids(body);

        let mut rebuilt = String::new();
        for id in &ids {
            let end = rebuilt.chars().count();
            rebuilt = insert_at(&rebuilt, end, id);
        }

        assert_eq!(extract_ids(&rebuilt), ids);
    }

    #[test]
    fn insert_at_uses_character_offsets() {
        assert_eq!(insert_at("héllo", 2, "x"), "hé[IMAGE:x]llo");
        assert_eq!(insert_at("abc", 0, "x"), "[IMAGE:x]abc");
        assert_eq!(insert_at("abc", 3, "x"), "abc[IMAGE:x]");
    }

    #[test]
    fn insert_at_clamps_out_of_range_offsets() {
        assert_eq!(insert_at("abc", 99, "x"), "abc[IMAGE:x]");
        assert_eq!(insert_at("héé", 4, "x"), "héé[IMAGE:x]");
        assert_eq!(insert_at("", 1, "x"), "[IMAGE:x]");
    }

    #[test]
    fn remove_references_is_global_and_targeted() {
        let body = "a [IMAGE:x] b [IMAGE:y] c [IMAGE:x]";
        assert_eq!(remove_references(body, "x"), "a  b [IMAGE:y] c ");
        assert_eq!(remove_references(body, "missing"), body);
    }

    #[test]
    fn strip_orphans_with_no_urls_removes_all_placeholders() {
        let body = "notes [IMAGE:a]\n[IMAGE:b] end [IMAGE:c]  ";
        let stripped = strip_orphans::<String>(body, &[]);
        assert_eq!(stripped, "notes \n end");
        assert!(extract_ids(&stripped).is_empty());
    }

    #[test]
    fn strip_orphans_truncates_positionally() {
        let stripped = strip_orphans("[IMAGE:a][IMAGE:b]", &["u1".to_string()]);
        assert_eq!(stripped, "[IMAGE:a]");
    }

    #[test]
    fn strip_orphans_counts_repeated_ids_once() {
        let body = "[IMAGE:a] [IMAGE:a] [IMAGE:b] [IMAGE:c]";
        let stripped = strip_orphans(body, &["u1", "u2"]);
        assert_eq!(stripped, "[IMAGE:a] [IMAGE:a] [IMAGE:b]");
    }

    #[test]
    fn strip_orphans_leaves_plain_text_untouched() {
        let body = "just text with trailing newline\n";
        assert_eq!(strip_orphans::<&str>(body, &[]), body);
    }

    #[test]
    fn migrate_legacy_creates_and_reuses_records() {
        let mut registry = ImageRegistry::default();
        let existing = registry.insert("http://x/1.png", "first");

        let body = "a [IMAGE:http://x/1.png|ignored] b [IMAGE:http://x/2.png|Second]";
        let (migrated, updated) = migrate_legacy(body, &registry);

        assert_eq!(updated.len(), 2);
        let second = updated.find_by_url("http://x/2.png").expect("new record");
        assert_eq!(second.description, "Second");
        assert_eq!(
            migrated,
            format!("a [IMAGE:{existing}] b [IMAGE:{}]", second.id)
        );
    }

    #[test]
    fn migrate_legacy_reuses_record_for_repeated_url() {
        let body = "[IMAGE:http://x/1.png|one] [IMAGE:http://x/1.png|again]";
        let (migrated, registry) = migrate_legacy(body, &ImageRegistry::default());
        assert_eq!(registry.len(), 1);
        let ids = extract_ids(&migrated);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ids[1]);
    }

    #[test]
    fn migrate_legacy_is_idempotent() {
        let body = "x [IMAGE:http://x/1.png|cap] y [IMAGE:keep]";
        let once = migrate_legacy(body, &ImageRegistry::default());
        let twice = migrate_legacy(&once.0, &once.1);
        assert_eq!(once, twice);
    }

    #[test]
    fn segments_mark_unresolved_references() {
        let mut registry = ImageRegistry::default();
        let resolved = registry.insert("http://x/1.png", "diagram");
        let pending = registry.insert("", "awaiting url");

        let body = format!("[IMAGE:{resolved}] and [IMAGE:{pending}] [IMAGE:ghost]");
        let segments = segments(&body, &registry);

        assert!(matches!(segments[0], Segment::Image(record) if record.url == "http://x/1.png"));
        assert_eq!(segments[1], Segment::Text(" and "));
        assert_eq!(
            segments[2],
            Segment::Unresolved {
                id: pending.as_str(),
                description: Some("awaiting url"),
            }
        );
        assert_eq!(
            segments[4],
            Segment::Unresolved {
                id: "ghost",
                description: None,
            }
        );
    }

    #[test]
    fn strip_unresolved_drops_tokens_without_urls() {
        let mut registry = ImageRegistry::default();
        let ok = registry.insert("http://x/1.png", "");
        let empty = registry.insert("", "");
        let body = format!("[IMAGE:{empty}] [IMAGE:{ok}] [IMAGE:ghost]");
        assert_eq!(strip_unresolved(&body, &registry), format!(" [IMAGE:{ok}]"));
    }
}
