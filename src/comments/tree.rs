use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One comment as the comment store returns it: a flat row pointing at its
/// parent, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub parent_comment_id: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Replies at every depth below this node.
    pub fn descendant_count(&self) -> usize {
        self.replies
            .iter()
            .map(|reply| 1 + reply.descendant_count())
            .sum()
    }
}

/// Rebuilds reply threads from a flat list.
///
/// Roots and replies are ordered oldest first (ties by id). Comments whose
/// parent is missing become roots, and so does one member of every parent
/// cycle. Duplicate ids keep the first occurrence.
pub fn build_threads(comments: impl IntoIterator<Item = Comment>) -> Vec<CommentNode> {
    let mut by_id: HashMap<String, Comment> = HashMap::new();
    for comment in comments {
        by_id.entry(comment.id.clone()).or_insert(comment);
    }

    let mut roots: Vec<String> = Vec::new();
    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    for comment in by_id.values() {
        match comment.parent_comment_id.as_deref() {
            Some(parent) if parent != comment.id && by_id.contains_key(parent) => children
                .entry(parent.to_string())
                .or_default()
                .push(comment.id.clone()),
            _ => roots.push(comment.id.clone()),
        }
    }

    let mut reachable = HashSet::new();
    mark_reachable(&roots, &children, &mut reachable);

    // Whatever is still unreachable hangs off a cycle; break each one.
    loop {
        let Some(start) = by_id
            .values()
            .filter(|comment| !reachable.contains(&comment.id))
            .min_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
        else {
            break;
        };

        let member = cycle_member(&by_id, &start.id);
        if let Some(parent) = by_id[&member].parent_comment_id.as_deref() {
            if let Some(siblings) = children.get_mut(parent) {
                siblings.retain(|id| *id != member);
            }
        }
        roots.push(member.clone());
        mark_reachable(&[member], &children, &mut reachable);
    }

    let order = |a: &String, b: &String| {
        let (a, b) = (&by_id[a], &by_id[b]);
        (a.created_at, &a.id).cmp(&(b.created_at, &b.id))
    };
    roots.sort_by(order);
    for siblings in children.values_mut() {
        siblings.sort_by(order);
    }

    roots
        .iter()
        .filter_map(|id| assemble(id, &mut by_id, &children))
        .collect()
}

/// Finds the thread root that `comment_id` belongs to, searching the loaded
/// threads breadth-first.
pub fn find_root_ancestor<'a>(roots: &'a [CommentNode], comment_id: &str) -> Option<&'a CommentNode> {
    let mut queue: VecDeque<(&CommentNode, &CommentNode)> =
        roots.iter().map(|root| (root, root)).collect();

    while let Some((root, node)) = queue.pop_front() {
        if node.comment.id == comment_id {
            return Some(root);
        }
        queue.extend(node.replies.iter().map(|reply| (root, reply)));
    }
    None
}

fn mark_reachable(
    from: &[String],
    children: &HashMap<String, Vec<String>>,
    reachable: &mut HashSet<String>,
) {
    let mut stack: Vec<&String> = from.iter().collect();
    while let Some(id) = stack.pop() {
        if reachable.insert(id.clone()) {
            if let Some(kids) = children.get(id) {
                stack.extend(kids);
            }
        }
    }
}

/// Walks parents from `start` until an id repeats; that id sits on the cycle.
fn cycle_member(by_id: &HashMap<String, Comment>, start: &str) -> String {
    let mut seen = HashSet::new();
    let mut current = start;
    while seen.insert(current) {
        match by_id
            .get(current)
            .and_then(|comment| comment.parent_comment_id.as_deref())
        {
            Some(parent) if by_id.contains_key(parent) => current = parent,
            _ => break,
        }
    }
    current.to_string()
}

fn assemble(
    id: &str,
    by_id: &mut HashMap<String, Comment>,
    children: &HashMap<String, Vec<String>>,
) -> Option<CommentNode> {
    let comment = by_id.remove(id)?;
    let replies = children
        .get(id)
        .map(|kids| {
            kids.iter()
                .filter_map(|kid| assemble(kid, by_id, children))
                .collect()
        })
        .unwrap_or_default();
    Some(CommentNode { comment, replies })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn comment(id: &str, parent: Option<&str>, minute: u32) -> Comment {
        Comment {
            id: id.into(),
            parent_comment_id: parent.map(str::to_string),
            author: "u1".into(),
            body: format!("comment {id}"),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<&str> {
        nodes.iter().map(|node| node.comment.id.as_str()).collect()
    }

    #[test]
    fn nests_replies_in_creation_order() {
        let threads = build_threads(vec![
            comment("c", Some("a"), 5),
            comment("b", Some("a"), 2),
            comment("a", None, 1),
            comment("d", Some("b"), 3),
            comment("z", None, 0),
        ]);

        assert_eq!(ids(&threads), vec!["z", "a"]);
        let a = &threads[1];
        assert_eq!(ids(&a.replies), vec!["b", "c"]);
        assert_eq!(ids(&a.replies[0].replies), vec!["d"]);
        assert_eq!(a.descendant_count(), 3);
    }

    #[test]
    fn orphans_become_roots() {
        let threads = build_threads(vec![
            comment("a", None, 1),
            comment("lost", Some("deleted"), 2),
        ]);
        assert_eq!(ids(&threads), vec!["a", "lost"]);
    }

    #[test]
    fn cycles_are_broken_without_losing_comments() {
        let threads = build_threads(vec![
            comment("x", Some("y"), 1),
            comment("y", Some("x"), 2),
            comment("reply", Some("y"), 3),
            comment("self", Some("self"), 4),
        ]);

        let total: usize = threads.iter().map(|root| 1 + root.descendant_count()).sum();
        assert_eq!(total, 4);
        assert!(ids(&threads).contains(&"self"));
        assert_eq!(threads.len(), 2);
    }

    #[test]
    fn root_ancestor_is_found_breadth_first() {
        let threads = build_threads(vec![
            comment("a", None, 1),
            comment("b", Some("a"), 2),
            comment("c", Some("b"), 3),
            comment("solo", None, 4),
        ]);

        assert_eq!(
            find_root_ancestor(&threads, "c").map(|root| root.comment.id.as_str()),
            Some("a")
        );
        assert_eq!(
            find_root_ancestor(&threads, "solo").map(|root| root.comment.id.as_str()),
            Some("solo")
        );
        assert!(find_root_ancestor(&threads, "missing").is_none());
    }

    #[test]
    fn parses_store_rows() {
        let raw = r#"[
            {"id":"a","createdAt":"2024-03-01T12:00:00Z","body":"hi"},
            {"id":"b","parentCommentId":"a","createdAt":"2024-03-01T12:01:00Z"}
        ]"#;
        let rows: Vec<Comment> = serde_json::from_str(raw).unwrap();
        let threads = build_threads(rows);
        assert_eq!(ids(&threads[0].replies), vec!["b"]);
    }
}
