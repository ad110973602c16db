//! Threaded comments attached to a question.

mod tree;

pub use tree::{build_threads, find_root_ancestor, Comment, CommentNode};
