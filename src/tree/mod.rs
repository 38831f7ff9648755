//! Conversation tree model
//!
//! A tree of [`ChatNode`]s, each holding its own conversation, canvas
//! position and child branches. Children are owned by their parent, so the
//! structure is a strict tree and there are no back-references.
//!
//! Every mutation takes `&self` and returns a new [`ConversationTree`]. They
//! are all expressed through one bottom-up rebuild ([`ChatNode::map`]) and
//! one pre-order visit ([`ChatNode::fold`]), parameterised by a per-node
//! transform, instead of a bespoke recursive walk per operation.

mod selection;

pub use selection::{transcript, truncate_selection};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers and messages
// ─────────────────────────────────────────────────────────────────────────────

/// Node identifier, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a fresh identifier
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A point in canvas space
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ChatNode
// ─────────────────────────────────────────────────────────────────────────────

/// One conversation branch on the canvas
#[derive(Debug, Clone, PartialEq)]
pub struct ChatNode {
    pub id: NodeId,
    /// Excerpt of the parent's reply this branch was started from
    pub quoted_text: Option<String>,
    pub children: Vec<ChatNode>,
    /// Top-left corner in canvas space
    pub position: Position,
    /// Rendered height, reported by the front end after measuring
    pub height: f64,
    /// Set once the user drags the node; auto-layout leaves it alone
    pub manual_position: bool,
    pub conversation: Vec<Message>,
    /// A request is outstanding for this node
    pub thinking: bool,
    /// Last failed request, kept out of the conversation itself
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatNode {
    pub fn new(position: Position) -> Self {
        Self {
            id: NodeId::next(),
            quoted_text: None,
            children: Vec::new(),
            position,
            height: 0.0,
            manual_position: false,
            conversation: Vec::new(),
            thinking: false,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Copy of this node without its children
    fn detached(&self) -> Self {
        Self {
            id: self.id,
            quoted_text: self.quoted_text.clone(),
            children: Vec::new(),
            position: self.position,
            height: self.height,
            manual_position: self.manual_position,
            conversation: self.conversation.clone(),
            thinking: self.thinking,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
        }
    }

    /// Rebuild this subtree bottom-up through `f`
    ///
    /// Children are rebuilt first, then the node itself is handed to `f`
    /// with its new children attached. Returning `None` drops the node and
    /// everything under it.
    pub fn map<F>(&self, f: &mut F) -> Option<ChatNode>
    where
        F: FnMut(ChatNode) -> Option<ChatNode>,
    {
        let children = self
            .children
            .iter()
            .filter_map(|child| child.map(&mut *f))
            .collect();

        f(ChatNode {
            children,
            ..self.detached()
        })
    }

    /// Visit this subtree in pre-order, threading an accumulator
    pub fn fold<B, F>(&self, init: B, f: &mut F) -> B
    where
        F: FnMut(B, &ChatNode) -> B,
    {
        let acc = f(init, self);
        self.children
            .iter()
            .fold(acc, |acc, child| child.fold(acc, &mut *f))
    }

    pub fn find(&self, id: NodeId) -> Option<&ChatNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    fn find_parent(&self, id: NodeId) -> Option<&ChatNode> {
        if self.children.iter().any(|child| child.id == id) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_parent(id))
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a ChatNode>) {
        out.push(self);
        for child in &self.children {
            child.collect(out);
        }
    }

    fn translate_descendants(&mut self, dx: f64, dy: f64) {
        for child in &mut self.children {
            child.position.x += dx;
            child.position.y += dy;
            child.translate_descendants(dx, dy);
        }
    }

    /// The trailing assistant message, if the conversation ends with one
    pub fn last_reply(&self) -> Option<&Message> {
        self.conversation
            .last()
            .filter(|m| m.role == Role::Assistant)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConversationTree
// ─────────────────────────────────────────────────────────────────────────────

/// The whole canvas: exactly one root, never deletable
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTree {
    root: ChatNode,
}

impl Default for ConversationTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationTree {
    /// A tree holding a single empty root at the canvas origin
    pub fn new() -> Self {
        Self {
            root: ChatNode::new(Position::default()),
        }
    }

    pub fn root(&self) -> &ChatNode {
        &self.root
    }

    pub fn root_id(&self) -> NodeId {
        self.root.id
    }

    pub fn find(&self, id: NodeId) -> Option<&ChatNode> {
        self.root.find(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.find(id).is_some()
    }

    /// Transient parent lookup (the tree stores no back-references)
    pub fn parent_of(&self, id: NodeId) -> Option<&ChatNode> {
        self.root.find_parent(id)
    }

    /// All nodes in pre-order
    pub fn flatten(&self) -> Vec<&ChatNode> {
        let mut out = Vec::new();
        self.root.collect(&mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.root.fold(0, &mut |count, _| count + 1)
    }

    /// Pre-order list of identifiers
    pub fn ids(&self) -> Vec<NodeId> {
        self.root.fold(Vec::new(), &mut |mut ids, node| {
            ids.push(node.id);
            ids
        })
    }

    /// Rebuild the tree through `f`; the root can never be dropped
    fn rewrite<F>(&self, f: &mut F) -> Self
    where
        F: FnMut(ChatNode) -> Option<ChatNode>,
    {
        let root = self.root.map(f).unwrap_or_else(|| self.root.clone());
        Self { root }
    }

    /// Apply `f` to the node matching `id`; unchanged tree if none matches
    fn update<F>(&self, id: NodeId, f: F) -> Self
    where
        F: FnOnce(&mut ChatNode),
    {
        let mut f = Some(f);
        self.rewrite(&mut |mut node| {
            if node.id == id {
                if let Some(f) = f.take() {
                    f(&mut node);
                }
            }
            Some(node)
        })
    }

    fn add_child(&self, source_id: NodeId, quoted_text: Option<String>) -> Self {
        self.update(source_id, |parent| {
            let mut child = ChatNode::new(parent.position);
            child.quoted_text = quoted_text;
            parent.children.push(child);
        })
    }

    /// New empty child of `source_id` quoting a truncated `text`
    ///
    /// No-op when `source_id` is not in the tree.
    pub fn create_from_selection(&self, source_id: NodeId, text: &str) -> Self {
        self.add_child(source_id, Some(truncate_selection(text)))
    }

    /// New empty child of `source_id` without a quote
    pub fn branch(&self, source_id: NodeId) -> Self {
        self.add_child(source_id, None)
    }

    /// Remove a node and its entire subtree
    ///
    /// The root is protected: deleting it returns the tree unchanged.
    pub fn delete_node(&self, id: NodeId) -> Self {
        if id == self.root.id {
            return self.clone();
        }
        self.rewrite(&mut |node| (node.id != id).then_some(node))
    }

    /// Move a node, freeze it against auto-layout, and carry its subtree along
    pub fn update_position(&self, id: NodeId, x: f64, y: f64) -> Self {
        self.update(id, |node| {
            let dx = x - node.position.x;
            let dy = y - node.position.y;
            node.position = Position::new(x, y);
            node.manual_position = true;
            node.translate_descendants(dx, dy);
        })
    }

    pub fn append_message(&self, id: NodeId, message: Message) -> Self {
        self.update(id, |node| node.conversation.push(message))
    }

    /// Append a stream chunk to the trailing assistant message
    ///
    /// Ignored when the conversation does not end with an assistant message.
    pub fn append_to_last_message(&self, id: NodeId, chunk: &str) -> Self {
        self.update(id, |node| {
            if let Some(last) = node
                .conversation
                .last_mut()
                .filter(|m| m.role == Role::Assistant)
            {
                last.content.push_str(chunk);
            }
        })
    }

    pub fn set_thinking(&self, id: NodeId, thinking: bool) -> Self {
        self.update(id, |node| node.thinking = thinking)
    }

    pub fn set_height(&self, id: NodeId, height: f64) -> Self {
        self.update(id, |node| node.height = height)
    }

    pub fn set_error(&self, id: NodeId, error: Option<String>) -> Self {
        self.update(id, |node| node.last_error = error)
    }

    /// Move nodes to computed layout targets
    ///
    /// Returns the new tree and how many nodes actually changed position.
    pub fn with_positions(&self, targets: &HashMap<NodeId, Position>) -> (Self, usize) {
        let mut moved = 0;
        let tree = self.rewrite(&mut |mut node| {
            if let Some(target) = targets.get(&node.id) {
                if node.position != *target {
                    node.position = *target;
                    moved += 1;
                }
            }
            Some(node)
        });
        (tree, moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root -> a -> (a1, a2), root -> b
    fn sample_tree() -> (ConversationTree, [NodeId; 4]) {
        let tree = ConversationTree::new();
        let root = tree.root_id();
        let tree = tree.branch(root).branch(root);
        let a = tree.root().children[0].id;
        let b = tree.root().children[1].id;
        let tree = tree.branch(a).branch(a);
        let a1 = tree.find(a).unwrap().children[0].id;
        let a2 = tree.find(a).unwrap().children[1].id;
        (tree, [a, b, a1, a2])
    }

    #[test]
    fn test_new_tree_has_single_root() {
        let tree = ConversationTree::new();
        assert_eq!(tree.len(), 1);
        assert!(tree.root().conversation.is_empty());
        assert!(tree.parent_of(tree.root_id()).is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let (tree, _) = sample_tree();
        let mut ids = tree.ids();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn test_branch_adds_empty_child_without_quote() {
        let tree = ConversationTree::new();
        let next = tree.branch(tree.root_id());

        assert_eq!(next.len(), 2);
        let child = &next.root().children[0];
        assert!(child.quoted_text.is_none());
        assert!(child.conversation.is_empty());
        // Original value is untouched
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_create_from_selection_sets_quote() {
        let tree = ConversationTree::new();
        let next = tree.create_from_selection(tree.root_id(), "Line one.\nLine two.\nLine three.");
        let child = &next.root().children[0];
        assert_eq!(child.quoted_text.as_deref(), Some("Line one. Line two."));
    }

    #[test]
    fn test_create_from_selection_unknown_source_is_noop() {
        let tree = ConversationTree::new();
        let unknown = NodeId::next();
        assert_eq!(tree.create_from_selection(unknown, "text"), tree);
        assert_eq!(tree.branch(unknown), tree);
    }

    #[test]
    fn test_delete_removes_entire_subtree() {
        let (tree, [a, b, a1, a2]) = sample_tree();
        assert_eq!(tree.len(), 5);

        let next = tree.delete_node(a);
        assert_eq!(tree.flatten().len() - next.flatten().len(), 3);
        assert!(!next.contains(a));
        assert!(!next.contains(a1));
        assert!(!next.contains(a2));
        assert!(next.contains(b));
    }

    #[test]
    fn test_delete_root_is_refused() {
        let (tree, _) = sample_tree();
        assert_eq!(tree.delete_node(tree.root_id()), tree);
    }

    #[test]
    fn test_update_position_is_idempotent() {
        let (tree, [a, ..]) = sample_tree();
        let once = tree.update_position(a, 300.0, 120.0);
        let twice = once.update_position(a, 300.0, 120.0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_update_position_marks_manual_and_moves_descendants() {
        let (tree, [a, b, a1, _]) = sample_tree();
        let before_child = tree.find(a1).unwrap().position;
        let before = tree.find(a).unwrap().position;

        let next = tree.update_position(a, before.x + 50.0, before.y - 20.0);

        let moved = next.find(a).unwrap();
        assert!(moved.manual_position);
        assert_eq!(moved.position, Position::new(before.x + 50.0, before.y - 20.0));

        let child = next.find(a1).unwrap();
        assert_eq!(
            child.position,
            Position::new(before_child.x + 50.0, before_child.y - 20.0)
        );
        assert!(!child.manual_position);
        // Sibling subtree not affected
        assert!(!next.find(b).unwrap().manual_position);
    }

    #[test]
    fn test_append_message_reaches_deep_nodes() {
        let (tree, [_, _, a1, _]) = sample_tree();
        let next = tree.append_message(a1, Message::user("deep question"));
        assert_eq!(next.find(a1).unwrap().conversation, vec![Message::user("deep question")]);
        assert!(next.root().conversation.is_empty());
    }

    #[test]
    fn test_append_to_last_message_requires_assistant_tail() {
        let tree = ConversationTree::new();
        let root = tree.root_id();

        let tree = tree.append_message(root, Message::user("q"));
        let unchanged = tree.append_to_last_message(root, "ignored");
        assert_eq!(unchanged, tree);

        let tree = tree.append_message(root, Message::assistant(""));
        let tree = tree
            .append_to_last_message(root, "Hel")
            .append_to_last_message(root, "lo")
            .append_to_last_message(root, " world");
        assert_eq!(tree.root().last_reply().unwrap().content, "Hello world");
    }

    #[test]
    fn test_parent_of() {
        let (tree, [a, b, a1, _]) = sample_tree();
        assert_eq!(tree.parent_of(a1).unwrap().id, a);
        assert_eq!(tree.parent_of(b).unwrap().id, tree.root_id());
        assert!(tree.parent_of(NodeId::next()).is_none());
    }

    #[test]
    fn test_flatten_is_pre_order() {
        let (tree, [a, b, a1, a2]) = sample_tree();
        assert_eq!(tree.ids(), vec![tree.root_id(), a, a1, a2, b]);
    }

    #[test]
    fn test_with_positions_counts_only_changes() {
        let (tree, [a, b, ..]) = sample_tree();
        let mut targets = HashMap::new();
        targets.insert(a, tree.find(a).unwrap().position);
        targets.insert(b, Position::new(10.0, 10.0));

        let (next, moved) = tree.with_positions(&targets);
        assert_eq!(moved, 1);
        assert_eq!(next.find(b).unwrap().position, Position::new(10.0, 10.0));
    }

    #[test]
    fn test_flags_and_height() {
        let tree = ConversationTree::new();
        let root = tree.root_id();
        let next = tree
            .set_thinking(root, true)
            .set_height(root, 128.0)
            .set_error(root, Some("boom".to_string()));
        let node = next.root();
        assert!(node.thinking);
        assert_eq!(node.height, 128.0);
        assert_eq!(node.last_error.as_deref(), Some("boom"));
    }
}
