//! Canvas controller
//!
//! Owns all front-end state: the conversation tree, layout mode, viewport
//! and the pointer interaction in progress. Every user action and every
//! stream event goes through exactly one method here, and each one commits
//! a new tree value followed by a layout pass.
//!
//! Pointer coordinates are in screen units; the controller converts them to
//! canvas space through the [`Viewport`].

pub mod edges;
pub mod viewport;

use std::fmt;

use crate::client::{StreamEvent, StreamEventKind};
use crate::config::CanvasConfig;
use crate::layout::{self, LayoutMode, LayoutParams};
use crate::protocol::ChatRequest;
use crate::tree::{transcript, ChatNode, ConversationTree, Message, NodeId, Position};
use edges::CubicCurve;
pub use viewport::Viewport;

/// Pointer gesture in progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interaction {
    Idle,
    /// Dragging empty canvas; `last` is the previous pointer position
    Panning { last: Position },
    /// Dragging a node; `grab` is the pointer offset from the node's corner
    Dragging { node: NodeId, grab: Position },
}

/// Why a message could not be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    EmptyPrompt,
    UnknownNode(NodeId),
    /// The node is still waiting on a previous reply
    Busy(NodeId),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::EmptyPrompt => write!(f, "Nothing to send"),
            SendError::UnknownNode(id) => write!(f, "Node {} no longer exists", id),
            SendError::Busy(id) => write!(f, "Node {} is still waiting for a reply", id),
        }
    }
}

impl std::error::Error for SendError {}

/// Connector between a parent and one of its children
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Connector {
    pub parent: NodeId,
    pub child: NodeId,
    pub curve: CubicCurve,
}

pub struct CanvasController {
    tree: ConversationTree,
    mode: LayoutMode,
    params: LayoutParams,
    viewport: Viewport,
    zoom_step: f64,
    interaction: Interaction,
    focused: NodeId,
}

impl CanvasController {
    pub fn new(config: &CanvasConfig) -> Self {
        let tree = ConversationTree::new();
        let focused = tree.root_id();
        Self {
            tree,
            mode: config.layout,
            params: LayoutParams {
                node_width: config.node_width,
                gap_x: config.gap_x,
                gap_y: config.gap_y,
            },
            viewport: Viewport::new(config.min_zoom, config.max_zoom),
            zoom_step: config.zoom_step,
            interaction: Interaction::Idle,
            focused,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read access
    // ─────────────────────────────────────────────────────────────────────

    pub fn tree(&self) -> &ConversationTree {
        &self.tree
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    pub fn focused(&self) -> NodeId {
        self.focused
    }

    pub fn focused_node(&self) -> Option<&ChatNode> {
        self.tree.find(self.focused)
    }

    /// Connectors for every parent/child pair
    pub fn connectors(&self) -> Vec<Connector> {
        self.tree
            .flatten()
            .into_iter()
            .flat_map(|parent| {
                parent.children.iter().map(move |child| Connector {
                    parent: parent.id,
                    child: child.id,
                    curve: edges::connector(parent, child, self.mode, self.params.node_width),
                })
            })
            .collect()
    }

    /// Topmost node under a canvas-space point
    ///
    /// Later nodes in pre-order are drawn on top, so they win ties.
    pub fn node_at(&self, world: Position) -> Option<NodeId> {
        self.tree
            .flatten()
            .into_iter()
            .rev()
            .find(|node| {
                let p = node.position;
                world.x >= p.x
                    && world.x <= p.x + self.params.node_width
                    && world.y >= p.y
                    && world.y <= p.y + node.height
            })
            .map(|node| node.id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tree actions
    // ─────────────────────────────────────────────────────────────────────

    /// Replace the committed tree and re-run layout
    fn commit(&mut self, tree: ConversationTree) {
        self.tree = tree;
        self.relayout();
    }

    /// Run layout; returns how many nodes moved
    fn relayout(&mut self) -> usize {
        let outcome = layout::apply(&self.tree, self.mode, &self.params);
        if outcome.moved > 0 {
            self.tree = outcome.tree;
        }
        outcome.moved
    }

    pub fn toggle_layout(&mut self) {
        self.mode = self.mode.toggled();
        let moved = self.relayout();
        tracing::info!(mode = self.mode.as_str(), moved, "Layout mode changed");
    }

    fn newest_child(&self, parent: NodeId) -> Option<NodeId> {
        self.tree
            .find(parent)
            .and_then(|node| node.children.last())
            .map(|child| child.id)
    }

    /// New empty child of `source`; focus moves to it
    pub fn branch(&mut self, source: NodeId) -> Option<NodeId> {
        if !self.tree.contains(source) {
            return None;
        }
        self.commit(self.tree.branch(source));
        let child = self.newest_child(source)?;
        self.focused = child;
        tracing::debug!(parent = %source, child = %child, "Branched");
        Some(child)
    }

    /// New child of `source` quoting part of its text; focus moves to it
    pub fn create_from_selection(&mut self, source: NodeId, text: &str) -> Option<NodeId> {
        if !self.tree.contains(source) {
            return None;
        }
        self.commit(self.tree.create_from_selection(source, text));
        let child = self.newest_child(source)?;
        self.focused = child;
        tracing::debug!(parent = %source, child = %child, "Branched from selection");
        Some(child)
    }

    /// Delete a node and its subtree; the root is refused
    pub fn delete(&mut self, id: NodeId) -> bool {
        if id == self.tree.root_id() || !self.tree.contains(id) {
            return false;
        }
        let parent = self.tree.parent_of(id).map(|p| p.id);
        let focus_lost = self
            .tree
            .find(id)
            .is_some_and(|node| node.find(self.focused).is_some());

        self.commit(self.tree.delete_node(id));

        if focus_lost {
            self.focused = parent.unwrap_or_else(|| self.tree.root_id());
        }
        if let Interaction::Dragging { node, .. } = self.interaction {
            if !self.tree.contains(node) {
                self.interaction = Interaction::Idle;
            }
        }
        tracing::debug!(node = %id, "Deleted subtree");
        true
    }

    /// Record a node's rendered height; re-lays out only on change
    pub fn report_height(&mut self, id: NodeId, height: f64) -> bool {
        match self.tree.find(id) {
            Some(node) if node.height != height => {
                self.commit(self.tree.set_height(id, height));
                true
            }
            _ => false,
        }
    }

    pub fn move_node(&mut self, id: NodeId, x: f64, y: f64) {
        self.commit(self.tree.update_position(id, x, y));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Focus
    // ─────────────────────────────────────────────────────────────────────

    pub fn focus(&mut self, id: NodeId) {
        if self.tree.contains(id) {
            self.focused = id;
        }
    }

    /// Cycle focus through nodes in pre-order
    pub fn focus_next(&mut self) {
        self.step_focus(1);
    }

    pub fn focus_prev(&mut self) {
        self.step_focus(-1);
    }

    fn step_focus(&mut self, step: isize) {
        let ids = self.tree.ids();
        let len = ids.len() as isize;
        let current = ids.iter().position(|id| *id == self.focused).unwrap_or(0) as isize;
        let next = (current + step).rem_euclid(len);
        self.focused = ids[next as usize];
    }

    // ─────────────────────────────────────────────────────────────────────
    // Messaging
    // ─────────────────────────────────────────────────────────────────────

    /// Start a request from `node`: append the user message, mark the node
    /// thinking, and build the request body
    ///
    /// The request carries the node's conversation as it was *before* this
    /// prompt, plus its quote and the parent's flattened transcript.
    pub fn begin_send(&mut self, node: NodeId, text: &str) -> Result<ChatRequest, SendError> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(SendError::EmptyPrompt);
        }
        let current = self.tree.find(node).ok_or(SendError::UnknownNode(node))?;
        if current.thinking {
            return Err(SendError::Busy(node));
        }

        let request = ChatRequest {
            prompt: prompt.to_string(),
            quoted_text: current.quoted_text.clone(),
            parent_conversation: self
                .tree
                .parent_of(node)
                .map(|parent| transcript(&parent.conversation))
                .filter(|t| !t.is_empty()),
            conversation: current.conversation.clone(),
        };

        let next = self
            .tree
            .append_message(node, Message::user(prompt))
            .set_thinking(node, true)
            .set_error(node, None);
        self.commit(next);

        tracing::info!(node = %node, chars = prompt.len(), "Sending message");
        Ok(request)
    }

    /// Apply one event from the streaming client
    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        let StreamEvent { node, kind } = event;
        if !self.tree.contains(node) {
            // Node deleted while its reply was streaming
            tracing::debug!(node = %node, "Dropping stream event for deleted node");
            return;
        }

        let next = match kind {
            StreamEventKind::Opened => self.tree.append_message(node, Message::assistant("")),
            StreamEventKind::Chunk(text) => self.tree.append_to_last_message(node, &text),
            StreamEventKind::Finished => self.tree.set_thinking(node, false),
            StreamEventKind::Failed(error) => {
                tracing::warn!(node = %node, "Reply failed: {}", error);
                self.tree
                    .set_thinking(node, false)
                    .set_error(node, Some(error))
            }
        };
        self.commit(next);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pointer and viewport
    // ─────────────────────────────────────────────────────────────────────

    /// Press: grab the node under the pointer, or start panning
    pub fn pointer_down(&mut self, screen: Position) {
        let world = self.viewport.screen_to_world(screen);
        self.interaction = match self.node_at(world) {
            Some(id) => {
                self.focused = id;
                let origin = self
                    .tree
                    .find(id)
                    .map(|n| n.position)
                    .unwrap_or_default();
                Interaction::Dragging {
                    node: id,
                    grab: Position::new(world.x - origin.x, world.y - origin.y),
                }
            }
            None => Interaction::Panning { last: screen },
        };
    }

    pub fn pointer_move(&mut self, screen: Position) {
        match self.interaction {
            Interaction::Idle => {}
            Interaction::Panning { last } => {
                self.viewport.pan_by(screen.x - last.x, screen.y - last.y);
                self.interaction = Interaction::Panning { last: screen };
            }
            Interaction::Dragging { node, grab } => {
                let world = self.viewport.screen_to_world(screen);
                self.move_node(node, world.x - grab.x, world.y - grab.y);
            }
        }
    }

    pub fn pointer_up(&mut self) {
        if let Interaction::Dragging { node, .. } = self.interaction {
            tracing::debug!(node = %node, "Node dropped");
        }
        self.interaction = Interaction::Idle;
    }

    /// Wheel: positive `notches` zoom in around the pointer
    pub fn wheel(&mut self, screen: Position, notches: f64) {
        let factor = self.zoom_step.powf(notches);
        self.viewport.zoom_at(screen, factor);
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.viewport.pan_by(dx, dy);
    }

    pub fn zoom_at(&mut self, screen: Position, factor: f64) {
        self.viewport.zoom_at(screen, factor);
    }

    pub fn zoom_step(&self) -> f64 {
        self.zoom_step
    }

    pub fn reset_view(&mut self) {
        self.viewport.reset();
    }

    /// Pan so the focused node's centre sits at `screen`
    pub fn center_on_focused(&mut self, screen: Position) {
        if let Some(node) = self.focused_node() {
            let centre = Position::new(
                node.position.x + self.params.node_width / 2.0,
                node.position.y + node.height / 2.0,
            );
            self.viewport.center_on(centre, screen);
        }
    }
}
