//! Tree layout engine
//!
//! Places every auto-positioned node relative to its parent, in one of two
//! orientations:
//!
//! - **Horizontal**: children sit to the right of the parent and are stacked
//!   vertically, centred on the parent's vertical centre.
//! - **Vertical**: children sit below the parent and are spread horizontally,
//!   centred under the parent's horizontal centre.
//!
//! Each child gets a slot as wide (or tall) as its whole subtree, and is
//! centred inside that slot. The root and manually dragged nodes keep their
//! position, but their children are still laid out relative to them.
//!
//! Layout is a pure function of tree shape, node heights, manual positions
//! and parameters. It never reads the current position of an auto-placed
//! node, so running it twice yields zero moves on the second pass.

use std::collections::HashMap;

use crate::tree::{ChatNode, ConversationTree, NodeId, Position};

/// Arrangement strategy for child nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayoutMode {
    #[default]
    Horizontal,
    Vertical,
}

impl LayoutMode {
    /// Parse mode string from config
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "vertical" => Self::Vertical,
            _ => Self::Horizontal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Horizontal => Self::Vertical,
            Self::Vertical => Self::Horizontal,
        }
    }
}

/// Fixed geometry used by the layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    /// Width of every node in canvas units
    pub node_width: f64,
    /// Horizontal gap between a parent and its children (horizontal mode)
    /// or between siblings (vertical mode)
    pub gap_x: f64,
    /// Vertical gap between siblings (horizontal mode) or between a parent
    /// and its children (vertical mode)
    pub gap_y: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            node_width: 400.0,
            gap_x: 120.0,
            gap_y: 80.0,
        }
    }
}

/// Result of a layout pass
#[derive(Debug, Clone)]
pub struct LayoutOutcome {
    pub tree: ConversationTree,
    /// Number of nodes whose position changed
    pub moved: usize,
}

/// Compute target positions for all auto-positioned, non-root nodes
pub fn compute(
    tree: &ConversationTree,
    mode: LayoutMode,
    params: &LayoutParams,
) -> HashMap<NodeId, Position> {
    let mut targets = HashMap::new();
    let root = tree.root();
    place_children(root, root.position, mode, params, &mut targets);
    targets
}

/// Lay out the tree and return the repositioned copy
pub fn apply(tree: &ConversationTree, mode: LayoutMode, params: &LayoutParams) -> LayoutOutcome {
    let targets = compute(tree, mode, params);
    let (tree, moved) = tree.with_positions(&targets);
    if moved > 0 {
        tracing::trace!(moved, mode = mode.as_str(), "Layout pass moved nodes");
    }
    LayoutOutcome { tree, moved }
}

/// Extent of a subtree along the sibling axis
///
/// Height in horizontal mode, width in vertical mode: the larger of the
/// node's own extent and its children's extents plus the gaps between them.
fn subtree_extent(node: &ChatNode, mode: LayoutMode, params: &LayoutParams) -> f64 {
    let own = match mode {
        LayoutMode::Horizontal => node.height,
        LayoutMode::Vertical => params.node_width,
    };
    if node.children.is_empty() {
        return own;
    }
    let (_, total) = children_extents(node, mode, params);
    own.max(total)
}

fn sibling_gap(mode: LayoutMode, params: &LayoutParams) -> f64 {
    match mode {
        LayoutMode::Horizontal => params.gap_y,
        LayoutMode::Vertical => params.gap_x,
    }
}

/// Per-child extents and their combined span including gaps
fn children_extents(node: &ChatNode, mode: LayoutMode, params: &LayoutParams) -> (Vec<f64>, f64) {
    let extents: Vec<f64> = node
        .children
        .iter()
        .map(|child| subtree_extent(child, mode, params))
        .collect();
    let gaps = sibling_gap(mode, params) * extents.len().saturating_sub(1) as f64;
    let total = extents.iter().sum::<f64>() + gaps;
    (extents, total)
}

/// Place the children of `node`, which is (or will be) drawn at `anchor`
fn place_children(
    node: &ChatNode,
    anchor: Position,
    mode: LayoutMode,
    params: &LayoutParams,
    targets: &mut HashMap<NodeId, Position>,
) {
    if node.children.is_empty() {
        return;
    }

    let (extents, total) = children_extents(node, mode, params);
    let gap = sibling_gap(mode, params);

    let mut cursor = match mode {
        LayoutMode::Horizontal => anchor.y + node.height / 2.0 - total / 2.0,
        LayoutMode::Vertical => anchor.x + params.node_width / 2.0 - total / 2.0,
    };

    for (child, extent) in node.children.iter().zip(extents) {
        let target = match mode {
            LayoutMode::Horizontal => Position::new(
                anchor.x + params.node_width + params.gap_x,
                cursor + (extent - child.height) / 2.0,
            ),
            LayoutMode::Vertical => Position::new(
                cursor + (extent - params.node_width) / 2.0,
                anchor.y + node.height + params.gap_y,
            ),
        };

        let effective = if child.manual_position {
            child.position
        } else {
            targets.insert(child.id, target);
            target
        };

        place_children(child, effective, mode, params, targets);
        cursor += extent + gap;
    }
}
