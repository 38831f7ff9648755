//! Parent-to-child connector curves

use crate::layout::LayoutMode;
use crate::tree::{ChatNode, Position};

/// Cubic Bézier curve in canvas space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicCurve {
    pub from: Position,
    pub c1: Position,
    pub c2: Position,
    pub to: Position,
}

impl CubicCurve {
    /// Point at parameter `t` in `[0, 1]`
    pub fn point_at(&self, t: f64) -> Position {
        let u = 1.0 - t;
        let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
        Position::new(
            a * self.from.x + b * self.c1.x + c * self.c2.x + d * self.to.x,
            a * self.from.y + b * self.c1.y + c * self.c2.y + d * self.to.y,
        )
    }

    /// Polyline approximation with `segments` pieces (`segments + 1` points)
    pub fn sample(&self, segments: usize) -> Vec<Position> {
        let segments = segments.max(1);
        (0..=segments)
            .map(|i| self.point_at(i as f64 / segments as f64))
            .collect()
    }
}

/// Curve from a parent's outgoing side to a child's incoming side
///
/// Horizontal mode leaves the parent's right edge and enters the child's
/// left edge; vertical mode goes from bottom centre to top centre. Control
/// points sit at the midpoint so the curve leaves and arrives straight.
pub fn connector(
    parent: &ChatNode,
    child: &ChatNode,
    mode: LayoutMode,
    node_width: f64,
) -> CubicCurve {
    match mode {
        LayoutMode::Horizontal => {
            let from = Position::new(
                parent.position.x + node_width,
                parent.position.y + parent.height / 2.0,
            );
            let to = Position::new(child.position.x, child.position.y + child.height / 2.0);
            let mid_x = (from.x + to.x) / 2.0;
            CubicCurve {
                from,
                c1: Position::new(mid_x, from.y),
                c2: Position::new(mid_x, to.y),
                to,
            }
        }
        LayoutMode::Vertical => {
            let from = Position::new(
                parent.position.x + node_width / 2.0,
                parent.position.y + parent.height,
            );
            let to = Position::new(child.position.x + node_width / 2.0, child.position.y);
            let mid_y = (from.y + to.y) / 2.0;
            CubicCurve {
                from,
                c1: Position::new(from.x, mid_y),
                c2: Position::new(to.x, mid_y),
                to,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(x: f64, y: f64, height: f64) -> ChatNode {
        let mut node = ChatNode::new(Position::new(x, y));
        node.height = height;
        node
    }

    #[test]
    fn test_horizontal_connector_endpoints() {
        let parent = node_at(0.0, 0.0, 100.0);
        let child = node_at(520.0, 200.0, 60.0);
        let curve = connector(&parent, &child, LayoutMode::Horizontal, 400.0);

        assert_eq!(curve.from, Position::new(400.0, 50.0));
        assert_eq!(curve.to, Position::new(520.0, 230.0));
        assert_eq!(curve.c1, Position::new(460.0, 50.0));
        assert_eq!(curve.c2, Position::new(460.0, 230.0));
    }

    #[test]
    fn test_vertical_connector_endpoints() {
        let parent = node_at(0.0, 0.0, 100.0);
        let child = node_at(100.0, 180.0, 60.0);
        let curve = connector(&parent, &child, LayoutMode::Vertical, 400.0);

        assert_eq!(curve.from, Position::new(200.0, 100.0));
        assert_eq!(curve.to, Position::new(300.0, 180.0));
    }

    #[test]
    fn test_sample_hits_both_ends() {
        let parent = node_at(0.0, 0.0, 100.0);
        let child = node_at(520.0, 200.0, 60.0);
        let curve = connector(&parent, &child, LayoutMode::Horizontal, 400.0);

        let points = curve.sample(8);
        assert_eq!(points.len(), 9);
        assert_eq!(points[0], curve.from);
        assert_eq!(points[8], curve.to);
        // Symmetric control points put the midpoint halfway in both axes
        assert_eq!(points[4], Position::new(460.0, 140.0));
    }
}
