//! Pan offset and zoom scale
//!
//! Screen = world × scale + offset. Screen units are whatever the front end
//! feeds in (pixels for a browser, scaled cell coordinates for the terminal).

use crate::tree::Position;

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    offset: Position,
    scale: f64,
    min_scale: f64,
    max_scale: f64,
}

impl Viewport {
    pub fn new(min_scale: f64, max_scale: f64) -> Self {
        let (min_scale, max_scale) = if min_scale <= max_scale {
            (min_scale, max_scale)
        } else {
            (max_scale, min_scale)
        };
        Self {
            offset: Position::default(),
            scale: 1.0_f64.clamp(min_scale, max_scale),
            min_scale,
            max_scale,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn offset(&self) -> Position {
        self.offset
    }

    pub fn world_to_screen(&self, p: Position) -> Position {
        Position::new(
            p.x * self.scale + self.offset.x,
            p.y * self.scale + self.offset.y,
        )
    }

    pub fn screen_to_world(&self, p: Position) -> Position {
        Position::new(
            (p.x - self.offset.x) / self.scale,
            (p.y - self.offset.y) / self.scale,
        )
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.offset.x += dx;
        self.offset.y += dy;
    }

    /// Multiply the scale by `factor`, keeping the world point under
    /// `anchor` fixed on screen. Returns false when already at a bound.
    pub fn zoom_at(&mut self, anchor: Position, factor: f64) -> bool {
        let next = (self.scale * factor).clamp(self.min_scale, self.max_scale);
        if next == self.scale {
            return false;
        }
        let world = self.screen_to_world(anchor);
        self.scale = next;
        self.offset = Position::new(anchor.x - world.x * next, anchor.y - world.y * next);
        true
    }

    /// Pan so that `world` appears at `screen`
    pub fn center_on(&mut self, world: Position, screen: Position) {
        self.offset = Position::new(
            screen.x - world.x * self.scale,
            screen.y - world.y * self.scale,
        );
    }

    pub fn reset(&mut self) {
        self.offset = Position::default();
        self.scale = 1.0_f64.clamp(self.min_scale, self.max_scale);
    }
}
