//! Spatial helpers shared by the server module and the client (positions, planar distance, chunk math)

use std::ops::RangeInclusive;

use rapier3d::na::Point2;
use serde::{Deserialize, Serialize};

/// Distance at which a user picks up a collectible
pub const PICKUP_RADIUS: f32 = 1.0;

/// Radius a spawner searches around its anchor when counting its own collectibles
pub const SPAWNER_SEARCH_RADIUS: f32 = 500.0;

/// Size of one chunk in world units
pub const CHUNK_SIZE: f32 = 10.0;

/// A point in the world. `x`/`y` span the ground plane, `height` is vertical.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub height: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, height: f32) -> Self {
        Self { x, y, height }
    }

    /// Projection onto the ground plane
    pub fn planar(&self) -> Point2<f32> {
        Point2::new(self.x, self.y)
    }

    /// Distance on the ground plane; `height` is not compared.
    pub fn planar_distance(&self, other: &Position) -> f32 {
        rapier3d::na::distance(&self.planar(), &other.planar())
    }

    pub fn within(&self, other: &Position, radius: f32) -> bool {
        self.planar_distance(other) <= radius
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Position {
        Position::new(self.x + dx, self.y + dy, self.height)
    }
}

/// Convert a continuous world position (f32) to a discrete chunk coordinate (i32)
pub fn calculate_chunk(world_pos: f32) -> i32 {
    (world_pos / CHUNK_SIZE).floor() as i32
}

/// Chunks overlapped by the square of half-width `radius` around `center`, as (x range, y range)
pub fn chunk_span(center: Position, radius: f32) -> (RangeInclusive<i32>, RangeInclusive<i32>) {
    let radius = radius.abs();
    (
        calculate_chunk(center.x - radius)..=calculate_chunk(center.x + radius),
        calculate_chunk(center.y - radius)..=calculate_chunk(center.y + radius),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_distance_ignores_height() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 100.0);
        assert!((a.planar_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn pickup_radius_is_inclusive() {
        let coin = Position::new(10.0, 10.0, 0.0);
        assert!(coin.within(&Position::new(11.0, 10.0, 0.0), PICKUP_RADIUS));
        assert!(!coin.within(&Position::new(11.01, 10.0, 0.0), PICKUP_RADIUS));
    }

    #[test]
    fn chunks_floor_negative_positions() {
        assert_eq!(calculate_chunk(9.9), 0);
        assert_eq!(calculate_chunk(10.0), 1);
        assert_eq!(calculate_chunk(-0.1), -1);
    }

    #[test]
    fn chunk_span_covers_every_chunk_in_reach() {
        let (xs, ys) = chunk_span(Position::new(5.0, -5.0, 0.0), 6.0);
        assert_eq!(xs, -1..=1);
        assert_eq!(ys, -2..=0);

        let (xs, ys) = chunk_span(Position::new(15.0, 15.0, 0.0), 0.0);
        assert_eq!((xs, ys), (1..=1, 1..=1));
    }
}
