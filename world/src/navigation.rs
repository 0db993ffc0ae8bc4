//! Nearest-point sampling over the traversable surface.

use squad_command_core::{GroundRect, Surface, Vec2, Vec3};

/// Finds the walkable point closest to `point`, if one lies within `max_distance`.
///
/// The surface is flat at height zero. Points outside the bounds are clamped
/// onto them; points inside an obstacle are pushed to the nearest obstacle edge
/// that is itself walkable. Obstacle edges count as walkable.
pub(crate) fn sample_nearest(surface: &Surface, point: Vec3, max_distance: f32) -> Option<Vec3> {
    let ground = Vec2::new(point.x, point.z);
    let bounds = surface.bounds();
    let clamped = ground.clamp(bounds.min(), bounds.max());

    let candidate = match surface
        .obstacles()
        .iter()
        .find(|obstacle| strictly_inside(obstacle, clamped))
    {
        Some(obstacle) => nearest_walkable_edge(surface, obstacle, clamped)?,
        None => clamped,
    };

    if candidate.distance(ground) > max_distance {
        return None;
    }

    Some(Vec3::new(candidate.x, 0.0, candidate.y))
}

/// Reports whether the ground projection of `point` is walkable.
pub(crate) fn is_walkable(surface: &Surface, point: Vec2) -> bool {
    surface.bounds().contains(point)
        && !surface
            .obstacles()
            .iter()
            .any(|obstacle| strictly_inside(obstacle, point))
}

fn strictly_inside(rect: &GroundRect, point: Vec2) -> bool {
    point.x > rect.min().x && point.x < rect.max().x && point.y > rect.min().y && point.y < rect.max().y
}

fn nearest_walkable_edge(surface: &Surface, obstacle: &GroundRect, point: Vec2) -> Option<Vec2> {
    let candidates = [
        Vec2::new(obstacle.min().x, point.y),
        Vec2::new(obstacle.max().x, point.y),
        Vec2::new(point.x, obstacle.min().y),
        Vec2::new(point.x, obstacle.max().y),
    ];

    candidates
        .into_iter()
        .filter(|candidate| is_walkable(surface, *candidate))
        .min_by(|a, b| a.distance_squared(point).total_cmp(&b.distance_squared(point)))
}
