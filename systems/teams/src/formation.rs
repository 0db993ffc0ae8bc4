//! Slot geometry for team formations.
//!
//! Formations are built from concentric rings around the anchor. Each ring
//! holds as many slots as fit at the current spacing, so larger teams spread
//! outward instead of crowding a fixed slot count.

use std::f32::consts::{PI, TAU};

use squad_command_core::{TeamConfig, TeamId, Vec3};

/// Golden angle in radians, used to spread staging phases between teams.
const GOLDEN_ANGLE: f32 = 2.399_963;

/// Spacing between neighbouring slots for a team of `member_count` units.
///
/// The spacing grows with the square root of the member count and is widened
/// so that the largest member plus a clearance buffer always fits.
#[must_use]
pub fn slot_spacing(config: &TeamConfig, member_count: usize, max_member_radius: f32) -> f32 {
    let grown = config.base_spacing + config.spacing_growth * (member_count as f32).sqrt();
    let footprint = 2.0 * max_member_radius.max(0.0) + config.radius_buffer;
    config.min_spacing.max(grown).max(footprint)
}

/// Radius of the innermost ring.
#[must_use]
pub fn first_ring_radius(
    config: &TeamConfig,
    formation_radius: f32,
    spacing: f32,
    member_count: usize,
) -> f32 {
    let ring_scale = 1.0 + config.ring_scale_growth * (member_count as f32).sqrt();
    formation_radius.max(spacing * ring_scale)
}

/// Radius of the staging ring used during the first phase of a staged merge.
#[must_use]
pub fn staging_radius(config: &TeamConfig, base_radius: f32, spacing: f32) -> f32 {
    config
        .min_staging_radius
        .max(base_radius * config.staging_multiplier)
        .max(base_radius + spacing * config.staging_spacing_factor)
}

/// Angular offset of a team's staging sweep, stable for the team's lifetime.
#[must_use]
pub fn team_phase(team: TeamId) -> f32 {
    (team.get() as f32 * GOLDEN_ANGLE).rem_euclid(TAU)
}

/// Generates ring slots around `center` until at least `count` slots exist.
///
/// Rings are completed rather than truncated, so the result may hold more
/// slots than requested. Odd rings are rotated by half a slot so that slots
/// on neighbouring rings do not line up radially.
#[must_use]
pub fn ring_slots(
    center: Vec3,
    count: usize,
    first_radius: f32,
    spacing: f32,
    min_per_ring: usize,
) -> Vec<Vec3> {
    let mut slots = Vec::with_capacity(count);
    if count == 0 || !(spacing > 0.0) {
        return slots;
    }

    let mut ring = 0_usize;
    while slots.len() < count {
        let radius = first_radius + ring as f32 * spacing;
        let fit = ((TAU * radius) / spacing).floor() as usize;
        let per_ring = fit.max(min_per_ring).max(1);
        let phase = if ring % 2 == 1 {
            PI / per_ring as f32
        } else {
            0.0
        };

        for slot in 0..per_ring {
            let angle = phase + TAU * slot as f32 / per_ring as f32;
            slots.push(center + Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin()));
        }
        ring += 1;
    }

    slots
}

/// Points evenly swept around `center` at `radius`, starting at `phase`.
#[must_use]
pub fn staging_points(center: Vec3, count: usize, radius: f32, phase: f32) -> Vec<Vec3> {
    (0..count)
        .map(|index| {
            let angle = phase + TAU * index as f32 / count as f32;
            center + Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin())
        })
        .collect()
}

/// Greedily matches each position to the nearest unclaimed slot.
///
/// Positions are processed in the order given; each claims the closest slot
/// not yet taken. Entries are `None` once every slot has been claimed.
#[must_use]
pub fn assign_nearest(positions: &[Vec3], slots: &[Vec3]) -> Vec<Option<usize>> {
    let mut claimed = vec![false; slots.len()];
    positions
        .iter()
        .map(|position| {
            let best = slots
                .iter()
                .enumerate()
                .filter(|(index, _)| !claimed[*index])
                .min_by(|(_, a), (_, b)| {
                    planar_distance_squared(**a, *position)
                        .total_cmp(&planar_distance_squared(**b, *position))
                })
                .map(|(index, _)| index);
            if let Some(index) = best {
                claimed[index] = true;
            }
            best
        })
        .collect()
}

fn planar_distance_squared(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    dx * dx + dz * dz
}
