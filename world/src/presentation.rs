//! Destination markers and hint toasts recorded for adapters to present.

use std::{collections::BTreeMap, time::Duration};

use squad_command_core::{MarkerKey, UnitId, Vec3};

/// Short-lived message shown to the player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hint {
    message: String,
    remaining: Duration,
}

impl Hint {
    /// Text of the hint.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Time left before the hint disappears.
    #[must_use]
    pub const fn remaining(&self) -> Duration {
        self.remaining
    }
}

/// Visual state owned by the world on behalf of adapters.
#[derive(Debug, Default)]
pub(crate) struct Presentation {
    markers: BTreeMap<MarkerKey, Vec3>,
    hints: Vec<Hint>,
    history: Vec<String>,
}

impl Presentation {
    pub(crate) fn place_marker(&mut self, key: MarkerKey, point: Vec3) {
        let _ = self.markers.insert(key, point);
    }

    pub(crate) fn clear_marker(&mut self, key: MarkerKey) {
        let _ = self.markers.remove(&key);
    }

    pub(crate) fn forget_unit(&mut self, unit: UnitId) {
        self.clear_marker(MarkerKey::Unit(unit));
    }

    pub(crate) fn show_hint(&mut self, message: String, duration: Duration) {
        self.history.push(message.clone());
        self.hints.push(Hint {
            message,
            remaining: duration,
        });
    }

    pub(crate) fn expire(&mut self, dt: Duration) {
        for hint in &mut self.hints {
            hint.remaining = hint.remaining.saturating_sub(dt);
        }
        self.hints.retain(|hint| !hint.remaining.is_zero());
    }

    pub(crate) fn markers(&self) -> &BTreeMap<MarkerKey, Vec3> {
        &self.markers
    }

    pub(crate) fn hints(&self) -> &[Hint] {
        &self.hints
    }

    pub(crate) fn history(&self) -> &[String] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_expire_after_their_duration() {
        let mut presentation = Presentation::default();
        presentation.show_hint("unit is busy".to_owned(), Duration::from_secs(1));

        presentation.expire(Duration::from_millis(600));
        assert_eq!(presentation.hints().len(), 1);
        presentation.expire(Duration::from_millis(400));
        assert!(presentation.hints().is_empty());
        assert_eq!(presentation.history(), ["unit is busy".to_owned()]);
    }

    #[test]
    fn placing_a_marker_twice_moves_it() {
        let mut presentation = Presentation::default();
        let key = MarkerKey::Unit(UnitId::new(1));
        presentation.place_marker(key, Vec3::ZERO);
        presentation.place_marker(key, Vec3::ONE);
        assert_eq!(presentation.markers().get(&key), Some(&Vec3::ONE));
        presentation.forget_unit(UnitId::new(1));
        assert!(presentation.markers().is_empty());
    }
}
