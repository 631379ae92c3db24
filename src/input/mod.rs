//! Entrée pointeur : échantillonnage tactile et pont vers la souris invitée

use crossbeam::atomic::AtomicCell;
use log::debug;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::guest::GuestMachine;
use crate::hal::TouchController;
use crate::scheduler::StopToken;

/// Position absolue et état d'appui du pointeur
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerState {
    pub x: i32,
    pub y: i32,
    pub pressed: bool,
}

impl PointerState {
    pub fn new(x: i32, y: i32, pressed: bool) -> Self {
        Self { x, y, pressed }
    }
}

/// Dernier échantillon brut, partagé entre l'échantillonneur et le pont
///
/// Le triplet est publié d'un seul bloc : un lecteur ne voit jamais un
/// mélange de deux échantillons. Il peut avoir une période de retard.
#[derive(Debug, Default)]
pub struct PointerCell {
    state: AtomicCell<PointerState>,
}

impl PointerCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, state: PointerState) {
        self.state.store(state);
    }

    pub fn latest(&self) -> PointerState {
        self.state.load()
    }
}

/// Échantillonneur tactile
pub struct PointerSampler<T: TouchController> {
    touch: T,
    cell: Arc<PointerCell>,
    sample_period: Duration,
}

impl<T: TouchController> PointerSampler<T> {
    pub fn new(touch: T, cell: Arc<PointerCell>, sample_period_us: u64) -> Self {
        Self {
            touch,
            cell,
            sample_period: Duration::from_micros(sample_period_us),
        }
    }

    /// Lit X, Y et l'appui puis publie le triplet sans filtrage
    pub fn sample_once(&mut self) -> PointerState {
        let state = PointerState {
            x: self.touch.sample_x(),
            y: self.touch.sample_y(),
            pressed: self.touch.is_pressed(),
        };
        self.cell.publish(state);
        state
    }

    pub fn run(mut self, stop: StopToken) -> anyhow::Result<()> {
        debug!("Échantillonneur tactile démarré");
        while !stop.is_stopped() {
            self.sample_once();
            if self.sample_period.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(self.sample_period);
            }
        }
        Ok(())
    }
}

/// Mouvement relatif livré à l'invité
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeMotion {
    pub dx: i32,
    /// Déjà inversé pour la convention de l'invité
    pub dy: i32,
    pub button: bool,
}

/// Pont entre l'état brut et l'état déjà livré à l'invité
#[derive(Debug, Clone, Default)]
pub struct PointerBridge {
    delivered: PointerState,
}

impl PointerBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> PointerState {
        self.delivered
    }

    /// Calcule le delta et ne notifie l'invité que si quelque chose a changé
    pub fn step<G: GuestMachine + ?Sized>(
        &mut self,
        raw: PointerState,
        guest: &mut G,
    ) -> Option<RelativeMotion> {
        if raw == self.delivered {
            return None;
        }

        let motion = RelativeMotion {
            dx: raw.x.wrapping_sub(self.delivered.x),
            // Axe vertical inversé côté invité
            dy: raw.y.wrapping_sub(self.delivered.y).wrapping_neg(),
            button: raw.pressed,
        };
        self.delivered = raw;
        guest.inject_relative_motion(motion.dx, motion.dy, motion.button);
        Some(motion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RecordingGuest;

    struct FixedTouch(PointerState);

    impl TouchController for FixedTouch {
        fn sample_x(&mut self) -> i32 {
            self.0.x
        }
        fn sample_y(&mut self) -> i32 {
            self.0.y
        }
        fn is_pressed(&mut self) -> bool {
            self.0.pressed
        }
    }

    #[test]
    fn test_sampler_publishes_whole_triple() {
        let cell = Arc::new(PointerCell::new());
        let mut sampler =
            PointerSampler::new(FixedTouch(PointerState::new(12, 34, true)), cell.clone(), 0);
        sampler.sample_once();
        assert_eq!(cell.latest(), PointerState::new(12, 34, true));
    }

    #[test]
    fn test_bridge_inverts_vertical_axis() {
        let mut guest = RecordingGuest::default();
        let mut bridge = PointerBridge::new();

        bridge.step(PointerState::new(100, 50, false), &mut guest);
        let motion = bridge.step(PointerState::new(105, 40, true), &mut guest);

        assert_eq!(motion, Some(RelativeMotion { dx: 5, dy: 10, button: true }));
        assert_eq!(guest.motions.last(), Some(&(5, 10, true)));
        assert_eq!(bridge.delivered(), PointerState::new(105, 40, true));
    }

    #[test]
    fn test_unchanged_state_emits_nothing() {
        let mut guest = RecordingGuest::default();
        let mut bridge = PointerBridge::new();
        let raw = PointerState::new(7, 9, false);

        assert!(bridge.step(raw, &mut guest).is_some());
        assert!(bridge.step(raw, &mut guest).is_none());
        assert!(bridge.step(raw, &mut guest).is_none());
        assert_eq!(guest.motions.len(), 1);
    }

    #[test]
    fn test_button_edge_alone_is_forwarded() {
        let mut guest = RecordingGuest::default();
        let mut bridge = PointerBridge::new();

        let motion = bridge.step(PointerState::new(0, 0, true), &mut guest);
        assert_eq!(motion, Some(RelativeMotion { dx: 0, dy: 0, button: true }));
        let release = bridge.step(PointerState::new(0, 0, false), &mut guest);
        assert_eq!(release, Some(RelativeMotion { dx: 0, dy: 0, button: false }));
    }
}
