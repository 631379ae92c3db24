//! Boucle de pilotage de la machine invitée
//!
//! Chaque itération avance l'invité d'un quantum, lève les événements
//! synthétiques (vsync logicielle, tick 1Hz) quand leur période est écoulée,
//! puis transmet les mouvements du pointeur.

use anyhow::Result;
use log::info;
use std::sync::Arc;

use crate::config::TimingConfig;
use crate::disc::DiscDescriptor;
use crate::guest::GuestMachine;
use crate::input::{PointerBridge, PointerCell, RelativeMotion};
use crate::memory::GuestMemory;
use crate::scheduler::StopToken;
use crate::timing::{Clock, PacedEvent, SoftwarePacedVsync};

/// Ce qui s'est passé pendant une itération
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub vsync: bool,
    pub one_second: bool,
    pub motion: Option<RelativeMotion>,
}

/// Compteurs cumulés de la boucle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub iterations: u64,
    pub vsync_events: u64,
    pub one_second_events: u64,
    pub motion_events: u64,
}

pub struct GuestDriver<G: GuestMachine, C: Clock> {
    guest: G,
    memory: GuestMemory,
    clock: C,
    vsync: SoftwarePacedVsync,
    one_hz: PacedEvent,
    bridge: PointerBridge,
    pointer: Arc<PointerCell>,
    stats: DriverStats,
}

impl<G: GuestMachine, C: Clock> GuestDriver<G, C> {
    pub fn new(
        guest: G,
        memory: GuestMemory,
        clock: C,
        timing: &TimingConfig,
        pointer: Arc<PointerCell>,
    ) -> Self {
        Self {
            guest,
            memory,
            clock,
            vsync: SoftwarePacedVsync::new(timing.vsync_period_us),
            one_hz: PacedEvent::new(timing.one_hz_period_us),
            bridge: PointerBridge::new(),
            pointer,
            stats: DriverStats::default(),
        }
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn guest(&self) -> &G {
        &self.guest
    }

    pub fn bridge(&self) -> &PointerBridge {
        &self.bridge
    }

    /// Initialise l'invité et publie l'emplacement de son framebuffer
    pub fn boot(&mut self, rom: &[u8], discs: &[DiscDescriptor]) -> Result<()> {
        info!("Tâche umac démarrée");
        let guest = &mut self.guest;
        self.memory.with_mut(|ram| guest.init(ram, rom, discs))?;

        let offset = self.guest.framebuffer_offset();
        self.memory.set_framebuffer_offset(offset);
        info!(
            "RAM invitée: {} octets, framebuffer à l'offset {:#x}",
            self.memory.size(),
            offset
        );
        Ok(())
    }

    /// Une itération de la boucle ; une erreur de l'invité est fatale
    pub fn iterate(&mut self) -> Result<IterationReport> {
        let now = self.clock.now_us();

        let guest = &mut self.guest;
        self.memory.with_mut(|ram| guest.step(ram))?;

        let mut report = IterationReport::default();
        if self.vsync.poll(now) {
            self.guest.raise_vsync();
            report.vsync = true;
            self.stats.vsync_events += 1;
        }
        if self.one_hz.poll(now) {
            self.guest.raise_one_second_tick();
            report.one_second = true;
            self.stats.one_second_events += 1;
        }

        report.motion = self.bridge.step(self.pointer.latest(), &mut self.guest);
        if report.motion.is_some() {
            self.stats.motion_events += 1;
        }

        self.stats.iterations += 1;
        Ok(report)
    }

    pub fn run(mut self, stop: StopToken) -> Result<()> {
        info!("Enjoyable Mac times now begin");
        while !stop.is_stopped() {
            self.iterate()?;
        }
        info!("Boucle invitée arrêtée: {:?}", self.stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use crate::input::PointerState;
    use crate::sim::RecordingGuest;
    use crate::timing::ManualClock;

    fn driver() -> (GuestDriver<RecordingGuest, ManualClock>, ManualClock, Arc<PointerCell>) {
        let clock = ManualClock::new();
        let pointer = Arc::new(PointerCell::new());
        let config = SystemConfig::default();
        let driver = GuestDriver::new(
            RecordingGuest::default(),
            GuestMemory::new(4096),
            clock.clone(),
            &config.timing,
            pointer.clone(),
        );
        (driver, clock, pointer)
    }

    #[test]
    fn test_boot_publishes_framebuffer_offset() {
        let (mut driver, _, _) = driver();
        driver.guest.fb_offset = 0x200;
        driver.boot(&[0u8; 16], &[]).unwrap();
        assert!(driver.guest().initialized);
        assert_eq!(driver.memory.framebuffer_offset(), Some(0x200));
    }

    #[test]
    fn test_vsync_cadence() {
        let (mut driver, clock, _) = driver();

        clock.set_us(16_666);
        assert!(!driver.iterate().unwrap().vsync);
        clock.set_us(16_667);
        assert!(driver.iterate().unwrap().vsync);
        clock.set_us(33_333);
        assert!(!driver.iterate().unwrap().vsync);
        clock.set_us(33_334);
        assert!(driver.iterate().unwrap().vsync);

        assert_eq!(driver.guest().vsyncs, 2);
        assert_eq!(driver.guest().steps, 4);
    }

    #[test]
    fn test_one_second_cadence() {
        let (mut driver, clock, _) = driver();

        clock.set_us(999_999);
        assert!(!driver.iterate().unwrap().one_second);
        clock.set_us(1_000_000);
        assert!(driver.iterate().unwrap().one_second);
        clock.set_us(1_999_999);
        assert!(!driver.iterate().unwrap().one_second);
        clock.set_us(2_000_000);
        assert!(driver.iterate().unwrap().one_second);
        assert_eq!(driver.stats().one_second_events, 2);
    }

    #[test]
    fn test_pointer_changes_forwarded_once() {
        let (mut driver, _, pointer) = driver();

        pointer.publish(PointerState::new(100, 50, false));
        driver.iterate().unwrap();
        pointer.publish(PointerState::new(105, 40, true));
        let report = driver.iterate().unwrap();
        assert_eq!(report.motion, Some(RelativeMotion { dx: 5, dy: 10, button: true }));

        assert!(driver.iterate().unwrap().motion.is_none());
        assert!(driver.iterate().unwrap().motion.is_none());
        assert_eq!(driver.guest().motions, vec![(100, -50, false), (5, 10, true)]);
    }

    #[test]
    fn test_guest_fault_is_propagated() {
        let (mut driver, clock, _) = driver();
        driver.guest.fail_after = Some(1);

        assert!(driver.iterate().is_ok());
        clock.set_us(20_000);
        assert!(driver.iterate().is_err());
        // Pas d'événement levé après une faute
        assert_eq!(driver.guest().vsyncs, 0);
    }
}
