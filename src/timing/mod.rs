//! Horloges et événements cadencés logiciellement
//!
//! La vsync de l'invité n'est pas déclenchée par le matériel : elle est
//! approximée par une période fixe mesurée sur une horloge monotone. La
//! cadence n'est garantie qu'à une itération de boucle près.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source de temps monotone en microsecondes
pub trait Clock: Send {
    fn now_us(&self) -> u64;
}

/// Horloge réelle, origine à la création
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Horloge pilotée à la main, pour les tests déterministes
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_us(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance_us(&self, delta: u64) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Événement périodique : se déclenche dès que la période est écoulée
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacedEvent {
    period_us: u64,
    last_mark_us: u64,
}

impl PacedEvent {
    /// La marque initiale est l'origine de l'horloge
    ///
    /// Avec [`MonotonicClock`], l'origine est la création de l'horloge et non
    /// le démarrage de la carte : le premier déclenchement arrive donc une
    /// période pleine après la création, pas au premier appel de `poll`.
    pub fn new(period_us: u64) -> Self {
        Self {
            period_us,
            last_mark_us: 0,
        }
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    pub fn last_mark_us(&self) -> u64 {
        self.last_mark_us
    }

    /// Renvoie `true` et recale la marque si la période est écoulée
    pub fn poll(&mut self, now_us: u64) -> bool {
        if now_us.saturating_sub(self.last_mark_us) >= self.period_us {
            self.last_mark_us = now_us;
            true
        } else {
            false
        }
    }
}

/// Vsync logicielle (~60Hz), pas synchronisée sur le balayage réel de l'écran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwarePacedVsync {
    event: PacedEvent,
}

impl SoftwarePacedVsync {
    pub fn new(period_us: u64) -> Self {
        Self {
            event: PacedEvent::new(period_us),
        }
    }

    pub fn poll(&mut self, now_us: u64) -> bool {
        self.event.poll(now_us)
    }

    pub fn last_mark_us(&self) -> u64 {
        self.event.last_mark_us()
    }
}
