//! Orchestrateur des tâches temps réel
//!
//! Séquence de démarrage, strictement monotone :
//! `Uninitialized → HardwareConfigured → TasksCreated → SchedulerRunning`.
//!
//! 1. Mise en route de la carte (tension, horloges, pilotes, rétroéclairage)
//! 2. Création des quatre tâches : invité (cœur 0, priorité haute), tactile,
//!    pompe d'affichage et vidage (cœur 1)
//! 3. Passage de la main à l'ordonnanceur

use anyhow::{Context, Result};
use log::info;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ConfigError, SystemConfig};
use crate::disc::setup_discs;
use crate::driver::GuestDriver;
use crate::guest::GuestMachine;
use crate::hal::{BoardSupport, CoreVoltage, DisplayPanel, TouchController, UsbHost};
use crate::input::{PointerCell, PointerSampler};
use crate::memory::GuestMemory;
use crate::scheduler::{Scheduler, StopToken, TaskBody, TaskSpec};
use crate::timing::Clock;
use crate::video::{DisplayPump, FlushQueue, FlushTask, FramebufferGeometry, FLUSH_QUEUE_DEPTH};

/// État de l'orchestrateur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Uninitialized,
    HardwareConfigured,
    TasksCreated,
    SchedulerRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SystemError {
    #[error("transition invalide: {from:?} -> {to:?}")]
    InvalidTransition {
        from: OrchestratorState,
        to: OrchestratorState,
    },
}

/// Collaborateurs remis aux tâches à leur création
pub struct SystemParts<G, C, T, U, P> {
    pub guest: G,
    pub clock: C,
    pub touch: T,
    pub usb: U,
    pub panel: P,
}

/// Images compilées dans le firmware
#[derive(Debug, Clone, Copy)]
pub struct FirmwareImages {
    /// ROM déjà patchée
    pub rom: &'static [u8],
    pub disc: &'static [u8],
}

pub struct Orchestrator {
    config: SystemConfig,
    state: OrchestratorState,
    stop: StopToken,
    memory: GuestMemory,
    pointer: Arc<PointerCell>,
    queue: FlushQueue,
    tasks: Vec<(TaskSpec, TaskBody)>,
}

impl Orchestrator {
    pub fn new(config: SystemConfig) -> Result<Self> {
        config.validate()?;
        let memory = GuestMemory::new(config.memory.ram_size);
        let queue = FlushQueue::new(config.pixel_count(), FLUSH_QUEUE_DEPTH);
        Ok(Self {
            config,
            state: OrchestratorState::Uninitialized,
            stop: StopToken::new(),
            memory,
            pointer: Arc::new(PointerCell::new()),
            queue,
            tasks: Vec::new(),
        })
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn memory(&self) -> &GuestMemory {
        &self.memory
    }

    /// Tâches créées, dans l'ordre de création
    pub fn task_specs(&self) -> Vec<&TaskSpec> {
        self.tasks.iter().map(|(spec, _)| spec).collect()
    }

    fn advance(&mut self, from: OrchestratorState, to: OrchestratorState) -> Result<(), SystemError> {
        if self.state != from {
            return Err(SystemError::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    /// Mise en route unique de la carte, avant toute tâche
    pub fn configure_hardware(&mut self, board: &mut dyn BoardSupport) -> Result<()> {
        if self.state != OrchestratorState::Uninitialized {
            return Err(SystemError::InvalidTransition {
                from: self.state,
                to: OrchestratorState::HardwareConfigured,
            }
            .into());
        }
        let board_config = &self.config.board;
        let mhz = board_config.cpu_speed_mhz;

        let hz = mhz
            .checked_mul(1_000_000)
            .ok_or(ConfigError::CpuSpeedOutOfRange(mhz))?;

        board.set_core_voltage(CoreVoltage::for_cpu_speed(mhz))?;
        board
            .set_sys_clock_khz(hz / 1000)
            .with_context(|| format!("Horloge système à {} MHz refusée", mhz))?;
        board.configure_peripheral_clock(hz)?;
        board.init_uart(board_config.uart_baud)?;
        info!("PICO DM QD3503728 UMAC, CPU à {} MHz", mhz);

        board.init_usb_host().context("Initialisation USB hôte")?;
        board.init_touch().context("Initialisation du tactile")?;
        board.init_display().context("Initialisation de l'écran")?;
        board.backlight().set_level(board_config.backlight_level)?;
        info!("Rétroéclairage à {}%", board_config.backlight_level);

        self.advance(OrchestratorState::Uninitialized, OrchestratorState::HardwareConfigured)?;
        Ok(())
    }

    /// Crée les quatre tâches sans les démarrer
    pub fn create_tasks<G, C, T, U, P>(
        &mut self,
        parts: SystemParts<G, C, T, U, P>,
        images: FirmwareImages,
    ) -> Result<()>
    where
        G: GuestMachine + 'static,
        C: Clock + 'static,
        T: TouchController + 'static,
        U: UsbHost + 'static,
        P: DisplayPanel + 'static,
    {
        if self.state != OrchestratorState::HardwareConfigured {
            return Err(SystemError::InvalidTransition {
                from: self.state,
                to: OrchestratorState::TasksCreated,
            }
            .into());
        }

        let SystemParts { guest, clock, touch, usb, panel } = parts;
        let geometry = FramebufferGeometry::new(self.config.display.width, self.config.display.height);
        let alternate = self.config.disc.image_path.as_deref().map(Path::new);
        let discs = setup_discs(images.disc, alternate)?;

        let tasks = &self.config.tasks;
        let mut created: Vec<(TaskSpec, TaskBody)> = Vec::with_capacity(4);

        let mut driver = GuestDriver::new(
            guest,
            self.memory.clone(),
            clock,
            &self.config.timing,
            self.pointer.clone(),
        );
        let stop = self.stop.clone();
        let rom = images.rom;
        let guest_body: TaskBody = Box::new(move || {
            driver.boot(rom, &discs)?;
            driver.run(stop)
        });
        created.push((TaskSpec::from_config(&tasks.guest)?, guest_body));

        let sampler = PointerSampler::new(touch, self.pointer.clone(), self.config.input.sample_period_us);
        let stop = self.stop.clone();
        let input_body: TaskBody = Box::new(move || sampler.run(stop));
        created.push((TaskSpec::from_config(&tasks.input)?, input_body));

        let pump = DisplayPump::new(usb, self.memory.clone(), self.queue.clone(), geometry);
        let stop = self.stop.clone();
        let push_body: TaskBody = Box::new(move || pump.run(stop));
        created.push((TaskSpec::from_config(&tasks.video_push)?, push_body));

        let flush = FlushTask::new(panel, self.queue.clone());
        let stop = self.stop.clone();
        let flush_body: TaskBody = Box::new(move || flush.run(stop));
        created.push((TaskSpec::from_config(&tasks.video_flush)?, flush_body));

        self.tasks = created;
        self.advance(OrchestratorState::HardwareConfigured, OrchestratorState::TasksCreated)?;
        Ok(())
    }

    /// Passe la main à l'ordonnanceur ; sur cible, ne revient jamais
    pub fn start(&mut self, mut scheduler: Box<dyn Scheduler>) -> Result<()> {
        if self.state != OrchestratorState::TasksCreated {
            return Err(SystemError::InvalidTransition {
                from: self.state,
                to: OrchestratorState::SchedulerRunning,
            }
            .into());
        }
        for (spec, body) in self.tasks.drain(..) {
            scheduler.spawn(spec, body)?;
        }
        // Toutes les tâches sont enregistrées : l'ordonnanceur peut partir
        self.advance(OrchestratorState::TasksCreated, OrchestratorState::SchedulerRunning)?;
        info!("Appel de l'ordonnanceur");
        scheduler.start()
    }
}
