//! Abstraction de l'ordonnanceur temps réel
//!
//! Chaque boucle longue est une tâche avec une priorité fixe et une affinité
//! de cœur. Sur cible, l'ordonnanceur RTOS ne rend jamais la main ; côté hôte,
//! [`ThreadScheduler`] lance un thread nommé par tâche et attend leur arrêt.

use anyhow::{anyhow, Result};
use bitflags::bitflags;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::TaskConfig;

/// Nombre de cœurs du microcontrôleur
pub const NUM_CORES: u8 = 2;

bitflags! {
    /// Masque d'affinité de cœur (équivalent de `1 << n`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CoreMask: u8 {
        const CORE0 = 1 << 0;
        const CORE1 = 1 << 1;
    }
}

impl CoreMask {
    /// Masque d'un cœur unique, `None` si le cœur n'existe pas
    pub fn for_core(core: u8) -> Option<Self> {
        if core >= NUM_CORES {
            return None;
        }
        Self::from_bits(1 << core)
    }
}

/// Signal d'arrêt partagé par toutes les boucles
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Description d'une tâche à créer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub priority: u8,
    pub affinity: CoreMask,
    pub stack_words: usize,
}

impl TaskSpec {
    pub fn from_config(config: &TaskConfig) -> Result<Self> {
        let affinity = CoreMask::for_core(config.core)
            .ok_or_else(|| anyhow!("Tâche {}: cœur {} inexistant", config.name, config.core))?;
        Ok(Self {
            name: config.name.clone(),
            priority: config.priority,
            affinity,
            stack_words: config.stack_words,
        })
    }
}

/// Corps d'une tâche
pub type TaskBody = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Ordonnanceur capable de lancer des tâches épinglées
pub trait Scheduler {
    /// Enregistre une tâche ; elle ne démarre qu'avec [`Scheduler::start`]
    fn spawn(&mut self, spec: TaskSpec, body: TaskBody) -> Result<()>;

    /// Démarre l'ordonnanceur
    fn start(self: Box<Self>) -> Result<()>;
}

/// Ordonnanceur hôte : un thread OS par tâche
///
/// L'affinité et la priorité sont journalisées mais pas appliquées.
pub struct ThreadScheduler {
    pending: Vec<(TaskSpec, TaskBody)>,
    stop: StopToken,
}

impl ThreadScheduler {
    pub fn new(stop: StopToken) -> Self {
        Self {
            pending: Vec::new(),
            stop,
        }
    }

    pub fn task_count(&self) -> usize {
        self.pending.len()
    }
}

impl Scheduler for ThreadScheduler {
    fn spawn(&mut self, spec: TaskSpec, body: TaskBody) -> Result<()> {
        debug!(
            "Tâche {} enregistrée (priorité {}, affinité {:?}, pile {} mots)",
            spec.name, spec.priority, spec.affinity, spec.stack_words
        );
        self.pending.push((spec, body));
        Ok(())
    }

    fn start(self: Box<Self>) -> Result<()> {
        let ThreadScheduler { pending, stop } = *self;
        let mut handles = Vec::with_capacity(pending.len());

        for (spec, body) in pending {
            let name = spec.name.clone();
            let task_stop = stop.clone();
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    let result = body();
                    if let Err(e) = &result {
                        error!("Tâche {} arrêtée sur erreur fatale: {:#}", spec.name, e);
                        // Pas de reprise possible : tout le système s'arrête
                        task_stop.stop();
                    }
                    result
                })?;
            handles.push((name, handle));
        }
        info!("Ordonnanceur démarré avec {} tâches", handles.len());

        let mut first_error = None;
        for (name, handle) in handles {
            let outcome = handle
                .join()
                .map_err(|_| anyhow!("Tâche {} a paniqué", name))
                .and_then(|r| r);
            if let Err(e) = outcome {
                stop.stop();
                first_error.get_or_insert(e);
            } else {
                debug!("Tâche {} terminée", name);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_core_masks() {
        assert_eq!(CoreMask::for_core(0), Some(CoreMask::CORE0));
        assert_eq!(CoreMask::for_core(1), Some(CoreMask::CORE1));
        assert_eq!(CoreMask::for_core(2), None);
        assert_eq!(CoreMask::CORE1.bits(), 0b10);
    }

    #[test]
    fn test_thread_scheduler_runs_all_tasks() {
        let stop = StopToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Box::new(ThreadScheduler::new(stop));

        for core in 0..2 {
            let counter = counter.clone();
            let spec = TaskSpec {
                name: format!("t{}", core),
                priority: 2,
                affinity: CoreMask::for_core(core).unwrap(),
                stack_words: 256,
            };
            scheduler
                .spawn(spec, Box::new(move || -> Result<()> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
                .unwrap();
        }
        assert_eq!(scheduler.task_count(), 2);
        scheduler.start().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_task_stops_the_others() {
        let stop = StopToken::new();
        let mut scheduler = Box::new(ThreadScheduler::new(stop.clone()));
        let spec = |name: &str| TaskSpec {
            name: name.to_string(),
            priority: 2,
            affinity: CoreMask::CORE1,
            stack_words: 256,
        };

        let waiter = stop.clone();
        scheduler
            .spawn(spec("loop"), Box::new(move || -> Result<()> {
                while !waiter.is_stopped() {
                    thread::yield_now();
                }
                Ok(())
            }))
            .unwrap();
        scheduler
            .spawn(spec("fault"), Box::new(|| -> Result<()> { Err(anyhow!("faute invité")) }))
            .unwrap();

        let err = scheduler.start().unwrap_err();
        assert!(err.to_string().contains("faute invité"));
        assert!(stop.is_stopped());
    }
}
