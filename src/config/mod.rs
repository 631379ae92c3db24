//! Configuration du système (affichage, mémoire, cadences, tâches)
//!
//! Sur cible, toutes ces valeurs sont des constantes de compilation. Côté hôte,
//! elles peuvent être chargées depuis un fichier TOML pour les essais.

use serde::{Deserialize, Serialize};
use anyhow::Result;
use std::fs;
use thiserror::Error;

use crate::scheduler::CoreMask;

/// Largeur de l'écran (ILI9488 en paysage)
pub const DISP_WIDTH: u32 = 480;

/// Hauteur de l'écran
pub const DISP_HEIGHT: u32 = 320;

/// Taille de la RAM émulée
pub const RAM_SIZE: usize = 208 * 1024;

/// Période de la vsync logicielle en microsecondes (~60Hz)
pub const VSYNC_PERIOD_US: u64 = 16_667;

/// Période du tick une seconde
pub const ONE_HZ_PERIOD_US: u64 = 1_000_000;

/// Fréquence CPU par défaut (DEFAULT_SYS_CLK_KHZ / 1000)
pub const DEFAULT_CPU_SPEED_MHZ: u32 = 125;

/// Horloge CPU maximale acceptée (overclocking à tension maximale)
pub const MAX_CPU_SPEED_MHZ: u32 = 500;

/// Pile minimale d'une tâche, en mots
pub const MINIMAL_STACK_WORDS: usize = 256;

/// Configuration principale du système
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub display: DisplayConfig,
    pub memory: MemoryConfig,
    pub timing: TimingConfig,
    pub input: InputConfig,
    pub board: BoardConfig,
    pub disc: DiscConfig,
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub ram_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub vsync_period_us: u64,
    pub one_hz_period_us: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// 0 = on cède simplement le processeur entre deux échantillons
    pub sample_period_us: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub cpu_speed_mhz: u32,
    pub backlight_level: u8,
    pub uart_baud: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DiscConfig {
    /// Image alternative à la place de l'image compilée (montée en lecture seule)
    pub image_path: Option<String>,
}

/// Paramètres d'une tâche temps réel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    /// Priorité relative à la tâche idle
    pub priority: u8,
    pub core: u8,
    pub stack_words: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksConfig {
    pub guest: TaskConfig,
    pub input: TaskConfig,
    pub video_push: TaskConfig,
    pub video_flush: TaskConfig,
}

/// Erreurs de validation de la configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("largeur d'écran {0} non multiple de 16")]
    WidthNotMultipleOf16(u32),

    #[error("géométrie d'écran vide: {width}x{height}")]
    EmptyDisplay { width: u32, height: u32 },

    #[error("RAM trop petite ({ram_size} octets) pour un framebuffer de {framebuffer} octets")]
    RamTooSmall { ram_size: usize, framebuffer: usize },

    #[error("période nulle pour {0}")]
    ZeroPeriod(&'static str),

    #[error("tâche {name}: cœur {core} inexistant")]
    InvalidCore { name: String, core: u8 },

    #[error("horloge CPU {0} MHz hors limites")]
    CpuSpeedOutOfRange(u32),

    #[error("niveau de rétroéclairage {0} > 100")]
    BacklightOutOfRange(u8),
}

impl TaskConfig {
    fn new(name: &str, priority: u8, core: u8, stack_words: usize) -> Self {
        Self {
            name: name.to_string(),
            priority,
            core,
            stack_words,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            display: DisplayConfig {
                width: DISP_WIDTH,
                height: DISP_HEIGHT,
            },
            memory: MemoryConfig { ram_size: RAM_SIZE },
            timing: TimingConfig {
                vsync_period_us: VSYNC_PERIOD_US,
                one_hz_period_us: ONE_HZ_PERIOD_US,
            },
            input: InputConfig { sample_period_us: 0 },
            board: BoardConfig {
                cpu_speed_mhz: DEFAULT_CPU_SPEED_MHZ,
                backlight_level: 100,
                uart_baud: 115_200,
            },
            disc: DiscConfig::default(),
            tasks: TasksConfig {
                guest: TaskConfig::new("umac_task", 3, 0, 2048),
                input: TaskConfig::new("input_task", 2, 1, MINIMAL_STACK_WORDS),
                video_push: TaskConfig::new("video_push", 2, 1, MINIMAL_STACK_WORDS),
                video_flush: TaskConfig::new("video_flush", 2, 1, MINIMAL_STACK_WORDS),
            },
        }
    }
}

impl SystemConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: SystemConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Configuration {} ignorée ({}), valeurs par défaut utilisées", path, e);
                Self::default()
            }
        }
    }

    /// Nombre d'octets du framebuffer 1bpp de l'invité
    pub fn framebuffer_bytes(&self) -> usize {
        (self.display.width as usize * self.display.height as usize) / 8
    }

    /// Nombre de pixels 16 bits côté écran
    pub fn pixel_count(&self) -> usize {
        self.display.width as usize * self.display.height as usize
    }

    /// Vérifie la cohérence de la configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let DisplayConfig { width, height } = self.display;
        if width == 0 || height == 0 {
            return Err(ConfigError::EmptyDisplay { width, height });
        }
        if width % 16 != 0 {
            return Err(ConfigError::WidthNotMultipleOf16(width));
        }
        if self.memory.ram_size < self.framebuffer_bytes() {
            return Err(ConfigError::RamTooSmall {
                ram_size: self.memory.ram_size,
                framebuffer: self.framebuffer_bytes(),
            });
        }
        if self.timing.vsync_period_us == 0 {
            return Err(ConfigError::ZeroPeriod("vsync"));
        }
        if self.timing.one_hz_period_us == 0 {
            return Err(ConfigError::ZeroPeriod("tick 1Hz"));
        }
        if self.board.cpu_speed_mhz == 0 || self.board.cpu_speed_mhz > MAX_CPU_SPEED_MHZ {
            return Err(ConfigError::CpuSpeedOutOfRange(self.board.cpu_speed_mhz));
        }
        if self.board.backlight_level > 100 {
            return Err(ConfigError::BacklightOutOfRange(self.board.backlight_level));
        }
        for task in [
            &self.tasks.guest,
            &self.tasks.input,
            &self.tasks.video_push,
            &self.tasks.video_flush,
        ] {
            if CoreMask::for_core(task.core).is_none() {
                return Err(ConfigError::InvalidCore {
                    name: task.name.clone(),
                    core: task.core,
                });
            }
        }
        Ok(())
    }
}
