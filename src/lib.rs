//! Pico umac Rust - Orchestration temps réel d'un Macintosh émulé
//!
//! Cette bibliothèque relie la boucle d'exécution du cœur umac au tactile et
//! à l'écran d'une carte à microcontrôleur double cœur : cadence des
//! événements synthétiques, pont souris, conversion du framebuffer 1bpp et
//! vidage asynchrone vers l'écran.

pub mod config;
pub mod memory;
pub mod disc;
pub mod guest;
pub mod hal;
pub mod timing;
pub mod input;
pub mod video;
pub mod driver;
pub mod scheduler;
pub mod system;
pub mod sim;

pub use config::*;
pub use memory::*;
pub use disc::*;
pub use guest::*;
pub use hal::*;
pub use timing::*;
pub use input::*;
pub use video::*;
pub use driver::*;
pub use scheduler::*;
pub use system::*;

/// Version du firmware
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Offset du framebuffer dans la RAM du Mac Plus émulé (fin de RAM moins 0x5900)
pub const MAC_PLUS_FB_OFFSET_FROM_END: usize = 0x5900;
