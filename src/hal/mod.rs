//! Collaborateurs matériels de la carte
//!
//! Pilote tactile, écran, pile USB hôte, rétroéclairage et mise en route des
//! horloges. Chacun est supposé correct et n'est décrit que par son contrat.

use anyhow::Result;

use crate::video::VideoFrame;

/// Contrôleur tactile (FT6236 sur la carte de référence)
pub trait TouchController: Send {
    fn sample_x(&mut self) -> i32;
    fn sample_y(&mut self) -> i32;
    fn is_pressed(&mut self) -> bool;
}

/// Écran : transfert bloquant d'une trame complète
///
/// Appelé uniquement par la tâche de vidage ; la soumission asynchrone passe
/// par [`crate::video::FlushQueue`].
pub trait DisplayPanel: Send {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()>;
}

/// Pile USB hôte : un appel de service borné et non bloquant
pub trait UsbHost: Send {
    fn pump_once(&mut self);
}

/// Rétroéclairage de l'écran
pub trait Backlight {
    /// Niveau en pourcentage (0..=100)
    fn set_level(&mut self, percent: u8) -> Result<()>;
}

/// Tension du cœur, choisie selon la fréquence CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreVoltage {
    Default,
    V1_20,
    V1_25,
    Max,
}

impl CoreVoltage {
    /// Tension requise pour une fréquence donnée
    pub fn for_cpu_speed(mhz: u32) -> Self {
        match mhz {
            0..=266 => CoreVoltage::Default,
            267..=360 => CoreVoltage::V1_20,
            361..=396 => CoreVoltage::V1_25,
            _ => CoreVoltage::Max,
        }
    }
}

/// Mise en route de la carte (horloges, tension, pilotes)
pub trait BoardSupport {
    fn set_core_voltage(&mut self, voltage: CoreVoltage) -> Result<()>;
    fn set_sys_clock_khz(&mut self, khz: u32) -> Result<()>;
    /// Route l'horloge périphérique sur l'horloge système
    fn configure_peripheral_clock(&mut self, hz: u32) -> Result<()>;
    fn init_uart(&mut self, baud: u32) -> Result<()>;
    fn init_usb_host(&mut self) -> Result<()>;
    fn init_touch(&mut self) -> Result<()>;
    fn init_display(&mut self) -> Result<()>;
    fn backlight(&mut self) -> &mut dyn Backlight;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_bands() {
        assert_eq!(CoreVoltage::for_cpu_speed(125), CoreVoltage::Default);
        assert_eq!(CoreVoltage::for_cpu_speed(266), CoreVoltage::Default);
        assert_eq!(CoreVoltage::for_cpu_speed(267), CoreVoltage::V1_20);
        assert_eq!(CoreVoltage::for_cpu_speed(360), CoreVoltage::V1_20);
        assert_eq!(CoreVoltage::for_cpu_speed(396), CoreVoltage::V1_25);
        assert_eq!(CoreVoltage::for_cpu_speed(400), CoreVoltage::Max);
    }
}
