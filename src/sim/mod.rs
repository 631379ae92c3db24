//! Collaborateurs simulés pour l'exécution sur hôte et les tests
//!
//! Ils remplacent le cœur umac, le FT6236, l'ILI9488, la pile USB et la
//! mise en route de la carte quand on fait tourner la chaîne complète sur un
//! poste de travail.

use anyhow::{anyhow, Result};
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::disc::DiscDescriptor;
use crate::guest::GuestMachine;
use crate::hal::{Backlight, BoardSupport, CoreVoltage, DisplayPanel, TouchController, UsbHost};
use crate::video::VideoFrame;

/// Invité qui enregistre tous les appels reçus
#[derive(Debug, Default, Clone)]
pub struct RecordingGuest {
    pub initialized: bool,
    pub disc_count: usize,
    pub steps: u64,
    pub vsyncs: u64,
    pub ticks: u64,
    pub motions: Vec<(i32, i32, bool)>,
    pub fb_offset: usize,
    /// Le pas numéro `n + 1` échoue
    pub fail_after: Option<u64>,
}

impl GuestMachine for RecordingGuest {
    fn init(&mut self, _ram: &mut [u8], _rom: &[u8], discs: &[DiscDescriptor]) -> Result<()> {
        self.initialized = true;
        self.disc_count = discs.iter().filter(|d| d.is_present()).count();
        Ok(())
    }

    fn step(&mut self, _ram: &mut [u8]) -> Result<()> {
        if self.fail_after == Some(self.steps) {
            return Err(anyhow!("Exception invité au pas {}", self.steps));
        }
        self.steps += 1;
        Ok(())
    }

    fn raise_vsync(&mut self) {
        self.vsyncs += 1;
    }

    fn raise_one_second_tick(&mut self) {
        self.ticks += 1;
    }

    fn inject_relative_motion(&mut self, dx: i32, dy: i32, button: bool) {
        self.motions.push((dx, dy, button));
    }

    fn framebuffer_offset(&self) -> usize {
        self.fb_offset
    }
}

/// Invité de démonstration : bureau tramé et curseur suivant la souris
#[derive(Debug)]
pub struct DemoGuest {
    width: usize,
    height: usize,
    fb_offset: usize,
    cursor: (i32, i32),
    button: bool,
    frame: u64,
}

impl DemoGuest {
    pub fn new(width: u32, height: u32, fb_offset: usize) -> Self {
        Self {
            width: width as usize,
            height: height as usize,
            fb_offset,
            cursor: (width as i32 / 2, height as i32 / 2),
            button: false,
            frame: 0,
        }
    }

    pub fn cursor(&self) -> (i32, i32) {
        self.cursor
    }

    fn fb_bytes(&self) -> usize {
        self.width * self.height / 8
    }

    fn set_pixel(fb: &mut [u8], stride: usize, x: usize, y: usize) {
        fb[y * stride + x / 8] |= 0x80 >> (x % 8);
    }
}

impl GuestMachine for DemoGuest {
    fn init(&mut self, ram: &mut [u8], rom: &[u8], discs: &[DiscDescriptor]) -> Result<()> {
        let end = self.fb_offset + self.fb_bytes();
        if end > ram.len() {
            return Err(anyhow!("Framebuffer hors de la RAM ({:#x} > {:#x})", end, ram.len()));
        }
        debug!(
            "DemoGuest: ROM {} octets, {} disque(s)",
            rom.len(),
            discs.iter().filter(|d| d.is_present()).count()
        );
        Ok(())
    }

    fn step(&mut self, ram: &mut [u8]) -> Result<()> {
        let stride = self.width / 8;
        let fb = &mut ram[self.fb_offset..self.fb_offset + self.fb_bytes()];

        // Trame grise classique, décalée une ligne sur deux
        for (y, row) in fb.chunks_exact_mut(stride).enumerate() {
            row.fill(if y % 2 == 0 { 0xAA } else { 0x55 });
        }

        // Curseur 8x8, plein quand le bouton est appuyé
        let (cx, cy) = self.cursor;
        for dy in 0..8i32 {
            for dx in 0..8i32 {
                let (x, y) = (cx + dx, cy + dy);
                if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
                    continue;
                }
                let border = dx == 0 || dy == 0 || dx == 7 || dy == 7;
                if border || self.button {
                    Self::set_pixel(fb, stride, x as usize, y as usize);
                }
            }
        }
        Ok(())
    }

    fn raise_vsync(&mut self) {
        self.frame += 1;
    }

    fn raise_one_second_tick(&mut self) {
        debug!("DemoGuest: {} vsync(s) reçues", self.frame);
    }

    fn inject_relative_motion(&mut self, dx: i32, dy: i32, button: bool) {
        // dy arrive inversé : on revient à l'axe de l'écran
        self.cursor.0 = (self.cursor.0 + dx).clamp(0, self.width as i32 - 1);
        self.cursor.1 = (self.cursor.1 - dy).clamp(0, self.height as i32 - 1);
        self.button = button;
    }

    fn framebuffer_offset(&self) -> usize {
        self.fb_offset
    }
}

/// Tactile simulé parcourant un cercle, avec un appui toutes les 64 lectures
#[derive(Debug)]
pub struct OrbitTouch {
    center: (i32, i32),
    radius: f32,
    samples: u64,
}

impl OrbitTouch {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            center: (width as i32 / 2, height as i32 / 2),
            radius: (height.min(width) / 3) as f32,
            samples: 0,
        }
    }

    fn angle(&self) -> f32 {
        (self.samples % 3600) as f32 * std::f32::consts::TAU / 3600.0
    }
}

impl TouchController for OrbitTouch {
    fn sample_x(&mut self) -> i32 {
        self.samples += 1;
        self.center.0 + (self.radius * self.angle().cos()) as i32
    }

    fn sample_y(&mut self) -> i32 {
        self.center.1 + (self.radius * self.angle().sin()) as i32
    }

    fn is_pressed(&mut self) -> bool {
        (self.samples / 64) % 2 == 1
    }
}

/// Statistiques partagées d'un écran sans affichage
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PanelStats {
    pub frames: u64,
    pub last_window: (u32, u32, u32, u32),
    pub last_crc32: u32,
}

/// Écran sans affichage : compte les trames et garde leur empreinte
#[derive(Debug, Default, Clone)]
pub struct HeadlessPanel {
    stats: Arc<Mutex<PanelStats>>,
}

impl HeadlessPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> PanelStats {
        *self.stats.lock()
    }
}

impl DisplayPanel for HeadlessPanel {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        let mut stats = self.stats.lock();
        stats.frames += 1;
        stats.last_window = (frame.origin_x, frame.origin_y, frame.x_end(), frame.y_end());
        stats.last_crc32 = crc32fast::hash(frame.as_bytes());
        Ok(())
    }
}

/// Pile USB qui compte les appels de service
#[derive(Debug, Default, Clone)]
pub struct CountingUsb {
    pub pumps: u64,
}

impl UsbHost for CountingUsb {
    fn pump_once(&mut self) {
        self.pumps += 1;
    }
}

#[derive(Debug, Default)]
pub struct SimBacklight {
    pub level: Option<u8>,
}

impl Backlight for SimBacklight {
    fn set_level(&mut self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(anyhow!("Niveau de rétroéclairage invalide: {}", percent));
        }
        self.level = Some(percent);
        Ok(())
    }
}

/// Étape de mise en route enregistrée par [`SimBoard`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BringUpStep {
    CoreVoltage(CoreVoltage),
    SysClockKhz(u32),
    PeripheralClockHz(u32),
    Uart(u32),
    UsbHost,
    Touch,
    Display,
}

/// Carte simulée : journalise la séquence de mise en route
#[derive(Debug, Default)]
pub struct SimBoard {
    pub steps: Vec<BringUpStep>,
    pub backlight: SimBacklight,
    /// Fait échouer l'initialisation de l'écran
    pub fail_display: bool,
}

impl BoardSupport for SimBoard {
    fn set_core_voltage(&mut self, voltage: CoreVoltage) -> Result<()> {
        self.steps.push(BringUpStep::CoreVoltage(voltage));
        Ok(())
    }

    fn set_sys_clock_khz(&mut self, khz: u32) -> Result<()> {
        self.steps.push(BringUpStep::SysClockKhz(khz));
        Ok(())
    }

    fn configure_peripheral_clock(&mut self, hz: u32) -> Result<()> {
        self.steps.push(BringUpStep::PeripheralClockHz(hz));
        Ok(())
    }

    fn init_uart(&mut self, baud: u32) -> Result<()> {
        self.steps.push(BringUpStep::Uart(baud));
        Ok(())
    }

    fn init_usb_host(&mut self) -> Result<()> {
        self.steps.push(BringUpStep::UsbHost);
        Ok(())
    }

    fn init_touch(&mut self) -> Result<()> {
        self.steps.push(BringUpStep::Touch);
        Ok(())
    }

    fn init_display(&mut self) -> Result<()> {
        if self.fail_display {
            return Err(anyhow!("ILI9488 ne répond pas"));
        }
        self.steps.push(BringUpStep::Display);
        Ok(())
    }

    fn backlight(&mut self) -> &mut dyn Backlight {
        &mut self.backlight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_guest_draws_inside_framebuffer() {
        let mut guest = DemoGuest::new(32, 16, 8);
        let mut ram = vec![0u8; 8 + 32 * 16 / 8 + 8];
        guest.init(&mut ram, &[], &[]).unwrap();
        guest.step(&mut ram).unwrap();

        assert!(ram[..8].iter().all(|&b| b == 0));
        assert!(ram[ram.len() - 8..].iter().all(|&b| b == 0));
        assert_eq!(ram[8], 0xAA);
    }

    #[test]
    fn test_demo_guest_cursor_follows_screen_axis() {
        let mut guest = DemoGuest::new(64, 64, 0);
        guest.inject_relative_motion(4, 10, true);
        assert_eq!(guest.cursor(), (36, 22));
    }

    #[test]
    fn test_demo_guest_rejects_small_ram() {
        let mut guest = DemoGuest::new(480, 320, 0);
        let mut ram = vec![0u8; 100];
        assert!(guest.init(&mut ram, &[], &[]).is_err());
    }
}
