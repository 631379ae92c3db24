//! Interface de contrôle de la machine invitée (cœur umac)
//!
//! L'exécution des instructions et les périphériques émulés sont hors de ce
//! crate ; seul le contrat d'appel est décrit ici.

use anyhow::Result;

use crate::disc::DiscDescriptor;

/// Contrat d'appel du cœur émulé
pub trait GuestMachine: Send {
    /// Initialise la machine avec sa RAM, la ROM (déjà patchée) et les disques
    fn init(&mut self, ram: &mut [u8], rom: &[u8], discs: &[DiscDescriptor]) -> Result<()>;

    /// Avance la machine d'un quantum d'ordonnancement
    ///
    /// Une erreur ici est fatale pour tout le système.
    fn step(&mut self, ram: &mut [u8]) -> Result<()>;

    /// Signale une synchronisation verticale
    fn raise_vsync(&mut self);

    /// Signale le tick d'une seconde (horloge temps réel)
    fn raise_one_second_tick(&mut self);

    /// Injecte un mouvement relatif de la souris et l'état du bouton
    fn inject_relative_motion(&mut self, dx: i32, dy: i32, button: bool);

    /// Offset du framebuffer 1bpp dans la RAM invitée
    fn framebuffer_offset(&self) -> usize;
}
