//! RAM de la machine invitée
//!
//! Arène d'octets de taille fixe, initialisée à zéro. La boucle de pilotage de
//! l'invité est le seul écrivain (pendant `step`). La pompe d'affichage, sur
//! l'autre cœur, ne fait que copier la région du framebuffer sous un verrou de
//! lecture bref.

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const NO_FRAMEBUFFER: usize = usize::MAX;

#[derive(Debug)]
struct Shared {
    data: RwLock<Box<[u8]>>,
    size: usize,
    fb_offset: AtomicUsize,
}

/// Poignée partagée vers la RAM invitée
#[derive(Debug, Clone)]
pub struct GuestMemory {
    shared: Arc<Shared>,
}

impl GuestMemory {
    /// Crée une RAM de `size` octets remplie de zéros
    pub fn new(size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                data: RwLock::new(vec![0; size].into_boxed_slice()),
                size,
                fb_offset: AtomicUsize::new(NO_FRAMEBUFFER),
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Accès exclusif à la RAM, réservé à la boucle de l'invité
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut data = self.shared.data.write();
        f(&mut data)
    }

    /// Accès en lecture à la RAM
    pub fn with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.shared.data.read();
        f(&data)
    }

    /// Charge des données dans la RAM à partir d'un offset
    pub fn load_data(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_bounds(offset, bytes.len())?;
        self.with_mut(|ram| ram[offset..offset + bytes.len()].copy_from_slice(bytes));
        Ok(())
    }

    /// Copie `dst.len()` octets depuis `offset`
    pub fn read_into(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.check_bounds(offset, dst.len())?;
        self.with(|ram| dst.copy_from_slice(&ram[offset..offset + dst.len()]));
        Ok(())
    }

    /// Publie l'offset du framebuffer rapporté par l'invité
    pub fn set_framebuffer_offset(&self, offset: usize) {
        self.shared.fb_offset.store(offset, Ordering::Release);
    }

    /// Offset du framebuffer, `None` tant que l'invité n'est pas initialisé
    pub fn framebuffer_offset(&self) -> Option<usize> {
        match self.shared.fb_offset.load(Ordering::Acquire) {
            NO_FRAMEBUFFER => None,
            offset => Some(offset),
        }
    }

    /// Copie le framebuffer courant dans `dst` (instantané cohérent)
    pub fn snapshot_framebuffer(&self, dst: &mut [u8]) -> Result<()> {
        let offset = self
            .framebuffer_offset()
            .ok_or_else(|| anyhow!("Framebuffer invité pas encore publié"))?;
        self.read_into(offset, dst)
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.shared.size => Ok(()),
            _ => Err(anyhow!(
                "Accès mémoire hors limites: {:#08x} + {} > {:#08x}",
                offset,
                len,
                self.shared.size
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_initialized() {
        let memory = GuestMemory::new(4096);
        assert_eq!(memory.size(), 4096);
        memory.with(|ram| assert!(ram.iter().all(|&b| b == 0)));
    }

    #[test]
    fn test_load_and_read_back() {
        let memory = GuestMemory::new(64);
        memory.load_data(8, &[1, 2, 3, 4]).unwrap();
        let mut out = [0u8; 4];
        memory.read_into(8, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let memory = GuestMemory::new(16);
        assert!(memory.load_data(14, &[0; 4]).is_err());
        let mut out = [0u8; 2];
        assert!(memory.read_into(usize::MAX, &mut out).is_err());
    }

    #[test]
    fn test_framebuffer_snapshot_requires_offset() {
        let memory = GuestMemory::new(32);
        let mut out = [0u8; 4];
        assert!(memory.snapshot_framebuffer(&mut out).is_err());

        memory.load_data(16, &[0xAA; 4]).unwrap();
        memory.set_framebuffer_offset(16);
        assert_eq!(memory.framebuffer_offset(), Some(16));
        memory.snapshot_framebuffer(&mut out).unwrap();
        assert_eq!(out, [0xAA; 4]);
    }
}
