//! Descripteurs de disques fournis à l'invité
//!
//! Le lecteur 0 reçoit par défaut l'image disque compilée dans le firmware.
//! Une image alternative peut être projetée en mémoire depuis un fichier.

use log::info;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Nombre de lecteurs exposés à l'invité
pub const DISC_NUM_DRIVES: usize = 2;

/// Erreurs de préparation des disques
#[derive(Debug, Error)]
pub enum DiscError {
    #[error("image disque {path} illisible: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("image disque {0} vide")]
    EmptyImage(String),
}

/// Descripteur d'un lecteur : base, taille et protection en écriture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscDescriptor {
    image: &'static [u8],
    read_only: bool,
}

impl Default for DiscDescriptor {
    fn default() -> Self {
        Self {
            image: &[],
            read_only: false,
        }
    }
}

impl DiscDescriptor {
    pub fn read_only(image: &'static [u8]) -> Self {
        Self {
            image,
            read_only: true,
        }
    }

    pub fn base(&self) -> *const u8 {
        self.image.as_ptr()
    }

    pub fn size(&self) -> usize {
        self.image.len()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Un lecteur vide a une taille nulle
    pub fn is_present(&self) -> bool {
        !self.image.is_empty()
    }

    pub fn data(&self) -> &'static [u8] {
        self.image
    }
}

/// Table des lecteurs, remplie une fois au démarrage
pub type DiscTable = [DiscDescriptor; DISC_NUM_DRIVES];

/// Projette une image disque en mémoire pour toute la durée du processus
pub fn map_image(path: &Path) -> Result<&'static [u8], DiscError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|source| DiscError::Io {
        path: display.clone(),
        source,
    })?;
    let len = file
        .metadata()
        .map_err(|source| DiscError::Io {
            path: display.clone(),
            source,
        })?
        .len();
    if len == 0 {
        return Err(DiscError::EmptyImage(display));
    }
    // SAFETY: l'image est montée en lecture seule et n'est pas censée
    // être modifiée par un autre processus pendant l'exécution.
    let map = unsafe { Mmap::map(&file) }.map_err(|source| DiscError::Io { path: display, source })?;
    let map: &'static Mmap = Box::leak(Box::new(map));
    Ok(&map[..])
}

/// Prépare la table des lecteurs
///
/// Sans image alternative, le lecteur 0 pointe sur l'image compilée, en
/// lecture seule.
pub fn setup_discs(compiled: &'static [u8], alternate: Option<&Path>) -> Result<DiscTable, DiscError> {
    let mut discs: DiscTable = Default::default();

    let (image, source) = match alternate {
        Some(path) => (map_image(path)?, path.display().to_string()),
        None => (compiled, "flash".to_string()),
    };
    discs[0] = DiscDescriptor::read_only(image);

    info!(
        "Disque 0: {} ({} octets, crc32 {:#010x}, lecture seule)",
        source,
        image.len(),
        crc32fast::hash(image)
    );
    Ok(discs)
}
