//! Conversion 1bpp (MSB en premier) vers pixels 16 bits

use thiserror::Error;

/// Pixel d'un bit à 1 (noir côté invité)
pub const PIXEL_SET: u16 = 0x0000;

/// Pixel d'un bit à 0 (blanc côté invité)
pub const PIXEL_CLEAR: u16 = 0xFFFF;

/// Pixels produits par pas de conversion (deux octets source)
pub const PIXELS_PER_STEP: u32 = 16;

/// Erreurs de géométrie détectées avant toute écriture
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("géométrie vide: {width}x{height}")]
    EmptyGeometry { width: u32, height: u32 },

    #[error("largeur {0} non multiple de 16 pixels")]
    UnsupportedWidth(u32),

    #[error("source trop courte: {found} octets, {expected} attendus")]
    SourceTooShort { expected: usize, found: usize },

    #[error("taille de destination incorrecte: {found} pixels, {expected} attendus")]
    DestinationSizeMismatch { expected: usize, found: usize },
}

/// Dimensions du framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferGeometry {
    pub width: u32,
    pub height: u32,
}

impl FramebufferGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Octets du framebuffer packé
    pub fn source_bytes(&self) -> usize {
        self.pixel_count() / 8
    }

    pub fn validate(&self) -> Result<(), ConversionError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConversionError::EmptyGeometry {
                width: self.width,
                height: self.height,
            });
        }
        if self.width % PIXELS_PER_STEP != 0 {
            return Err(ConversionError::UnsupportedWidth(self.width));
        }
        Ok(())
    }
}

#[inline(always)]
fn expand_byte(byte: u8, out: &mut [u16]) {
    for (i, pixel) in out.iter_mut().enumerate() {
        *pixel = if byte & (0x80 >> i) != 0 { PIXEL_SET } else { PIXEL_CLEAR };
    }
}

/// Convertit un framebuffer 1bpp en pixels 16 bits, dans l'ordre de balayage
///
/// Les tailles sont vérifiées avant d'écrire quoi que ce soit ; une largeur
/// non multiple de 16 n'est pas prise en charge.
pub fn convert_framebuffer(
    src: &[u8],
    dst: &mut [u16],
    geometry: FramebufferGeometry,
) -> Result<(), ConversionError> {
    geometry.validate()?;

    let expected_src = geometry.source_bytes();
    if src.len() < expected_src {
        return Err(ConversionError::SourceTooShort {
            expected: expected_src,
            found: src.len(),
        });
    }
    let expected_dst = geometry.pixel_count();
    if dst.len() != expected_dst {
        return Err(ConversionError::DestinationSizeMismatch {
            expected: expected_dst,
            found: dst.len(),
        });
    }

    // Chaque ligne fait un nombre pair d'octets : les paires ne chevauchent
    // jamais deux lignes.
    for (pair, out) in src[..expected_src]
        .chunks_exact(2)
        .zip(dst.chunks_exact_mut(PIXELS_PER_STEP as usize))
    {
        let (lo, hi) = out.split_at_mut(8);
        expand_byte(pair[0], lo);
        expand_byte(pair[1], hi);
    }
    Ok(())
}
