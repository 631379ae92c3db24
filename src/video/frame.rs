//! Descripteur de trame vidéo

use super::converter::FramebufferGeometry;

/// Région rectangulaire à pousser vers l'écran, avec son tampon de pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub origin_x: u32,
    pub origin_y: u32,
    pub width: u32,
    pub height: u32,
    pixels: Box<[u16]>,
}

impl VideoFrame {
    /// Trame plein écran
    pub fn full_screen(geometry: FramebufferGeometry, pixels: Box<[u16]>) -> Self {
        debug_assert_eq!(pixels.len(), geometry.pixel_count());
        Self {
            origin_x: 0,
            origin_y: 0,
            width: geometry.width,
            height: geometry.height,
            pixels,
        }
    }

    /// Nombre de pixels du tampon
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Dernière colonne incluse (fenêtre d'adressage de l'écran)
    pub fn x_end(&self) -> u32 {
        self.origin_x + self.width.saturating_sub(1)
    }

    /// Dernière ligne incluse
    pub fn y_end(&self) -> u32 {
        self.origin_y + self.height.saturating_sub(1)
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    /// Vue octets pour le transfert SPI/DMA
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels[..])
    }

    /// Rend le tampon pour réutilisation
    pub fn into_pixels(self) -> Box<[u16]> {
        self.pixels
    }
}
