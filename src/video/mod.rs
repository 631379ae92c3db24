//! Chaîne vidéo : conversion du framebuffer invité et vidage vers l'écran
//!
//! Le framebuffer 1bpp de l'invité est converti en pixels 16 bits dans un des
//! deux tampons de la pompe, puis soumis à la file de vidage. La tâche de
//! vidage transfère la trame à l'écran et rend le tampon, ce qui autorise sa
//! réutilisation.

pub mod converter;
pub mod frame;
pub mod flush;
pub mod pump;

pub use converter::*;
pub use frame::*;
pub use flush::*;
pub use pump::*;
