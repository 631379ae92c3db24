//! Pompe d'affichage : service USB, conversion et soumission plein écran

use anyhow::Result;
use log::{debug, info};
use std::thread;
use std::time::Duration;

use super::converter::{convert_framebuffer, FramebufferGeometry};
use super::flush::{FlushQueue, QUEUE_WAIT};
use super::frame::VideoFrame;
use crate::hal::UsbHost;
use crate::memory::GuestMemory;
use crate::scheduler::StopToken;

/// Résultat d'une itération de la pompe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Une trame plein écran a été soumise
    Submitted,
    /// Les deux tampons sont encore en vol
    BufferBusy,
    /// L'invité n'a pas encore publié son framebuffer
    GuestNotReady,
}

pub struct DisplayPump<U: UsbHost> {
    usb: U,
    memory: GuestMemory,
    queue: FlushQueue,
    geometry: FramebufferGeometry,
    staging: Vec<u8>,
    frames_submitted: u64,
}

impl<U: UsbHost> DisplayPump<U> {
    pub fn new(usb: U, memory: GuestMemory, queue: FlushQueue, geometry: FramebufferGeometry) -> Self {
        Self {
            usb,
            memory,
            queue,
            geometry,
            staging: vec![0; geometry.source_bytes()],
            frames_submitted: 0,
        }
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Une itération : service USB, puis conversion et soumission si un tampon est libre
    pub fn pump_once(&mut self, wait: Duration) -> Result<PumpOutcome> {
        self.usb.pump_once();

        if self.memory.framebuffer_offset().is_none() {
            return Ok(PumpOutcome::GuestNotReady);
        }
        let Some(mut pixels) = self.queue.acquire_buffer(wait)? else {
            return Ok(PumpOutcome::BufferBusy);
        };

        // Instantané sous verrou de lecture, conversion hors verrou
        let converted = self
            .memory
            .snapshot_framebuffer(&mut self.staging)
            .and_then(|()| Ok(convert_framebuffer(&self.staging, &mut pixels, self.geometry)?));
        if let Err(e) = converted {
            // Le tampon retourne au pool, sinon la rotation perd un slot
            self.queue.release(pixels)?;
            return Err(e);
        }

        self.queue.submit(VideoFrame::full_screen(self.geometry, pixels))?;
        self.frames_submitted += 1;
        Ok(PumpOutcome::Submitted)
    }

    pub fn run(mut self, stop: StopToken) -> Result<()> {
        debug!("Pompe d'affichage démarrée ({}x{})", self.geometry.width, self.geometry.height);
        while !stop.is_stopped() {
            if self.pump_once(QUEUE_WAIT)? == PumpOutcome::GuestNotReady {
                thread::yield_now();
            }
        }
        info!("Pompe d'affichage arrêtée après {} trames", self.frames_submitted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::CountingUsb;
    use crate::video::{FlushQueue, FLUSH_QUEUE_DEPTH};

    fn setup(geometry: FramebufferGeometry) -> (GuestMemory, FlushQueue, DisplayPump<CountingUsb>) {
        let memory = GuestMemory::new(1024);
        let queue = FlushQueue::new(geometry.pixel_count(), FLUSH_QUEUE_DEPTH);
        let pump = DisplayPump::new(CountingUsb::default(), memory.clone(), queue.clone(), geometry);
        (memory, queue, pump)
    }

    #[test]
    fn test_waits_for_guest_framebuffer() {
        let geometry = FramebufferGeometry::new(16, 2);
        let (_memory, queue, mut pump) = setup(geometry);
        assert_eq!(pump.pump_once(Duration::ZERO).unwrap(), PumpOutcome::GuestNotReady);
        assert_eq!(pump.usb.pumps, 1);
        assert_eq!(queue.free_buffers(), FLUSH_QUEUE_DEPTH);
    }

    #[test]
    fn test_submits_converted_full_screen_frame() {
        let geometry = FramebufferGeometry::new(16, 2);
        let (memory, queue, mut pump) = setup(geometry);
        memory.load_data(100, &[0xFF, 0x00, 0x00, 0xFF]).unwrap();
        memory.set_framebuffer_offset(100);

        assert_eq!(pump.pump_once(Duration::ZERO).unwrap(), PumpOutcome::Submitted);
        let frame = queue.next_frame(Duration::ZERO).unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (16, 2));
        assert!(frame.pixels()[..8].iter().all(|&p| p == 0x0000));
        assert!(frame.pixels()[8..24].iter().all(|&p| p == 0xFFFF));
        assert!(frame.pixels()[24..].iter().all(|&p| p == 0x0000));
    }

    #[test]
    fn test_never_reuses_buffer_in_flight() {
        let geometry = FramebufferGeometry::new(16, 1);
        let (memory, queue, mut pump) = setup(geometry);
        memory.set_framebuffer_offset(0);

        assert_eq!(pump.pump_once(Duration::ZERO).unwrap(), PumpOutcome::Submitted);
        assert_eq!(pump.pump_once(Duration::ZERO).unwrap(), PumpOutcome::Submitted);
        // Aucun transfert terminé : la pompe doit attendre
        assert_eq!(pump.pump_once(Duration::ZERO).unwrap(), PumpOutcome::BufferBusy);
        assert_eq!(pump.frames_submitted(), 2);

        let frame = queue.next_frame(Duration::ZERO).unwrap().unwrap();
        queue.release(frame.into_pixels()).unwrap();
        assert_eq!(pump.pump_once(Duration::ZERO).unwrap(), PumpOutcome::Submitted);
        assert_eq!(pump.usb.pumps, 4);
    }

    #[test]
    fn test_failed_snapshot_returns_buffer_to_pool() {
        let geometry = FramebufferGeometry::new(16, 4);
        let memory = GuestMemory::new(64);
        let queue = FlushQueue::new(geometry.pixel_count(), FLUSH_QUEUE_DEPTH);
        let mut pump = DisplayPump::new(CountingUsb::default(), memory.clone(), queue.clone(), geometry);

        // Framebuffer publié trop près de la fin de la RAM
        memory.set_framebuffer_offset(60);
        assert!(pump.pump_once(Duration::ZERO).is_err());
        assert!(pump.pump_once(Duration::ZERO).is_err());
        assert_eq!(queue.free_buffers() + queue.pending_frames(), FLUSH_QUEUE_DEPTH);

        memory.set_framebuffer_offset(0);
        assert_eq!(pump.pump_once(Duration::ZERO).unwrap(), PumpOutcome::Submitted);
        assert_eq!(pump.frames_submitted(), 1);
    }
}
