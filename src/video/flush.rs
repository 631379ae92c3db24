//! File de vidage et tâche de fin de transfert
//!
//! Deux tampons de pixels circulent entre la pompe et la tâche de vidage.
//! Un tampon soumis n'est rendu à la pompe qu'une fois le transfert terminé.

use anyhow::{anyhow, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, info};
use std::time::Duration;

use super::frame::VideoFrame;
use crate::hal::DisplayPanel;
use crate::scheduler::StopToken;

/// Profondeur de la file de vidage (double tampon)
pub const FLUSH_QUEUE_DEPTH: usize = 2;

/// Attente maximale sur la file avant de revérifier le signal d'arrêt
pub const QUEUE_WAIT: Duration = Duration::from_millis(20);

/// File entre la pompe d'affichage et la tâche de vidage
#[derive(Debug, Clone)]
pub struct FlushQueue {
    to_flush_tx: Sender<VideoFrame>,
    to_flush_rx: Receiver<VideoFrame>,
    free_tx: Sender<Box<[u16]>>,
    free_rx: Receiver<Box<[u16]>>,
}

impl FlushQueue {
    /// Crée la file et ses `buffers` tampons de `pixel_count` pixels
    pub fn new(pixel_count: usize, buffers: usize) -> Self {
        let (to_flush_tx, to_flush_rx) = channel::bounded(buffers);
        let (free_tx, free_rx) = channel::bounded(buffers);
        for _ in 0..buffers {
            // Capacité égale au nombre de tampons : l'envoi ne peut échouer
            let _ = free_tx.try_send(vec![0u16; pixel_count].into_boxed_slice());
        }
        Self {
            to_flush_tx,
            to_flush_rx,
            free_tx,
            free_rx,
        }
    }

    /// Prend un tampon libre ; `None` si aucun ne s'est libéré à temps
    pub fn acquire_buffer(&self, wait: Duration) -> Result<Option<Box<[u16]>>> {
        match self.free_rx.recv_timeout(wait) {
            Ok(buffer) => Ok(Some(buffer)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("File de vidage fermée")),
        }
    }

    /// Soumission asynchrone : retourne immédiatement
    pub fn submit(&self, frame: VideoFrame) -> Result<()> {
        match self.to_flush_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(anyhow!("File de vidage pleine")),
            Err(TrySendError::Disconnected(_)) => Err(anyhow!("File de vidage fermée")),
        }
    }

    /// Prochaine trame à transférer
    pub fn next_frame(&self, wait: Duration) -> Result<Option<VideoFrame>> {
        match self.to_flush_rx.recv_timeout(wait) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("File de vidage fermée")),
        }
    }

    /// Signale la fin d'un transfert en rendant son tampon
    pub fn release(&self, buffer: Box<[u16]>) -> Result<()> {
        self.free_tx
            .try_send(buffer)
            .map_err(|_| anyhow!("Tampon rendu en trop dans la file de vidage"))
    }

    /// Trames soumises et pas encore prises par la tâche de vidage
    pub fn pending_frames(&self) -> usize {
        self.to_flush_rx.len()
    }

    /// Tampons disponibles pour la pompe
    pub fn free_buffers(&self) -> usize {
        self.free_rx.len()
    }
}

/// Tâche de fin de vidage : transfère les trames et libère les tampons
pub struct FlushTask<P: DisplayPanel> {
    panel: P,
    queue: FlushQueue,
    frames_flushed: u64,
}

impl<P: DisplayPanel> FlushTask<P> {
    pub fn new(panel: P, queue: FlushQueue) -> Self {
        Self {
            panel,
            queue,
            frames_flushed: 0,
        }
    }

    pub fn frames_flushed(&self) -> u64 {
        self.frames_flushed
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    /// Transfère une trame si elle arrive dans le délai ; renvoie `true` si c'est le cas
    pub fn flush_once(&mut self, wait: Duration) -> Result<bool> {
        let Some(frame) = self.queue.next_frame(wait)? else {
            return Ok(false);
        };
        self.panel.write_frame(&frame)?;
        self.queue.release(frame.into_pixels())?;
        self.frames_flushed += 1;
        Ok(true)
    }

    pub fn run(mut self, stop: StopToken) -> Result<()> {
        debug!("Tâche de vidage démarrée");
        while !stop.is_stopped() {
            self.flush_once(QUEUE_WAIT)?;
        }
        info!("Tâche de vidage arrêtée après {} trames", self.frames_flushed);
        Ok(())
    }
}
