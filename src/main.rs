use anyhow::{Context, Result};
use log::info;
use pico_umac_rust::sim::{CountingUsb, DemoGuest, HeadlessPanel, OrbitTouch, SimBoard};
use pico_umac_rust::*;
use std::env;
use std::thread;
use std::time::Duration;

/// ROM de secours quand aucune ROM n'est fournie
static BUILTIN_ROM: [u8; 128 * 1024] = [0; 128 * 1024];

/// Image disque « compilée » de la version hôte
static BUILTIN_DISC: [u8; 400 * 1024] = [0; 400 * 1024];

fn main() -> Result<()> {
    env_logger::init();
    info!("Pico umac Rust v{}", VERSION);

    // Traitement simple des arguments
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<String> = None;
    let mut rom_path: Option<String> = None;
    let mut disc_path: Option<String> = None;
    let mut seconds: u64 = 3;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match (args[i].as_str(), value) {
            ("--config", Some(v)) => config_path = Some(v),
            ("--rom", Some(v)) => rom_path = Some(v),
            ("--disc", Some(v)) => disc_path = Some(v),
            ("--seconds", Some(v)) => {
                seconds = v.parse().with_context(|| format!("Durée invalide: {}", v))?
            }
            (other, _) => {
                eprintln!("Argument inconnu ou incomplet: {}", other);
                eprintln!("Usage: pico-umac-rust [--config f.toml] [--rom rom.bin] [--disc disc.img] [--seconds n]");
                std::process::exit(2);
            }
        }
        i += 2;
    }

    let mut config = match &config_path {
        Some(path) => SystemConfig::load_from_file(path)?,
        None => SystemConfig::default(),
    };
    if disc_path.is_some() {
        config.disc.image_path = disc_path;
    }

    let rom: &'static [u8] = match &rom_path {
        Some(path) => {
            let data = std::fs::read(path).with_context(|| format!("ROM {} illisible", path))?;
            Box::leak(data.into_boxed_slice())
        }
        None => &BUILTIN_ROM,
    };

    let width = config.display.width;
    let height = config.display.height;
    let fb_offset = config
        .memory
        .ram_size
        .checked_sub(MAC_PLUS_FB_OFFSET_FROM_END)
        .context("RAM trop petite pour le framebuffer du Mac Plus")?;

    let mut orchestrator = Orchestrator::new(config)?;
    orchestrator.configure_hardware(&mut SimBoard::default())?;

    let panel = HeadlessPanel::new();
    orchestrator.create_tasks(
        SystemParts {
            guest: DemoGuest::new(width, height, fb_offset),
            clock: MonotonicClock::new(),
            touch: OrbitTouch::new(width, height),
            usb: CountingUsb::default(),
            panel: panel.clone(),
        },
        FirmwareImages { rom, disc: &BUILTIN_DISC },
    )?;

    // Sur cible l'ordonnanceur ne rend jamais la main ; ici on l'arrête au bout du délai
    let stop = orchestrator.stop_token();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(seconds));
        stop.stop();
    });

    let scheduler = Box::new(ThreadScheduler::new(orchestrator.stop_token()));
    orchestrator.start(scheduler)?;

    let stats = panel.stats();
    info!(
        "{} trames affichées, fenêtre {:?}, crc32 dernière trame {:#010x}",
        stats.frames, stats.last_window, stats.last_crc32
    );
    Ok(())
}
