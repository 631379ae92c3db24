//! Tests de la conversion et du vidage vidéo
//!
//! Ces tests valident la chaîne framebuffer → pixels → écran sans matériel.

use pico_umac_rust::sim::HeadlessPanel;
use pico_umac_rust::*;
use std::thread;
use std::time::Duration;

#[test]
fn test_configured_geometry_all_zero_and_all_ones() {
    let config = SystemConfig::default();
    let geometry = FramebufferGeometry::new(config.display.width, config.display.height);
    let mut pixels = vec![0u16; geometry.pixel_count()];

    convert_framebuffer(&vec![0x00; config.framebuffer_bytes()], &mut pixels, geometry).unwrap();
    assert!(pixels.iter().all(|&p| p == PIXEL_CLEAR));

    convert_framebuffer(&vec![0xFF; config.framebuffer_bytes()], &mut pixels, geometry).unwrap();
    assert!(pixels.iter().all(|&p| p == PIXEL_SET));
}

#[test]
fn test_every_bit_maps_to_its_pixel() {
    let geometry = FramebufferGeometry::new(32, 3);
    let mut src = vec![0u8; geometry.source_bytes()];
    // Un pixel allumé par ligne, à une colonne différente
    let lit = [(0usize, 3usize), (1, 17), (2, 31)];
    for &(y, x) in &lit {
        src[y * 4 + x / 8] |= 0x80 >> (x % 8);
    }

    let mut pixels = vec![0u16; geometry.pixel_count()];
    convert_framebuffer(&src, &mut pixels, geometry).unwrap();

    for y in 0..3 {
        for x in 0..32 {
            let expected = if lit.contains(&(y, x)) { PIXEL_SET } else { PIXEL_CLEAR };
            assert_eq!(pixels[y * 32 + x], expected, "pixel ({}, {})", x, y);
        }
    }
}

#[test]
fn test_non_multiple_of_16_width_is_rejected() {
    for width in [8u32, 20, 100, 481] {
        let geometry = FramebufferGeometry::new(width, 2);
        let src = vec![0u8; geometry.source_bytes() + 2];
        let mut pixels = vec![0u16; geometry.pixel_count()];
        assert_eq!(
            convert_framebuffer(&src, &mut pixels, geometry),
            Err(ConversionError::UnsupportedWidth(width))
        );
    }
}

#[test]
fn test_flush_task_on_its_own_thread() {
    let geometry = FramebufferGeometry::new(16, 4);
    let memory = GuestMemory::new(256);
    memory.load_data(64, &[0xF0; 8]).unwrap();
    memory.set_framebuffer_offset(64);

    let queue = FlushQueue::new(geometry.pixel_count(), FLUSH_QUEUE_DEPTH);
    let panel = HeadlessPanel::new();
    let stop = StopToken::new();

    let flush = FlushTask::new(panel.clone(), queue.clone());
    let flush_stop = stop.clone();
    let handle = thread::spawn(move || flush.run(flush_stop));

    let mut pump = DisplayPump::new(sim::CountingUsb::default(), memory, queue, geometry);
    let mut submitted = 0;
    while submitted < 10 {
        if pump.pump_once(Duration::from_millis(100)).unwrap() == PumpOutcome::Submitted {
            submitted += 1;
        }
    }

    while panel.stats().frames < 10 {
        thread::sleep(Duration::from_millis(1));
    }
    stop.stop();
    handle.join().unwrap().unwrap();

    let stats = panel.stats();
    assert_eq!(stats.frames, 10);
    assert_eq!(stats.last_window, (0, 0, 15, 3));
}
