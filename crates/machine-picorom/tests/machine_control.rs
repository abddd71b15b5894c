//! Control-plane tests: persistence, suspend/resume and the clock
//! counter variant.

use std::time::Duration;

use machine_picorom::{
    BoardConfig, FlashStore, InMemoryFlash, OFFSET_OUT_AREA, OFFSET_TICK_COUNT, OFFSET_TICK_RESET,
    PicoRom, STATUS_CLOCK_READY, VecSink,
};

#[test]
fn boot_restores_the_committed_image_and_config() {
    let mut flash = InMemoryFlash::new();
    {
        let machine = PicoRom::new(BoardConfig::rom_28p());
        machine.set_pointer(0x200);
        machine
            .write_bytes(&[0xCA, 0xFE, 0xF0, 0x0D])
            .expect("in range");
        machine.set_rom_name("diag");
        machine.set_address_mask(0x7FFF);
        machine.commit(&mut flash).expect("flash accepts");
        assert_eq!(flash.rom_writes, 1);
        assert!(machine.is_serving(), "commit resumes the service");
    }

    let machine = PicoRom::boot(BoardConfig::rom_28p(), &flash);
    let port = machine.target_port();
    assert_eq!(port.read(0x200), 0xCA);
    assert_eq!(port.read(0x203), 0x0D);
    assert_eq!(machine.config().rom_name, "diag");
    assert_eq!(machine.address_mask(), 0x7FFF);
}

#[test]
fn commit_does_not_disturb_the_buffer() {
    let mut flash = InMemoryFlash::new();
    let machine = PicoRom::new(BoardConfig::rom_28p());
    machine.set_pointer(0x1000);
    machine.write_bytes(&[0x55; 64]).expect("in range");
    let before = machine.rom().snapshot();

    machine.commit(&mut flash).expect("flash accepts");
    assert_eq!(machine.rom().snapshot(), before);
    assert_eq!(flash.load_rom().expect("committed"), before);
}

#[test]
fn suspend_stops_serving_and_masks_the_detectors() {
    let machine = PicoRom::new(BoardConfig::rom_28p());
    machine.rom().poke(0, 0xA0);
    machine.rom().poke(5, 0x5A);
    let base = machine.comms_start(0x8000).expect("detectors resident");
    let port = machine.target_port();
    assert_eq!(port.read(0), 0xA0);

    let guard = machine.suspend();
    assert!(!machine.is_serving());
    // The latch no longer follows the address lines.
    assert_eq!(port.read(5), 0xA0);
    // A push during suspension is captured but not delivered.
    port.read(base + OFFSET_OUT_AREA + 1);
    assert_eq!(machine.comms().outbound_count(), 0);

    drop(guard);
    assert!(machine.is_serving());
    assert_eq!(port.read(5), 0x5A);
    // The captured push was delivered on the first access after resume.
    assert_eq!(machine.comms().outbound_count(), 1);
    let mut sink = VecSink::new();
    machine
        .comms_update(&[], Duration::ZERO, &mut sink)
        .expect("drain only");
    assert_eq!(sink.bytes, [1]);
}

#[test]
fn concurrent_ports_each_read_their_own_byte() {
    let machine = PicoRom::new(BoardConfig::rom_28p());
    machine.rom().poke(0x100, 0xAA);
    machine.rom().poke(0x200, 0xBB);

    // Two target handles hammering different addresses must never see
    // each other's bytes: a bus cycle is indivisible.
    let mut readers = Vec::new();
    for &(addr, expected) in &[(0x100u32, 0xAAu8), (0x200, 0xBB)] {
        let port = machine.target_port();
        readers.push(std::thread::spawn(move || {
            for _ in 0..10_000 {
                assert_eq!(port.read(addr), expected);
            }
        }));
    }
    for reader in readers {
        reader.join().expect("reader thread");
    }
}

#[test]
fn clock_variant_counts_accesses_and_resets() {
    let board = BoardConfig::rom_28p().with_clock_counting(true);
    let machine = PicoRom::new(board);
    assert_ne!(machine.status() & STATUS_CLOCK_READY, 0);

    // The wider window forces 1 KiB alignment.
    let base = machine.comms_start(0x12345).expect("detectors resident");
    assert_eq!(base, 0x12000);

    let port = machine.target_port();
    for _ in 0..5 {
        port.read(base);
    }
    assert_eq!(machine.rom().read_u32_le(base + OFFSET_TICK_COUNT), 5);

    port.read(base + OFFSET_TICK_RESET);
    assert_eq!(machine.rom().read_u32_le(base + OFFSET_TICK_COUNT), 0);
    port.read(base);
    assert_eq!(machine.rom().read_u32_le(base + OFFSET_TICK_COUNT), 1);
}
