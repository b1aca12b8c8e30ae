use flash_engine::{FlashDevice, FlashEngine, Request};

const SECTOR: usize = 65536;

struct MemDevice {
    flash: Vec<u8>,
    erase_calls: u32,
    program_calls: u32,
}

impl MemDevice {
    fn erased(sectors: usize) -> Self {
        Self { flash: vec![0xFFu8; sectors * SECTOR], erase_calls: 0, program_calls: 0 }
    }
}

impl FlashDevice for MemDevice {
    type Error = &'static str;

    fn read(&mut self, src_addr: u32, dst: &mut [u8]) -> Result<(), Self::Error> {
        let start = src_addr as usize;
        dst.copy_from_slice(&self.flash[start..start + dst.len()]);
        Ok(())
    }

    fn erase_sector(&mut self, sector_base: u32) -> Result<(), Self::Error> {
        self.erase_calls += 1;
        let start = sector_base as usize;
        self.flash[start..start + SECTOR].fill(0xFF);
        Ok(())
    }

    fn program_block(&mut self, dst_addr: u32, src: &[u8]) -> Result<(), Self::Error> {
        self.program_calls += 1;
        let start = dst_addr as usize;
        self.flash[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }
}

fn byte_at_a_time_read(engine: &mut FlashEngine<MemDevice, SECTOR>, addr: u32, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let mut one = [0u8; 1];
        engine.engine_read(addr + i as u32, &mut one).unwrap();
        out.push(one[0]);
    }
    out
}

#[test]
fn read_fidelity_matches_byte_at_a_time() {
    let mut engine: FlashEngine<MemDevice, SECTOR> = FlashEngine::new(MemDevice::erased(2));
    let data: Vec<u8> = (0..200u32).map(|i| (i * 7) as u8).collect();
    engine.engine_write(40, Request::Program(&data)).unwrap();

    let mut bulk = vec![0u8; 200];
    engine.engine_read(40, &mut bulk).unwrap();

    let piecemeal = byte_at_a_time_read(&mut engine, 40, 200);
    assert_eq!(bulk, piecemeal);
}

#[test]
fn erase_fidelity_leaves_neighbors_untouched() {
    let mut engine: FlashEngine<MemDevice, SECTOR> = FlashEngine::new(MemDevice::erased(1));
    engine.engine_write(0, Request::Program(&[0x5Au8; SECTOR])).unwrap();

    engine.engine_erase(1000, 200).unwrap();

    let mut erased = [0u8; 200];
    engine.engine_read(1000, &mut erased).unwrap();
    assert!(erased.iter().all(|&b| b == 0xFF));

    let mut before = [0u8; 1000];
    engine.engine_read(0, &mut before).unwrap();
    assert!(before.iter().all(|&b| b == 0x5A));

    let mut after = [0u8; 50];
    engine.engine_read(1200, &mut after).unwrap();
    assert!(after.iter().all(|&b| b == 0x5A));
}

#[test]
fn write_read_round_trips_at_every_boundary_length() {
    for len in [0usize, 1, SECTOR - 1, SECTOR, SECTOR + 1, 2 * SECTOR] {
        let mut engine: FlashEngine<MemDevice, SECTOR> = FlashEngine::new(MemDevice::erased(len / SECTOR + 2));
        let data: Vec<u8> = (0..len).map(|i| (i % 233) as u8).collect();
        engine.engine_write(0, Request::Program(&data)).unwrap();

        let mut out = vec![0u8; len];
        engine.engine_read(0, &mut out).unwrap();
        assert_eq!(out, data, "round trip failed at len={len}");
    }
}

#[test]
fn the_scenario_from_the_wire_protocol_walkthrough() {
    // "F 00020000 00001000 000A0000" — 4096 bytes at 0x20000 summing to 0xA0000.
    let mut engine: FlashEngine<MemDevice, SECTOR> = FlashEngine::new(MemDevice::erased(4));
    let payload = vec![0x28u8; 4096]; // 0x28 * 4096 == 0xA0000
    let checksum: u32 = payload.iter().map(|&b| b as u32).sum();
    assert_eq!(checksum, 0x000A_0000);

    engine.engine_write(0x0002_0000, Request::Program(&payload)).unwrap();

    let mut out = vec![0u8; 4096];
    engine.engine_read(0x0002_0000, &mut out).unwrap();
    assert_eq!(out, payload);
}
