use crate::device::FlashDevice;

/// Single-slot, write-through-on-demand buffer holding the most recently
/// accessed sector's bytes and its base address.
///
/// `SECTOR_BYTES` is a const generic so the buffer lives inline (no heap,
/// no `no_std` allocator needed) and is sized exactly to one sector.
pub struct SectorCache<const SECTOR_BYTES: usize> {
    buffer: [u8; SECTOR_BYTES],
    cached_addr: Option<u32>,
}

impl<const SECTOR_BYTES: usize> SectorCache<SECTOR_BYTES> {
    pub const fn new() -> Self {
        Self {
            buffer: [0; SECTOR_BYTES],
            cached_addr: None,
        }
    }

    /// Fills the buffer with `sector_base`'s contents unless it is already
    /// cached. On device failure the cache is marked invalid and the error
    /// is returned to the caller.
    pub fn ensure<D: FlashDevice>(&mut self, device: &mut D, sector_base: u32) -> Result<(), D::Error> {
        if self.cached_addr == Some(sector_base) {
            return Ok(());
        }
        match device.read(sector_base, &mut self.buffer) {
            Ok(()) => {
                self.cached_addr = Some(sector_base);
                Ok(())
            }
            Err(e) => {
                self.cached_addr = None;
                Err(e)
            }
        }
    }

    /// Drops the cache if it currently holds `sector_base`. No-op otherwise.
    pub fn invalidate_if(&mut self, sector_base: u32) {
        if self.cached_addr == Some(sector_base) {
            self.cached_addr = None;
        }
    }

    pub fn buffer(&mut self) -> &mut [u8; SECTOR_BYTES] {
        &mut self.buffer
    }

    pub fn cached_addr(&self) -> Option<u32> {
        self.cached_addr
    }
}

impl<const SECTOR_BYTES: usize> Default for SectorCache<SECTOR_BYTES> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeDevice {
        flash: std::vec::Vec<u8>,
        reads: u32,
    }

    impl FlashDevice for FakeDevice {
        type Error = ();

        fn read(&mut self, src_addr: u32, dst: &mut [u8]) -> Result<(), ()> {
            self.reads += 1;
            let start = src_addr as usize;
            dst.copy_from_slice(&self.flash[start..start + dst.len()]);
            Ok(())
        }

        fn erase_sector(&mut self, sector_base: u32) -> Result<(), ()> {
            let start = sector_base as usize;
            for b in &mut self.flash[start..start + 4096] {
                *b = 0xFF;
            }
            Ok(())
        }

        fn program_block(&mut self, dst_addr: u32, src: &[u8]) -> Result<(), ()> {
            let start = dst_addr as usize;
            self.flash[start..start + src.len()].copy_from_slice(src);
            Ok(())
        }
    }

    #[test]
    fn ensure_skips_redundant_reads() {
        let mut device = FakeDevice { flash: std::vec![0xAAu8; 4096], reads: 0 };
        let mut cache = SectorCache::<4096>::new();

        cache.ensure(&mut device, 0).unwrap();
        cache.ensure(&mut device, 0).unwrap();
        assert_eq!(device.reads, 1);
        assert_eq!(cache.cached_addr(), Some(0));
    }

    #[test]
    fn invalidate_if_only_matches_cached_sector() {
        let mut device = FakeDevice { flash: std::vec![0u8; 8192], reads: 0 };
        let mut cache = SectorCache::<4096>::new();

        cache.ensure(&mut device, 4096).unwrap();
        cache.invalidate_if(0);
        assert_eq!(cache.cached_addr(), Some(4096));

        cache.invalidate_if(4096);
        assert_eq!(cache.cached_addr(), None);
    }

    #[test]
    fn failed_read_invalidates() {
        struct FailingDevice;
        impl FlashDevice for FailingDevice {
            type Error = &'static str;
            fn read(&mut self, _: u32, _: &mut [u8]) -> Result<(), &'static str> {
                Err("device offline")
            }
            fn erase_sector(&mut self, _: u32) -> Result<(), &'static str> {
                Ok(())
            }
            fn program_block(&mut self, _: u32, _: &[u8]) -> Result<(), &'static str> {
                Ok(())
            }
        }

        let mut device = FailingDevice;
        let mut cache = SectorCache::<4096>::new();
        assert!(cache.ensure(&mut device, 0).is_err());
        assert_eq!(cache.cached_addr(), None);
    }
}
