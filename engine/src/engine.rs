use crate::cache::SectorCache;
use crate::chunk::{plan_chunk, sector_of};
use crate::device::FlashDevice;

/// What to do with the range passed to [`FlashEngine::engine_write`].
///
/// This replaces the original's trick of passing a null source pointer to
/// mean "erase this range instead of writing it" with an explicit two-variant
/// request. The merge logic inside the engine stays unified either way.
pub enum Request<'a> {
    /// Make flash equal to `bytes` over the destination range.
    Program(&'a [u8]),
    /// Set `len` bytes starting at the destination to the erased pattern `0xFF`.
    EraseRange(u32),
}

impl<'a> Request<'a> {
    fn length(&self) -> u32 {
        match self {
            Request::Program(bytes) => bytes.len() as u32,
            Request::EraseRange(len) => *len,
        }
    }
}

/// The read-modify-write engine bound to one flash device and one sector
/// cache. `SECTOR_BYTES` must match the device's native erase granularity.
pub struct FlashEngine<D: FlashDevice, const SECTOR_BYTES: usize> {
    device: D,
    cache: SectorCache<SECTOR_BYTES>,
}

impl<D: FlashDevice, const SECTOR_BYTES: usize> FlashEngine<D, SECTOR_BYTES> {
    pub const fn new(device: D) -> Self {
        Self { device, cache: SectorCache::new() }
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Copies `dst.len()` bytes starting at `flash_src` into `dst`, reading
    /// sector by sector through the cache. Never erases, never programs.
    pub fn engine_read(&mut self, flash_src: u32, dst: &mut [u8]) -> Result<(), D::Error> {
        let length = dst.len() as u32;
        let mut consumed = 0u32;
        while consumed < length {
            let s = sector_of(flash_src + consumed, SECTOR_BYTES as u32);
            self.cache.ensure(&mut self.device, s)?;
            let chunk_len = plan_chunk(flash_src, length, s, consumed, SECTOR_BYTES as u32);
            let off = (flash_src + consumed - s) as usize;
            let (chunk_len, consumed_usize) = (chunk_len as usize, consumed as usize);
            dst[consumed_usize..consumed_usize + chunk_len]
                .copy_from_slice(&self.cache.buffer()[off..off + chunk_len]);
            consumed += chunk_len as u32;
        }
        Ok(())
    }

    /// Unified write/erase operation. See [`Request`].
    pub fn engine_write(&mut self, flash_dst: u32, request: Request<'_>) -> Result<(), D::Error> {
        let length = request.length();
        if length == 0 {
            return Ok(());
        }

        let mut consumed = 0u32;
        while consumed < length {
            let s = sector_of(flash_dst + consumed, SECTOR_BYTES as u32);
            let chunk_len = plan_chunk(flash_dst, length, s, consumed, SECTOR_BYTES as u32);
            self.cache.ensure(&mut self.device, s)?;
            let off = (flash_dst + consumed - s) as usize;
            let (chunk_len, consumed_usize) = (chunk_len as usize, consumed as usize);
            let full_sector = chunk_len == SECTOR_BYTES;

            // `true` unless a full-sector program writes straight from the
            // caller's buffer, bypassing the cache copy entirely. A
            // sector-aligned erase skips the program step too: erasing
            // already leaves the whole sector at 0xFF, so reprogramming it
            // with more 0xFF would be a pointless extra program cycle (see
            // scenario 3 in the testable-properties list).
            let mut program_from_cache = true;
            let must_rewrite = match (&request, full_sector) {
                (Request::EraseRange(_), false) => {
                    self.cache.buffer()[off..off + chunk_len].fill(0xFF);
                    true
                }
                (Request::EraseRange(_), true) => {
                    self.cache.buffer().fill(0xFF);
                    self.cache.invalidate_if(s);
                    self.device.erase_sector(s)?;
                    self.cache.ensure(&mut self.device, s)?;
                    consumed += chunk_len as u32;
                    continue;
                }
                (Request::Program(src), false) => {
                    let incoming = &src[consumed_usize..consumed_usize + chunk_len];
                    if &self.cache.buffer()[off..off + chunk_len] == incoming {
                        false
                    } else {
                        self.cache.buffer()[off..off + chunk_len].copy_from_slice(incoming);
                        true
                    }
                }
                (Request::Program(src), true) => {
                    let incoming = &src[consumed_usize..consumed_usize + SECTOR_BYTES];
                    if self.cache.buffer().as_slice() == incoming {
                        false
                    } else {
                        program_from_cache = false;
                        true
                    }
                }
            };

            if must_rewrite {
                self.cache.invalidate_if(s);
                self.device.erase_sector(s)?;
                if program_from_cache {
                    let staged: &[u8] = self.cache.buffer().as_slice();
                    self.device.program_block(s, staged)?;
                } else if let Request::Program(src) = &request {
                    let incoming = &src[consumed_usize..consumed_usize + SECTOR_BYTES];
                    self.device.program_block(s, incoming)?;
                }
                // The cache buffer may or may not match what was just
                // programmed (it does when `program_from_cache`, it does
                // not when we wrote straight from `src`). Leaving the
                // descriptor invalid either way keeps §3 trivially true; the
                // next access simply re-reads.
                self.cache.invalidate_if(s);
            }

            consumed += chunk_len as u32;
        }

        Ok(())
    }

    /// Convenience wrapper for an erase-only request.
    pub fn engine_erase(&mut self, flash_dst: u32, length: u32) -> Result<(), D::Error> {
        self.engine_write(flash_dst, Request::EraseRange(length))
    }
}
