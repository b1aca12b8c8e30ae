/// Capability set a flash device must expose to the engine.
///
/// All three operations are synchronous and blocking; there is no async
/// variant because the firmware this crate ships in never preempts a flash
/// operation (see the concurrency model in the top-level design notes).
pub trait FlashDevice {
    /// Error type returned by any of the three primitives below. The engine
    /// never inspects it, only propagates it to its own caller.
    type Error;

    /// Copy `dst.len()` bytes from flash starting at `src_addr` into `dst`.
    /// No alignment requirement on `src_addr`.
    fn read(&mut self, src_addr: u32, dst: &mut [u8]) -> Result<(), Self::Error>;

    /// Erase the single sector whose base address is `sector_base`.
    /// `sector_base` is always sector-aligned; the implementation may assume
    /// this and need not re-check it.
    fn erase_sector(&mut self, sector_base: u32) -> Result<(), Self::Error>;

    /// Program `src.len()` bytes at `dst_addr`. The engine only ever calls
    /// this with `dst_addr` equal to a sector base and `src.len()` equal to
    /// the sector size, immediately after erasing that sector.
    fn program_block(&mut self, dst_addr: u32, src: &[u8]) -> Result<(), Self::Error>;
}
