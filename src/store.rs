//! Byte-addressable adapter over the device's non-volatile
//! configuration region.

/// Narrow interface the registry persists through. Implementations
/// wrap whatever the platform offers (NVS blob, EEPROM emulation, a
/// plain file) and must keep bytes durable across a
/// `close_region`/`open_region` cycle.
///
/// There is no error channel here: the configuration region is assumed
/// operable once the device is up. A platform where opening the region
/// can fail should treat that as fatal before handing the store to
/// this crate.
pub trait ConfigStore {
    /// Reserve the region for a load or save pass. `total_bytes` is
    /// the full layout size including the version tag and base offset.
    fn open_region(&mut self, total_bytes: usize);

    /// Read one byte at an absolute offset within the region.
    fn read_byte(&mut self, offset: usize) -> u8;

    /// Write one byte at an absolute offset within the region.
    fn write_byte(&mut self, offset: usize, value: u8);

    /// Release the region, committing pending writes.
    fn close_region(&mut self);
}
