use std::fmt::Debug;

#[cfg(test)]
pub(crate) mod mock;

/// One-transaction-per-cycle bus interface.
///
/// The sequencer posts exactly one directive per tick; implementations latch
/// the address, data and qualifier lines and perform the transfer on their
/// own clock. `vda`/`vpa` mark the address as a valid data or program
/// address; cycles with neither asserted are internal and must not touch
/// memory, whatever the address lines show.
pub trait BusDriver: Debug {
    /// Drive `addr` for a read. `vec_pull` qualifies interrupt vector
    /// fetches so hardware can substitute a vector.
    fn initiate_read(&mut self, addr: u32, vda: bool, vpa: bool, vec_pull: bool);

    /// Drive `addr` and `data` for a write. Always a valid data address.
    fn initiate_write(&mut self, addr: u32, data: u8);

    /// Internal cycle driving `addr` with the read/write line at `rwb`,
    /// neither qualifier asserted.
    fn initiate_stall_at(&mut self, addr: u32, rwb: bool);

    /// Internal cycle leaving the address and read/write lines as they were.
    fn initiate_stall_idle(&mut self);

    /// Internal cycle forcing the read/write line to `rwb`. Turning a read
    /// into a write re-drives the byte last latched from the data lines.
    fn initiate_stall_idle_rwb(&mut self, rwb: bool);

    /// Replace the driven address mid-cycle. Used by the indexed-mode
    /// penalty cycle, which drives the unindexed address before the carry
    /// into the high byte has settled.
    fn transitive_addr(&mut self, addr: u32);

    /// The byte latched by the most recent read cycle.
    fn read_data(&self) -> u8;

    /// Level of the maskable interrupt request line.
    fn irq(&self) -> bool;

    /// Consume the latched non-maskable interrupt edge.
    fn nmi(&mut self) -> bool;
}
