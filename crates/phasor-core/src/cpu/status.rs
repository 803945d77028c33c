use bitflags::bitflags;

bitflags! {
    /// The 8-bit processor status register (P) of the 65C816.
    ///
    /// Bit layout (native mode):
    /// 7 6 5 4 3 2 1 0
    /// N V M X D I Z C
    ///
    /// In emulation mode bits 5 and 4 are forced set, which doubles as the
    /// 8-bit accumulator/index width selection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        /// Carry flag (C)
        const C = 0b0000_0001;

        /// Zero flag (Z)
        const Z = 0b0000_0010;

        /// Interrupt disable flag (I)
        /// When set, the maskable interrupt request line is ignored.
        const I = 0b0000_0100;

        /// Decimal mode flag (D)
        /// Routes ADC/SBC through the per-digit BCD correction.
        const D = 0b0000_1000;

        /// Index width flag (X)
        /// When set, X and Y are 8 bits wide and truncated on every write.
        const X = 0b0001_0000;

        /// Accumulator width flag (M)
        /// When set, the accumulator is 8 bits wide.
        const M = 0b0010_0000;

        /// Overflow flag (V)
        const V = 0b0100_0000;

        /// Negative flag (N)
        /// Mirrors the sign bit of the last result at its operand width.
        const N = 0b1000_0000;
    }
}

impl Status {
    /// Set Z iff `value` masked to the operand width is zero and N from the
    /// sign bit. `top` is the sign-bit position: 7 for 8-bit results,
    /// 15 for 16-bit results.
    pub fn update_nz(&mut self, value: u16, top: u32) {
        self.remove(Status::N | Status::Z);
        if u32::from(value) & ((1u32 << (top + 1)) - 1) == 0 {
            self.insert(Status::Z);
        }
        if u32::from(value) & (1u32 << top) != 0 {
            self.insert(Status::N);
        }
    }
}
