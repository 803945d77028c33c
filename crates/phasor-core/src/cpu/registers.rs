use crate::cpu::status::Status;

/// The 65C816 register file.
///
/// The accumulator and index registers are 16 bits of storage whose
/// *effective* width is a function of (E, M, X) evaluated on every access;
/// the width is never cached. All mutation that is subject to a width or
/// emulation-mode invariant goes through the setters below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registers {
    /// Accumulator storage. 8-bit writes leave the high byte untouched.
    pub a: u16,
    /// X index register. Truncated to 8 bits on every write while narrow.
    pub x: u16,
    /// Y index register. Same truncation rule as X.
    pub y: u16,
    /// Program bank register.
    pub pbr: u8,
    /// Data bank register.
    pub dbr: u8,
    /// Program counter.
    pub pc: u16,
    /// Stack pointer. High byte pinned to 0x01 in emulation mode.
    pub s: u16,
    /// Direct page base register.
    pub d: u16,
    /// Processor status flags.
    pub p: Status,
    /// Emulation mode bit.
    pub e: bool,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            pbr: 0,
            dbr: 0,
            pc: 0,
            s: 0x0100,
            d: 0,
            p: Status::empty(),
            e: true,
        }
    }
}

impl Registers {
    /// 24-bit program-bank:program-counter address.
    pub fn far_pc(&self) -> u32 {
        u32::from(self.pc) | u32::from(self.pbr) << 16
    }

    pub fn is_a_wide(&self) -> bool {
        !self.e && !self.p.contains(Status::M)
    }

    /// Effective accumulator width in bytes.
    pub fn a_size(&self) -> usize {
        if self.is_a_wide() { 2 } else { 1 }
    }

    pub fn set_a(&mut self, v: u16) {
        if self.is_a_wide() {
            self.a = v;
        } else {
            self.a = (self.a & 0xFF00) | (v & 0x00FF);
        }
    }

    pub fn get_a(&self) -> u16 {
        if self.is_a_wide() { self.a } else { self.a & 0x00FF }
    }

    pub fn is_xy_wide(&self) -> bool {
        !self.e && !self.p.contains(Status::X)
    }

    /// Effective index register width in bytes.
    pub fn xy_size(&self) -> usize {
        if self.is_xy_wide() { 2 } else { 1 }
    }

    pub fn set_x(&mut self, v: u16) {
        self.x = if self.is_xy_wide() { v } else { v & 0x00FF };
    }

    pub fn set_y(&mut self, v: u16) {
        self.y = if self.is_xy_wide() { v } else { v & 0x00FF };
    }

    pub fn set_s(&mut self, v: u16) {
        self.s = if self.e { 0x0100 | (v & 0x00FF) } else { v };
    }

    /// Re-applies the forced-width and forced-stack-page invariants after
    /// any operation that can change E, M or X (XCE, REP, SEP, flag pulls).
    pub fn apply_mode_transition(&mut self) {
        if self.e {
            self.s = 0x0100 | (self.s & 0x00FF);
            self.p.insert(Status::M | Status::X);
        }

        if self.p.contains(Status::X) {
            self.x &= 0x00FF;
            self.y &= 0x00FF;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Registers;
    use crate::cpu::status::Status;

    fn native_wide() -> Registers {
        Registers {
            e: false,
            p: Status::empty(),
            ..Registers::default()
        }
    }

    #[test]
    fn narrow_accumulator_write_preserves_high_byte() {
        let mut r = Registers::default(); // emulation mode -> 8-bit
        r.a = 0xAB00;
        r.set_a(0x12);
        assert_eq!(r.a, 0xAB12);
        assert_eq!(r.get_a(), 0x0012);
    }

    #[test]
    fn wide_accumulator_roundtrips() {
        let mut r = native_wide();
        r.set_a(0x1234);
        assert_eq!(r.get_a(), 0x1234);
    }

    #[test]
    fn narrow_index_writes_truncate() {
        let mut r = native_wide();
        r.p.insert(Status::X);
        r.set_x(0x1234);
        r.set_y(0xFFEE);
        assert_eq!(r.x, 0x34);
        assert_eq!(r.y, 0xEE);
    }

    #[test]
    fn emulation_mode_pins_stack_page() {
        let mut r = Registers::default();
        r.set_s(0x33FE);
        assert_eq!(r.s, 0x01FE);

        let mut r = native_wide();
        r.set_s(0x33FE);
        assert_eq!(r.s, 0x33FE);
    }

    #[test]
    fn entering_emulation_mode_forces_widths_and_stack() {
        let mut r = native_wide();
        r.s = 0x2345;
        r.x = 0x1234;
        r.y = 0xBEEF;
        r.e = true;
        r.apply_mode_transition();
        assert_eq!(r.s, 0x0145);
        assert!(r.p.contains(Status::M | Status::X));
        assert_eq!(r.x, 0x34);
        assert_eq!(r.y, 0xEF);
        assert_eq!(r.a_size(), 1);
        assert_eq!(r.xy_size(), 1);
    }
}
