use crate::cpu::decode::OpFields;
use crate::cpu::registers::Registers;

/// Classification of an operand target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum TargetKind {
    #[default]
    None,
    /// The operand bytes themselves are the value.
    Immediate,
    /// A (data-bank, offset) address.
    Address,
    /// A bank-0 address formed from the direct page register.
    DirectPage,
    /// A bank-0 address formed from the stack pointer.
    Stack,
    /// A fully explicit 24-bit address.
    Far,
    /// The accumulator itself; no bus access.
    Accumulator,
}

/// Resolved operand target for the instruction in flight.
///
/// Recomputed per instruction from the opcode, the fetched operand bytes and
/// a register snapshot; never persisted across instructions. The pre-index
/// pair is the address before the index register was added, kept so the
/// page-boundary penalty and its mid-cycle address fix-up can be computed.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Target {
    pub bank: u8,
    pub addr: u16,
    pub bank_preindex: u8,
    pub addr_preindex: u16,
    pub kind: TargetKind,
    /// Kind of the pointer target before indirect resolution replaced it.
    pub inner_kind: TargetKind,
    /// 0 = not indirect; 2 or 3 = read that many bytes from the resolved
    /// address to obtain the real target.
    pub indirect_len: usize,
    pub indexed: bool,
    /// Whether low-16-bit overflow stays within the bank instead of
    /// carrying into it.
    pub wrap_in_bank: bool,
}

impl Target {
    /// First-pass resolution: opcode + fetched operand bytes -> target.
    pub(crate) fn compute(opcode: u8, operands: [u8; 3], regs: &Registers) -> Target {
        let mut t = Target::default();

        let val16 = u16::from_le_bytes([operands[0], operands[1]]);
        let sext8 = operands[0] as i8 as u16;

        let imm8 = |t: &mut Target| {
            t.addr = u16::from(operands[0]);
            t.kind = TargetKind::Immediate;
        };
        let imm16 = |t: &mut Target| {
            t.addr = val16;
            t.kind = TargetKind::Immediate;
        };
        let imm_reg = |t: &mut Target, wide: bool| {
            if wide { imm16(t) } else { imm8(t) }
        };

        let abs = |t: &mut Target, offset: u16| {
            let v1 = u32::from(val16);
            let v2 = u32::from(val16) + u32::from(offset);

            t.bank = regs.dbr.wrapping_add((v2 >> 16) as u8);
            t.bank_preindex = regs.dbr;
            t.addr = v2 as u16;
            t.addr_preindex = v1 as u16;
            t.kind = TargetKind::Address;
        };

        let absl = |t: &mut Target, offset: u16| {
            let v1 = u32::from(val16);
            let v2 = u32::from(val16) + u32::from(offset);

            t.bank = operands[2].wrapping_add((v2 >> 16) as u8);
            t.bank_preindex = operands[2];
            t.addr = v2 as u16;
            t.addr_preindex = v1 as u16;
            t.kind = TargetKind::Far;
        };

        let dp = |t: &mut Target, offset: u16| {
            let v1 = regs.d.wrapping_add(u16::from(operands[0]));
            let v2 = if regs.e {
                regs.d
                    .wrapping_add(u16::from(operands[0]).wrapping_add(offset) & 0x00FF)
            } else {
                regs.d
                    .wrapping_add(u16::from(operands[0]))
                    .wrapping_add(offset)
            };

            t.bank = 0;
            t.bank_preindex = 0;
            t.addr = v2;
            t.addr_preindex = v1;
            t.kind = TargetKind::DirectPage;
            t.wrap_in_bank = true;
        };

        let sp = |t: &mut Target| {
            let v = regs.s.wrapping_add(u16::from(operands[0]));

            t.bank = 0;
            t.bank_preindex = 0;
            t.addr = v;
            t.addr_preindex = v;
            t.kind = TargetKind::Stack;
            t.wrap_in_bank = true;
        };

        if opcode == 0x80 || opcode & 0b11111 == 0b10000 {
            // BRA / Bcc
            t.bank = regs.pbr;
            t.addr = regs.pc.wrapping_add(sext8);
            t.kind = TargetKind::Address;
            return t;
        }

        match opcode {
            0x00 | 0x02 | 0xC2 | 0xE2 => {
                // BRK sig, COP sig, REP imm, SEP imm
                imm8(&mut t);
                return t;
            }
            0x89 => {
                // BIT imm
                imm_reg(&mut t, regs.is_a_wide());
                return t;
            }
            0x04 | 0x14 | 0x64 => {
                // TSB/TRB/STZ dp
                dp(&mut t, 0);
                return t;
            }
            0x74 => {
                // STZ dp,X
                dp(&mut t, regs.x);
                t.indexed = true;
                return t;
            }
            0x0C | 0x1C | 0x9C => {
                // TSB/TRB/STZ abs
                abs(&mut t, 0);
                return t;
            }
            0x9E => {
                // STZ abs,X
                abs(&mut t, regs.x);
                t.indexed = true;
                return t;
            }
            0xD4 => {
                // PEI dp
                dp(&mut t, 0);
                t.indirect_len = 2;
                return t;
            }
            0x20 | 0xF4 => {
                // JSR abs, PEA abs
                abs(&mut t, 0);
                return t;
            }
            0x44 | 0x54 => {
                // MVP/MVN bank pair
                imm16(&mut t);
                return t;
            }
            0x62 | 0x82 => {
                // PER rl, BRL rl
                t.bank = regs.pbr;
                t.addr = regs.pc.wrapping_add(val16);
                t.kind = TargetKind::Address;
                return t;
            }
            0x6C => {
                // JMP (abs): pointer lives in bank 0
                abs(&mut t, 0);
                t.bank = 0;
                t.indirect_len = 2;
                return t;
            }
            0xDC => {
                // JML (abs): 3-byte pointer in bank 0, wrapping within it
                abs(&mut t, 0);
                t.bank = 0;
                t.wrap_in_bank = true;
                t.indirect_len = 3;
                return t;
            }
            0x7C | 0xFC => {
                // JMP (abs,X), JSR (abs,X): pointer lives in the program bank
                abs(&mut t, regs.x);
                t.bank = regs.pbr;
                t.indirect_len = 2;
                t.indexed = true;
                return t;
            }
            0x22 | 0x5C => {
                // JSL absl, JMP absl
                absl(&mut t, 0);
                return t;
            }
            _ => {}
        }

        let addr_mode = OpFields::of(opcode).addr_mode();
        // LDX/STX index with Y instead of X
        let use_y_not_x = matches!(opcode, 0x96 | 0xB6 | 0xBE);
        let index = if use_y_not_x { regs.y } else { regs.x };

        match addr_mode {
            0b00000 | 0b10000 => imm_reg(&mut t, regs.is_xy_wide()),
            0b01010 => imm_reg(&mut t, regs.is_a_wide()),
            0b01100 | 0b10100 | 0b11001 | 0b11101 => {
                // (dp),Y / (dp) / [dp] / [dp],Y
                t.indirect_len = if OpFields::of(opcode).cc == 0b11 { 3 } else { 2 };
                dp(&mut t, 0);
            }
            0b00001 | 0b01001 | 0b10001 => dp(&mut t, 0),
            0b01000 => {
                // (dp,X)
                t.indirect_len = 2;
                dp(&mut t, index);
                t.indexed = true;
            }
            0b01101 | 0b00101 | 0b10101 => {
                // dp,X (dp,Y for STX/LDX)
                dp(&mut t, index);
                t.indexed = true;
            }
            0b11100 => {
                // (d,S),Y
                t.indirect_len = 2;
                sp(&mut t);
            }
            0b11000 => sp(&mut t), // d,S
            0b00011 | 0b01011 | 0b10011 => abs(&mut t, 0),
            0b00111 | 0b01111 | 0b10111 => {
                // abs,X (abs,Y for LDX)
                abs(&mut t, index);
                t.indexed = true;
            }
            0b01110 => {
                // abs,Y
                abs(&mut t, regs.y);
                t.indexed = true;
            }
            0b11011 => absl(&mut t, 0),
            0b11111 => {
                // absl,X
                absl(&mut t, regs.x);
                t.indexed = true;
            }
            0b10010 => {
                // A
                t.addr = regs.get_a();
                t.kind = TargetKind::Accumulator;
            }
            // Register-only opcodes have no operand target.
            _ => {}
        }

        t
    }

    /// Second-pass resolution: reinterpret the `raw` word (or 3-byte value)
    /// just read through the pointer as the real target, adding the index
    /// register where the mode calls for it.
    pub(crate) fn resolve_indirect(&mut self, opcode: u8, raw: u32, regs: &Registers) {
        self.wrap_in_bank = self.wrap_in_bank && self.kind != TargetKind::Stack;
        self.inner_kind = self.kind;
        self.bank = 0;
        self.bank_preindex = 0;
        self.addr = 0;
        self.addr_preindex = 0;
        self.kind = TargetKind::None;
        self.indirect_len = 0;
        self.indexed = false;

        let val16 = raw as u16;

        let abs = |t: &mut Target, offset: u16| {
            let v1 = u32::from(val16);
            let v2 = u32::from(val16) + u32::from(offset);

            t.bank = regs.dbr.wrapping_add((v2 >> 16) as u8);
            t.bank_preindex = regs.dbr;
            t.addr = v2 as u16;
            t.addr_preindex = v1 as u16;
            t.kind = TargetKind::Address;
        };

        let absl = |t: &mut Target, offset: u16| {
            let v1 = u32::from(val16);
            let v2 = u32::from(val16) + u32::from(offset);
            let bank = (raw >> 16) as u8;

            t.bank = bank.wrapping_add((v2 >> 16) as u8);
            t.bank_preindex = bank;
            t.addr = v2 as u16;
            t.addr_preindex = v1 as u16;
            t.kind = TargetKind::Far;
        };

        match opcode {
            0xD4 => {
                // PEI dp
                abs(self, 0);
                return;
            }
            0xDC => {
                // JML (abs)
                absl(self, 0);
                return;
            }
            0x6C | 0x7C | 0xFC => {
                // JMP (abs), JMP (abs,X), JSR (abs,X)
                abs(self, 0);
                self.bank = regs.pbr;
                return;
            }
            _ => {}
        }

        match OpFields::of(opcode).addr_mode() {
            0b11001 => absl(self, 0), // [dp]
            0b11101 => {
                // [dp],Y
                absl(self, regs.y);
                self.indexed = true;
            }
            0b10100 | 0b01000 => abs(self, 0), // (dp) / (dp,X)
            0b01100 | 0b11100 => {
                // (dp),Y / (d,S),Y
                abs(self, regs.y);
                self.indexed = true;
            }
            mode => unreachable!("opcode {opcode:02X} mode {mode:05b} is not indirect"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::status::Status;

    fn native_wide() -> Registers {
        Registers {
            e: false,
            p: Status::empty(),
            ..Registers::default()
        }
    }

    #[test]
    fn absolute_uses_data_bank() {
        let mut regs = native_wide();
        regs.dbr = 0x12;
        let t = Target::compute(0xAD, [0x34, 0x56, 0], &regs); // LDA abs
        assert_eq!(t.kind, TargetKind::Address);
        assert_eq!((t.bank, t.addr), (0x12, 0x5634));
        assert!(!t.indexed);
        assert!(!t.wrap_in_bank);
    }

    #[test]
    fn absolute_indexed_carries_into_bank() {
        let mut regs = native_wide();
        regs.dbr = 0x12;
        regs.x = 0x0002;
        let t = Target::compute(0xBD, [0xFF, 0xFF, 0], &regs); // LDA abs,X
        assert_eq!((t.bank, t.addr), (0x13, 0x0001));
        assert_eq!((t.bank_preindex, t.addr_preindex), (0x12, 0xFFFF));
        assert!(t.indexed);
    }

    #[test]
    fn long_indexed_carries_into_explicit_bank() {
        let mut regs = native_wide();
        regs.x = 0x0010;
        let t = Target::compute(0xBF, [0xF8, 0xFF, 0x7E], &regs); // LDA absl,X
        assert_eq!(t.kind, TargetKind::Far);
        assert_eq!((t.bank, t.addr), (0x7F, 0x0008));
        assert_eq!(t.bank_preindex, 0x7E);
    }

    #[test]
    fn direct_page_wraps_operand_in_emulation_mode() {
        let mut regs = Registers::default();
        regs.apply_mode_transition();
        regs.d = 0x1200;
        regs.x = 0x00FF;
        let t = Target::compute(0xB5, [0x80, 0, 0], &regs); // LDA dp,X
        // (0x80 + 0xFF) & 0xFF = 0x7F before adding D.
        assert_eq!(t.addr, 0x127F);
        assert_eq!(t.addr_preindex, 0x1280);
        assert_eq!(t.kind, TargetKind::DirectPage);
        assert!(t.wrap_in_bank);

        let mut regs = native_wide();
        regs.d = 0x1200;
        regs.x = 0x00FF;
        let t = Target::compute(0xB5, [0x80, 0, 0], &regs);
        assert_eq!(t.addr, 0x137F);
    }

    #[test]
    fn stack_relative_offsets_from_s() {
        let mut regs = native_wide();
        regs.s = 0x1F00;
        let t = Target::compute(0xA3, [0x04, 0, 0], &regs); // LDA d,S
        assert_eq!(t.kind, TargetKind::Stack);
        assert_eq!((t.bank, t.addr), (0x00, 0x1F04));
        assert!(t.wrap_in_bank);
    }

    #[test]
    fn relative_branch_targets() {
        let mut regs = native_wide();
        regs.pbr = 0x03;
        regs.pc = 0x8002; // already past the operand
        let t = Target::compute(0xD0, [0xFE, 0, 0], &regs); // BNE -2
        assert_eq!((t.bank, t.addr), (0x03, 0x8000));

        let t = Target::compute(0x82, [0x00, 0x01, 0], &regs); // BRL +0x100
        assert_eq!(t.addr, 0x8102);
    }

    #[test]
    fn jmp_indirect_pointer_banks() {
        let mut regs = native_wide();
        regs.pbr = 0x04;
        regs.dbr = 0x12;
        let t = Target::compute(0x6C, [0x00, 0x30, 0], &regs); // JMP (abs)
        assert_eq!((t.bank, t.addr), (0x00, 0x3000));
        assert_eq!(t.indirect_len, 2);

        let t = Target::compute(0x7C, [0x00, 0x30, 0], &regs); // JMP (abs,X)
        assert_eq!(t.bank, 0x04);
        assert!(t.indexed);
    }

    #[test]
    fn indirect_second_pass_dp_y() {
        let mut regs = native_wide();
        regs.dbr = 0x21;
        regs.y = 0x0300;
        let mut t = Target::compute(0xB1, [0x10, 0, 0], &regs); // LDA (dp),Y
        assert_eq!(t.indirect_len, 2);
        assert_eq!(t.kind, TargetKind::DirectPage);

        t.resolve_indirect(0xB1, 0xFF80, &regs);
        assert_eq!(t.kind, TargetKind::Address);
        assert_eq!((t.bank, t.addr), (0x22, 0x0280));
        assert_eq!(t.addr_preindex, 0xFF80);
        assert!(t.indexed);
        assert_eq!(t.inner_kind, TargetKind::DirectPage);
        assert!(t.wrap_in_bank);
    }

    #[test]
    fn indirect_second_pass_long() {
        let mut regs = native_wide();
        regs.y = 0x0001;
        let mut t = Target::compute(0xB7, [0x10, 0, 0], &regs); // LDA [dp],Y
        assert_eq!(t.indirect_len, 3);

        t.resolve_indirect(0xB7, 0x7EFFFF, &regs);
        assert_eq!(t.kind, TargetKind::Far);
        assert_eq!((t.bank, t.addr), (0x7F, 0x0000));
        assert!(t.indexed);
    }

    #[test]
    fn stack_indirect_drops_bank_wrap() {
        let mut regs = native_wide();
        regs.s = 0x1FF0;
        regs.y = 0x0010;
        let mut t = Target::compute(0xB3, [0x04, 0, 0], &regs); // LDA (d,S),Y
        assert_eq!(t.kind, TargetKind::Stack);
        assert!(t.wrap_in_bank);

        t.resolve_indirect(0xB3, 0x2000, &regs);
        assert!(!t.wrap_in_bank);
        assert_eq!(t.inner_kind, TargetKind::Stack);
        assert_eq!(t.addr, 0x2010);
    }

    #[test]
    fn accumulator_mode_has_no_address() {
        let mut regs = native_wide();
        regs.a = 0x1234;
        let t = Target::compute(0x0A, [0, 0, 0], &regs); // ASL A
        assert_eq!(t.kind, TargetKind::Accumulator);
        assert_eq!(t.addr, 0x1234);
    }
}
