use crate::cpu::registers::Registers;
use crate::cpu::target::TargetKind;

/// The `aaa` (bits 7-5), `bbb` (bits 4-2) and `cc` (bits 1-0) fields of an
/// opcode byte. Most of the instruction set is a regular `aaabbbcc` grid;
/// the irregular opcodes are matched by value before these fields are
/// consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpFields {
    pub aaa: u8,
    pub bbb: u8,
    pub cc: u8,
}

impl OpFields {
    pub(crate) const fn of(opcode: u8) -> Self {
        Self {
            aaa: opcode >> 5 & 0b111,
            bbb: opcode >> 2 & 0b111,
            cc: opcode & 0b11,
        }
    }

    /// `(cc << 3) | bbb`, the addressing-mode family selector.
    pub(crate) const fn addr_mode(&self) -> u8 {
        self.cc << 3 | self.bbb
    }
}

/// True for BRA and the eight conditional branches (`xxx10000`).
pub(crate) const fn is_branch(opcode: u8) -> bool {
    opcode == 0x80 || opcode & 0b11111 == 0b10000
}

/// Number of operand bytes (0-3) following `opcode`. A pure function of the
/// opcode except for the immediates, whose length follows the current
/// accumulator or index width.
///
/// WDM (0x42) reports zero even though an operand byte follows it in the
/// instruction stream; the sequencer skips that byte without fetching it.
pub(crate) fn operand_length(opcode: u8, regs: &Registers) -> usize {
    if opcode & 0b11111 == 0b10000 {
        // Bcc
        return 1;
    }

    match opcode {
        0x08 | 0x0B | 0x18 | 0x1A | 0x1B | 0x28 | 0x2B | 0x38 | 0x3A | 0x3B | 0x40 | 0x42
        | 0x48 | 0x4B | 0x58 | 0x5A | 0x5B | 0x60 | 0x68 | 0x6B | 0x78 | 0x7A | 0x7B | 0x88
        | 0x8A | 0x8B | 0x98 | 0x9A | 0x9B | 0xA8 | 0xAA | 0xAB | 0xB8 | 0xBA | 0xBB | 0xC8
        | 0xCA | 0xCB | 0xD8 | 0xDA | 0xDB | 0xE8 | 0xEA | 0xEB | 0xF8 | 0xFA | 0xFB => {
            return 0;
        }

        // BRK sig, COP sig, BRA r, REP imm, PEI dp, SEP imm
        0x00 | 0x02 | 0x80 | 0xC2 | 0xD4 | 0xE2 => return 1,

        // JSR abs, MVP, MVN, PER rl, BRL rl, JML (abs), PEA abs, JSR (abs,X)
        0x20 | 0x44 | 0x54 | 0x62 | 0x82 | 0xDC | 0xF4 | 0xFC => return 2,

        // JSL absl, JMP absl
        0x22 | 0x5C => return 3,

        _ => {}
    }

    let OpFields { bbb, cc, .. } = OpFields::of(opcode);

    match cc {
        0b00 => match bbb {
            0 => regs.xy_size(),             // imm (X/Y index)
            3 | 7 => 2,                      // abs / abs,X
            1 | 5 => 1,                      // dp / dp,X
            _ => unreachable!("no cc=00 opcode encodes bbb={bbb}"),
        },
        0b01 => match bbb {
            0 | 1 | 4 | 5 => 1,              // (dp,X) / dp / (dp),Y / dp,X
            3 | 6 | 7 => 2,                  // abs / abs,Y / abs,X
            2 => regs.a_size(),              // imm (accumulator)
            _ => unreachable!("no cc=01 opcode encodes bbb={bbb}"),
        },
        0b10 => match bbb {
            0 => regs.xy_size(),             // imm (X index)
            1 | 4 | 5 => 1,                  // dp / (dp) / dp,X|Y
            2 => 0,                          // A
            3 | 7 => 2,                      // abs / abs,X|Y
            _ => unreachable!("no cc=10 opcode encodes bbb={bbb}"),
        },
        0b11 => match bbb {
            0 | 1 | 4 | 5 => 1,              // d,S / [dp] / (d,S),Y / [dp],Y
            3 | 7 => 3,                      // absl / absl,X
            _ => unreachable!("no cc=11 opcode encodes bbb={bbb}"),
        },
        _ => unreachable!(),
    }
}

/// Width in bytes of the value the operation reads, computes on and writes
/// back. Accumulator width for the accumulator classes and the named
/// exceptions (BIT imm, TSB, TRB, STZ), index width for the index classes.
pub(crate) fn result_size(opcode: u8, regs: &Registers) -> usize {
    match opcode {
        0x89 | 0x04 | 0x0C | 0x14 | 0x1C | 0x64 | 0x9C | 0x74 | 0x9E => return regs.a_size(),
        _ => {}
    }

    let OpFields { aaa, bbb, cc } = OpFields::of(opcode);

    if cc == 0b00 && aaa & 0b100 != 0 {
        return regs.xy_size(); // STY/LDY/CPY/CPX
    }

    if cc == 0b10 && (aaa == 0b100 || aaa == 0b101) && bbb != 0b100 {
        return regs.xy_size(); // STX/LDX
    }

    // cc=01 and cc=11 are accumulator-sized; cc=10 bbb=100 re-encodes the
    // cc=01 operations with (dp) addressing.
    regs.a_size()
}

/// Whether the operation loads its operand from memory before evaluating.
/// Stores and the immediate/accumulator targets do not.
pub(crate) fn requires_load(opcode: u8, target_kind: TargetKind) -> bool {
    match opcode {
        0x64 | 0x9C | 0x74 | 0x9E => return false, // STZ
        _ => {}
    }

    target_kind != TargetKind::Accumulator
        && target_kind != TargetKind::Immediate
        && OpFields::of(opcode).aaa != 0b100 // ST{A,X,Y}
}

/// Where an aaabbbcc-encoded operation's result goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Writeback {
    /// CMP/CPX/CPY/BIT imm: flags only.
    Discard,
    /// Read-modify-write and the stores.
    Mem,
    A,
    X,
    Y,
}

pub(crate) fn writeback_target(opcode: u8) -> Writeback {
    match opcode {
        0x89 => return Writeback::Discard,                             // BIT imm
        0x04 | 0x0C | 0x14 | 0x1C => return Writeback::Mem,            // TSB/TRB
        0x64 | 0x9C | 0x74 | 0x9E => return Writeback::Mem,            // STZ
        _ => {}
    }

    let OpFields { aaa, bbb, cc } = OpFields::of(opcode);

    if cc == 0b01 || cc == 0b11 || (cc == 0b10 && bbb == 0b100) {
        return match aaa {
            0b100 => Writeback::Mem,     // STA
            0b110 => Writeback::Discard, // CMP
            _ => Writeback::A,
        };
    }

    if cc == 0b10 {
        return if bbb != 0b010 {
            if aaa == 0b101 {
                Writeback::X // LDX
            } else {
                Writeback::Mem
            }
        } else {
            Writeback::A // accumulator addressing
        };
    }

    if cc == 0b00 {
        return match aaa {
            0b101 => Writeback::Y, // LDY
            0b100 => Writeback::Mem, // STY
            _ => Writeback::Discard,
        };
    }

    unreachable!("opcode {opcode:02X} has no aaabbbcc writeback class")
}
