//! Cycle-stepped 65C816 execution core.
//!
//! [`Cpu::tick`] advances the machine by exactly one bus cycle: it pops one
//! continuation from the micro-op queue and chains through zero-cost steps
//! until a bus directive has been posted, then returns. All multi-cycle
//! behavior (operand fetches, stack traffic, penalty cycles, interrupt
//! entry) is expressed as queued continuations.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::bus::BusDriver;
use crate::cpu::decode::Writeback;
use crate::cpu::micro_op::MicroOp;
use crate::cpu::registers::Registers;
use crate::cpu::status::Status;
use crate::cpu::target::{Target, TargetKind};

mod alu;
mod decode;
mod micro_op;
pub mod registers;
pub mod status;
mod target;

const fn far(bank: u8, addr: u16) -> u32 {
    (bank as u32) << 16 | addr as u32
}

/// Where a micro-op hands control after running within a tick.
enum Flow {
    /// A bus directive has been posted; the tick is over.
    Yield,
    /// Continue with this micro-op in the same tick.
    Goto(MicroOp),
    /// Continue with the next queued micro-op in the same tick.
    Next,
}

/// Destination register of an in-flight pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PullDest {
    #[default]
    D,
    X,
    Y,
    Dbr,
}

#[derive(Debug)]
pub struct Cpu {
    pub regs: Registers,

    executed_ops: u64,

    opcode: u8,
    operands: [u8; 3],
    operand_idx: usize,
    target: Target,

    queue: VecDeque<MicroOp>,
    pending_reset: bool,
    pending_test: bool,

    pull_to: PullDest,
    stack_data: u32,
    stack_off: u32,

    io_bank: u8,
    io_addr: u16,
    io_data: u32,
    io_pos: i32,
    io_backwards: bool,
    io_wrap_in_bank: bool,
    io_vec_pull: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// A fresh core with the reset sequence pending; the first seven ticks
    /// run the reset stalls and vector fetch.
    pub fn new() -> Self {
        Self {
            regs: Registers::default(),
            executed_ops: 0,
            opcode: 0,
            operands: [0; 3],
            operand_idx: 0,
            target: Target::default(),
            queue: VecDeque::new(),
            pending_reset: true,
            pending_test: false,
            pull_to: PullDest::default(),
            stack_data: 0,
            stack_off: 0,
            io_bank: 0,
            io_addr: 0,
            io_data: 0,
            io_pos: 0,
            io_backwards: false,
            io_wrap_in_bank: false,
            io_vec_pull: false,
        }
    }

    /// Instructions retired since reset (or the last [`Cpu::inject_test`]).
    pub fn executed_ops(&self) -> u64 {
        self.executed_ops
    }

    /// Abandon whatever is in flight and begin fetching at the current
    /// register state on the next tick. Intended for harnesses that place
    /// registers and memory directly.
    pub fn inject_test(&mut self) {
        self.executed_ops = 0;
        self.pending_test = true;
        self.pending_reset = false;
    }

    /// Advance by one bus cycle. Exactly one directive is posted on `bus`
    /// per call. Panics if the micro-op queue is empty, which can only
    /// happen if an implementation bug broke the fetch-execute chain.
    pub fn tick(&mut self, bus: &mut dyn BusDriver) {
        let first = if self.pending_reset {
            self.pending_reset = false;
            self.queue.extend([
                MicroOp::Stall,
                MicroOp::Stall,
                MicroOp::Stall,
                MicroOp::Stall,
                MicroOp::ResetVectorLo,
                MicroOp::ResetVectorHi,
                MicroOp::ResetDone,
            ]);
            self.dequeue()
        } else if self.pending_test {
            self.pending_test = false;
            self.queue.clear();
            MicroOp::FetchOpcode
        } else {
            self.dequeue()
        };

        let mut op = first;
        loop {
            op = match self.run(op, bus) {
                Flow::Yield => return,
                Flow::Goto(next) => next,
                Flow::Next => self.dequeue(),
            };
        }
    }

    fn dequeue(&mut self) -> MicroOp {
        match self.queue.pop_front() {
            Some(op) => op,
            None => panic!("sequencer queue drained mid-instruction"),
        }
    }

    fn run(&mut self, op: MicroOp, bus: &mut dyn BusDriver) -> Flow {
        match op {
            MicroOp::Stall => {
                bus.initiate_stall_at(self.regs.far_pc(), true);
                Flow::Yield
            }
            MicroOp::StallIdle => {
                bus.initiate_stall_idle();
                Flow::Yield
            }
            MicroOp::StallIdleRead => {
                bus.initiate_stall_idle_rwb(true);
                Flow::Yield
            }
            MicroOp::StallIdleWrite => {
                bus.initiate_stall_idle_rwb(false);
                Flow::Yield
            }
            MicroOp::MaybeStallIndexed => self.maybe_stall_indexed(bus),

            MicroOp::ResetVectorLo => {
                bus.initiate_read(0x00FFFC, true, false, true);
                Flow::Yield
            }
            MicroOp::ResetVectorHi => {
                self.regs.pc |= u16::from(bus.read_data());
                bus.initiate_read(0x00FFFD, true, false, true);
                Flow::Yield
            }
            MicroOp::ResetDone => {
                self.regs.pbr = 0;
                self.regs.pc |= u16::from(bus.read_data()) << 8;
                debug!("reset to {:06X}", self.regs.far_pc());
                Flow::Goto(MicroOp::FetchOpcode)
            }

            MicroOp::FetchOpcode => {
                if bus.irq() && !self.regs.p.contains(Status::I) {
                    let vector = if self.regs.e { 0xFFFE } else { 0xFFEE };
                    return self.enter_vector(vector, true);
                }
                if bus.nmi() {
                    let vector = if self.regs.e { 0xFFFA } else { 0xFFEA };
                    return self.enter_vector(vector, true);
                }

                bus.initiate_read(self.regs.far_pc(), true, true, false);
                self.queue.push_back(MicroOp::Decode);
                Flow::Yield
            }
            MicroOp::Decode => {
                self.regs.pc = self.regs.pc.wrapping_add(1);
                bus.transitive_addr(self.regs.far_pc());
                self.opcode = bus.read_data();
                trace!("opcode {:02X} pc {:04X}", self.opcode, self.regs.pc);

                let len = decode::operand_length(self.opcode, &self.regs);
                if len > 0 {
                    self.operand_idx = 0;
                    for _ in 1..len {
                        self.queue.push_back(MicroOp::FetchOperand);
                    }
                    self.queue.push_back(MicroOp::FetchOperandLast);
                    Flow::Goto(MicroOp::BeginOperandFetch)
                } else {
                    Flow::Goto(MicroOp::ResolveTarget)
                }
            }
            MicroOp::BeginOperandFetch => {
                bus.initiate_read(self.regs.far_pc(), false, true, false);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                Flow::Yield
            }
            MicroOp::FetchOperand => {
                self.operands[self.operand_idx] = bus.read_data();
                self.operand_idx += 1;
                Flow::Goto(MicroOp::BeginOperandFetch)
            }
            MicroOp::FetchOperandLast => {
                self.operands[self.operand_idx] = bus.read_data();
                self.operand_idx += 1;
                Flow::Goto(MicroOp::ResolveTarget)
            }

            MicroOp::ResolveTarget => self.resolve_target(),
            MicroOp::ResolveIndirect => {
                self.target.resolve_indirect(self.opcode, self.io_data, &self.regs);
                self.queue.push_back(MicroOp::MaybeStallIndexed);
                self.queue.push_back(MicroOp::Execute);
                Flow::Next
            }
            MicroOp::Execute => self.execute(),
            MicroOp::ExecuteAlu => self.execute_alu(),
            MicroOp::ExecuteReturn => self.execute_return(),

            MicroOp::Push => {
                let byte = (self.stack_data >> self.stack_off) as u8;
                bus.initiate_write(u32::from(self.regs.s), byte);
                self.regs.set_s(self.regs.s.wrapping_sub(1));
                self.stack_off = self.stack_off.wrapping_sub(8);
                Flow::Yield
            }
            MicroOp::BeginPull => {
                self.regs.set_s(self.regs.s.wrapping_add(1));
                bus.initiate_read(u32::from(self.regs.s), true, false, false);
                Flow::Yield
            }
            MicroOp::Pull => {
                self.stack_data |= u32::from(bus.read_data()) << self.stack_off;
                self.stack_off += 8;
                Flow::Goto(MicroOp::BeginPull)
            }
            MicroOp::PullLast => {
                self.stack_data |= u32::from(bus.read_data()) << self.stack_off;
                Flow::Next
            }
            MicroOp::PullToFlags => {
                self.regs.p = Status::from_bits_retain(self.stack_data as u8);
                self.regs.apply_mode_transition();
                Flow::Goto(MicroOp::CompleteOp)
            }
            MicroOp::PullToAccumulator => {
                self.regs.set_a(self.stack_data as u16);
                self.regs.p.update_nz(self.stack_data as u16, self.stack_off + 7);
                Flow::Goto(MicroOp::CompleteOp)
            }
            MicroOp::PullToRegister => {
                match self.pull_to {
                    PullDest::D => self.regs.d = self.stack_data as u16,
                    PullDest::X => self.regs.x = self.stack_data as u16,
                    PullDest::Y => self.regs.y = self.stack_data as u16,
                    PullDest::Dbr => self.regs.dbr = self.stack_data as u8,
                }
                self.regs.p.update_nz(self.stack_data as u16, self.stack_off + 7);
                Flow::Goto(MicroOp::CompleteOp)
            }

            MicroOp::BeginRead => {
                bus.initiate_read(self.io_far_addr(), true, false, self.io_vec_pull);
                Flow::Yield
            }
            MicroOp::Read => {
                self.io_data |= u32::from(bus.read_data()) << (self.io_pos * 8);
                self.io_pos += if self.io_backwards { -1 } else { 1 };
                Flow::Goto(MicroOp::BeginRead)
            }
            MicroOp::ReadLast => {
                self.io_data |= u32::from(bus.read_data()) << (self.io_pos * 8);
                Flow::Next
            }
            MicroOp::Write => {
                let byte = (self.io_data >> (self.io_pos * 8)) as u8;
                bus.initiate_write(self.io_far_addr(), byte);
                self.io_pos += if self.io_backwards { -1 } else { 1 };
                Flow::Yield
            }

            MicroOp::BlockMoveRead => {
                self.set_io(self.operands[1], self.regs.x, false, false, false);
                self.start_read(1, 0, MicroOp::BlockMoveWrite)
            }
            MicroOp::BlockMoveWrite => {
                let data = self.io_data & 0xFF;
                self.set_io(self.operands[0], self.regs.y, false, false, false);
                self.start_write(data, 1, MicroOp::BlockMoveNext)
            }
            MicroOp::BlockMoveNext => self.block_move_next(),

            MicroOp::VectorFetch => {
                self.set_io(0, self.io_addr, false, false, true);
                self.start_read(2, 0, MicroOp::VectorJump)
            }
            MicroOp::VectorJump => {
                self.regs.p.insert(Status::I);
                self.regs.p.remove(Status::D);
                self.regs.pbr = 0;
                if self.regs.e {
                    self.regs.dbr = 0;
                }
                self.regs.pc = self.io_data as u16;
                self.executed_ops += 1;
                Flow::Goto(MicroOp::FetchOpcode)
            }

            MicroOp::CompleteOp => {
                self.executed_ops += 1;
                Flow::Goto(MicroOp::FetchOpcode)
            }
        }
    }

    fn set_io(&mut self, bank: u8, addr: u16, backwards: bool, wrap: bool, vec_pull: bool) {
        self.io_bank = bank;
        self.io_addr = addr;
        self.io_backwards = backwards;
        self.io_wrap_in_bank = wrap;
        self.io_vec_pull = vec_pull;
    }

    fn io_far_addr(&self) -> u32 {
        if self.io_wrap_in_bank {
            far(self.io_bank, self.io_addr.wrapping_add(self.io_pos as u16))
        } else {
            far(self.io_bank, self.io_addr).wrapping_add(self.io_pos as u32)
        }
    }

    /// Queue a `len`-byte read of the io address and yield into its first
    /// cycle, with up to two leading idle cycles. `next` runs in the tick
    /// after the last byte has been latched.
    fn start_read(&mut self, len: usize, stalls: usize, next: MicroOp) -> Flow {
        self.io_data = 0;
        self.io_pos = if self.io_backwards { len as i32 - 1 } else { 0 };
        if stalls > 1 {
            self.queue.push_back(MicroOp::StallIdle);
        }
        if stalls > 0 {
            self.queue.push_back(MicroOp::BeginRead);
        }
        for _ in 1..len {
            self.queue.push_back(MicroOp::Read);
        }
        self.queue.push_back(MicroOp::ReadLast);
        self.queue.push_back(next);
        Flow::Goto(if stalls > 0 {
            MicroOp::StallIdle
        } else {
            MicroOp::BeginRead
        })
    }

    fn start_write(&mut self, data: u32, len: usize, next: MicroOp) -> Flow {
        self.io_data = data;
        self.io_pos = if self.io_backwards { len as i32 - 1 } else { 0 };
        for _ in 0..len {
            self.queue.push_back(MicroOp::Write);
        }
        self.queue.push_back(next);
        Flow::Next
    }

    /// Queue a push of the top `len` bytes of `value`, most significant
    /// first. With `stall` the first cycle is idle and the writes follow
    /// from the queue; without it the first write happens immediately.
    fn start_push(&mut self, value: u32, len: usize, stall: bool, then: MicroOp) -> Flow {
        self.stack_data = value;
        self.stack_off = ((len - 1) * 8) as u32;
        if stall {
            for _ in 0..len {
                self.queue.push_back(MicroOp::Push);
            }
            self.queue.push_back(then);
            Flow::Goto(MicroOp::StallIdle)
        } else {
            for _ in 1..len {
                self.queue.push_back(MicroOp::Push);
            }
            self.queue.push_back(then);
            Flow::Goto(MicroOp::Push)
        }
    }

    fn start_pull(&mut self, len: usize, next: MicroOp) -> Flow {
        self.stack_data = 0;
        self.stack_off = 0;
        self.queue.push_back(MicroOp::StallIdle);
        self.queue.push_back(MicroOp::BeginPull);
        for _ in 1..len {
            self.queue.push_back(MicroOp::Pull);
        }
        self.queue.push_back(MicroOp::PullLast);
        self.queue.push_back(next);
        Flow::Goto(MicroOp::StallIdle)
    }

    /// Begin interrupt entry: optionally two leading stalls, then the state
    /// push (PBR, PC, P in native mode; PC, P in emulation mode) and the
    /// vector fetch. The first push cycle replaces the opcode fetch that
    /// would have happened this tick.
    fn enter_vector(&mut self, vector: u16, stall: bool) -> Flow {
        debug!("vector entry {:04X}", vector);
        if stall {
            self.queue.push_back(MicroOp::Stall);
            self.queue.push_back(MicroOp::Stall);
        }
        self.io_addr = vector;

        let value = u32::from(self.regs.pbr) << 24
            | u32::from(self.regs.pc) << 8
            | u32::from(self.regs.p.bits());
        let len = 3 + usize::from(!self.regs.e);
        self.start_push(value, len, false, MicroOp::VectorFetch)
    }

    fn maybe_stall_indexed(&mut self, bus: &mut dyn BusDriver) -> Flow {
        if self.target.indexed && self.target.inner_kind == TargetKind::Stack {
            return Flow::Goto(MicroOp::StallIdle);
        }

        if self.target.indexed
            && self.target.kind != TargetKind::Far
            && (self.target.addr_preindex & 0xFF00 != self.target.addr & 0xFF00
                || !self.regs.p.contains(Status::X)
                || decode::writeback_target(self.opcode) == Writeback::Mem)
        {
            // The address lines already show the unindexed page; patch in
            // the indexed low byte for the penalty cycle.
            bus.transitive_addr(far(
                self.target.bank_preindex,
                (self.target.addr_preindex & 0xFF00) | (self.target.addr & 0x00FF),
            ));
            return Flow::Goto(MicroOp::StallIdle);
        }

        Flow::Next
    }

    fn resolve_target(&mut self) -> Flow {
        self.target = Target::compute(self.opcode, self.operands, &self.regs);

        let unaligned_dp =
            self.target.kind == TargetKind::DirectPage && self.regs.d & 0xFF != 0;

        if self.target.indirect_len > 0 {
            let stalls = usize::from(unaligned_dp)
                + usize::from(self.target.indexed)
                + usize::from(self.target.kind == TargetKind::Stack);
            self.set_io(
                self.target.bank,
                self.target.addr,
                false,
                self.target.wrap_in_bank,
                false,
            );
            return self.start_read(self.target.indirect_len, stalls, MicroOp::ResolveIndirect);
        }

        if unaligned_dp {
            self.queue.push_back(MicroOp::StallIdle);
        }
        if self.target.kind == TargetKind::Stack {
            self.queue.push_back(MicroOp::StallIdle);
        }
        if self.target.indexed && self.target.kind != TargetKind::DirectPage {
            self.queue.push_back(MicroOp::MaybeStallIndexed);
        } else if self.target.indexed {
            self.queue.push_back(MicroOp::StallIdle);
        }

        self.queue.push_back(MicroOp::Execute);
        Flow::Next
    }

    fn execute(&mut self) -> Flow {
        let r = &mut self.regs;
        match self.opcode {
            // BRK and COP return past their signature byte.
            0x00 => {
                let vector = if r.e { 0xFFFE } else { 0xFFE6 };
                return self.enter_vector(vector, false);
            }
            0x02 => {
                let vector = if r.e { 0xFFF4 } else { 0xFFE4 };
                return self.enter_vector(vector, false);
            }

            0x08 => {
                let p = u32::from(r.p.bits());
                return self.push_op(p, 1); // PHP
            }
            0x0B => {
                let d = u32::from(r.d);
                return self.push_op(d, 2); // PHD
            }
            0x48 => {
                let (a, n) = (u32::from(r.a), r.a_size());
                return self.push_op(a, n); // PHA
            }
            0x4B => {
                let pbr = u32::from(r.pbr);
                return self.push_op(pbr, 1); // PHK
            }
            0x5A => {
                let (y, n) = (u32::from(r.y), r.xy_size());
                return self.push_op(y, n); // PHY
            }
            0x8B => {
                let dbr = u32::from(r.dbr);
                return self.push_op(dbr, 1); // PHB
            }
            0xDA => {
                let (x, n) = (u32::from(r.x), r.xy_size());
                return self.push_op(x, n); // PHX
            }
            0x62 => return self.push_op(u32::from(self.target.addr), 2), // PER
            0xD4 | 0xF4 => {
                // PEI / PEA push without the leading idle cycle
                let addr = u32::from(self.target.addr);
                return self.start_push(addr, 2, false, MicroOp::CompleteOp);
            }

            0x28 => return self.start_pull(1, MicroOp::PullToFlags), // PLP
            0x2B => {
                self.pull_to = PullDest::D;
                return self.start_pull(2, MicroOp::PullToRegister); // PLD
            }
            0x68 => {
                let n = r.a_size();
                return self.start_pull(n, MicroOp::PullToAccumulator); // PLA
            }
            0x7A => {
                self.pull_to = PullDest::Y;
                let n = r.xy_size();
                return self.start_pull(n, MicroOp::PullToRegister); // PLY
            }
            0xAB => {
                self.pull_to = PullDest::Dbr;
                return self.start_pull(1, MicroOp::PullToRegister); // PLB
            }
            0xFA => {
                self.pull_to = PullDest::X;
                let n = r.xy_size();
                return self.start_pull(n, MicroOp::PullToRegister); // PLX
            }

            0x40 => {
                let n = 3 + usize::from(!r.e);
                return self.start_pull(n, MicroOp::ExecuteReturn); // RTI
            }
            0x60 => return self.start_pull(2, MicroOp::ExecuteReturn), // RTS
            0x6B => return self.start_pull(3, MicroOp::ExecuteReturn), // RTL

            0x20 | 0xFC => return self.call_near(), // JSR
            0x22 => return self.call_far(),         // JSL

            0x4C | 0x6C | 0x7C => {
                r.pc = self.target.addr; // JMP
                return Flow::Goto(MicroOp::CompleteOp);
            }
            0x5C | 0xDC => {
                r.pbr = self.target.bank; // JMP absl / JML (abs)
                r.pc = self.target.addr;
                return Flow::Goto(MicroOp::CompleteOp);
            }

            0x44 | 0x54 => return Flow::Goto(MicroOp::BlockMoveRead), // MVP / MVN

            0x18 => r.p.remove(Status::C), // CLC
            0x38 => r.p.insert(Status::C), // SEC
            0x58 => r.p.remove(Status::I), // CLI
            0x78 => r.p.insert(Status::I), // SEI
            0xB8 => r.p.remove(Status::V), // CLV
            0xD8 => r.p.remove(Status::D), // CLD
            0xF8 => r.p.insert(Status::D), // SED

            0xC2 => {
                // REP clears the immediate's bits
                r.p.remove(Status::from_bits_retain(self.target.addr as u8));
                r.apply_mode_transition();
            }
            0xE2 => {
                // SEP
                r.p.insert(Status::from_bits_retain(self.target.addr as u8));
                r.apply_mode_transition();
            }
            0xFB => {
                // XCE swaps carry with the emulation bit
                let carry = r.p.contains(Status::C);
                r.p.set(Status::C, r.e);
                r.e = carry;
                r.apply_mode_transition();
            }

            0x1A => {
                let v = r.get_a().wrapping_add(1); // INA
                r.set_a(v);
                let top = (r.a_size() * 8 - 1) as u32;
                r.p.update_nz(r.a, top);
            }
            0x3A => {
                let v = r.get_a().wrapping_sub(1); // DEA
                r.set_a(v);
                let top = (r.a_size() * 8 - 1) as u32;
                r.p.update_nz(r.a, top);
            }
            0x88 => {
                r.set_y(r.y.wrapping_sub(1)); // DEY
                let top = (r.xy_size() * 8 - 1) as u32;
                r.p.update_nz(r.y, top);
            }
            0xC8 => {
                r.set_y(r.y.wrapping_add(1)); // INY
                let top = (r.xy_size() * 8 - 1) as u32;
                r.p.update_nz(r.y, top);
            }
            0xCA => {
                r.set_x(r.x.wrapping_sub(1)); // DEX
                let top = (r.xy_size() * 8 - 1) as u32;
                r.p.update_nz(r.x, top);
            }
            0xE8 => {
                r.set_x(r.x.wrapping_add(1)); // INX
                let top = (r.xy_size() * 8 - 1) as u32;
                r.p.update_nz(r.x, top);
            }

            0x1B => r.set_s(r.a), // TCS
            0x3B => {
                r.a = r.s; // TSC moves all 16 bits whatever the width
                r.p.update_nz(r.a, 15);
            }
            0x5B => {
                r.d = r.a; // TCD
                r.p.update_nz(r.d, 15);
            }
            0x7B => {
                r.a = r.d; // TDC
                r.p.update_nz(r.a, 15);
            }
            0x8A => {
                r.set_a(r.x); // TXA
                let top = (r.a_size() * 8 - 1) as u32;
                r.p.update_nz(r.a, top);
            }
            0x98 => {
                r.set_a(r.y); // TYA
                let top = (r.a_size() * 8 - 1) as u32;
                r.p.update_nz(r.a, top);
            }
            0x9A => r.set_s(r.x), // TXS
            0x9B => {
                r.y = r.x; // TXY
                let top = (r.xy_size() * 8 - 1) as u32;
                r.p.update_nz(r.y, top);
            }
            0xA8 => {
                r.set_y(r.a); // TAY
                let top = (r.xy_size() * 8 - 1) as u32;
                r.p.update_nz(r.y, top);
            }
            0xAA => {
                r.set_x(r.a); // TAX
                let top = (r.xy_size() * 8 - 1) as u32;
                r.p.update_nz(r.x, top);
            }
            0xBA => {
                r.set_x(r.s); // TSX
                let top = (r.xy_size() * 8 - 1) as u32;
                r.p.update_nz(r.x, top);
            }
            0xBB => {
                r.set_x(r.y); // TYX
                let top = (r.xy_size() * 8 - 1) as u32;
                r.p.update_nz(r.x, top);
            }

            0x82 => r.pc = self.target.addr, // BRL
            0x42 => r.pc = r.pc.wrapping_add(1), // WDM skips its operand byte
            0xEA => {}                           // NOP
            // TODO: WAI/STP should halt the sequencer until an interrupt
            // (or reset) line is asserted.
            0xCB | 0xDB => {}
            0xEB => {
                r.a = r.a.swap_bytes(); // XBA
                r.p.update_nz(r.a, 7);
                self.queue.push_back(MicroOp::StallIdle);
            }

            _ => return self.execute_grid(),
        }

        self.queue.push_back(MicroOp::CompleteOp);
        Flow::Goto(MicroOp::StallIdle)
    }

    fn push_op(&mut self, value: u32, len: usize) -> Flow {
        self.start_push(value, len, true, MicroOp::CompleteOp)
    }

    fn call_near(&mut self) -> Flow {
        let old_pc = self.regs.pc;
        self.regs.pc = self.target.addr;
        self.start_push(u32::from(old_pc.wrapping_sub(1)), 2, true, MicroOp::CompleteOp)
    }

    fn call_far(&mut self) -> Flow {
        let old_pc = self.regs.pc;
        let old_pbr = self.regs.pbr;
        self.regs.pc = self.target.addr;
        self.regs.pbr = self.target.bank;
        let value = u32::from(old_pc.wrapping_sub(1)) | u32::from(old_pbr) << 16;
        self.start_push(value, 3, true, MicroOp::CompleteOp)
    }

    /// The branches and the `aaabbbcc` grid.
    fn execute_grid(&mut self) -> Flow {
        if decode::is_branch(self.opcode) {
            const FLAG_BITS: [Status; 4] = [Status::N, Status::V, Status::C, Status::Z];
            let flag = FLAG_BITS[(self.opcode >> 6 & 0b11) as usize];
            let taken = self.opcode == 0x80
                || self.regs.p.contains(flag) == (self.opcode & 1 << 5 != 0);

            if !taken {
                return Flow::Goto(MicroOp::CompleteOp);
            }

            if self.regs.e && self.regs.pc & 0xFF00 != self.target.addr & 0xFF00 {
                self.queue.push_back(MicroOp::StallIdle);
            }
            self.regs.pc = self.target.addr;
            self.queue.push_back(MicroOp::CompleteOp);
            return Flow::Goto(MicroOp::StallIdle);
        }

        if decode::requires_load(self.opcode, self.target.kind) {
            let size = decode::result_size(self.opcode, &self.regs);
            self.set_io(
                self.target.bank,
                self.target.addr,
                false,
                self.target.wrap_in_bank,
                false,
            );
            return self.start_read(size, 0, MicroOp::ExecuteAlu);
        }

        self.io_data = u32::from(self.target.addr);
        Flow::Goto(MicroOp::ExecuteAlu)
    }

    fn execute_alu(&mut self) -> Flow {
        self.io_data = alu::evaluate(self.opcode, self.io_data, self.target.kind, &mut self.regs);

        let loaded = decode::requires_load(self.opcode, self.target.kind);
        // Register-addressed read-modify-write ops spend an extra idle cycle.
        let reg_stall = self.target.kind == TargetKind::Accumulator && !loaded;

        match decode::writeback_target(self.opcode) {
            Writeback::Discard => {}
            Writeback::A => {
                self.regs.set_a(self.io_data as u16);
                if reg_stall {
                    self.queue.push_back(MicroOp::StallIdle);
                }
            }
            Writeback::X => {
                self.regs.set_x(self.io_data as u16);
                if reg_stall {
                    self.queue.push_back(MicroOp::StallIdle);
                }
            }
            Writeback::Y => {
                self.regs.set_y(self.io_data as u16);
                if reg_stall {
                    self.queue.push_back(MicroOp::StallIdle);
                }
            }
            Writeback::Mem => {
                if loaded {
                    // Memory read-modify-write: idle cycle between the read
                    // and the write, holding write-level RWB in emulation
                    // mode and read-level in native mode.
                    self.queue.push_back(if self.regs.e {
                        MicroOp::StallIdleWrite
                    } else {
                        MicroOp::StallIdleRead
                    });
                }
                let size = decode::result_size(self.opcode, &self.regs);
                self.set_io(
                    self.target.bank,
                    self.target.addr,
                    loaded,
                    self.target.wrap_in_bank,
                    false,
                );
                let data = self.io_data;
                return self.start_write(data, size, MicroOp::CompleteOp);
            }
        }

        self.queue.push_back(MicroOp::CompleteOp);
        Flow::Next
    }

    fn execute_return(&mut self) -> Flow {
        match self.opcode {
            0x40 => {
                // RTI restores P, PC and (native mode) PBR
                if !self.regs.e {
                    self.regs.pbr = (self.stack_data >> 24) as u8;
                }
                self.regs.pc = (self.stack_data >> 8) as u16;
                self.regs.p = Status::from_bits_retain(self.stack_data as u8);
                self.regs.apply_mode_transition();
                Flow::Goto(MicroOp::CompleteOp)
            }
            0x60 => {
                self.regs.pc = (self.stack_data as u16).wrapping_add(1);
                self.queue.push_back(MicroOp::CompleteOp);
                Flow::Goto(MicroOp::StallIdle)
            }
            0x6B => {
                self.regs.pc = (self.stack_data as u16).wrapping_add(1);
                self.regs.pbr = (self.stack_data >> 16) as u8;
                Flow::Goto(MicroOp::CompleteOp)
            }
            _ => unreachable!("return continuation for opcode {:02X}", self.opcode),
        }
    }

    fn block_move_next(&mut self) -> Flow {
        self.queue.push_back(MicroOp::StallIdle);

        if self.regs.a != 0 {
            // One byte moved, more to go: rewind PC so the opcode refetch
            // makes the move interruptible between iterations.
            self.regs.a -= 1;
            self.regs.pc = self.regs.pc.wrapping_sub(3);
            let step: i16 = if self.opcode == 0x44 { -1 } else { 1 };
            self.regs.set_x(self.regs.x.wrapping_add_signed(step));
            self.regs.set_y(self.regs.y.wrapping_add_signed(step));
            self.regs.dbr = self.operands[0];
            self.queue.push_back(MicroOp::FetchOpcode);
        } else {
            self.queue.push_back(MicroOp::CompleteOp);
        }

        Flow::Goto(MicroOp::StallIdleRead)
    }
}
