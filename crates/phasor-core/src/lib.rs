//! Cycle-accurate W65C816 instruction execution engine.
//!
//! The core advances one bus transaction per call to [`Cpu::tick`]; memory,
//! clocking and device decode live behind the [`BusDriver`] trait supplied
//! by the embedder. Cycle counts, penalty cycles and the address/qualifier
//! lines driven on internal cycles follow the W65C816S data sheet.

pub mod bus;
pub mod cpu;

pub use bus::BusDriver;
pub use cpu::Cpu;
pub use cpu::registers::Registers;
pub use cpu::status::Status;
