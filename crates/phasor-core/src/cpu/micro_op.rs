/// One continuation tag in the sequencer's micro-op queue.
///
/// Each tag names the point the state machine resumes from on a later tick.
/// The original resumption scheme was a queue of code addresses; here it is
/// a closed enumeration popped one entry per tick, with tags allowed to
/// chain within a tick until exactly one bus directive has been posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MicroOp {
    /// Idle cycle driving the current program-counter address, read direction.
    Stall,
    /// Idle cycle with a neutral address.
    StallIdle,
    /// Idle cycle holding the last transfer's lines, read direction.
    StallIdleRead,
    /// Idle cycle holding the last transfer's lines, write direction.
    StallIdleWrite,
    /// Conditional idle cycle for indexed targets (page cross / wide index /
    /// memory write), with the mid-cycle address fix-up.
    MaybeStallIndexed,

    /// Reset vector low byte read.
    ResetVectorLo,
    /// Reset vector high byte read.
    ResetVectorHi,
    /// Latch the reset vector and fall into opcode fetch.
    ResetDone,

    /// Interrupt/opcode boundary: interrupt checks, then the opcode read.
    FetchOpcode,
    /// Latch the opcode, decide the operand length.
    Decode,
    /// Post an operand byte read without latching (first operand cycle).
    BeginOperandFetch,
    /// Latch an operand byte and post the next operand read.
    FetchOperand,
    /// Latch the final operand byte and resolve the target.
    FetchOperandLast,

    /// Compute the operand target descriptor, queue penalty cycles.
    ResolveTarget,
    /// Reinterpret the just-read pointer bytes as the real target.
    ResolveIndirect,
    /// Opcode dispatch.
    Execute,
    /// ALU evaluation and writeback for aaabbbcc-encoded opcodes.
    ExecuteAlu,
    /// RTS/RTL/RTI return-address handling after the pull completes.
    ExecuteReturn,

    /// Write one byte of the pending push, post-decrementing S.
    Push,
    /// Pre-increment S and post the first pull read.
    BeginPull,
    /// Latch a pulled byte and post the next pull read.
    Pull,
    /// Latch the final pulled byte.
    PullLast,
    /// Route the pulled value into the status register.
    PullToFlags,
    /// Route the pulled value into the accumulator.
    PullToAccumulator,
    /// Route the pulled value into D, DBR, X or Y.
    PullToRegister,

    /// Post the first byte read of a multi-byte transfer.
    BeginRead,
    /// Latch a byte, advance the cursor, post the next read.
    Read,
    /// Latch the final byte of a multi-byte transfer.
    ReadLast,
    /// Post one byte write of a multi-byte transfer.
    Write,

    /// Block move: read one byte from the source bank.
    BlockMoveRead,
    /// Block move: write the byte to the destination bank.
    BlockMoveWrite,
    /// Block move: adjust counters and loop or finish.
    BlockMoveNext,

    /// Read the 2-byte interrupt vector (vector-pull qualified).
    VectorFetch,
    /// Load PC from the vector, fix up mode flags, fall into fetch.
    VectorJump,

    /// Count the instruction and fall into the next opcode fetch.
    CompleteOp,
}
