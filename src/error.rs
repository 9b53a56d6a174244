// Fault taxonomy. Every fallible core primitive returns Result<T, Fault>
// instead of cutting control flow with goto/panic.

use thiserror::Error;

/// A synchronous program-check class, plus the handful of causes the trap
/// unit delivers that are not program-checks (machine-check, external, I/O,
/// supervisor-call are handled by `crate::trap::InterruptClass` instead;
/// `Fault` covers only what an instruction or memory access can itself raise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("addressing exception: physical address {0:#x} out of range")]
    Addressing(u32),

    #[error("protection exception: key mismatch at frame containing {0:#x}")]
    Protection(u32),

    #[error("specification exception")]
    Specification,

    #[error("segment translation exception: segment {0} of va {1:#x}")]
    SegmentTranslation(u32, u32),

    #[error("page translation exception: va {0:#x}")]
    PageTranslation(u32),

    #[error("operation exception: opcode {0:#06x} not implemented or disabled")]
    Operation(u16),

    #[error("privileged operation exception")]
    Privilege,

    #[error("fixed-point overflow exception")]
    FixedPointOverflow,

    #[error("fixed-point divide exception")]
    FixedPointDivide,

    #[error("decimal overflow exception")]
    DecimalOverflow,

    #[error("decimal divide exception")]
    DecimalDivide,

    #[error("exponent overflow exception")]
    ExponentOverflow,

    #[error("exponent underflow exception")]
    ExponentUnderflow,

    #[error("significance exception")]
    Significance,

    #[error("floating-point divide exception")]
    FloatingDivide,

    #[error("execute exception: nested EXECUTE")]
    Execute,
}

impl Fault {
    /// The va/segment pair written to the 0x80 diagnostic scratch slot on
    /// delivery, if this fault carries one.
    pub fn translation_params(&self) -> Option<(u32, Option<u32>)> {
        match *self {
            Fault::SegmentTranslation(seg, va) => Some((va, Some(seg))),
            Fault::PageTranslation(va) => Some((va, None)),
            Fault::Addressing(va) => Some((va, None)),
            _ => None,
        }
    }

    /// Whether this fault's delivery is gated by a program-mask bit rather
    /// than always being enabled.
    pub fn maskable(&self) -> bool {
        matches!(
            self,
            Fault::FixedPointOverflow
                | Fault::DecimalOverflow
                | Fault::ExponentOverflow
                | Fault::ExponentUnderflow
                | Fault::Significance
        )
    }

    /// Interruption code written to the old PSW's low byte/halfword on
    /// delivery, bit-exact with `original_source/IBM360/ibm360_cpu.c`'s
    /// `IRC_*` table.
    pub fn interruption_code(&self) -> u16 {
        match self {
            Fault::Operation(_) => 0x0001,
            Fault::Privilege => 0x0002,
            Fault::Execute => 0x0003,
            Fault::Protection(_) => 0x0004,
            Fault::Addressing(_) => 0x0005,
            Fault::Specification => 0x0006,
            Fault::FixedPointOverflow => 0x0008,
            Fault::FixedPointDivide => 0x0009,
            Fault::DecimalOverflow => 0x000a,
            Fault::DecimalDivide => 0x000b,
            Fault::ExponentOverflow => 0x000c,
            Fault::ExponentUnderflow => 0x000d,
            Fault::Significance => 0x000e,
            Fault::FloatingDivide => 0x000f,
            Fault::SegmentTranslation(_, _) => 0x0010,
            Fault::PageTranslation(_) => 0x0011,
        }
    }

    /// Whether this fault's handler has already committed its writeback and
    /// advanced the instruction pointer before the fault surfaced — e.g.
    /// packed-decimal overflow updates its memory operand despite trapping.
    /// Restart-class faults — addressing, translation,
    /// decode, privilege — are raised before any state mutation and always
    /// restart at the unchanged instruction address; this is exactly the
    /// maskable set, since only the overflow/significance family commits.
    pub fn commits_before_trap(&self) -> bool {
        self.maskable()
    }
}
