// Trap and Interrupt Unit — priority arbitration and PSW save/load across
// the fixed low-memory vector slots. Grounded on
// `original_source/IBM360/ibm360_cpu.c`'s interrupt-priority scan and
// `ibm360_defs.h`'s slot offsets.

use crate::cpu::Cpu;
use crate::error::Fault;
use crate::psw::Psw;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSource {
    ClockCompare,
    IntervalTimer,
    ExternalSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptClass {
    MachineCheck,
    ProgramCheck,
    SupervisorCall,
    External(ExternalSource),
    Io,
}

impl InterruptClass {
    /// Lower is higher priority: machine-check, program-check,
    /// supervisor-call, external, I/O; within external, clock-compare >
    /// interval-timer > external-signal.
    fn rank(self) -> u8 {
        match self {
            InterruptClass::MachineCheck => 0,
            InterruptClass::ProgramCheck => 1,
            InterruptClass::SupervisorCall => 2,
            InterruptClass::External(ExternalSource::ClockCompare) => 3,
            InterruptClass::External(ExternalSource::IntervalTimer) => 4,
            InterruptClass::External(ExternalSource::ExternalSignal) => 5,
            InterruptClass::Io => 6,
        }
    }

    /// Returns (old-PSW slot, new-PSW slot).
    fn slots(self) -> (u32, u32) {
        match self {
            InterruptClass::External(_) => (0x18, 0x58),
            InterruptClass::SupervisorCall => (0x20, 0x60),
            InterruptClass::ProgramCheck => (0x28, 0x68),
            InterruptClass::MachineCheck => (0x30, 0x70),
            InterruptClass::Io => (0x38, 0x78),
        }
    }
}

/// Per-interruption parameter scratch at 0x80.
const DIAGAREA: u32 = 0x80;

/// Latched event-pending state, cleared one source at a time on delivery:
/// only the event-pending flag for the delivered source clears.
#[derive(Debug, Clone, Default)]
pub struct PendingInterrupts {
    pub machine_check: bool,
    pub program_check: Option<(Fault, u8)>,
    pub supervisor_call: Option<u8>,
    pub clock_compare: bool,
    pub interval_timer: bool,
    pub external_signal: bool,
    pub io: Option<u16>,
}

impl PendingInterrupts {
    pub fn is_empty(&self) -> bool {
        !self.machine_check
            && self.program_check.is_none()
            && self.supervisor_call.is_none()
            && !self.clock_compare
            && !self.interval_timer
            && !self.external_signal
            && self.io.is_none()
    }

    /// Highest-priority pending source that is also enabled by the live PSW
    /// bits, or `None` if nothing eligible is pending.
    pub fn highest(&self, psw: &Psw) -> Option<InterruptClass> {
        let mut candidates = Vec::new();
        if self.machine_check && psw.machine_check_enabled {
            candidates.push(InterruptClass::MachineCheck);
        }
        if self.program_check.is_some() {
            candidates.push(InterruptClass::ProgramCheck);
        }
        if self.supervisor_call.is_some() {
            candidates.push(InterruptClass::SupervisorCall);
        }
        if psw.external_enabled {
            if self.clock_compare {
                candidates.push(InterruptClass::External(ExternalSource::ClockCompare));
            }
            if self.interval_timer {
                candidates.push(InterruptClass::External(ExternalSource::IntervalTimer));
            }
            if self.external_signal {
                candidates.push(InterruptClass::External(ExternalSource::ExternalSignal));
            }
        }
        if self.io.is_some() && psw.io_enabled {
            candidates.push(InterruptClass::Io);
        }
        candidates.into_iter().min_by_key(|c| c.rank())
    }

    fn clear(&mut self, class: InterruptClass) {
        match class {
            InterruptClass::MachineCheck => self.machine_check = false,
            InterruptClass::ProgramCheck => self.program_check = None,
            InterruptClass::SupervisorCall => self.supervisor_call = None,
            InterruptClass::External(ExternalSource::ClockCompare) => self.clock_compare = false,
            InterruptClass::External(ExternalSource::IntervalTimer) => self.interval_timer = false,
            InterruptClass::External(ExternalSource::ExternalSignal) => self.external_signal = false,
            InterruptClass::Io => self.io = None,
        }
    }
}

/// Delivers the given interrupt class: saves the live PSW to its old slot,
/// writes any fault parameters to the diagnostic scratch, loads and installs
/// the new PSW, and clears the delivered source.
pub fn deliver(cpu: &mut Cpu, class: InterruptClass) -> Result<(), Fault> {
    let (old_slot, new_slot) = class.slots();

    let mut old_psw = cpu.psw;
    if let InterruptClass::ProgramCheck = class {
        if let Some((fault, _)) = cpu.pending.program_check {
            if let Some((va, segment)) = fault.translation_params() {
                cpu.memory.poke_word(DIAGAREA, va)?;
                if let Some(seg) = segment {
                    cpu.memory.poke_word(DIAGAREA + 4, seg)?;
                }
            }
        }
    }
    if let InterruptClass::SupervisorCall = class {
        if let Some(code) = cpu.pending.supervisor_call {
            old_psw.interrupt_code = code as u16;
        }
    }
    if let InterruptClass::ProgramCheck = class {
        if let Some((_, code)) = cpu.pending.program_check {
            old_psw.interrupt_code = code as u16;
        }
    }

    let (w0, w1) = old_psw.to_bits();
    cpu.memory.poke_word(old_slot, w0)?;
    cpu.memory.poke_word(old_slot + 4, w1)?;

    let new_w0 = cpu.memory.peek_word(new_slot)?;
    let new_w1 = cpu.memory.peek_word(new_slot + 4)?;
    let mut new_psw = Psw::from_bits(cpu.psw.mode, new_w0, new_w1);
    new_psw.clear_ilc();

    cpu.psw = new_psw;
    cpu.pending.clear(class);
    log::debug!("trap delivered: {:?}, restart at {:#x}", class, cpu.psw.instruction_addr);
    Ok(())
}
