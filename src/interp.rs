// 4.5 Interpreter Core — one dispatch method per tagged `Instruction`
// variant, following the `Instruction::execute(&self, cpu: &mut CPU)`
// pattern in `instructions.rs` (the per-handler contract: validate operands,
// gather, invoke the arithmetic unit, writeback, update CC, advance PC) but
// rewritten so every handler returns `Result<(), Fault>` instead of
// mutating unconditionally.
//
// Handlers that touch memory always resolve addresses and perform reads
// *before* advancing the instruction pointer, so an addressing/translation/
// specification fault restarts at the unchanged address.
// Arithmetic handlers advance the pointer and commit their writeback before
// returning an overflow-class fault, e.g. a packed-decimal add whose memory
// operand is updated despite overflowing.

use crate::cpu::Cpu;
use crate::decode;
use crate::error::Fault;
use crate::instr::{Instruction, RxOperand, SOperand, SsOperand};
use crate::psw::ADDR_MASK;
use crate::translate::AccessKind;
use crate::value::{Size, Value};
use crate::arith::{decimal, float, integer};
use crate::arith::float::HEX_LONG;
use crate::trap::{self, InterruptClass};

fn rx_address(cpu: &Cpu, op: RxOperand) -> u32 {
    let x = if op.x2 != 0 { cpu.gpr[op.x2 as usize] } else { 0 };
    let b = if op.b2 != 0 { cpu.gpr[op.b2 as usize] } else { 0 };
    x.wrapping_add(b).wrapping_add(op.d2 as u32) & ADDR_MASK
}

fn s_address(cpu: &Cpu, op: SOperand) -> u32 {
    let b = if op.b2 != 0 { cpu.gpr[op.b2 as usize] } else { 0 };
    b.wrapping_add(op.d2 as u32) & ADDR_MASK
}

fn ss_address1(cpu: &Cpu, op: SsOperand) -> u32 {
    let b = if op.b1 != 0 { cpu.gpr[op.b1 as usize] } else { 0 };
    b.wrapping_add(op.d1 as u32) & ADDR_MASK
}

fn ss_address2(cpu: &Cpu, op: SsOperand) -> u32 {
    let b = if op.b2 != 0 { cpu.gpr[op.b2 as usize] } else { 0 };
    b.wrapping_add(op.d2 as u32) & ADDR_MASK
}

fn advance(cpu: &mut Cpu, pc: u32, length: usize) {
    cpu.psw.instruction_addr = pc.wrapping_add(length as u32) & ADDR_MASK;
}

fn read_word(cpu: &mut Cpu, va: u32, kind: AccessKind) -> Result<u32, Fault> {
    let pa = cpu.translate(va, kind)?;
    cpu.memory.read_word(pa, cpu.psw.storage_key)
}

fn read_half(cpu: &mut Cpu, va: u32) -> Result<i32, Fault> {
    let pa = cpu.translate(va, AccessKind::DataRead)?;
    Ok(cpu.memory.read(pa, Size::Half, cpu.psw.storage_key)?.sign_extend())
}

fn write_word(cpu: &mut Cpu, va: u32, value: u32) -> Result<(), Fault> {
    let pa = cpu.translate(va, AccessKind::DataWrite)?;
    cpu.memory.write_word(pa, value, cpu.psw.storage_key)
}

fn write_half(cpu: &mut Cpu, va: u32, value: u16) -> Result<(), Fault> {
    let pa = cpu.translate(va, AccessKind::DataWrite)?;
    cpu.memory.write(pa, Value::Half(value), cpu.psw.storage_key)
}

fn read_bytes(cpu: &mut Cpu, va: u32, len: usize) -> Result<Vec<u8>, Fault> {
    let mut bytes = Vec::with_capacity(len);
    for i in 0..len {
        let pa = cpu.translate(va.wrapping_add(i as u32) & ADDR_MASK, AccessKind::DataRead)?;
        let value = cpu.memory.read(pa, Size::Byte, cpu.psw.storage_key)?;
        bytes.push(value.inner() as u8);
    }
    Ok(bytes)
}

fn write_bytes(cpu: &mut Cpu, va: u32, bytes: &[u8]) -> Result<(), Fault> {
    for (i, &b) in bytes.iter().enumerate() {
        let pa = cpu.translate(va.wrapping_add(i as u32) & ADDR_MASK, AccessKind::DataWrite)?;
        cpu.memory.write(pa, Value::Byte(b), cpu.psw.storage_key)?;
    }
    Ok(())
}

fn read_fpr(cpu: &Cpu, reg: u8) -> float::Float {
    let hi = cpu.fpr[reg as usize];
    let lo = cpu.fpr[reg as usize + 1];
    decode_long_float_words(hi, lo)
}

fn write_fpr(cpu: &mut Cpu, reg: u8, value: float::Float) {
    let (hi, lo) = encode_long_float_words(&value);
    cpu.fpr[reg as usize] = hi;
    cpu.fpr[reg as usize + 1] = lo;
}

/// Hex-long wire format: word0 bit31 sign, bits24-30 excess-64 characteristic,
/// bits0-23 high fraction; word1 low fraction. Grounded on
/// `original_source/IBM360/ibm360_cpu.c`'s `AD`/`SD` long-format operand
/// layout (characteristic/fraction split).
fn decode_long_float_words(w0: u32, w1: u32) -> float::Float {
    let sign = w0 & 0x8000_0000 != 0;
    let characteristic = (w0 >> 24) & 0x7f;
    let exponent = characteristic as i32 - 64;
    let fraction56 = (((w0 & 0x00ff_ffff) as u64) << 32) | w1 as u64;
    let mantissa = fraction56 << (64 - 56);
    float::Float { sign, exponent, mantissa }
}

fn encode_long_float_words(v: &float::Float) -> (u32, u32) {
    let characteristic = ((v.exponent + 64) as u32) & 0x7f;
    let fraction56 = v.mantissa >> (64 - 56);
    let w0 = ((v.sign as u32) << 31) | (characteristic << 24) | ((fraction56 >> 32) as u32 & 0x00ff_ffff);
    let w1 = fraction56 as u32;
    (w0, w1)
}

/// Dispatches one decoded instruction. `length` is the instruction's own
/// byte length, used to compute the next sequential address.
pub fn execute(cpu: &mut Cpu, instruction: Instruction, length: usize) -> Result<(), Fault> {
    let pc = cpu.psw.instruction_addr;
    match instruction {
        Instruction::Lr { r1, r2 } => {
            advance(cpu, pc, length);
            cpu.gpr[r1 as usize] = cpu.gpr[r2 as usize];
            Ok(())
        }
        Instruction::Ar { r1, r2 } => {
            advance(cpu, pc, length);
            let result = integer::add(cpu.gpr[r1 as usize] as i32, cpu.gpr[r2 as usize] as i32);
            cpu.gpr[r1 as usize] = result.value as u32;
            cpu.psw.cc = result.cc as u8;
            if result.overflow {
                Err(Fault::FixedPointOverflow)
            } else {
                Ok(())
            }
        }
        Instruction::Adr { r1, r2 } => {
            advance(cpu, pc, length);
            let acc = read_fpr(cpu, r1);
            let operand = read_fpr(cpu, r2);
            let result = float::add(&HEX_LONG, &acc, &operand);
            write_fpr(cpu, r1, result.value);
            cpu.psw.cc = result.cc as u8;
            match result.fault {
                Some(f) => Err(f),
                None => Ok(()),
            }
        }
        Instruction::Balr { r1, r2 } => {
            let next = pc.wrapping_add(length as u32) & ADDR_MASK;
            if r1 != 0 {
                cpu.gpr[r1 as usize] = next;
            }
            cpu.psw.instruction_addr = if r2 != 0 { cpu.gpr[r2 as usize] & ADDR_MASK } else { next };
            Ok(())
        }
        Instruction::Bcr { mask, r2 } => {
            let next = pc.wrapping_add(length as u32) & ADDR_MASK;
            let taken = r2 != 0 && mask_hits(mask, cpu.psw.cc);
            cpu.psw.instruction_addr = if taken { cpu.gpr[r2 as usize] & ADDR_MASK } else { next };
            Ok(())
        }
        Instruction::Svc { code } => {
            advance(cpu, pc, length);
            cpu.pending.supervisor_call = Some(code);
            trap::deliver(cpu, InterruptClass::SupervisorCall)
        }
        Instruction::Lh(op) => {
            let ea = rx_address(cpu, op);
            let value = read_half(cpu, ea)?;
            advance(cpu, pc, length);
            cpu.gpr[op.r1 as usize] = value as u32;
            Ok(())
        }
        Instruction::Ah(op) => {
            let ea = rx_address(cpu, op);
            let operand = read_half(cpu, ea)?;
            advance(cpu, pc, length);
            let result = integer::add(cpu.gpr[op.r1 as usize] as i32, operand);
            cpu.gpr[op.r1 as usize] = result.value as u32;
            cpu.psw.cc = result.cc as u8;
            if result.overflow {
                Err(Fault::FixedPointOverflow)
            } else {
                Ok(())
            }
        }
        Instruction::L(op) => {
            let ea = rx_address(cpu, op);
            let value = read_word(cpu, ea, AccessKind::DataRead)?;
            advance(cpu, pc, length);
            cpu.gpr[op.r1 as usize] = value;
            Ok(())
        }
        Instruction::A(op) => {
            let ea = rx_address(cpu, op);
            let operand = read_word(cpu, ea, AccessKind::DataRead)? as i32;
            advance(cpu, pc, length);
            let result = integer::add(cpu.gpr[op.r1 as usize] as i32, operand);
            cpu.gpr[op.r1 as usize] = result.value as u32;
            cpu.psw.cc = result.cc as u8;
            if result.overflow {
                Err(Fault::FixedPointOverflow)
            } else {
                Ok(())
            }
        }
        Instruction::St(op) => {
            let ea = rx_address(cpu, op);
            write_word(cpu, ea, cpu.gpr[op.r1 as usize])?;
            advance(cpu, pc, length);
            Ok(())
        }
        Instruction::Sth(op) => {
            let ea = rx_address(cpu, op);
            write_half(cpu, ea, cpu.gpr[op.r1 as usize] as u16)?;
            advance(cpu, pc, length);
            Ok(())
        }
        Instruction::Bc { mask, op } => {
            let ea = rx_address(cpu, op);
            let next = pc.wrapping_add(length as u32) & ADDR_MASK;
            cpu.psw.instruction_addr = if mask_hits(mask, cpu.psw.cc) { ea } else { next };
            Ok(())
        }
        Instruction::Bal(op) => {
            let ea = rx_address(cpu, op);
            let next = pc.wrapping_add(length as u32) & ADDR_MASK;
            if op.r1 != 0 {
                cpu.gpr[op.r1 as usize] = next;
            }
            cpu.psw.instruction_addr = ea;
            Ok(())
        }
        Instruction::Ex(op) => execute_ex(cpu, op, pc, length),
        Instruction::Cvb(op) => {
            let ea = rx_address(cpu, op);
            let bytes = read_bytes(cpu, ea, 8)?;
            let packed = decimal::Packed::from_bytes(&bytes)?;
            advance(cpu, pc, length);
            match decimal::packed_to_binary(&packed) {
                Some(value) => {
                    cpu.gpr[op.r1 as usize] = value as u32;
                    Ok(())
                }
                // Too large to fit a fullword: `original_source/IBM360/
                // ibm360_cpu.c`'s CVB handler raises IRC_FIXDIV for this.
                None => Err(Fault::FixedPointDivide),
            }
        }
        Instruction::Cvd(op) => {
            let ea = rx_address(cpu, op);
            let packed = decimal::binary_to_packed(cpu.gpr[op.r1 as usize] as i32, 15);
            let bytes = packed.to_bytes();
            write_bytes(cpu, ea, &bytes)?;
            advance(cpu, pc, length);
            Ok(())
        }
        Instruction::Ad(op) => {
            let ea = rx_address(cpu, op);
            let w0 = read_word(cpu, ea, AccessKind::DataRead)?;
            let w1 = read_word(cpu, ea.wrapping_add(4) & ADDR_MASK, AccessKind::DataRead)?;
            let operand = decode_long_float_words(w0, w1);
            advance(cpu, pc, length);
            let acc = read_fpr(cpu, op.r1);
            let result = float::add(&HEX_LONG, &acc, &operand);
            write_fpr(cpu, op.r1, result.value);
            cpu.psw.cc = result.cc as u8;
            match result.fault {
                Some(f) => Err(f),
                None => Ok(()),
            }
        }
        Instruction::Lpsw(op) => {
            if cpu.psw.problem_state {
                return Err(Fault::Privilege);
            }
            let ea = s_address(cpu, op);
            let w0 = read_word(cpu, ea, AccessKind::DataRead)?;
            let w1 = read_word(cpu, ea.wrapping_add(4) & ADDR_MASK, AccessKind::DataRead)?;
            let new_psw = crate::psw::Psw::from_bits(cpu.psw.mode, w0, w1);
            if new_psw.is_specification_invalid() {
                return Err(Fault::Specification);
            }
            cpu.psw = new_psw;
            Ok(())
        }
        Instruction::Mvc(op) => {
            let len = ((op.l1 << 4) | op.l2) as usize + 1;
            let src = ss_address2(cpu, op);
            let dst = ss_address1(cpu, op);
            let bytes = read_bytes(cpu, src, len)?;
            write_bytes(cpu, dst, &bytes)?;
            advance(cpu, pc, length);
            Ok(())
        }
        Instruction::Zap(op) => {
            let len1 = op.l1 as usize + 1;
            let len2 = op.l2 as usize + 1;
            let addr1 = ss_address1(cpu, op);
            let addr2 = ss_address2(cpu, op);
            let operand2 = decimal::Packed::from_bytes(&read_bytes(cpu, addr2, len2)?)?;
            advance(cpu, pc, length);
            let zero = decimal::Packed::zero(digit_count(len1));
            let (result, cc, overflow) = zero.add(&operand2, digit_count(len1));
            write_bytes(cpu, addr1, &result.to_bytes())?;
            cpu.psw.cc = if overflow { integer::Cc::High as u8 } else { cc as u8 };
            if overflow {
                Err(Fault::DecimalOverflow)
            } else {
                Ok(())
            }
        }
        Instruction::Ap(op) => decimal_arith(cpu, op, pc, length, false),
        Instruction::Sp(op) => decimal_arith(cpu, op, pc, length, true),
        Instruction::Cp(op) => {
            let len1 = op.l1 as usize + 1;
            let len2 = op.l2 as usize + 1;
            let addr1 = ss_address1(cpu, op);
            let addr2 = ss_address2(cpu, op);
            let operand1 = decimal::Packed::from_bytes(&read_bytes(cpu, addr1, len1)?)?;
            let operand2 = decimal::Packed::from_bytes(&read_bytes(cpu, addr2, len2)?)?;
            advance(cpu, pc, length);
            cpu.psw.cc = operand1.compare(&operand2) as u8;
            Ok(())
        }
    }
}

fn decimal_arith(cpu: &mut Cpu, op: SsOperand, pc: u32, length: usize, subtract: bool) -> Result<(), Fault> {
    let len1 = op.l1 as usize + 1;
    let len2 = op.l2 as usize + 1;
    let addr1 = ss_address1(cpu, op);
    let addr2 = ss_address2(cpu, op);
    let operand1 = decimal::Packed::from_bytes(&read_bytes(cpu, addr1, len1)?)?;
    let operand2 = decimal::Packed::from_bytes(&read_bytes(cpu, addr2, len2)?)?;
    advance(cpu, pc, length);
    let (result, cc, overflow) = if subtract {
        operand1.subtract(&operand2, digit_count(len1))
    } else {
        operand1.add(&operand2, digit_count(len1))
    };
    write_bytes(cpu, addr1, &result.to_bytes())?;
    cpu.psw.cc = if overflow { integer::Cc::High as u8 } else { cc as u8 };
    if overflow {
        Err(Fault::DecimalOverflow)
    } else {
        Ok(())
    }
}

/// Digit count (including sign-bearing final nibble position) for an
/// `len`-byte packed field: two nibbles per byte minus the sign nibble.
fn digit_count(len: usize) -> usize {
    len * 2 - 1
}

/// Condition-code mask test shared by BC/BCR: mask bit 0x8 selects CC0, 0x4
/// CC1, 0x2 CC2, 0x1 CC3 (classic 360 branch-on-condition encoding).
fn mask_hits(mask: u8, cc: u8) -> bool {
    mask & (0x8 >> cc) != 0
}

fn execute_ex(cpu: &mut Cpu, op: RxOperand, pc: u32, length: usize) -> Result<(), Fault> {
    let target_addr = rx_address(cpu, op);
    let (mut bytes, target_len) = decode::fetch_bytes(cpu, target_addr)?;
    if op.r1 != 0 {
        bytes[1] |= (cpu.gpr[op.r1 as usize] & 0xff) as u8;
    }
    let target = crate::instr::decode_instruction(&bytes[..target_len])?;
    advance(cpu, pc, length);
    cpu.execute_target(target, target_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn cpu_with_image(bytes: &[u8]) -> Cpu {
        let mut cpu = Cpu::new(Config::default());
        cpu.load_image(0x200, bytes).unwrap();
        cpu
    }

    #[test]
    fn ar_sets_cc_and_advances_pc() {
        let mut cpu = cpu_with_image(&[0x1A, 0x12]); // AR R1,R2
        cpu.gpr[1] = 5;
        cpu.gpr[2] = 7;
        cpu.step().unwrap();
        assert_eq!(cpu.gpr[1], 12);
        assert_eq!(cpu.psw.instruction_addr, 0x202);
    }

    #[test]
    fn ar_overflow_commits_writeback_then_traps() {
        let mut cpu = cpu_with_image(&[0x1A, 0x12]);
        cpu.gpr[1] = i32::MAX as u32;
        cpu.gpr[2] = 1;
        cpu.step().unwrap();
        assert_eq!(cpu.gpr[1], i32::MIN as u32);
        // ILC advanced past the AR before the program-check trap fired.
        assert_ne!(cpu.psw.instruction_addr, 0x200);
    }

    #[test]
    fn load_and_store_round_trip_through_memory() {
        // ST R1,0(0,R2) then L R3,0(0,R2)
        let mut cpu = cpu_with_image(&[0x50, 0x10, 0x20, 0x00, 0x58, 0x30, 0x20, 0x00]);
        cpu.gpr[1] = 0xdead_beef;
        cpu.gpr[2] = 0x400;
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.gpr[3], 0xdead_beef);
    }

    #[test]
    fn bc_always_branches_on_mask_15() {
        let mut cpu = cpu_with_image(&[0x47, 0xF0, 0x20, 0x00]); // BC 15,0(0,R2)
        cpu.gpr[2] = 0x300;
        cpu.step().unwrap();
        assert_eq!(cpu.psw.instruction_addr, 0x300);
    }

    #[test]
    fn ap_overflow_still_stores_truncated_result() {
        let mut cpu = Cpu::new(Config::default());
        let a = decimal::Packed { digits: vec![9, 9, 9, 9, 9], negative: false };
        let b = decimal::Packed { digits: vec![0, 0, 0, 0, 1], negative: false };
        cpu.memory.load_image(0x400, &a.to_bytes()).unwrap();
        cpu.memory.load_image(0x410, &b.to_bytes()).unwrap();
        // AP 0(3,0x400),0(3,0x410): l1=l2=2 (3-byte fields)
        cpu.load_image(0x200, &[0xFA, 0x22, 0x04, 0x00, 0x04, 0x10]).unwrap();
        let err = cpu.step().unwrap_err();
        assert!(matches!(err, Fault::DecimalOverflow));
        let word = cpu.memory.read_word(0x400, 0).unwrap();
        let stored = word.to_be_bytes();
        let packed = decimal::Packed::from_bytes(&stored[..3]).unwrap();
        assert_eq!(packed.digits, vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn execute_runs_target_without_advancing_history_twice() {
        // AR R1,R2 sitting at 0x300, EX R0,0x300(0,0) at 0x200 issuing it unmodified.
        let mut ex_cpu = Cpu::new(Config::default());
        ex_cpu.memory.load_image(0x300, &[0x1A, 0x12]).unwrap();
        ex_cpu.load_image(0x200, &[0x44, 0x00, 0x03, 0x00]).unwrap();
        ex_cpu.gpr[1] = 2;
        ex_cpu.gpr[2] = 3;
        ex_cpu.step().unwrap();
        assert_eq!(ex_cpu.gpr[1], 5);
        assert_eq!(ex_cpu.psw.instruction_addr, 0x204);
    }

    #[test]
    fn execute_of_execute_is_rejected() {
        let mut cpu = Cpu::new(Config::default());
        cpu.memory.load_image(0x300, &[0x44, 0x00, 0x03, 0x00]).unwrap();
        cpu.load_image(0x200, &[0x44, 0x00, 0x03, 0x00]).unwrap();
        let err = cpu.step().unwrap_err();
        assert!(matches!(err, Fault::Execute));
    }
}
