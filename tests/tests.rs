// End-to-end scenarios driven through the public `Cpu` API: a scripted
// scenario against a fully assembled machine rather than a single unit.

use em32::arith::decimal::Packed;
use em32::arith::float::{self, HEX_LONG};
use em32::config::Config;
use em32::cpu::Cpu;
use em32::error::Fault;
use em32::psw::{ControlMode, Psw};
use em32::trap::{ExternalSource, InterruptClass};

fn small_cpu() -> Cpu {
    Cpu::new(Config { memory_words: 16 * 1024, ..Config::default() })
}

/// Scenario 1: load half, add, store, landing at the documented register,
/// memory and condition-code values.
#[test]
fn load_add_store_scenario() {
    let mut cpu = small_cpu();
    cpu.memory.write_word(0x1000, 0x0000_0005, 0).unwrap();
    cpu.gpr[3] = 7;
    cpu.gpr[4] = 0x1000; // holds the load address
    cpu.gpr[5] = 0x3000; // holds the store address

    // LH R2,0(R4,0) ; AR R2,R3 ; ST R2,0(R5,0)
    let image = [
        0x48, 0x24, 0x00, 0x00, // LH R2,0(R4,0)
        0x1A, 0x23, // AR R2,R3
        0x50, 0x25, 0x00, 0x00, // ST R2,0(R5,0)
    ];
    cpu.load_image(0x400, &image).unwrap();

    cpu.step().unwrap();
    cpu.step().unwrap();
    cpu.step().unwrap();

    assert_eq!(cpu.gpr[2], 0x0000_000C);
    assert_eq!(cpu.memory.read_word(0x3000, 0).unwrap(), 0x0000_000C);
    assert_eq!(cpu.psw.cc, 2); // Cc::Low: non-zero, positive result
    assert_eq!(cpu.psw.instruction_addr, 0x400 + 4 + 2 + 4);
}

/// Scenario 2: a load past the end of memory with translation disabled
/// raises addressing, restarts at the unchanged PC, and leaves GPRs alone.
#[test]
fn address_fault_during_operand_fetch_scenario() {
    let mut cpu = small_cpu();
    cpu.psw.dat_enabled = false;
    cpu.psw.program_mask = 0xf;
    let out_of_range = (cpu.memory.len_words() as u32) * 4;
    cpu.gpr[4] = out_of_range;
    cpu.gpr[1] = 0xaaaa_aaaa;

    // Program-check new PSW at slot 0x68: DAT disabled, resume at 0x900.
    let new_psw = Psw { mode: ControlMode::Extended, instruction_addr: 0x900, ..Psw::default() };
    let (w0, w1) = new_psw.to_bits();
    cpu.memory.poke_word(0x68, w0).unwrap();
    cpu.memory.poke_word(0x6c, w1).unwrap();

    // L R1,0(R4,0)
    cpu.load_image(0x400, &[0x58, 0x14, 0x00, 0x00]).unwrap();
    cpu.step().unwrap();

    let old_w0 = cpu.memory.peek_word(0x28).unwrap();
    let old_w1 = cpu.memory.peek_word(0x2c).unwrap();
    let old_psw = Psw::from_bits(ControlMode::Extended, old_w0, old_w1);
    assert_eq!(old_psw.instruction_addr, 0x400);
    assert_eq!(old_psw.interrupt_code, Fault::Addressing(0).interruption_code());
    assert_eq!(cpu.psw.instruction_addr, 0x900);
    assert_eq!(cpu.gpr[1], 0xaaaa_aaaa);
}

/// Scenario 3: packed-decimal add overflows, still commits the truncated
/// result, and traps iff the decimal-overflow mask bit is set.
#[test]
fn packed_decimal_overflow_scenario() {
    for (mask, expect_trap) in [(0x4u8, true), (0x0u8, false)] {
        let mut cpu = small_cpu();
        cpu.psw.program_mask = mask;
        cpu.memory.load_image(0x100, &[0x99, 0x99, 0x9C]).unwrap(); // +99999
        cpu.memory.load_image(0x200, &[0x00, 0x00, 0x1C]).unwrap(); // +1

        // AP 0(3,0x100),0(3,0x200): l1=l2=2 (3-byte fields)
        cpu.load_image(0x400, &[0xFA, 0x22, 0x01, 0x00, 0x02, 0x00]).unwrap();

        cpu.step().unwrap();
        let stored = cpu.memory.read_word(0x100, 0).unwrap().to_be_bytes();
        let packed = Packed::from_bytes(&stored[..3]).unwrap();
        assert_eq!(packed.digits, vec![0, 0, 0, 0, 0]);
        assert_eq!(cpu.psw.cc, 3); // Cc::High: overflow, regardless of the truncated magnitude

        if expect_trap {
            let old_w0 = cpu.memory.peek_word(0x28).unwrap();
            let old_w1 = cpu.memory.peek_word(0x2c).unwrap();
            let old_psw = Psw::from_bits(ControlMode::Extended, old_w0, old_w1);
            assert_eq!(old_psw.interrupt_code, Fault::DecimalOverflow.interruption_code());
            assert_eq!(old_psw.instruction_addr, 0x400 + 6);
        } else {
            assert_eq!(cpu.psw.instruction_addr, 0x400 + 6);
        }
    }
}

/// Scenario 4: a stale translation-cache entry persists until an explicit
/// flush, matching the cache-coherence contract the guest is responsible for.
#[test]
fn translation_cache_coherence_scenario() {
    use em32::translate::AccessKind;

    let mut cpu = small_cpu();
    cpu.psw.dat_enabled = true;
    cpu.translator.load_segment_table(0, 0);
    cpu.memory.poke_word(0, 0x0000_1000).unwrap(); // STE -> page table at 0x1000
    cpu.memory.poke_word(0x1000, 0x0000_0005).unwrap(); // PTE: frame 5

    let va = 0x40;
    let first = cpu.translate(va, AccessKind::DataRead).unwrap();

    cpu.memory.poke_word(0x1000, 0x0000_0009).unwrap(); // remap without flushing
    let second = cpu.translate(va, AccessKind::DataRead).unwrap();
    assert_eq!(first, second);

    cpu.translator.flush();
    let third = cpu.translate(va, AccessKind::DataRead).unwrap();
    assert_ne!(third, second);
}

/// Scenario 5: an external interrupt pulls the CPU out of a wait state.
#[test]
fn interrupt_during_wait_scenario() {
    let mut cpu = small_cpu();
    cpu.psw.wait = true;
    cpu.psw.external_enabled = true;
    cpu.psw.instruction_addr = 0x500;
    cpu.pending.external_signal = true;

    assert_eq!(
        cpu.pending.highest(&cpu.psw),
        Some(InterruptClass::External(ExternalSource::ExternalSignal))
    );
    cpu.step().unwrap();

    assert!(!cpu.psw.wait);
    assert!(!cpu.pending.external_signal);
    let old_w0 = cpu.memory.peek_word(0x18).unwrap();
    let old_w1 = cpu.memory.peek_word(0x1c).unwrap();
    let old_psw = Psw::from_bits(ControlMode::Extended, old_w0, old_w1);
    assert_eq!(old_psw.instruction_addr, 0x500);
    assert!(old_psw.wait);
}

/// Scenario 6: floating-point add/negate round-trips through the register
/// file to a canonical zero.
#[test]
fn float_round_trip_scenario() {
    let mut cpu = small_cpu();
    let one = float::float_from_int(&HEX_LONG, 1);
    let neg_one = float::Float { sign: true, ..one };

    let (hi, lo) = encode_for_test(&one);
    cpu.fpr[0] = hi;
    cpu.fpr[1] = lo;
    let (hi, lo) = encode_for_test(&neg_one);
    cpu.fpr[2] = hi;
    cpu.fpr[3] = lo;

    // ADR FP0,FP2
    cpu.load_image(0x400, &[0x2A, 0x02]).unwrap();
    cpu.step().unwrap();

    assert_eq!(cpu.fpr[0], 0);
    assert_eq!(cpu.fpr[1], 0);
    assert_eq!(cpu.psw.cc, 0); // Cc::Zero
}

fn encode_for_test(v: &float::Float) -> (u32, u32) {
    let characteristic = ((v.exponent + 64) as u32) & 0x7f;
    let fraction56 = v.mantissa >> (64 - 56);
    let w0 = ((v.sign as u32) << 31) | (characteristic << 24) | ((fraction56 >> 32) as u32 & 0x00ff_ffff);
    let w1 = fraction56 as u32;
    (w0, w1)
}

/// PSW round-trips exactly through both control-mode layouts, and
/// storage-key protection rejects a mismatched write while permitting a
/// wildcard key of zero.
#[test]
fn psw_round_trip_and_storage_key_protection() {
    let mut cpu = small_cpu();
    cpu.memory.set_key(0x10, 0x3); // word address 0x10 == physical address 0x40

    let err = cpu.memory.write_word(0x40, 1, 0x5).unwrap_err();
    assert!(matches!(err, Fault::Protection(_)));
    cpu.memory.write_word(0x40, 1, 0x3).unwrap();
    cpu.memory.write_word(0x40, 1, 0x0).unwrap();

    let extended = Psw { mode: ControlMode::Extended, interrupt_code: 0x34, ..Psw::default() };
    let (w0, w1) = extended.to_bits();
    assert_eq!(Psw::from_bits(ControlMode::Extended, w0, w1), extended);

    let basic = Psw { mode: ControlMode::Basic, interrupt_code: 0x1234, ..Psw::default() };
    let (w0, w1) = basic.to_bits();
    assert_eq!(Psw::from_bits(ControlMode::Basic, w0, w1), basic);
}
