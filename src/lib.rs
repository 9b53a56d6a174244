// Top-level library surface. Follows the `lib.rs` pattern of pairing a
// `Configuration` builder with an `Emulator` that owns the `CPU` and drives
// its run loop; generalized here from a single clock-cycle/debugger loop to
// one that also ticks the discrete-event scheduler and polls channel devices
// at each instruction boundary, since device callbacks run between
// instructions, synchronously with the scheduler.

pub mod arith;
pub mod channel;
pub mod config;
pub mod cpu;
pub mod decode;
pub mod error;
pub mod instr;
pub mod interp;
pub mod memory;
pub mod psw;
pub mod scheduler;
pub mod snapshot;
pub mod trap;
pub mod translate;
pub mod value;

use std::fs;
use std::path::Path;

use channel::ChannelDevice;
use config::Config;
use cpu::Cpu;
use error::Fault;

/// What the host front-end hands the core to bring a machine up: a
/// validated `Config`, the memory image to load, and where to load it.
/// The front-panel/CLI itself lives in `src/main.rs`; this is the contract
/// between it and the core.
pub struct Configuration {
    pub config: Config,
    pub load_address: u32,
    pub image: Vec<u8>,
    pub devices: Vec<(u16, Box<dyn ChannelDevice>)>,
}

impl Configuration {
    pub fn from_image_file(config: Config, load_address: u32, path: &Path) -> std::io::Result<Self> {
        let image = fs::read(path)?;
        Ok(Self { config, load_address, image, devices: Vec::new() })
    }

    pub fn attach(&mut self, addr: u16, device: Box<dyn ChannelDevice>) {
        self.devices.push((addr, device));
    }
}

/// Owns the single `Cpu` struct and drives it instead of relying on
/// globals. Follows the `Emulator::run` idle/step loop pattern,
/// generalized to also tick the scheduler and poll channel devices for
/// unsolicited completion once per instruction.
pub struct Emulator {
    cpu: Cpu,
}

/// Outcome of driving the emulator for one batch of instructions, so a host
/// loop (interactive debugger, test harness) can decide whether to keep
/// stepping, report a fault, or honor a wait state.
#[derive(Debug)]
pub enum RunOutcome {
    /// `max_steps` were executed with no unmasked, undelivered fault.
    StepLimitReached,
    /// The CPU is in a wait state with no pending scheduler event — the
    /// architectural definition of "the machine will never resume on its
    /// own."
    WaitWithNoPendingWork,
}

impl Emulator {
    pub fn new(configuration: Configuration) -> Result<Self, Fault> {
        configuration
            .config
            .validate()
            .map_err(|_| Fault::Specification)?;
        let mut cpu = Cpu::new(configuration.config);
        cpu.load_image(configuration.load_address, &configuration.image)?;
        for (addr, device) in configuration.devices {
            cpu.channel.attach(addr, device);
        }
        Ok(Self { cpu })
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// One fetch-decode-execute-or-trap step, plus the device-polling work
    /// that happens "between instructions": the scheduler's
    /// clock advances one tick, due events are delivered to their devices,
    /// and any device now asserting attention posts an I/O interrupt for the
    /// next trap check.
    pub fn step(&mut self) -> Result<(), Fault> {
        self.cpu.step()?;
        self.cpu.scheduler.tick();
        for (addr, flags) in self.cpu.channel.poll_devices() {
            self.cpu.channel.chan_end(addr, flags);
            self.cpu.post_io_interrupt(addr);
        }
        Ok(())
    }

    /// Runs until either `max_steps` instructions have been stepped or the
    /// machine enters a wait state with nothing left to wake it, propagating
    /// any fault `step` could not itself resolve (an unmasked fault with no
    /// enabled interrupt class to deliver it under, per `trap::deliver`'s
    /// contract, is itself a sign of a misconfigured PSW rather than
    /// something this loop should swallow).
    pub fn run(&mut self, max_steps: u64) -> Result<RunOutcome, Fault> {
        for _ in 0..max_steps {
            if self.cpu.psw.wait {
                match self.cpu.wait_idle_hint() {
                    Some(_) => {
                        self.cpu.scheduler.tick();
                        for (addr, flags) in self.cpu.channel.poll_devices() {
                            self.cpu.channel.chan_end(addr, flags);
                            self.cpu.post_io_interrupt(addr);
                        }
                        continue;
                    }
                    None => return Ok(RunOutcome::WaitWithNoPendingWork),
                }
            }
            self.step()?;
        }
        Ok(RunOutcome::StepLimitReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emulator_runs_a_loaded_instruction() {
        let configuration = Configuration {
            config: Config::default(),
            load_address: 0x400,
            image: vec![0x18, 0x12], // LR R1,R2
            devices: Vec::new(),
        };
        let mut emulator = Emulator::new(configuration).unwrap();
        emulator.cpu_mut().gpr[2] = 7;
        emulator.step().unwrap();
        assert_eq!(emulator.cpu().gpr[1], 7);
    }

    #[test]
    fn wait_with_no_scheduled_work_halts_the_run_loop() {
        let configuration = Configuration {
            config: Config::default(),
            load_address: 0x400,
            image: Vec::new(),
            devices: Vec::new(),
        };
        let mut emulator = Emulator::new(configuration).unwrap();
        emulator.cpu_mut().psw.wait = true;
        let outcome = emulator.run(10).unwrap();
        assert!(matches!(outcome, RunOutcome::WaitWithNoPendingWork));
    }
}
