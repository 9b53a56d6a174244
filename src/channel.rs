// Channel Interface — programmed byte transfer between device models and
// addressable memory. Grounded on `original_source/IBM360/ibm360_cdp.c` and
// `ibm360_scon.c`'s `chan_read_byte`/`chan_write_byte`/`chan_end` call sites
// and `ibm360_defs.h`'s `SNS_*` flag bits, dispatched through a polymorphic
// 256-entry device table rather than the source's per-device globals.

use crate::error::Fault;
use crate::memory::MemoryStore;

/// `chan_end` flags, bit-exact with `original_source/IBM360/ibm360_defs.h`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndFlags {
    pub channel_end: bool,
    pub device_end: bool,
    pub unit_check: bool,
    pub unit_exception: bool,
}

impl EndFlags {
    pub const CHNEND: u8 = 0x08;
    pub const DEVEND: u8 = 0x04;
    pub const UNITCHK: u8 = 0x02;
    pub const UNITEXP: u8 = 0x01;

    pub fn to_byte(self) -> u8 {
        let mut b = 0;
        if self.channel_end {
            b |= Self::CHNEND;
        }
        if self.device_end {
            b |= Self::DEVEND;
        }
        if self.unit_check {
            b |= Self::UNITCHK;
        }
        if self.unit_exception {
            b |= Self::UNITEXP;
        }
        b
    }
}

/// Returned by `chan_read_byte`/`chan_write_byte` when the programmed
/// transfer's byte count has been exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfTransfer;

/// The four methods the architecture names for the polymorphic device table:
/// `start_io`, `start_cmd`, `halt_io`, `attention`. A device implements this
/// instead of touching memory directly; all byte movement goes back through
/// the owning `Channel`.
pub trait ChannelDevice {
    /// Kernel-initiated `start_io`; returns the condition code.
    fn start_io(&mut self) -> u8;
    /// Channel-command-word decode handed to the device; returns the
    /// condition code and whatever byte count the device expects to move.
    fn start_cmd(&mut self, command: u8, count: u32) -> (u8, u32);
    fn halt_io(&mut self);
    /// Polled once per scheduler tick; `Some` when the device has ended its
    /// own transfer or wants to raise unsolicited attention.
    fn attention(&mut self) -> Option<EndFlags>;
}

/// The programmed transfer in progress for one device: a single in-memory
/// range walked byte by byte in strictly increasing order.
struct Transfer {
    addr: u32,
    remaining: u32,
    is_write: bool,
}

struct DeviceSlot {
    device: Box<dyn ChannelDevice>,
    transfer: Option<Transfer>,
    busy: bool,
}

const DEVICE_TABLE_SIZE: usize = 256;

/// Owns the command-address-word and per-device transfer state; devices
/// never touch `MemoryStore` directly.
pub struct Channel {
    slots: Vec<Option<DeviceSlot>>,
    pub caw: u32,
    pub csw: u64,
}

impl Channel {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(DEVICE_TABLE_SIZE);
        slots.resize_with(DEVICE_TABLE_SIZE, || None);
        Self { slots, caw: 0, csw: 0 }
    }

    pub fn attach(&mut self, addr: u16, device: Box<dyn ChannelDevice>) {
        self.slots[addr as usize] = Some(DeviceSlot { device, transfer: None, busy: false });
    }

    fn slot_mut(&mut self, addr: u16) -> Option<&mut DeviceSlot> {
        self.slots.get_mut(addr as usize).and_then(|s| s.as_mut())
    }

    /// Kernel `start_io` instruction: reads the CCW at `caw`, hands the
    /// command byte to the device, and opens a transfer range if the device
    /// expects to move bytes.
    pub fn start_io(&mut self, mem: &MemoryStore, addr: u16) -> Result<u8, Fault> {
        let caw = self.caw;
        let ccw0 = mem.peek_word(caw)?;
        let ccw1 = mem.peek_word(caw + 4)?;
        let command = (ccw0 >> 24) as u8;
        let data_addr = ccw0 & 0x00ff_ffff;
        let count = ccw1 & 0xffff;

        let Some(slot) = self.slot_mut(addr) else {
            return Ok(3); // CC 3: device not operational
        };
        if slot.busy {
            return Ok(2); // CC 2: device busy
        }
        let cc = slot.device.start_io();
        if cc != 0 {
            return Ok(cc);
        }
        let (cc, expected) = slot.device.start_cmd(command, count);
        if cc == 0 {
            let is_write = command & 0x01 != 0; // write commands are odd, per the 360 command-code convention
            slot.transfer = Some(Transfer { addr: data_addr, remaining: expected, is_write });
            slot.busy = true;
        }
        Ok(cc)
    }

    pub fn halt_io(&mut self, addr: u16) -> u8 {
        match self.slot_mut(addr) {
            Some(slot) => {
                slot.device.halt_io();
                slot.transfer = None;
                slot.busy = false;
                0
            }
            None => 3,
        }
    }

    pub fn test_io(&self, addr: u16) -> u8 {
        match self.slots.get(addr as usize).and_then(|s| s.as_ref()) {
            Some(slot) if slot.busy => 2,
            Some(_) => 0,
            None => 3,
        }
    }

    pub fn test_chan(&self, addr: u16) -> u8 {
        self.test_io(addr)
    }

    /// Pulls the next byte of the device's outbound transfer from memory
    /// (e.g. a write-to-tape command reading memory to hand to the device).
    pub fn chan_read_byte(&mut self, mem: &mut MemoryStore, addr: u16) -> Result<Result<u8, EndOfTransfer>, Fault> {
        let Some(slot) = self.slot_mut(addr) else {
            return Ok(Err(EndOfTransfer));
        };
        let Some(transfer) = slot.transfer.as_mut() else {
            return Ok(Err(EndOfTransfer));
        };
        if transfer.remaining == 0 {
            return Ok(Err(EndOfTransfer));
        }
        let value = mem.read(transfer.addr, crate::value::Size::Byte, 0)?;
        transfer.addr += 1;
        transfer.remaining -= 1;
        Ok(Ok(value.inner() as u8))
    }

    /// Pushes a byte from the device's inbound transfer into memory (e.g. a
    /// read-from-card-reader command writing what the device produced).
    pub fn chan_write_byte(&mut self, mem: &mut MemoryStore, addr: u16, byte: u8) -> Result<Result<(), EndOfTransfer>, Fault> {
        let Some(slot) = self.slot_mut(addr) else {
            return Ok(Err(EndOfTransfer));
        };
        let Some(transfer) = slot.transfer.as_mut() else {
            return Ok(Err(EndOfTransfer));
        };
        if transfer.remaining == 0 {
            return Ok(Err(EndOfTransfer));
        }
        mem.write(transfer.addr, crate::value::Value::Byte(byte), 0)?;
        transfer.addr += 1;
        transfer.remaining -= 1;
        Ok(Ok(()))
    }

    /// Marks the channel command complete; clears the busy/transfer state
    /// and latches the flags into the channel-status word for the kernel to
    /// observe via `test_io`/a subsequent I/O interrupt.
    pub fn chan_end(&mut self, addr: u16, flags: EndFlags) {
        if let Some(slot) = self.slot_mut(addr) {
            slot.busy = false;
            slot.transfer = None;
        }
        self.csw = (self.csw & !0xff) | flags.to_byte() as u64;
        log::debug!("chan_end device={:#x} flags={:#04x}", addr, flags.to_byte());
    }

    /// A device with no current transfer asserting unsolicited attention.
    pub fn set_dev_attn(&mut self, addr: u16, flags: EndFlags) {
        self.csw = (self.csw & !0xff) | flags.to_byte() as u64;
        log::debug!("dev_attn device={:#x} flags={:#04x}", addr, flags.to_byte());
    }

    /// Polls every attached device once per scheduler tick for unsolicited
    /// completion/attention; device callbacks may assert interrupt lines
    /// without a preceding `start_io`.
    pub fn poll_devices(&mut self) -> Vec<(u16, EndFlags)> {
        let mut events = Vec::new();
        for (addr, slot) in self.slots.iter_mut().enumerate() {
            if let Some(slot) = slot {
                if let Some(flags) = slot.device.attention() {
                    events.push((addr as u16, flags));
                }
            }
        }
        events
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestDevice {
        start_cc: u8,
        buffer: Vec<u8>,
    }

    impl ChannelDevice for TestDevice {
        fn start_io(&mut self) -> u8 {
            self.start_cc
        }
        fn start_cmd(&mut self, _command: u8, count: u32) -> (u8, u32) {
            (0, count)
        }
        fn halt_io(&mut self) {}
        fn attention(&mut self) -> Option<EndFlags> {
            None
        }
    }

    #[test]
    fn start_io_on_unattached_device_is_cc3() {
        let mut chan = Channel::new();
        let mem = MemoryStore::new(1 << 16);
        assert_eq!(chan.start_io(&mem, 5).unwrap(), 3);
    }

    #[test]
    fn program_transfer_reads_strictly_increasing_addresses() {
        let mut chan = Channel::new();
        let mut mem = MemoryStore::new(1 << 16);
        mem.write_word(0x200, 0xaabb_ccdd, 0).unwrap();
        // CCW: command 0x02 (read, even code), data address 0x200, count 4.
        mem.write_word(0x48, 0x0200_0200, 0).unwrap();
        mem.write_word(0x4c, 0x0000_0004, 0).unwrap();
        chan.caw = 0x48;
        chan.attach(7, Box::new(TestDevice { start_cc: 0, buffer: Vec::new() }));
        chan.start_io(&mem, 7).unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(chan.chan_read_byte(&mut mem, 7).unwrap().unwrap());
        }
        assert_eq!(seen, vec![0xaa, 0xbb, 0xcc, 0xdd]);
        assert!(chan.chan_read_byte(&mut mem, 7).unwrap().is_err());
    }

    #[test]
    fn chan_end_clears_busy_state() {
        let mut chan = Channel::new();
        let mem = MemoryStore::new(1 << 16);
        chan.attach(2, Box::new(TestDevice { start_cc: 0, buffer: Vec::new() }));
        chan.caw = 0; // zeroed CCW: command 0, addr 0, count 0
        chan.start_io(&mem, 2).unwrap();
        chan.chan_end(2, EndFlags { channel_end: true, device_end: true, ..Default::default() });
        assert_eq!(chan.test_io(2), 0);
    }
}
