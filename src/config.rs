// Configuration accepted by the core from its front-panel/CLI collaborator.
// The front-panel itself is out of scope; this struct is the contract the
// core exposes to it.

use serde::{Deserialize, Serialize};

/// Feature flags a model build may enable or disable,
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    pub decimal: bool,
    pub floating: bool,
    pub extended_floating: bool,
    pub storage_protect: bool,
    pub unaligned_access: bool,
    pub translation: bool,
    pub timer: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            decimal: true,
            floating: true,
            extended_floating: false,
            storage_protect: true,
            unaligned_access: false,
            translation: true,
            timer: true,
        }
    }
}

/// Page/segment size in bytes. Both pairings are legal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSize {
    Small2K,
    Large4K,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentSize {
    Small64K,
    Large1M,
}

/// Translation-cache size. this leaves this an open configuration
/// parameter rather than a fixed default; see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlbSize {
    Entries16 = 16,
    Entries32 = 32,
}

impl TlbSize {
    pub fn entries(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Memory size in words; must fall within [16 Ki, 4 Mi].
    pub memory_words: usize,
    pub features: Features,
    pub page_size: PageSize,
    pub segment_size: SegmentSize,
    pub tlb_size: TlbSize,
    /// Ring-buffer length for the decoder's instruction-trace history.
    pub history_len: usize,
    /// Device address the loader treats as the boot device, if any.
    pub boot_device: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_words: 1 << 20,
            features: Features::default(),
            page_size: PageSize::Small2K,
            segment_size: SegmentSize::Small64K,
            tlb_size: TlbSize::Entries16,
            history_len: 256,
            boot_device: None,
        }
    }
}

impl Config {
    /// Validates the memory-size bound.
    pub fn validate(&self) -> Result<(), String> {
        const MIN: usize = 16 * 1024;
        const MAX: usize = 4 * 1024 * 1024;
        if self.memory_words < MIN || self.memory_words > MAX {
            return Err(format!(
                "memory_words {} out of range [{}, {}]",
                self.memory_words, MIN, MAX
            ));
        }
        if !self.memory_words.is_power_of_two() {
            return Err("memory_words must be a power of two".into());
        }
        Ok(())
    }
}
