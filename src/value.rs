// Sized values flowing between memory, registers and the arithmetic unit.
// Follows the `fields::{Size, OpResult}` pair pattern: a Size tag plus
// a Value enum carrying the concrete bit width, so callers never have to
// remember how many bytes something is once they hold a Value.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Byte = 1,
    Half = 2,
    Word = 4,
}

impl Size {
    pub fn bytes(self) -> usize {
        self as usize
    }

    pub fn zero(self) -> Value {
        match self {
            Size::Byte => Value::Byte(0),
            Size::Half => Value::Half(0),
            Size::Word => Value::Word(0),
        }
    }

    pub fn from_word(self, word: u32) -> Value {
        match self {
            Size::Byte => Value::Byte(word as u8),
            Size::Half => Value::Half(word as u16),
            Size::Word => Value::Word(word),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Byte(u8),
    Half(u16),
    Word(u32),
}

impl Value {
    pub fn size(&self) -> Size {
        match self {
            Value::Byte(_) => Size::Byte,
            Value::Half(_) => Size::Half,
            Value::Word(_) => Size::Word,
        }
    }

    pub fn inner(&self) -> u32 {
        match *self {
            Value::Byte(b) => b as u32,
            Value::Half(h) => h as u32,
            Value::Word(w) => w,
        }
    }

    pub fn sign_extend(&self) -> i32 {
        match *self {
            Value::Byte(b) => b as i8 as i32,
            Value::Half(h) => h as i16 as i32,
            Value::Word(w) => w as i32,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.inner() == 0
    }

    pub fn is_negative(&self) -> bool {
        self.sign_extend() < 0
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value::Byte(b) => write!(f, "{:#04x}", b),
            Value::Half(h) => write!(f, "{:#06x}", h),
            Value::Word(w) => write!(f, "{:#010x}", w),
        }
    }
}
