//! CRC-32 compatible with the STM32 hardware CRC unit.
//!
//! The STM32 CRC peripheral consumes 32-bit words, MSB first, with the
//! polynomial `0x04C11DB7`, an initial value of `0xFFFFFFFF`, no input or
//! output reflection and no final XOR. Words are taken from memory in
//! little-endian order, so a trailing partial word (1-3 bytes) never
//! reaches the peripheral and is not part of the checksum.
//!
//! ```text
//! bytes:  78 56 34 12 | 01 02 03
//! words:  0x12345678  | (dropped)
//! ```

/// CRC-32 polynomial used by the STM32 CRC unit.
pub const STM32_CRC_POLY: u32 = 0x04C1_1DB7;

/// Initial value loaded into the STM32 CRC unit on reset.
pub const STM32_CRC_INIT: u32 = 0xFFFF_FFFF;

/// Streaming STM32 CRC calculator.
///
/// Bytes may be fed in slices of any size; they are grouped into 4-byte
/// words across calls. Bytes that never complete a word are excluded from
/// [`Stm32Crc::value`].
#[derive(Debug, Clone)]
pub struct Stm32Crc {
    crc: u32,
    pending: [u8; 4],
    pending_len: usize,
}

impl Default for Stm32Crc {
    fn default() -> Self {
        Self::new()
    }
}

impl Stm32Crc {
    /// Create a calculator in the reset state.
    pub fn new() -> Self {
        Self {
            crc: STM32_CRC_INIT,
            pending: [0; 4],
            pending_len: 0,
        }
    }

    /// Feed more bytes into the checksum.
    pub fn update(&mut self, mut data: &[u8]) {
        if self.pending_len > 0 {
            let take = (4 - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];
            if self.pending_len < 4 {
                return;
            }
            self.crc = feed_word(self.crc, u32::from_le_bytes(self.pending));
            self.pending_len = 0;
        }

        let mut words = data.chunks_exact(4);
        for word in &mut words {
            self.crc = feed_word(self.crc, u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
        }

        let rest = words.remainder();
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
    }

    /// Current checksum over all complete words fed so far.
    pub fn value(&self) -> u32 {
        self.crc
    }
}

/// Shift one 32-bit word through the CRC register, MSB first.
fn feed_word(mut crc: u32, word: u32) -> u32 {
    crc ^= word;
    for _ in 0..32 {
        crc = if crc & 0x8000_0000 != 0 {
            (crc << 1) ^ STM32_CRC_POLY
        } else {
            crc << 1
        };
    }
    crc
}

/// Compute the STM32 CRC of `data`, ignoring any trailing partial word.
pub fn stm32_crc(data: &[u8]) -> u32 {
    let mut engine = Stm32Crc::new();
    engine.update(&data[..data.len() - data.len() % 4]);
    engine.value()
}
