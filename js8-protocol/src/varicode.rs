/// Alphabet for numeric and callsign-style fields.
pub const ALPHABET41: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ+-./?";

/// Alphabet for frame text. Index = six-bit word value.
pub const ALPHABET64: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-+";

/// Number of characters in one frame of text.
pub const FRAME_CHARS: usize = 12;

const BASE41: u128 = 41;

/// Index of `c` in the 41-symbol alphabet.
pub fn index41(c: char) -> Option<u8> {
    ALPHABET41.find(c).map(|i| i as u8)
}

/// Index of `c` in the 64-symbol alphabet.
pub fn index64(c: char) -> Option<u8> {
    ALPHABET64.find(c).map(|i| i as u8)
}

/// Character for a six-bit word.
pub fn char64(word: u8) -> char {
    ALPHABET64.as_bytes()[(word & 0x3F) as usize] as char
}

fn char41(digit: u8) -> char {
    ALPHABET41.as_bytes()[(digit as usize) % ALPHABET41.len()] as char
}

/// Number of 41-alphabet symbols needed to carry `width` bits.
pub fn symbols_for_width(width: u32) -> usize {
    let width = width.min(64);
    let limit: u128 = 1u128 << width;
    let mut span: u128 = 1;
    let mut n = 0;
    while span < limit {
        span *= BASE41;
        n += 1;
    }
    n.max(1)
}

/// Pack the low `width` bits of `value` into a fixed number of symbols.
pub fn pack(value: u64, width: u32) -> String {
    let width = width.min(64);
    let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
    let mut remaining = (value & mask) as u128;
    let n = symbols_for_width(width);

    let mut digits = vec![0u8; n];
    for slot in digits.iter_mut().rev() {
        *slot = (remaining % BASE41) as u8;
        remaining /= BASE41;
    }
    digits.into_iter().map(char41).collect()
}

/// Inverse of [`pack`]. Unknown characters contribute zero.
pub fn unpack(symbols: &str) -> u64 {
    let mut value: u128 = 0;
    for c in symbols.chars() {
        let digit = index41(c).unwrap_or(0) as u128;
        value = value.wrapping_mul(BASE41).wrapping_add(digit);
    }
    value as u64
}

pub fn pack5(value: u8) -> String {
    pack(value as u64, 5)
}

pub fn unpack5(symbols: &str) -> u8 {
    (unpack(symbols) & 0x1F) as u8
}

pub fn pack6(value: u8) -> String {
    pack(value as u64, 6)
}

pub fn unpack6(symbols: &str) -> u8 {
    (unpack(symbols) & 0x3F) as u8
}

pub fn pack16(value: u16) -> String {
    pack(value as u64, 16)
}

pub fn unpack16(symbols: &str) -> u16 {
    unpack(symbols) as u16
}

pub fn pack32(value: u32) -> String {
    pack(value as u64, 32)
}

pub fn unpack32(symbols: &str) -> u32 {
    unpack(symbols) as u32
}

pub fn pack64(value: u64) -> String {
    pack(value, 64)
}

pub fn unpack64(symbols: &str) -> u64 {
    unpack(symbols)
}

/// Pack a 64-bit value and an 8-bit remainder into one frame of text
/// (12 six-bit words, most significant first).
pub fn pack72(value: u64, rem: u8) -> String {
    let combined = ((value as u128) << 8) | rem as u128;
    (0..FRAME_CHARS)
        .map(|i| {
            let shift = 6 * (FRAME_CHARS - 1 - i);
            char64(((combined >> shift) & 0x3F) as u8)
        })
        .collect()
}

/// Inverse of [`pack72`]. Unknown characters contribute zero.
pub fn unpack72(symbols: &str) -> (u64, u8) {
    let mut combined: u128 = 0;
    for c in symbols.chars().take(FRAME_CHARS) {
        combined = (combined << 6) | index64(c).unwrap_or(0) as u128;
    }
    ((combined >> 8) as u64, (combined & 0xFF) as u8)
}

/// Convert `value` into `len` bits, most significant first.
pub fn int_to_bits(value: u64, len: usize) -> Vec<bool> {
    (0..len)
        .rev()
        .map(|bit| bit < 64 && (value >> bit) & 1 == 1)
        .collect()
}

/// Convert most-significant-first bits back into an integer.
pub fn bits_to_int(bits: &[bool]) -> u64 {
    bits.iter()
        .fold(0u64, |acc, &bit| (acc << 1) | bit as u64)
}

/// Three-symbol checksum over the low 16 bits of the CRC-32 of `input`.
pub fn checksum16(input: &str) -> String {
    let crc = crc32fast::hash(input.as_bytes()) & 0xFFFF;
    format!("{:<3}", pack16(crc as u16))
}

pub fn checksum16_valid(checksum: &str, input: &str) -> bool {
    checksum16(input) == checksum
}

/// Six-symbol checksum over the full CRC-32 of `input`.
pub fn checksum32(input: &str) -> String {
    let crc = crc32fast::hash(input.as_bytes());
    format!("{:<6}", pack32(crc))
}

pub fn checksum32_valid(checksum: &str, input: &str) -> bool {
    checksum32(input) == checksum
}

/// Right-pad `text` with `pad` to exactly one frame of text.
/// Longer input is cut to the frame length.
pub fn pad_message(text: &str, pad: char) -> String {
    let mut out: String = text.chars().take(FRAME_CHARS).collect();
    while out.chars().count() < FRAME_CHARS {
        out.push(pad);
    }
    out
}
