use log::trace;

use crate::error::{ProtocolError, Result};
use crate::varicode::{self, FRAME_CHARS};

/// Synchronisation pattern written at each sync offset.
pub const COSTAS: [u8; 7] = [4, 2, 5, 6, 1, 3, 0];

/// Symbols in one frame.
pub const FRAME_SYMBOLS: usize = 79;

/// Start offsets of the three Costas blocks.
pub const SYNC_OFFSETS: [usize; 3] = [0, 36, 72];

/// Start of the parity region.
pub const PARITY_OFFSET: usize = 7;

/// Start of the payload region.
pub const PAYLOAD_OFFSET: usize = 43;

/// Symbols in each data region.
pub const REGION_SYMBOLS: usize = 29;

/// Message bits per frame (and parity bits per frame).
pub const MESSAGE_BITS: usize = 87;

/// Highest frame type (3 bits).
pub const MAX_FRAME_TYPE: u8 = 7;

/// Constant folded into the frame checksum.
const CRC_XOR: u16 = 42;

/// CRC-12 polynomial, implicit leading term.
const CRC12_POLY: u16 = 0xC06;

/// A complete frame of tone indices, 79 symbols of three bits each:
///
/// ```text
///  0..7    Costas sync
///  7..36   parity region  (87 parity bits)
/// 36..43   Costas sync
/// 43..72   payload region (12 six-bit characters, 3-bit type, 12-bit checksum)
/// 72..79   Costas sync
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneFrame {
    symbols: [u8; FRAME_SYMBOLS],
}

impl ToneFrame {
    /// Build a frame from raw symbols, e.g. the output of a demodulator.
    pub fn from_symbols(symbols: &[u8]) -> Result<Self> {
        if symbols.len() != FRAME_SYMBOLS {
            return Err(ProtocolError::InvalidFrame(format!(
                "expected {FRAME_SYMBOLS} symbols, got {}",
                symbols.len()
            )));
        }
        if let Some(bad) = symbols.iter().find(|&&s| s > 7) {
            return Err(ProtocolError::InvalidFrame(format!("symbol out of range: {bad}")));
        }
        let mut arr = [0u8; FRAME_SYMBOLS];
        arr.copy_from_slice(symbols);
        Ok(Self { symbols: arr })
    }

    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        FRAME_SYMBOLS
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if all three Costas blocks are intact.
    pub fn has_sync(&self) -> bool {
        SYNC_OFFSETS
            .iter()
            .all(|&off| self.symbols[off..off + COSTAS.len()] == COSTAS)
    }

    pub fn parity_region(&self) -> &[u8] {
        &self.symbols[PARITY_OFFSET..PARITY_OFFSET + REGION_SYMBOLS]
    }

    pub fn payload_region(&self) -> &[u8] {
        &self.symbols[PAYLOAD_OFFSET..PAYLOAD_OFFSET + REGION_SYMBOLS]
    }
}

/// Computes the parity bits for the parity region.
///
/// The real 87×87 parity-check matrix is external data; see [`MatrixParity`].
pub trait ParityPolicy: Send + Sync {
    fn parity(&self, message: &[bool; MESSAGE_BITS]) -> [bool; MESSAGE_BITS];
}

/// Deterministic stand-in relation. Fills the parity region with a fixed
/// function of all message bits; not decodable by conforming receivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderParity;

impl ParityPolicy for PlaceholderParity {
    fn parity(&self, message: &[bool; MESSAGE_BITS]) -> [bool; MESSAGE_BITS] {
        let mut out = [false; MESSAGE_BITS];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = message
                .iter()
                .enumerate()
                .filter(|&(j, _)| j == i || (i * 31 + j * 17) % 7 < 3)
                .fold(false, |acc, (_, &bit)| acc ^ bit);
        }
        out
    }
}

/// Parity from an externally supplied 87×87 generator table.
///
/// Row `i` selects the message bits XORed into parity bit `i`.
#[derive(Debug, Clone)]
pub struct MatrixParity {
    rows: Vec<[bool; MESSAGE_BITS]>,
}

impl MatrixParity {
    /// Build from rows of `0`/`1` entries.
    pub fn new(rows: &[Vec<u8>]) -> Result<Self> {
        if rows.len() != MESSAGE_BITS {
            return Err(ProtocolError::InvalidParityMatrix(format!(
                "expected {MESSAGE_BITS} rows, got {}",
                rows.len()
            )));
        }
        let mut table = Vec::with_capacity(MESSAGE_BITS);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != MESSAGE_BITS {
                return Err(ProtocolError::InvalidParityMatrix(format!(
                    "row {i} has {} columns",
                    row.len()
                )));
            }
            let mut bits = [false; MESSAGE_BITS];
            for (j, &v) in row.iter().enumerate() {
                bits[j] = match v {
                    0 => false,
                    1 => true,
                    other => {
                        return Err(ProtocolError::InvalidParityMatrix(format!(
                            "entry ({i}, {j}) is {other}"
                        )));
                    }
                };
            }
            table.push(bits);
        }
        Ok(Self { rows: table })
    }
}

impl ParityPolicy for MatrixParity {
    fn parity(&self, message: &[bool; MESSAGE_BITS]) -> [bool; MESSAGE_BITS] {
        let mut out = [false; MESSAGE_BITS];
        for (slot, row) in out.iter_mut().zip(&self.rows) {
            *slot = row
                .iter()
                .zip(message.iter())
                .fold(false, |acc, (&r, &m)| acc ^ (r & m));
        }
        out
    }
}

/// Builds tone frames from 12-character messages.
pub struct FrameEncoder {
    parity: Box<dyn ParityPolicy>,
    verbose: bool,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(Box::new(PlaceholderParity))
    }
}

impl FrameEncoder {
    pub fn new(parity: Box<dyn ParityPolicy>) -> Self {
        Self {
            parity,
            verbose: false,
        }
    }

    /// Emit per-frame tone traces.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Encode exactly 12 frame-alphabet characters with a 3-bit frame type.
    pub fn encode(&self, text: &str, frame_type: u8) -> Result<ToneFrame> {
        let message = message_bits(text, frame_type)?;
        let parity = self.parity.parity(&message);

        let mut symbols = [0u8; FRAME_SYMBOLS];
        for &off in &SYNC_OFFSETS {
            symbols[off..off + COSTAS.len()].copy_from_slice(&COSTAS);
        }
        for k in 0..REGION_SYMBOLS {
            symbols[PARITY_OFFSET + k] = tone_of(&parity[3 * k..3 * k + 3]);
            symbols[PAYLOAD_OFFSET + k] = tone_of(&message[3 * k..3 * k + 3]);
        }

        if self.verbose {
            trace!("encoded {text:?} type {frame_type}: {symbols:?}");
        }
        Ok(ToneFrame { symbols })
    }
}

/// Encode with the default (placeholder) parity policy.
pub fn encode_message(text: &str, frame_type: u8) -> Result<ToneFrame> {
    FrameEncoder::default().encode(text, frame_type)
}

/// The 87 message bits of a frame: 72 text bits, 3 type bits, 12 checksum bits.
pub fn message_bits(text: &str, frame_type: u8) -> Result<[bool; MESSAGE_BITS]> {
    let count = text.chars().count();
    if count != FRAME_CHARS {
        return Err(ProtocolError::InvalidLength(count));
    }
    let mut words = [0u8; FRAME_CHARS];
    for (slot, c) in words.iter_mut().zip(text.chars()) {
        *slot = varicode::index64(c).ok_or(ProtocolError::InvalidCharacter(c))?;
    }
    if frame_type > MAX_FRAME_TYPE {
        return Err(ProtocolError::InvalidFrameType(frame_type));
    }

    let payload = pack_words(&words);
    let checksum = crc12(&payload) ^ CRC_XOR;

    let mut bits = [false; MESSAGE_BITS];
    for (i, byte) in payload.iter().enumerate() {
        for (b, bit) in varicode::int_to_bits(*byte as u64, 8).into_iter().enumerate() {
            bits[i * 8 + b] = bit;
        }
    }
    for (b, bit) in varicode::int_to_bits(frame_type as u64, 3).into_iter().enumerate() {
        bits[72 + b] = bit;
    }
    for (b, bit) in varicode::int_to_bits(checksum as u64, 12).into_iter().enumerate() {
        bits[75 + b] = bit;
    }
    Ok(bits)
}

/// Recover `(text, frame_type)` from a frame, checking sync and checksum.
pub fn decode_frame(frame: &ToneFrame) -> Result<(String, u8)> {
    if !frame.has_sync() {
        return Err(ProtocolError::InvalidFrame("sync pattern missing".into()));
    }

    let bits: Vec<bool> = frame
        .payload_region()
        .iter()
        .flat_map(|&tone| varicode::int_to_bits(tone as u64, 3))
        .collect();

    let mut payload = [0u8; 9];
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte = varicode::bits_to_int(&bits[i * 8..i * 8 + 8]) as u8;
    }
    let frame_type = varicode::bits_to_int(&bits[72..75]) as u8;
    let checksum = varicode::bits_to_int(&bits[75..87]) as u16;

    if crc12(&payload) ^ CRC_XOR != checksum {
        return Err(ProtocolError::ChecksumMismatch);
    }

    let text = unpack_words(&payload).iter().map(|&w| varicode::char64(w)).collect();
    Ok((text, frame_type))
}

/// 12-bit CRC, MSB first, zero initial value.
pub fn crc12(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 4;
        for _ in 0..8 {
            crc = if crc & 0x800 != 0 {
                (crc << 1) ^ CRC12_POLY
            } else {
                crc << 1
            };
            crc &= 0xFFF;
        }
    }
    crc
}

/// Four six-bit words → three bytes, repeated.
fn pack_words(words: &[u8; FRAME_CHARS]) -> [u8; 9] {
    let mut out = [0u8; 9];
    for (chunk, dst) in words.chunks(4).zip(out.chunks_mut(3)) {
        let v = (chunk[0] as u32) << 18 | (chunk[1] as u32) << 12 | (chunk[2] as u32) << 6 | chunk[3] as u32;
        dst[0] = (v >> 16) as u8;
        dst[1] = (v >> 8) as u8;
        dst[2] = v as u8;
    }
    out
}

fn unpack_words(bytes: &[u8; 9]) -> [u8; FRAME_CHARS] {
    let mut out = [0u8; FRAME_CHARS];
    for (chunk, dst) in bytes.chunks(3).zip(out.chunks_mut(4)) {
        let v = (chunk[0] as u32) << 16 | (chunk[1] as u32) << 8 | chunk[2] as u32;
        dst[0] = ((v >> 18) & 0x3F) as u8;
        dst[1] = ((v >> 12) & 0x3F) as u8;
        dst[2] = ((v >> 6) & 0x3F) as u8;
        dst[3] = (v & 0x3F) as u8;
    }
    out
}

fn tone_of(bits: &[bool]) -> u8 {
    varicode::bits_to_int(bits) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::varicode::ALPHABET64;

    fn assert_sync(frame: &ToneFrame) {
        for &off in &SYNC_OFFSETS {
            assert_eq!(&frame.symbols()[off..off + 7], &COSTAS, "sync at {off}");
        }
    }

    #[test]
    fn test_encode_reference_message() {
        let frame = encode_message("CQ-N0CALL-XX", 0).unwrap();
        assert_eq!(frame.symbols().len(), 79);
        assert_sync(&frame);
        assert!(frame.symbols().iter().all(|&s| s < 8));
    }

    #[test]
    fn test_encode_all_frame_types_keep_sync() {
        for frame_type in 0..=MAX_FRAME_TYPE {
            let frame = encode_message("HELLOworld+-", frame_type).unwrap();
            assert_sync(&frame);
        }
    }

    #[test]
    fn test_encode_alphabet_sweep() {
        let chars: Vec<char> = ALPHABET64.chars().collect();
        for start in (0..chars.len()).step_by(5) {
            let text: String = (0..12).map(|i| chars[(start + i * 7) % chars.len()]).collect();
            let frame = encode_message(&text, (start % 8) as u8).unwrap();
            assert_sync(&frame);
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = encode_message("K1ABC-N0CALL", 3).unwrap();
        let b = encode_message("K1ABC-N0CALL", 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_length() {
        assert_eq!(encode_message("SHORT", 0), Err(ProtocolError::InvalidLength(5)));
        assert_eq!(
            encode_message("THIRTEENCHARS", 0),
            Err(ProtocolError::InvalidLength(13))
        );
    }

    #[test]
    fn test_invalid_character() {
        assert_eq!(
            encode_message("HELLO WORLD!", 0),
            Err(ProtocolError::InvalidCharacter(' '))
        );
    }

    #[test]
    fn test_invalid_frame_type() {
        assert_eq!(
            encode_message("CQ-N0CALL-XX", 8),
            Err(ProtocolError::InvalidFrameType(8))
        );
    }

    #[test]
    fn test_decode_frame_roundtrip() {
        let frame = encode_message("CQ-N0CALL-XX", 5).unwrap();
        let (text, frame_type) = decode_frame(&frame).unwrap();
        assert_eq!(text, "CQ-N0CALL-XX");
        assert_eq!(frame_type, 5);
    }

    #[test]
    fn test_decode_frame_detects_corruption() {
        let frame = encode_message("CQ-N0CALL-XX", 0).unwrap();
        let mut symbols = frame.symbols().to_vec();
        symbols[PAYLOAD_OFFSET + 2] ^= 0b001;
        let corrupted = ToneFrame::from_symbols(&symbols).unwrap();
        assert_eq!(decode_frame(&corrupted), Err(ProtocolError::ChecksumMismatch));

        let mut symbols = frame.symbols().to_vec();
        symbols[36] = 7;
        let no_sync = ToneFrame::from_symbols(&symbols).unwrap();
        assert!(matches!(decode_frame(&no_sync), Err(ProtocolError::InvalidFrame(_))));
    }

    #[test]
    fn test_from_symbols_validation() {
        assert!(ToneFrame::from_symbols(&[0u8; 10]).is_err());
        assert!(ToneFrame::from_symbols(&[9u8; 79]).is_err());
    }

    #[test]
    fn test_matrix_parity_identity() {
        let rows: Vec<Vec<u8>> = (0..MESSAGE_BITS)
            .map(|i| (0..MESSAGE_BITS).map(|j| (i == j) as u8).collect())
            .collect();
        let encoder = FrameEncoder::new(Box::new(MatrixParity::new(&rows).unwrap()));
        let frame = encoder.encode("CQ-N0CALL-XX", 1).unwrap();
        // Identity parity mirrors the payload region.
        assert_eq!(frame.parity_region(), frame.payload_region());
    }

    #[test]
    fn test_matrix_parity_rejects_bad_shape() {
        assert!(MatrixParity::new(&[vec![0u8; MESSAGE_BITS]]).is_err());
        let mut rows = vec![vec![0u8; MESSAGE_BITS]; MESSAGE_BITS];
        rows[3][4] = 2;
        assert!(MatrixParity::new(&rows).is_err());
    }

    #[test]
    fn test_crc12_range() {
        assert_eq!(crc12(&[]), 0);
        assert!(crc12(b"123456789") <= 0xFFF);
        assert_ne!(crc12(&[1, 2, 3]), crc12(&[1, 2, 4]));
    }
}
