use std::f32::consts::TAU;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, trace};

use crate::frame::{self, COSTAS, FRAME_SYMBOLS, SYNC_OFFSETS, ToneFrame};
use crate::modulator::Modulator;

/// One decoded transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    /// Recovered message text.
    pub message: String,
    /// Estimated signal-to-noise ratio in dB.
    pub snr: i32,
    /// Audio offset of tone 0 in Hz.
    pub frequency_offset: f32,
    /// Decoder confidence, from 0.0 to 1.0.
    pub quality: f32,
    /// Frame type carried by the frame.
    pub frame_type: u8,
}

/// Turns a sample buffer into zero or more results. Calls must return in
/// bounded time and tolerate being repeated on overlapping or growing
/// buffers.
pub trait Decoder: Send + Sync {
    fn decode(&self, samples: &[f32], sample_rate: u32) -> Vec<DecodeResult>;
}

/// Never produces a result.
#[derive(Debug, Default)]
pub struct NullDecoder;

impl Decoder for NullDecoder {
    fn decode(&self, _samples: &[f32], _sample_rate: u32) -> Vec<DecodeResult> {
        Vec::new()
    }
}

/// Test double: returns canned results once the buffer reaches a length.
#[derive(Debug, Default)]
pub struct ScriptedDecoder {
    min_samples: usize,
    results: Mutex<Vec<DecodeResult>>,
    calls: AtomicUsize,
    once: bool,
}

impl ScriptedDecoder {
    /// Emit `results` on every call whose buffer holds at least `min_samples`.
    pub fn new(min_samples: usize, results: Vec<DecodeResult>) -> Self {
        Self {
            min_samples,
            results: Mutex::new(results),
            calls: AtomicUsize::new(0),
            once: false,
        }
    }

    /// Emit the results on the first qualifying call only.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Number of decode attempts seen so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decoder for ScriptedDecoder {
    fn decode(&self, samples: &[f32], _sample_rate: u32) -> Vec<DecodeResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if samples.len() < self.min_samples {
            return Vec::new();
        }
        let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        if self.once {
            std::mem::take(&mut *results)
        } else {
            results.clone()
        }
    }
}

/// Minimum fraction of Costas symbols that must match to accept a frame.
const SYNC_THRESHOLD: f32 = 0.85;

/// Non-coherent tone demodulator for clean, single-signal audio such as a
/// loopback of our own transmissions. It searches for the first Costas block,
/// refines the start, reads every symbol by strongest tone and then checks the
/// frame checksum.
#[derive(Debug, Clone, Copy)]
pub struct ToneDecoder {
    modulator: Modulator,
}

impl ToneDecoder {
    pub fn new(modulator: Modulator) -> Self {
        Self { modulator }
    }

    fn tone_powers(&self, window: &[f32], sample_rate: u32) -> [f32; 8] {
        let mut powers = [0.0f32; 8];
        for (tone, slot) in powers.iter_mut().enumerate() {
            *slot = goertzel(window, self.modulator.tone_frequency(tone as u8), sample_rate);
        }
        powers
    }

    fn strongest(powers: &[f32; 8]) -> u8 {
        let mut best = 0;
        for (i, &p) in powers.iter().enumerate() {
            if p > powers[best] {
                best = i;
            }
        }
        best as u8
    }

    /// Fraction of sync symbols matching at `start`, counting `blocks` Costas blocks.
    fn sync_score(&self, samples: &[f32], start: usize, per_symbol: usize, blocks: usize, rate: u32) -> f32 {
        let mut hits = 0;
        let mut total = 0;
        for &off in SYNC_OFFSETS.iter().take(blocks) {
            for (k, &expected) in COSTAS.iter().enumerate() {
                let s = start + (off + k) * per_symbol;
                let Some(window) = samples.get(s..s + per_symbol) else {
                    continue;
                };
                total += 1;
                if Self::strongest(&self.tone_powers(window, rate)) == expected {
                    hits += 1;
                }
            }
        }
        if total == 0 { 0.0 } else { hits as f32 / total as f32 }
    }

    fn find_start(&self, samples: &[f32], per_symbol: usize, rate: u32) -> Option<(usize, f32)> {
        let frame_len = per_symbol * FRAME_SYMBOLS;
        let last = samples.len().checked_sub(frame_len)?;
        let coarse = (per_symbol / 2).max(1);
        let fine = (per_symbol / 8).max(1);

        let mut start = 0;
        while start <= last {
            if self.sync_score(samples, start, per_symbol, 1, rate) >= SYNC_THRESHOLD {
                let lo = start.saturating_sub(coarse);
                let hi = (start + coarse).min(last);
                let mut best = (start, 0.0f32);
                let mut s = lo;
                while s <= hi {
                    let score = self.sync_score(samples, s, per_symbol, SYNC_OFFSETS.len(), rate);
                    if score > best.1 {
                        best = (s, score);
                    }
                    s += fine;
                }
                if best.1 >= SYNC_THRESHOLD {
                    return Some(best);
                }
            }
            start += coarse;
        }
        None
    }
}

impl Decoder for ToneDecoder {
    fn decode(&self, samples: &[f32], sample_rate: u32) -> Vec<DecodeResult> {
        let modulator = Modulator {
            sample_rate,
            ..self.modulator
        };
        let decoder = ToneDecoder::new(modulator);
        let per_symbol = modulator.samples_per_symbol();
        if per_symbol == 0 {
            return Vec::new();
        }

        let Some((start, score)) = decoder.find_start(samples, per_symbol, sample_rate) else {
            trace!("no sync in {} samples", samples.len());
            return Vec::new();
        };

        let mut symbols = Vec::with_capacity(FRAME_SYMBOLS);
        let mut signal = 0.0f32;
        let mut noise = 0.0f32;
        for k in 0..FRAME_SYMBOLS {
            let s = start + k * per_symbol;
            let powers = decoder.tone_powers(&samples[s..s + per_symbol], sample_rate);
            let tone = Self::strongest(&powers);
            signal += powers[tone as usize];
            noise += (powers.iter().sum::<f32>() - powers[tone as usize]) / 7.0;
            symbols.push(tone);
        }

        let Ok(tone_frame) = ToneFrame::from_symbols(&symbols) else {
            return Vec::new();
        };
        match frame::decode_frame(&tone_frame) {
            Ok((message, frame_type)) => {
                let snr = if noise > 0.0 {
                    (10.0 * (signal / noise).log10()).round().clamp(-30.0, 30.0) as i32
                } else {
                    30
                };
                debug!("decoded {message:?} at sample {start} (sync {score:.2}, snr {snr})");
                vec![DecodeResult {
                    message,
                    snr,
                    frequency_offset: modulator.base_frequency,
                    quality: score,
                    frame_type,
                }]
            }
            Err(e) => {
                trace!("frame rejected at sample {start}: {e}");
                Vec::new()
            }
        }
    }
}

/// Power of `freq` in `window` using the Goertzel recurrence.
fn goertzel(window: &[f32], freq: f32, sample_rate: u32) -> f32 {
    let coeff = 2.0 * (TAU * freq / sample_rate as f32).cos();
    let (mut s1, mut s2) = (0.0f32, 0.0f32);
    for &x in window {
        let s0 = x + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    s1 * s1 + s2 * s2 - coeff * s1 * s2
}
