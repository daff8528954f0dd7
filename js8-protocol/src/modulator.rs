use std::f32::consts::TAU;

use crate::frame::{FRAME_SYMBOLS, ToneFrame};
use crate::mode::SubMode;

/// Default audio offset of tone 0, in Hz.
pub const DEFAULT_BASE_FREQUENCY: f32 = 1500.0;

/// Peak amplitude of generated audio (full scale = 1.0).
pub const AMPLITUDE: f32 = 0.5;

/// Turns tone frames into audio.
#[derive(Debug, Clone, Copy)]
pub struct Modulator {
    pub sample_rate: u32,
    pub base_frequency: f32,
    pub submode: SubMode,
}

impl Modulator {
    pub fn new(sample_rate: u32, base_frequency: f32, submode: SubMode) -> Self {
        Self {
            sample_rate,
            base_frequency,
            submode,
        }
    }

    /// Frequency separation between adjacent tones; `sample_rate / 2048` in
    /// the reference sub-mode.
    pub fn tone_spacing(&self) -> f32 {
        self.sample_rate as f32 / self.submode.tone_spacing_divisor()
    }

    /// Frequency of `tone` (0..8) in Hz.
    pub fn tone_frequency(&self, tone: u8) -> f32 {
        self.base_frequency + tone as f32 * self.tone_spacing()
    }

    /// Samples spent on each symbol.
    pub fn samples_per_symbol(&self) -> usize {
        let total = self.sample_rate as usize * self.submode.tx_seconds() as usize;
        total / FRAME_SYMBOLS
    }

    /// Synthesize one transmission. Symbols are emitted in frame order, each
    /// for an equal slice of the sub-mode period, with continuous phase
    /// across symbol boundaries.
    pub fn generate(&self, frame: &ToneFrame) -> Vec<f32> {
        let per_symbol = self.samples_per_symbol();
        let rate = self.sample_rate as f32;
        let mut out = Vec::with_capacity(per_symbol * FRAME_SYMBOLS);
        let mut phase = 0.0f32;

        for &tone in frame.symbols() {
            let step = TAU * self.tone_frequency(tone) / rate;
            for _ in 0..per_symbol {
                out.push(AMPLITUDE * phase.sin());
                phase += step;
                if phase >= TAU {
                    phase -= TAU;
                }
            }
        }
        out
    }
}

/// Synthesize a frame at the reference sub-mode and default base frequency.
pub fn generate_audio(frame: &ToneFrame, sample_rate: u32) -> Vec<f32> {
    Modulator::new(sample_rate, DEFAULT_BASE_FREQUENCY, SubMode::Normal).generate(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_message;

    #[test]
    fn test_reference_duration() {
        let frame = encode_message("CQ-N0CALL-XX", 0).unwrap();
        let audio = generate_audio(&frame, 12_000);
        assert!(
            (179_000..=181_000).contains(&audio.len()),
            "unexpected length {}",
            audio.len()
        );
    }

    #[test]
    fn test_audio_is_not_silent_and_bounded() {
        let frame = encode_message("CQ-N0CALL-XX", 0).unwrap();
        let audio = generate_audio(&frame, 12_000);
        let peak = audio.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.4, "peak too low: {peak}");
        assert!(peak <= AMPLITUDE + 1e-6);
    }

    #[test]
    fn test_tone_spacing() {
        let m = Modulator::new(12_000, 1000.0, SubMode::Normal);
        assert!((m.tone_spacing() - 5.859_375).abs() < 1e-6);
        assert!((m.tone_frequency(7) - (1000.0 + 7.0 * 5.859_375)).abs() < 1e-3);
    }

    #[test]
    fn test_submode_changes_length() {
        let frame = encode_message("CQ-N0CALL-XX", 0).unwrap();
        let fast = Modulator::new(12_000, 1500.0, SubMode::Fast).generate(&frame);
        let turbo = Modulator::new(12_000, 1500.0, SubMode::Turbo).generate(&frame);
        assert_eq!(fast.len(), (120_000 / 79) * 79);
        assert_eq!(turbo.len(), (72_000 / 79) * 79);
    }
}
