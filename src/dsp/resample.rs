use realfft::RealFftPlanner;
use std::cell::RefCell;

use crate::types::DecodedAudio;

thread_local! {
    static FFT_PLANNER: RefCell<RealFftPlanner<f32>> = RefCell::new(RealFftPlanner::new());
}

/// Per-channel sample-rate conversion.
///
/// Implementations must return exactly `out_len` samples; `resample_with`
/// computes `out_len` from the buffer duration so every implementation agrees
/// on the output length.
pub trait Resampler: Send + Sync {
    fn resample_channel(&self, input: &[f32], from_rate: u32, to_rate: u32, out_len: usize) -> Vec<f32>;
}

/// Linear interpolation between the two nearest source samples.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearResampler;

impl Resampler for LinearResampler {
    fn resample_channel(&self, input: &[f32], from_rate: u32, to_rate: u32, out_len: usize) -> Vec<f32> {
        if input.is_empty() {
            return vec![0.0; out_len];
        }

        let step = from_rate as f64 / to_rate as f64;
        let last = input.len() - 1;
        let mut output = Vec::with_capacity(out_len);

        for i in 0..out_len {
            let src_pos = i as f64 * step;
            let idx = src_pos as usize;
            if idx >= last {
                // Past the final source sample: hold it.
                output.push(input[last]);
                continue;
            }
            let frac = (src_pos - idx as f64) as f32;
            let s0 = input[idx];
            let s1 = input[idx + 1];
            output.push(s0 + frac * (s1 - s0));
        }

        output
    }
}

/// Band-limited resampling by zero-padding or truncating the spectrum of the
/// whole channel. Slower than [`LinearResampler`], but it does not alias when
/// downsampling.
#[derive(Clone, Copy, Debug, Default)]
pub struct FftResampler;

impl Resampler for FftResampler {
    fn resample_channel(&self, input: &[f32], from_rate: u32, to_rate: u32, out_len: usize) -> Vec<f32> {
        if input.is_empty() || out_len == 0 {
            return vec![0.0; out_len];
        }

        let n_in = input.len();
        let (forward, inverse) = FFT_PLANNER.with(|p| {
            let mut planner = p.borrow_mut();
            (planner.plan_fft_forward(n_in), planner.plan_fft_inverse(out_len))
        });

        let mut scratch = input.to_vec();
        let mut spectrum = forward.make_output_vec();
        if let Err(e) = forward.process(&mut scratch, &mut spectrum) {
            log::warn!("forward FFT failed ({e}), falling back to linear interpolation");
            return LinearResampler.resample_channel(input, from_rate, to_rate, out_len);
        }

        let mut out_spectrum = inverse.make_input_vec();
        let shared = spectrum.len().min(out_spectrum.len());
        out_spectrum[..shared].copy_from_slice(&spectrum[..shared]);

        // An even-length input's Nyquist bin is stored once; inside a longer
        // spectrum it gets mirrored, so halve it.
        if n_in % 2 == 0 && out_len > n_in {
            let nyquist = &mut out_spectrum[n_in / 2];
            nyquist.re *= 0.5;
            nyquist.im *= 0.5;
        }
        out_spectrum[0].im = 0.0;
        if out_len % 2 == 0 {
            let last = out_spectrum.len() - 1;
            out_spectrum[last].im = 0.0;
        }

        let mut output = inverse.make_output_vec();
        if let Err(e) = inverse.process(&mut out_spectrum, &mut output) {
            log::warn!("inverse FFT failed ({e}), falling back to linear interpolation");
            return LinearResampler.resample_channel(input, from_rate, to_rate, out_len);
        }

        // realfft is unnormalized; the round trip scales by the input length.
        let scale = 1.0 / n_in as f32;
        for s in output.iter_mut() {
            *s = (*s * scale).clamp(-1.0, 1.0);
        }
        output
    }
}

/// Convert every channel of `audio` to `target_rate` by linear interpolation.
///
/// Returns `audio` untouched when the rates already match.
pub fn resample(audio: DecodedAudio, target_rate: u32) -> DecodedAudio {
    resample_with(&LinearResampler, audio, target_rate)
}

/// Convert every channel of `audio` to `target_rate` with `resampler`.
///
/// The output holds `round(duration_secs * target_rate)` samples per channel.
/// A `target_rate` of 0 names no rate at all; `audio` comes back unchanged
/// and the call is logged at error level.
pub fn resample_with<R: Resampler + ?Sized>(resampler: &R, audio: DecodedAudio, target_rate: u32) -> DecodedAudio {
    if target_rate == 0 {
        log::error!("Refusing to resample to 0 Hz; keeping {} Hz", audio.sample_rate);
        return audio;
    }
    if audio.sample_rate == target_rate {
        return audio;
    }

    let out_len = (audio.duration_secs * target_rate as f64).round() as usize;
    let channels: Vec<Vec<f32>> = audio
        .channels
        .iter()
        .map(|ch| resampler.resample_channel(ch, audio.sample_rate, target_rate, out_len))
        .collect();

    log::debug!(
        "Resampled {} ch: {} Hz -> {} Hz ({} -> {} samples)",
        channels.len(),
        audio.sample_rate,
        target_rate,
        audio.frames(),
        out_len
    );

    DecodedAudio {
        sample_rate: target_rate,
        channels,
        duration_secs: out_len as f64 / target_rate as f64,
    }
}
