/// Convert float samples to signed 16-bit PCM.
///
/// Negative samples scale by 32768 and the rest by 32767, so -1.0 maps to
/// `i16::MIN` and +1.0 to `i16::MAX` without overflow. Values are clamped to
/// [-1.0, 1.0] first and truncated toward zero after scaling. NaN and
/// infinities become silence.
pub fn quantize(samples: &[f32]) -> Vec<i16> {
    samples.iter().copied().map(quantize_sample).collect()
}

#[inline]
fn quantize_sample(s: f32) -> i16 {
    if !s.is_finite() {
        return 0;
    }
    let s = s.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Inverse of [`quantize`]'s scaling, back to [-1.0, 1.0].
pub fn dequantize(pcm: &[i16]) -> Vec<f32> {
    pcm.iter()
        .map(|&v| {
            if v < 0 {
                v as f32 / 32768.0
            } else {
                v as f32 / 32767.0
            }
        })
        .collect()
}
