use crate::types::DecodedAudio;

/// Average all channels into one. Mono input is returned unchanged.
pub fn downmix_to_mono(audio: DecodedAudio) -> DecodedAudio {
    if audio.channels.len() <= 1 {
        return audio;
    }

    let frames = audio.frames();
    let count = audio.channels.len() as f32;
    let mut mono = vec![0.0f32; frames];
    for ch in &audio.channels {
        for (acc, &s) in mono.iter_mut().zip(ch) {
            *acc += s;
        }
    }
    for s in mono.iter_mut() {
        *s /= count;
    }

    DecodedAudio {
        sample_rate: audio.sample_rate,
        channels: vec![mono],
        duration_secs: audio.duration_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_average() {
        let audio = DecodedAudio::from_channels(16_000, vec![vec![1.0, -1.0, 0.5], vec![0.0, -1.0, -0.5]]);
        let mono = downmix_to_mono(audio);
        assert_eq!(mono.channel_count(), 1);
        assert_eq!(mono.channels[0], vec![0.5, -1.0, 0.0]);
    }

    #[test]
    fn test_mono_is_identity() {
        let audio = DecodedAudio::from_channels(22_050, vec![vec![0.3, -0.7]]);
        assert_eq!(downmix_to_mono(audio.clone()), audio);
    }

    #[test]
    fn test_sample_count_and_rate_unchanged() {
        let audio = DecodedAudio::from_channels(48_000, vec![vec![0.2; 480]; 6]);
        let mono = downmix_to_mono(audio);
        assert_eq!(mono.sample_rate, 48_000);
        assert_eq!(mono.frames(), 480);
        assert_eq!(mono.duration_secs, 0.01);
        assert!(mono.channels[0].iter().all(|&s| (s - 0.2).abs() < 1e-6));
    }
}
