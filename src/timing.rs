//! Millisecond/sample conversions at the engine rate.
//!
//! All channel arithmetic (fade durations, stop countdowns, reported
//! positions) is carried in whole output samples; hosts speak milliseconds.
//! Conversions widen to i64 before multiplying so positions far beyond
//! 2^31 samples stay exact.

/// Convert milliseconds to output samples at the given rate.
pub fn ms_to_samples(ms: i64, rate: u32) -> i64 {
    ms * rate as i64 / 1000
}

/// Convert output samples to milliseconds at the given rate.
pub fn samples_to_ms(samples: i64, rate: u32) -> i64 {
    samples * 1000 / rate as i64
}

/// Convert seconds (as hosts pass seek offsets) to whole milliseconds.
pub fn seconds_to_ms(seconds: f64) -> i64 {
    (seconds * 1000.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values_at_48k() {
        assert_eq!(ms_to_samples(1000, 48000), 48000);
        assert_eq!(ms_to_samples(500, 48000), 24000);
        assert_eq!(ms_to_samples(0, 48000), 0);
        assert_eq!(samples_to_ms(48000, 48000), 1000);
        assert_eq!(samples_to_ms(24000, 48000), 500);
    }

    #[test]
    fn test_known_values_at_44_1k() {
        assert_eq!(ms_to_samples(1000, 44100), 44100);
        // 10ms at 44.1kHz is 441 samples exactly
        assert_eq!(ms_to_samples(10, 44100), 441);
        assert_eq!(samples_to_ms(44100, 44100), 1000);
    }

    /// ms -> samples -> ms is stable to within one millisecond for any
    /// rate of at least 1000 Hz (the truncation error is < 1000/rate ms).
    #[test]
    fn test_ms_roundtrip_within_one_ms() {
        for rate in [8000u32, 22050, 44100, 48000, 96000] {
            for ms in [0i64, 1, 7, 250, 999, 1000, 1001, 90_000, 1 << 30] {
                let back = samples_to_ms(ms_to_samples(ms, rate), rate);
                assert!(
                    (back - ms).abs() <= 1,
                    "rate={} ms={} back={}",
                    rate,
                    ms,
                    back
                );
            }
        }
    }

    #[test]
    fn test_large_positions_do_not_overflow() {
        // 2^30 samples at 48kHz is ~6.2 hours; the conversion must widen.
        let samples = 1i64 << 30;
        let ms = samples_to_ms(samples, 48000);
        assert_eq!(ms, samples * 1000 / 48000);
        assert!(ms_to_samples(ms, 48000) <= samples);
        assert!(samples - ms_to_samples(ms, 48000) < 48);
    }

    #[test]
    fn test_seconds_to_ms() {
        assert_eq!(seconds_to_ms(0.0), 0);
        assert_eq!(seconds_to_ms(1.5), 1500);
        assert_eq!(seconds_to_ms(10.0), 10000);
    }
}
