//! Onset quantizer: turns a buffer into a clean marker list.
//!
//! 1. Feed the buffer hop by hop to an onset detector and, optionally, a
//!    tempo estimator. The last hop is zero-padded.
//! 2. Collect every reported onset time and the last positive tempo.
//! 3. Sort the onsets and snap each to the nearest quantize unit.
//! 4. Drop entries within the dedup epsilon of the previous kept one.

use crate::analyzer::{for_each_hop, OnsetDetector, TempoEstimator};
use crate::onset::SpectralFluxOnsets;
use crate::tempo::FluxTempoEstimator;
use reslice_core::{quantize_times, sort_and_dedup, MarkerList, Result, SliceConfig};

/// Result of one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Onset times exactly as reported, in report order.
    pub raw_onsets: Vec<f64>,
    /// Sorted, quantized and deduplicated markers.
    pub markers: MarkerList,
    /// Last positive tempo reported by the estimator.
    pub detected_bpm: Option<f32>,
    /// Tempo the markers were snapped to, if they were snapped at all.
    pub quantized_bpm: Option<f64>,
}

/// Drives onset and tempo analyzers over a buffer and post-processes the
/// onsets into markers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OnsetQuantizer {
    bpm: f64,
    subdivision: u32,
    hop_size: usize,
    epsilon: f64,
    follow_detected_tempo: bool,
}

impl OnsetQuantizer {
    pub fn new(bpm: f64, subdivision: u32, hop_size: usize, epsilon: f64) -> Self {
        Self {
            bpm,
            subdivision,
            hop_size,
            epsilon,
            follow_detected_tempo: true,
        }
    }

    pub fn from_config(config: &SliceConfig) -> Self {
        Self::new(
            config.bpm,
            config.subdivision,
            config.hop_size,
            config.dedup_epsilon,
        )
    }

    /// Whether a detected tempo replaces the session tempo for snapping.
    pub fn follow_detected_tempo(mut self, follow: bool) -> Self {
        self.follow_detected_tempo = follow;
        self
    }

    /// Tempo to snap to, given what the estimator reported.
    pub fn quantize_bpm(&self, detected: Option<f32>) -> f64 {
        match detected {
            Some(bpm) if self.follow_detected_tempo => bpm as f64,
            _ => self.bpm,
        }
    }

    /// Steps 3 and 4 on already collected onset times.
    ///
    /// Quantization is skipped when `bpm` is not positive or the subdivision
    /// is zero; sorting and deduplication still apply.
    pub fn finish(&self, mut onsets: Vec<f64>, bpm: f64) -> (MarkerList, bool) {
        onsets.retain(|t| t.is_finite() && *t >= 0.0);
        onsets.sort_by(f64::total_cmp);
        let quantized = quantize_times(&mut onsets, bpm, self.subdivision);
        sort_and_dedup(&mut onsets, self.epsilon);
        (MarkerList::from_times(onsets, self.epsilon), quantized)
    }

    /// Run the full pipeline over `samples`.
    ///
    /// An empty buffer yields an empty marker list. When `tempo` is `None`
    /// the session tempo is used for snapping.
    pub fn run<O, T>(&self, samples: &[f32], onset: &mut O, mut tempo: Option<&mut T>) -> Detection
    where
        O: OnsetDetector + ?Sized,
        T: TempoEstimator + ?Sized,
    {
        let mut raw_onsets = Vec::new();
        let mut detected_bpm = None;

        for_each_hop(samples, self.hop_size, |hop| {
            if let Some(time) = onset.process(hop) {
                raw_onsets.push(time);
            }
            if let Some(estimator) = tempo.as_deref_mut() {
                if let Some(bpm) = estimator.process(hop).filter(|b| b.is_finite() && *b > 0.0) {
                    detected_bpm = Some(bpm);
                }
            }
        });

        let bpm = self.quantize_bpm(detected_bpm);
        let (markers, quantized) = self.finish(raw_onsets.clone(), bpm);

        Detection {
            raw_onsets,
            markers,
            detected_bpm,
            quantized_bpm: quantized.then_some(bpm),
        }
    }
}

/// Run the built-in spectral-flux analyzers with the settings in `config`.
pub fn detect_onsets(
    samples: &[f32],
    sample_rate: u32,
    config: &SliceConfig,
    detect_tempo: bool,
) -> Result<Detection> {
    let quantizer = OnsetQuantizer::from_config(config);
    let mut onsets = SpectralFluxOnsets::new(sample_rate, config.window_size, config.hop_size)?;

    if detect_tempo {
        let mut tempo = FluxTempoEstimator::new(sample_rate, config.window_size, config.hop_size)?;
        Ok(quantizer.run(samples, &mut onsets, Some(&mut tempo)))
    } else {
        Ok(quantizer.run::<_, FluxTempoEstimator>(samples, &mut onsets, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Replays a fixed schedule of events, one entry per hop.
    struct Scripted<T> {
        events: Vec<Option<T>>,
        next: usize,
    }

    impl<T> Scripted<T> {
        fn new(events: Vec<Option<T>>) -> Self {
            Self { events, next: 0 }
        }
    }

    impl OnsetDetector for Scripted<f64> {
        fn process(&mut self, _hop: &[f32]) -> Option<f64> {
            let event = self.events.get(self.next).copied().flatten();
            self.next += 1;
            event
        }

        fn reset(&mut self) {
            self.next = 0;
        }
    }

    impl TempoEstimator for Scripted<f32> {
        fn process(&mut self, _hop: &[f32]) -> Option<f32> {
            let event = self.events.get(self.next).copied().flatten();
            self.next += 1;
            event
        }

        fn reset(&mut self) {
            self.next = 0;
        }
    }

    /// Records hop lengths and the final hop's contents.
    #[derive(Default)]
    struct Recorder {
        lengths: Vec<usize>,
        last: Vec<f32>,
    }

    impl OnsetDetector for Recorder {
        fn process(&mut self, hop: &[f32]) -> Option<f64> {
            self.lengths.push(hop.len());
            self.last = hop.to_vec();
            None
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn test_unquantized_pipeline_sorts_and_dedups() {
        let quantizer = OnsetQuantizer::new(0.0, 24, 4, 0.001);
        let mut onsets = Scripted::new(vec![Some(0.5), Some(0.2), Some(0.2004), None, Some(0.9)]);

        let detection = quantizer.run::<_, Scripted<f32>>(&[0.1; 20], &mut onsets, None);

        assert_eq!(detection.raw_onsets, vec![0.5, 0.2, 0.2004, 0.9]);
        assert_eq!(detection.markers.times(), vec![0.2, 0.5, 0.9]);
        assert_eq!(detection.quantized_bpm, None);
    }

    #[test]
    fn test_quantizes_to_session_tempo() {
        let quantizer = OnsetQuantizer::new(120.0, 24, 4, 0.001);
        let mut onsets = Scripted::new(vec![Some(0.04), Some(0.09), Some(0.12)]);

        let detection = quantizer.run::<_, Scripted<f32>>(&[0.0; 12], &mut onsets, None);
        let unit = 2.0 / 24.0;

        // 0.04 rounds to 0, 0.09 and 0.12 both round to one unit.
        let times = detection.markers.times();
        assert_eq!(times.len(), 2);
        assert_relative_eq!(times[0], 0.0);
        assert_relative_eq!(times[1], unit);
        assert_eq!(detection.quantized_bpm, Some(120.0));
    }

    #[test]
    fn test_last_positive_tempo_wins() {
        let quantizer = OnsetQuantizer::new(140.0, 24, 4, 0.001);
        let mut onsets = Scripted::new(vec![None, None, Some(1.0)]);
        let mut tempo = Scripted::new(vec![Some(100.0), Some(60.0), Some(-3.0), Some(f32::NAN)]);

        let detection = quantizer.run(&[0.0; 16], &mut onsets, Some(&mut tempo));

        assert_eq!(detection.detected_bpm, Some(60.0));
        assert_eq!(detection.quantized_bpm, Some(60.0));
        // 60 bpm: unit = 4 s / 24, so 1.0 s snaps to 1/6 * 6 = 1.0.
        assert_relative_eq!(detection.markers.times()[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_detected_tempo_can_be_ignored() {
        let quantizer = OnsetQuantizer::new(120.0, 24, 4, 0.001).follow_detected_tempo(false);
        let mut onsets = Scripted::new(vec![Some(0.1)]);
        let mut tempo = Scripted::new(vec![Some(90.0)]);

        let detection = quantizer.run(&[0.0; 4], &mut onsets, Some(&mut tempo));

        assert_eq!(detection.detected_bpm, Some(90.0));
        assert_eq!(detection.quantized_bpm, Some(120.0));
    }

    #[test]
    fn test_last_hop_is_zero_padded() {
        let quantizer = OnsetQuantizer::new(120.0, 24, 4, 0.001);
        let mut recorder = Recorder::default();

        quantizer.run::<_, Scripted<f32>>(&[1.0; 10], &mut recorder, None);

        assert_eq!(recorder.lengths, vec![4, 4, 4]);
        assert_eq!(recorder.last, vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_finish_ignores_onset_order() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(11);
        let mut onsets: Vec<f64> = (0..200).map(|_| rng.gen_range(0.0..8.0)).collect();
        let quantizer = OnsetQuantizer::new(133.0, 32, 512, 0.001);

        let (sorted, _) = quantizer.finish(onsets.clone(), 133.0);
        onsets.shuffle(&mut rng);
        let (shuffled, quantized) = quantizer.finish(onsets, 133.0);

        assert!(quantized);
        assert_eq!(sorted, shuffled);
        for pair in shuffled.times().windows(2) {
            assert!(pair[1] - pair[0] >= 0.001);
        }
    }

    #[test]
    fn test_empty_buffer_gives_empty_markers() {
        let config = SliceConfig::default();
        let detection = detect_onsets(&[], 44100, &config, true).unwrap();
        assert!(detection.markers.is_empty());
        assert!(detection.raw_onsets.is_empty());
        assert_eq!(detection.detected_bpm, None);
    }

    #[test]
    fn test_built_in_analyzers_on_clicks() {
        let config = SliceConfig::default();
        let mut samples = vec![0.0f32; 44100];
        for pos in [8820usize, 26460] {
            for i in 0..50 {
                samples[pos + i] = (-0.1 * i as f32).exp() * 0.8;
            }
        }

        let detection = detect_onsets(&samples, 44100, &config, false).unwrap();
        let unit = (60.0 / config.bpm) * 4.0 / config.subdivision as f64;

        assert_eq!(detection.markers.len(), 2);
        for (marker, expected) in detection.markers.times().iter().zip([0.2, 0.6]) {
            assert!((marker - expected).abs() <= unit, "{marker} vs {expected}");
            let steps = marker / unit;
            assert_relative_eq!(steps, steps.round(), epsilon = 1e-9);
        }
    }
}
