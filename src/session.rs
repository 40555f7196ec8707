//! SliceSession: owns the buffer, markers, grid parameters and playback.

use crate::detection::DetectionHandle;
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use reslice_analysis::{detect_onsets, Detection, Envelope, EnvelopeMode};
use reslice_core::{
    derive_regions, AtomicFlag, MarkerList, Region, Regions, SliceConfig, TempoGrid,
};
use reslice_playback::{
    playback_pair, AudioBuffer, OutputStream, PlaybackRange, PlaybackState, PlaybackVoice, Player,
};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Region under the playhead, with the playhead position inside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayingRegion {
    pub index: usize,
    pub region: Region,
    /// `0.0..=1.0` through the region
    pub fraction: f32,
}

/// One loaded recording and everything needed to slice and audition it.
///
/// Marker edits, detection and playback control take `&self`, so a session
/// can be shared behind an `Arc` with a background detection thread. Loading
/// new audio and output device changes take `&mut self`.
///
/// Regions and the tempo grid are never stored: they are derived from the
/// current markers and settings on every call.
pub struct SliceSession {
    config: RwLock<SliceConfig>,
    audio: AudioBuffer,
    source: Option<PathBuf>,
    envelope_mode: EnvelopeMode,
    envelope: Envelope,
    markers: RwLock<MarkerList>,
    detecting: AtomicFlag,
    detected_bpm: RwLock<Option<f32>>,
    player: Player,
    voice: Mutex<Option<PlaybackVoice>>,
    output: Mutex<Option<OutputStream>>,
    output_device: Option<usize>,
}

/// Lowers the detecting flag when a detection pass ends, even on error.
struct DetectingGuard<'a>(&'a AtomicFlag);

impl Drop for DetectingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl SliceSession {
    pub fn builder() -> crate::SliceSessionBuilder {
        crate::SliceSessionBuilder::default()
    }

    pub(crate) fn from_parts(
        config: SliceConfig,
        audio: AudioBuffer,
        source: Option<PathBuf>,
        envelope_mode: EnvelopeMode,
        output_device: Option<usize>,
    ) -> Result<Self> {
        config.validate()?;
        check_sample_rate(&audio)?;

        let envelope = Envelope::compute(
            audio.samples(),
            audio.sample_rate(),
            config.samples_per_block,
            envelope_mode,
        )?;
        let (player, voice) = playback_pair(
            audio.shared(),
            audio.sample_rate(),
            config.volume,
            config.fallback_window,
        );

        tracing::info!(
            source = ?source,
            sample_rate = audio.sample_rate(),
            frames = audio.len(),
            bpm = config.bpm,
            rows_per_bar = config.rows_per_bar,
            "session ready"
        );

        Ok(Self {
            markers: RwLock::new(MarkerList::new(config.dedup_epsilon)),
            config: RwLock::new(config),
            audio,
            source,
            envelope_mode,
            envelope,
            detecting: AtomicFlag::new(false),
            detected_bpm: RwLock::new(None),
            player,
            voice: Mutex::new(Some(voice)),
            output: Mutex::new(None),
            output_device,
        })
    }

    // Buffer and settings

    pub fn config(&self) -> SliceConfig {
        self.config.read().clone()
    }

    pub fn bpm(&self) -> f64 {
        self.config.read().bpm
    }

    pub fn rows_per_bar(&self) -> u32 {
        self.config.read().rows_per_bar
    }

    pub fn audio(&self) -> &AudioBuffer {
        &self.audio
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    pub fn total_samples(&self) -> usize {
        self.audio.len()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Tempo reported by the last detection pass that estimated one.
    pub fn detected_bpm(&self) -> Option<f32> {
        *self.detected_bpm.read()
    }

    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        self.update_config(|c| c.bpm = bpm)
    }

    pub fn set_rows_per_bar(&self, rows_per_bar: u32) -> Result<()> {
        self.update_config(|c| c.rows_per_bar = rows_per_bar)
    }

    pub fn set_base_pitch(&self, base_pitch: i32) -> Result<()> {
        self.update_config(|c| c.base_pitch = base_pitch)
    }

    pub fn set_subdivision(&self, subdivision: u32) -> Result<()> {
        self.update_config(|c| c.subdivision = subdivision)
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.update_config(|c| c.volume = volume)?;
        self.player.set_volume(volume);
        Ok(())
    }

    fn update_config(&self, apply: impl FnOnce(&mut SliceConfig)) -> Result<()> {
        let mut config = self.config.write();
        let mut next = config.clone();
        apply(&mut next);
        next.validate()?;
        *config = next;
        Ok(())
    }

    /// Row grid for the current tempo and subdivision.
    pub fn grid(&self) -> Result<TempoGrid> {
        let config = self.config.read();
        Ok(TempoGrid::new(
            config.bpm,
            config.rows_per_bar,
            self.audio.sample_rate(),
            self.audio.len(),
        )?)
    }

    /// Envelope blocks drawn next to `row`.
    pub fn row_envelope(&self, row: usize) -> Result<Range<usize>> {
        Ok(self.envelope.blocks_for_row(&self.grid()?, row))
    }

    // Markers

    pub fn markers(&self) -> MarkerList {
        self.markers.read().clone()
    }

    pub fn marker_times(&self) -> Vec<f64> {
        self.markers.read().times()
    }

    pub fn is_detecting(&self) -> bool {
        self.detecting.get()
    }

    fn edit<R>(&self, op: &'static str, apply: impl FnOnce(&mut MarkerList) -> R) -> Result<R> {
        let mut markers = self.markers.write();
        if self.detecting.get() {
            return Err(reslice_core::Error::DetectionInProgress.into());
        }
        let out = apply(&mut markers);
        tracing::debug!(op, markers = markers.len(), "markers edited");
        Ok(out)
    }

    /// Insert a marker. Returns false if it collapsed into an existing one.
    pub fn insert_marker(&self, time: f64) -> Result<bool> {
        self.edit("insert", |m| m.insert_marker(time))
    }

    pub fn remove_markers_in(&self, range: Range<f64>) -> Result<usize> {
        self.edit("remove_range", |m| m.remove_markers_in(range))
    }

    /// Move a marker; returns its index after re-sorting.
    pub fn move_marker(&self, index: usize, new_time: f64) -> Result<usize> {
        Ok(self.edit("move", |m| m.move_marker(index, new_time))??)
    }

    /// Grid left-click: add a marker at the start of `row` if none is there.
    pub fn add_at_row(&self, row: usize) -> Result<bool> {
        let grid = self.grid()?;
        self.edit("add_row", |m| m.add_at_row(&grid, row))
    }

    /// Grid right-click: remove every marker on `row`.
    pub fn remove_row(&self, row: usize) -> Result<usize> {
        let grid = self.grid()?;
        self.edit("remove_row", |m| m.remove_row(&grid, row))
    }

    pub fn set_markers(&self, times: impl IntoIterator<Item = f64>) -> Result<()> {
        self.edit("set", |m| m.replace(times))
    }

    pub fn clear_markers(&self) -> Result<()> {
        self.edit("clear", MarkerList::clear)
    }

    /// Snap the current markers to the session tempo. Edits never do this on their own.
    pub fn quantize_markers(&self) -> Result<bool> {
        let (bpm, subdivision) = {
            let config = self.config.read();
            (config.bpm, config.subdivision)
        };
        self.edit("quantize", |m| m.quantize(bpm, subdivision))
    }

    /// Rows that currently carry a marker.
    pub fn marker_rows(&self) -> Result<Vec<usize>> {
        let grid = self.grid()?;
        Ok(self.markers.read().marker_rows(&grid))
    }

    // Regions

    pub fn regions(&self) -> Regions {
        let base_pitch = self.config.read().base_pitch;
        derive_regions(
            self.markers.read().as_slice(),
            self.audio.sample_rate(),
            self.audio.len(),
            base_pitch,
        )
    }

    /// Regions for an exporter.
    ///
    /// With `strict`, the first zero-length region is an error. Otherwise
    /// zero-length regions are left out and the rest keep their pitch ids.
    pub fn export_regions(&self, strict: bool) -> Result<Vec<Region>> {
        let regions = self.regions();
        if strict {
            regions.validate()?;
            return Ok(regions.into_vec());
        }

        let skipped = regions.degenerate();
        if !skipped.is_empty() {
            tracing::warn!(count = skipped.len(), "skipping zero-length regions");
        }
        Ok(regions.playable().copied().collect())
    }

    /// One `<region> key=.. offset=.. end=..` line per region.
    pub fn region_table(&self) -> String {
        self.regions()
            .iter()
            .map(Region::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn log_regions(&self) {
        let name = self
            .source
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for region in &self.regions() {
            tracing::debug!(sample = %name, "{region}");
        }
    }

    // Detection

    /// Detect onsets, quantize them and replace the markers.
    ///
    /// With `detect_tempo`, a detected tempo becomes the session tempo and
    /// is used for quantizing.
    pub fn detect_onsets(&self, detect_tempo: bool) -> Result<Detection> {
        if !self.detecting.try_raise() {
            return Err(reslice_core::Error::DetectionInProgress.into());
        }
        let _guard = DetectingGuard(&self.detecting);
        self.run_detection(detect_tempo)
    }

    /// Run [`detect_onsets`](Self::detect_onsets) on a background thread.
    pub fn detect_in_background(self: &Arc<Self>, detect_tempo: bool) -> Result<DetectionHandle> {
        if !self.detecting.try_raise() {
            return Err(reslice_core::Error::DetectionInProgress.into());
        }

        let session = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("reslice-detect".into())
            .spawn(move || {
                let _guard = DetectingGuard(&session.detecting);
                session.run_detection(detect_tempo)
            });

        match spawned {
            Ok(thread) => Ok(DetectionHandle::new(thread)),
            Err(e) => {
                self.detecting.set(false);
                Err(e.into())
            }
        }
    }

    fn run_detection(&self, detect_tempo: bool) -> Result<Detection> {
        let config = self.config();
        let detection = detect_onsets(
            self.audio.samples(),
            self.audio.sample_rate(),
            &config,
            detect_tempo,
        )?;

        *self.markers.write() = detection.markers.clone();
        if let Some(bpm) = detection.detected_bpm {
            self.config.write().bpm = bpm as f64;
            *self.detected_bpm.write() = Some(bpm);
        }

        tracing::info!(
            onsets = detection.raw_onsets.len(),
            markers = detection.markers.len(),
            detected_bpm = ?detection.detected_bpm,
            quantized_bpm = ?detection.quantized_bpm,
            "onset detection finished"
        );
        self.log_regions();
        Ok(detection)
    }

    // Playback

    pub fn player(&self) -> &Player {
        &self.player
    }

    /// Play region `index`. `Ok(None)` when the buffer is empty.
    pub fn play_region(&self, index: usize) -> Result<Option<PlaybackRange>> {
        let regions = self.regions();
        let region = regions
            .get(index)
            .ok_or(reslice_core::Error::OutOfRangeIndex {
                index,
                len: regions.len(),
            })?;
        Ok(self.player.play_region(region))
    }

    pub fn play_range(&self, start_s: f64, end_s: f64) -> Option<PlaybackRange> {
        self.player.play_range(start_s, end_s)
    }

    pub fn play_all(&self) -> Option<PlaybackRange> {
        let range = self.player.play_all()?;
        tracing::info!(frames = range.len(), "play all");
        Some(range)
    }

    /// Move the playhead to `seconds` inside the range being played.
    pub fn seek(&self, seconds: f64) {
        self.player
            .seek(reslice_core::seconds_to_sample(seconds, self.audio.sample_rate()));
    }

    pub fn stop(&self) {
        self.player.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    pub fn cursor(&self) -> usize {
        self.player.cursor()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.player.state()
    }

    /// Region under the playhead while playing.
    pub fn playing_region(&self) -> Option<PlayingRegion> {
        if !self.player.is_playing() {
            return None;
        }
        let cursor = self.player.cursor();
        let regions = self.regions();
        let (index, region) = regions.find(cursor)?;
        Some(PlayingRegion {
            index,
            region: *region,
            fraction: region.fraction(cursor),
        })
    }

    /// Hand the real-time voice to a custom backend instead of the CPAL output.
    pub fn take_voice(&self) -> Result<PlaybackVoice> {
        self.voice
            .lock()
            .take()
            .ok_or(Error::Playback(reslice_playback::Error::VoiceTaken))
    }

    /// Start the CPAL output stream on the configured device.
    pub fn start_output(&mut self) -> Result<()> {
        if self.output.get_mut().is_some() {
            return Ok(());
        }
        let voice = match self.voice.get_mut().take() {
            Some(voice) => voice,
            None => {
                self.rebuild_playback();
                self.take_voice()?
            }
        };

        match OutputStream::start(voice, &self.player, self.audio.sample_rate(), self.output_device) {
            Ok(stream) => {
                *self.output.get_mut() = Some(stream);
                Ok(())
            }
            Err(e) => {
                self.rebuild_playback();
                Err(e.into())
            }
        }
    }

    /// Stop the output stream. Playback handles taken earlier stop working.
    pub fn stop_output(&mut self) {
        if self.output.get_mut().take().is_some() {
            tracing::info!("output stream stopped");
            self.rebuild_playback();
        }
    }

    pub fn is_output_running(&self) -> bool {
        self.output.lock().is_some()
    }

    fn rebuild_playback(&mut self) {
        self.player.stop();
        let config = self.config.get_mut();
        let (player, voice) = playback_pair(
            self.audio.shared(),
            self.audio.sample_rate(),
            config.volume,
            config.fallback_window,
        );
        self.player = player;
        *self.voice.get_mut() = Some(voice);
    }

    // Loading

    /// Load a WAV file, replacing the buffer. Markers are cleared.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let audio = AudioBuffer::load_wav(path)?;
        self.set_audio(audio)?;
        self.source = Some(path.to_path_buf());
        Ok(())
    }

    /// Load the current source file again.
    pub fn reload(&mut self) -> Result<()> {
        let path = self.source.clone().ok_or(Error::NoSource)?;
        self.load(path)
    }

    /// Replace the buffer with decoded audio. Markers are cleared, the
    /// envelope is recomputed and the output restarted if it was running.
    pub fn set_audio(&mut self, audio: AudioBuffer) -> Result<()> {
        check_sample_rate(&audio)?;
        let config = self.config.get_mut().clone();
        self.envelope = Envelope::compute(
            audio.samples(),
            audio.sample_rate(),
            config.samples_per_block,
            self.envelope_mode,
        )?;
        self.audio = audio;
        self.source = None;
        self.markers.get_mut().clear();
        *self.detected_bpm.get_mut() = None;

        let was_running = self.output.get_mut().take().is_some();
        self.rebuild_playback();
        if was_running {
            self.start_output()?;
        }

        tracing::info!(
            sample_rate = self.audio.sample_rate(),
            frames = self.audio.len(),
            "audio replaced"
        );
        Ok(())
    }
}

fn check_sample_rate(audio: &AudioBuffer) -> Result<()> {
    if audio.sample_rate() == 0 {
        return Err(reslice_core::Error::InvalidParameter("sample_rate must be positive".into()).into());
    }
    Ok(())
}
