//! Region playback split across two threads.
//!
//! [`Player`] is the foreground handle: it resolves ranges, queues commands
//! and reads back the published state. [`PlaybackVoice`] lives on the audio
//! thread, owns the authoritative `{playing, start, end, cursor}` state and
//! produces one sample per tick.
//!
//! Commands travel over a bounded channel and are applied at the start of a
//! tick, so the voice only ever switches between whole ranges. The voice
//! publishes its state to shared atomics for the foreground to read; the
//! foreground may briefly see fields from two different ticks.
//!
//! Every command carries a sequence number. Until the voice has published
//! the latest one, the foreground reports the state it expects once the
//! queue is drained, so a stale tick never undoes a newer `play` or `stop`.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use reslice_core::{seconds_to_sample, AtomicFloat, Region};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Pending commands kept before the oldest is discarded.
const COMMAND_CAPACITY: usize = 16;

/// Resolved half-open sample range `[start, end)` handed to the voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackRange {
    pub start: usize,
    pub end: usize,
}

impl PlaybackRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Snapshot of the playback state as last published by the voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub playing: bool,
    pub start: usize,
    pub end: usize,
    pub cursor: usize,
    pub volume: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Play(PlaybackRange),
    Seek(usize),
    Stop,
}

/// Pull interface for playback backends: one output sample per call.
pub trait SampleSource: Send {
    fn next_sample(&mut self) -> f32;

    /// Fill `out` with consecutive samples.
    fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.next_sample();
        }
    }
}

#[derive(Default)]
struct StateCells {
    playing: AtomicBool,
    start: AtomicUsize,
    end: AtomicUsize,
    cursor: AtomicUsize,
}

impl StateCells {
    fn store(&self, playing: bool, start: usize, end: usize, cursor: usize) {
        self.start.store(start, Ordering::Relaxed);
        self.end.store(end, Ordering::Relaxed);
        self.cursor.store(cursor, Ordering::Relaxed);
        self.playing.store(playing, Ordering::Relaxed);
    }
}

struct SharedState {
    /// Written by the voice only.
    voice: StateCells,
    /// Expected state once every issued command is applied. Written by the foreground only.
    pending: StateCells,
    /// Sequence number of the last command sent.
    issued: AtomicU64,
    /// Sequence number of the last command the voice has published.
    applied: AtomicU64,
    volume: AtomicFloat,
    stream_errors: AtomicUsize,
}

impl SharedState {
    /// Cells that describe the newest state: the voice's once it has caught up.
    fn current(&self) -> &StateCells {
        let applied = self.applied.load(Ordering::Acquire);
        if applied < self.issued.load(Ordering::Acquire) {
            &self.pending
        } else {
            &self.voice
        }
    }
}

/// Build a connected player/voice pair for `buffer`.
///
/// `fallback_window` is the length in seconds played instead of a degenerate
/// range.
pub fn playback_pair(
    buffer: Arc<[f32]>,
    sample_rate: u32,
    volume: f32,
    fallback_window: f64,
) -> (Player, PlaybackVoice) {
    let (commands_tx, commands_rx) = crossbeam_channel::bounded(COMMAND_CAPACITY);
    let shared = Arc::new(SharedState {
        voice: StateCells::default(),
        pending: StateCells::default(),
        issued: AtomicU64::new(0),
        applied: AtomicU64::new(0),
        volume: AtomicFloat::new(volume.max(0.0)),
        stream_errors: AtomicUsize::new(0),
    });

    let total_samples = buffer.len();
    let player = Player {
        commands: commands_tx,
        stale: commands_rx.clone(),
        shared: Arc::clone(&shared),
        total_samples,
        sample_rate,
        fallback_samples: seconds_to_sample(fallback_window, sample_rate).max(1),
    };
    let voice = PlaybackVoice {
        buffer,
        commands: commands_rx,
        shared,
        playing: false,
        start: 0,
        end: 0,
        cursor: 0,
        applied: 0,
    };
    (player, voice)
}

/// Foreground playback handle. Cheap to clone; every clone drives the same voice.
#[derive(Clone)]
pub struct Player {
    commands: Sender<(u64, Command)>,
    /// Receiver clone used to discard the oldest command when the queue is full.
    stale: Receiver<(u64, Command)>,
    shared: Arc<SharedState>,
    total_samples: usize,
    sample_rate: u32,
    fallback_samples: usize,
}

impl Player {
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Resolve a sample range against the buffer.
    ///
    /// Bounds are clamped to the buffer. A degenerate range (`end <= start`)
    /// becomes the fallback window starting at `start`, clipped to the buffer
    /// end, or ending at the buffer end when `start` is already there.
    /// Returns `None` for an empty buffer.
    pub fn resolve(&self, start: usize, end: usize) -> Option<PlaybackRange> {
        if self.total_samples == 0 {
            return None;
        }
        let start = start.min(self.total_samples);
        let end = end.min(self.total_samples);
        if end > start {
            return Some(PlaybackRange { start, end });
        }

        let window = if start < self.total_samples {
            PlaybackRange {
                start,
                end: (start + self.fallback_samples).min(self.total_samples),
            }
        } else {
            PlaybackRange {
                start: self.total_samples.saturating_sub(self.fallback_samples),
                end: self.total_samples,
            }
        };
        tracing::warn!(
            requested_start = start,
            requested_end = end,
            start = window.start,
            end = window.end,
            "degenerate playback range, using fallback window"
        );
        Some(window)
    }

    /// Play `[start, end)` in samples. Returns the range actually queued.
    pub fn play_samples(&self, start: usize, end: usize) -> Option<PlaybackRange> {
        let range = self.resolve(start, end)?;
        self.send(Command::Play(range));
        Some(range)
    }

    /// Play from `start_s` to `end_s` seconds.
    pub fn play_range(&self, start_s: f64, end_s: f64) -> Option<PlaybackRange> {
        self.play_samples(
            seconds_to_sample(start_s, self.sample_rate),
            seconds_to_sample(end_s, self.sample_rate),
        )
    }

    pub fn play_region(&self, region: &Region) -> Option<PlaybackRange> {
        let range = self.play_samples(region.start_sample, region.end_sample)?;
        tracing::info!(
            key = region.pitch_id,
            offset = range.start,
            end = range.end,
            length = range.len(),
            "[PLAY]"
        );
        Some(range)
    }

    /// Play the whole buffer.
    pub fn play_all(&self) -> Option<PlaybackRange> {
        self.play_samples(0, self.total_samples)
    }

    /// Move the cursor to `sample`, clamped to the current range.
    /// Seeking to the end of the range stops playback.
    pub fn seek(&self, sample: usize) {
        self.send(Command::Seek(sample));
    }

    /// Stop playback. The cursor stays where it is.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// True from a successful `play_*` call until the range ends or `stop`.
    pub fn is_playing(&self) -> bool {
        self.shared.current().playing.load(Ordering::Relaxed)
    }

    pub fn cursor(&self) -> usize {
        self.shared.current().cursor.load(Ordering::Relaxed)
    }

    /// Whether the voice has yet to apply a command sent from here.
    pub fn has_pending_commands(&self) -> bool {
        self.shared.applied.load(Ordering::Acquire) < self.shared.issued.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PlaybackState {
        let cells = self.shared.current();
        PlaybackState {
            playing: cells.playing.load(Ordering::Relaxed),
            start: cells.start.load(Ordering::Relaxed),
            end: cells.end.load(Ordering::Relaxed),
            cursor: cells.cursor.load(Ordering::Relaxed),
            volume: self.shared.volume.get(),
        }
    }

    /// Set output gain (0.0+).
    pub fn set_volume(&self, volume: f32) {
        self.shared.volume.set(volume.max(0.0));
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume.get()
    }

    /// Errors reported by the output stream since the pair was built.
    pub fn stream_errors(&self) -> usize {
        self.shared.stream_errors.load(Ordering::Relaxed)
    }

    pub(crate) fn note_stream_error(&self) {
        self.shared.stream_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the state `command` leads to, then queue it.
    fn send(&self, command: Command) {
        let mut state = self.state();
        match command {
            Command::Play(range) => {
                state.playing = true;
                state.start = range.start;
                state.end = range.end;
                state.cursor = range.start;
            }
            Command::Seek(sample) => {
                state.cursor = sample.clamp(state.start, state.end.max(state.start));
                state.playing &= state.cursor < state.end;
            }
            Command::Stop => state.playing = false,
        }
        self.shared
            .pending
            .store(state.playing, state.start, state.end, state.cursor);
        let seq = self.shared.issued.fetch_add(1, Ordering::AcqRel) + 1;

        let mut command = (seq, command);
        loop {
            match self.commands.try_send(command) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(rejected)) => {
                    // Later commands supersede earlier ones.
                    let _ = self.stale.try_recv();
                    command = rejected;
                }
            }
        }
    }
}

/// Real-time side of the pair. Move it into the audio callback.
pub struct PlaybackVoice {
    buffer: Arc<[f32]>,
    commands: Receiver<(u64, Command)>,
    shared: Arc<SharedState>,
    playing: bool,
    start: usize,
    end: usize,
    cursor: usize,
    /// Sequence number of the last command applied.
    applied: u64,
}

impl PlaybackVoice {
    /// One output sample, then publish the state.
    pub fn tick(&mut self) -> f32 {
        let out = self.step();
        self.publish();
        out
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn apply_commands(&mut self) {
        while let Ok((seq, command)) = self.commands.try_recv() {
            self.applied = self.applied.max(seq);
            match command {
                Command::Play(range) => {
                    self.start = range.start;
                    self.end = range.end;
                    self.cursor = range.start;
                    self.playing = true;
                }
                Command::Seek(sample) => {
                    self.cursor = sample.clamp(self.start, self.end);
                    if self.cursor >= self.end {
                        self.playing = false;
                    }
                }
                Command::Stop => self.playing = false,
            }
        }
    }

    fn step(&mut self) -> f32 {
        self.apply_commands();

        if !self.playing {
            return 0.0;
        }
        // Out-of-range bounds stop playback instead of faulting.
        if self.cursor >= self.end || self.cursor >= self.buffer.len() {
            self.playing = false;
            return 0.0;
        }

        let sample = self.buffer[self.cursor];
        self.cursor += 1;
        if self.cursor >= self.end {
            self.playing = false;
        }
        sample * self.shared.volume.get()
    }

    fn publish(&self) {
        self.shared
            .voice
            .store(self.playing, self.start, self.end, self.cursor);
        self.shared.applied.store(self.applied, Ordering::Release);
    }
}

impl SampleSource for PlaybackVoice {
    fn next_sample(&mut self) -> f32 {
        self.step()
    }

    fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.step();
        }
        self.publish();
    }
}
