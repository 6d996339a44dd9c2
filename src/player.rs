use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

use crate::audio::AudioSource;

/// Transport used by the selection controller. Holds at most one bound
/// source; `release` drops it.
pub trait Playback {
    fn bind(&mut self, source: Arc<AudioSource>);
    /// Plays `[start, end)` seconds of the bound source once.
    fn play_range(&mut self, start: f64, end: f64);
    /// Pauses if playing, otherwise resumes (or starts at the cursor).
    fn toggle(&mut self);
    fn seek(&mut self, at: f64);
    fn release(&mut self);
    fn is_playing(&self) -> bool;
}

/// Plays a slice of an [`AudioSource`], frame aligned.
pub struct RegionSource {
    data: Arc<AudioSource>,
    cursor: usize,
    end: usize,
}

impl RegionSource {
    /// `end` of `None` plays to the end of the source.
    pub fn new(data: Arc<AudioSource>, start: f64, end: Option<f64>) -> Self {
        let cursor = data.sample_index(start);
        let end = end
            .map(|e| data.sample_index(e))
            .unwrap_or(data.samples.len())
            .max(cursor);
        Self { data, cursor, end }
    }
}

impl Iterator for RegionSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let sample = self.data.samples[self.cursor];
        self.cursor += 1;
        Some(sample)
    }
}

impl Source for RegionSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.end - self.cursor)
    }

    fn channels(&self) -> u16 {
        self.data.channels
    }

    fn sample_rate(&self) -> u32 {
        self.data.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        let frames = (self.end - self.cursor) / self.data.channels.max(1) as usize;
        Some(Duration::from_secs_f64(frames as f64 / self.data.sample_rate.max(1) as f64))
    }
}

/// Playback through the default output device.
pub struct RodioPlayback {
    _stream: OutputStream,
    _handle: OutputStreamHandle,
    sink: Sink,
    source: Option<Arc<AudioSource>>,
    cursor: f64,
}

impl RodioPlayback {
    pub fn try_default() -> Result<Self> {
        let (stream, handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&handle)?;
        Ok(Self {
            _stream: stream,
            _handle: handle,
            sink,
            source: None,
            cursor: 0.0,
        })
    }

    fn start(&mut self, start: f64, end: Option<f64>) {
        let Some(source) = &self.source else { return };
        self.sink.stop();
        self.sink.append(RegionSource::new(source.clone(), start, end));
        self.sink.play();
    }
}

impl Playback for RodioPlayback {
    fn bind(&mut self, source: Arc<AudioSource>) {
        self.release();
        self.source = Some(source);
    }

    fn play_range(&mut self, start: f64, end: f64) {
        self.cursor = start;
        self.start(start, Some(end));
    }

    fn toggle(&mut self) {
        if self.sink.empty() {
            self.start(self.cursor, None);
        } else if self.sink.is_paused() {
            self.sink.play();
        } else {
            self.sink.pause();
        }
    }

    fn seek(&mut self, at: f64) {
        let was_playing = self.is_playing();
        self.cursor = at.max(0.0);
        if was_playing {
            self.start(self.cursor, None);
        } else {
            self.sink.stop();
        }
    }

    fn release(&mut self) {
        self.sink.stop();
        self.source = None;
        self.cursor = 0.0;
    }

    fn is_playing(&self) -> bool {
        !self.sink.empty() && !self.sink.is_paused()
    }
}

/// Playback that only tracks what it was asked to do. Used headless and when
/// no output device is available.
#[derive(Default)]
pub struct SilentPlayback {
    bound: bool,
    playing: bool,
}

impl Playback for SilentPlayback {
    fn bind(&mut self, _source: Arc<AudioSource>) {
        self.bound = true;
        self.playing = false;
    }

    fn play_range(&mut self, _start: f64, _end: f64) {
        self.playing = self.bound;
    }

    fn toggle(&mut self) {
        self.playing = self.bound && !self.playing;
    }

    fn seek(&mut self, _at: f64) {}

    fn release(&mut self) {
        self.bound = false;
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}
