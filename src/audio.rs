use anyhow::{bail, Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// A loaded audio file: the encoded bytes as picked (uploaded as-is to the
/// analysis service) plus the decoded PCM used for playback and the waveform.
#[derive(Clone)]
pub struct AudioSource {
    pub name: String,
    pub encoded: Arc<[u8]>,
    pub samples: Vec<f32>, // Interleaved
    pub sample_rate: u32,
    pub channels: u16,
    pub title: Option<String>,
    pub artist: Option<String>,
}

impl AudioSource {
    /// Wraps already decoded PCM. `encoded` is left empty.
    pub fn from_pcm(name: impl Into<String>, samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            name: name.into(),
            encoded: Arc::from(Vec::new()),
            samples,
            sample_rate,
            channels,
            title: None,
            artist: None,
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds; zero until something decodable was loaded.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Interleaved sample index of the frame at `secs`, clamped to the source.
    pub fn sample_index(&self, secs: f64) -> usize {
        let frame = (secs.max(0.0) * self.sample_rate as f64) as usize;
        frame.min(self.frames()) * self.channels as usize
    }

    /// File extension of the original name, used as a format hint and
    /// upload file name suffix.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name).extension().and_then(|ext| ext.to_str())
    }
}

impl std::fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSource")
            .field("name", &self.name)
            .field("encoded_bytes", &self.encoded.len())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs())
            .finish()
    }
}

fn decode(name: String, encoded: Arc<[u8]>, hint: &Hint) -> Result<AudioSource> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(encoded.clone())), Default::default());

    let mut probed = symphonia::default::get_probe()
        .format(hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("unsupported format")?;

    let mut title = None;
    let mut artist = None;
    if let Some(metadata) = probed.format.metadata().current() {
        for tag in metadata.tags() {
            match tag.std_key {
                Some(StandardTagKey::TrackTitle) => title = Some(tag.value.to_string()),
                Some(StandardTagKey::Artist) => artist = Some(tag.value.to_string()),
                _ => (),
            }
        }
    }

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("no supported audio track")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("unsupported codec")?;

    let track_id = track.id;
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = 0;
    let mut channels = 0;
    let mut buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream surfaces as an IO error
            Err(Error::IoError(_)) => break,
            Err(e) => {
                log::warn!("stopping decode of {name}: {e}");
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if buffer.is_none() {
                    let spec = *decoded.spec();
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u16;
                    buffer = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                if let Some(buf) = buffer.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(Error::DecodeError(e)) => log::debug!("skipping corrupt packet in {name}: {e}"),
            Err(e) => {
                log::warn!("decoder gave up on {name}: {e}");
                break;
            }
        }
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        bail!("no audio could be decoded from {name}");
    }

    let source = AudioSource {
        name,
        encoded,
        samples,
        sample_rate,
        channels,
        title,
        artist,
    };
    log::info!("decoded {:?}", source);
    Ok(source)
}

pub fn load_audio_file<P: AsRef<Path>>(path: P) -> Result<AudioSource> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to open audio file {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "audio".to_string());
    load_audio_from_bytes(name, bytes)
}

pub fn load_audio_from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<AudioSource> {
    let name = name.into();
    let mut hint = Hint::new();
    if let Some(ext) = Path::new(&name).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    decode(name, Arc::from(data), &hint)
}
