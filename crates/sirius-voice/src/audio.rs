//! Audio input: chunk type, WAV helpers and (feature `capture`) microphone capture via CPAL.

use crate::error::{VoiceError, VoiceResult};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// A block of mono samples from the capture source.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Audio samples (f32, normalized to -1.0 to 1.0)
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len() as u64, self.sample_rate)
    }
}

/// Exact duration of `samples` at `sample_rate`, to the nanosecond.
pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = samples as u128 * 1_000_000_000 / sample_rate as u128;
    Duration::from_nanos(nanos as u64)
}

/// Number of samples covering `ms` milliseconds.
pub fn ms_to_samples(ms: u64, sample_rate: u32) -> u64 {
    ms * sample_rate as u64 / 1000
}

/// Encode mono f32 PCM as 16-bit WAV bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> VoiceResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * 32767.0).round() as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Read a WAV file as mono f32 and split it into `chunk_ms` chunks, for replaying
/// recorded audio through the pipeline.
pub fn wav_chunks(path: impl AsRef<Path>, chunk_ms: u64) -> VoiceResult<Vec<AudioChunk>> {
    let mut reader = hound::WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    let per_chunk = ms_to_samples(chunk_ms, spec.sample_rate).max(1) as usize;
    if mono.is_empty() {
        return Err(VoiceError::AudioStream(format!(
            "{} contains no samples",
            path.as_ref().display()
        )));
    }
    info!(
        "📼 Loaded {} ({} Hz, {} ch, {:.1}s)",
        path.as_ref().display(),
        spec.sample_rate,
        spec.channels,
        mono.len() as f32 / spec.sample_rate as f32
    );
    Ok(mono
        .chunks(per_chunk)
        .map(|c| AudioChunk::new(c.to_vec(), spec.sample_rate))
        .collect())
}

#[cfg(feature = "capture")]
pub use capture::{AudioCapture, AudioConfig};

#[cfg(feature = "capture")]
mod capture {
    use super::AudioChunk;
    use crate::error::{VoiceError, VoiceResult};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Device, Stream, StreamConfig};
    use tokio::sync::mpsc;
    use tracing::{info, warn};

    /// Audio configuration
    #[derive(Debug, Clone)]
    pub struct AudioConfig {
        /// Sample rate in Hz (default: 16000)
        pub sample_rate: u32,

        /// Number of channels delivered by the device (default: 1); mixed down to mono.
        pub channels: u16,

        /// Samples per chunk (default: 1600 for 100ms at 16kHz)
        pub buffer_size: usize,
    }

    impl Default for AudioConfig {
        fn default() -> Self {
            Self {
                sample_rate: 16000,
                channels: 1,
                buffer_size: 1600,
            }
        }
    }

    /// Microphone capture using CPAL
    pub struct AudioCapture {
        config: AudioConfig,
        device: Device,
        stream_config: StreamConfig,
    }

    impl AudioCapture {
        pub fn new(config: AudioConfig) -> VoiceResult<Self> {
            info!(
                "🎤 Initializing audio capture ({}Hz, {} channels)",
                config.sample_rate, config.channels
            );

            let device = cpal::default_host()
                .default_input_device()
                .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;

            info!(
                "📱 Using input device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );

            let default_config = device.default_input_config()?;
            info!("🔧 Default config: {:?}", default_config);

            let stream_config = StreamConfig {
                channels: config.channels,
                sample_rate: cpal::SampleRate(config.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            Ok(Self {
                config,
                device,
                stream_config,
            })
        }

        /// Start capturing and send mono chunks to `chunk_tx`. Keep the returned stream
        /// alive; dropping it stops capture and closes the channel.
        pub fn start_capture(self, chunk_tx: mpsc::UnboundedSender<AudioChunk>) -> VoiceResult<Stream> {
            info!("▶️ Starting audio capture stream");

            let buffer_size = self.config.buffer_size.max(1);
            let channels = self.config.channels.max(1) as usize;
            let sample_rate = self.config.sample_rate;
            let mut sample_buffer = Vec::with_capacity(buffer_size);

            let stream = self.device.build_input_stream(
                &self.stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels) {
                        sample_buffer.push(frame.iter().sum::<f32>() / frame.len() as f32);

                        if sample_buffer.len() >= buffer_size {
                            let chunk = AudioChunk::new(std::mem::take(&mut sample_buffer), sample_rate);
                            if let Err(e) = chunk_tx.send(chunk) {
                                warn!("Failed to send audio chunk: {}", e);
                            }
                            sample_buffer.reserve(buffer_size);
                        }
                    }
                },
                move |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )?;

            stream.play()?;
            info!("✅ Audio capture started");
            Ok(stream)
        }

        pub fn list_input_devices() -> VoiceResult<Vec<String>> {
            let devices = cpal::default_host().input_devices()?;
            Ok(devices.filter_map(|d| d.name().ok()).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_duration_is_exact() {
        let chunk = AudioChunk::new(vec![0.0; 1600], 16000);
        assert_eq!(chunk.duration(), Duration::from_millis(100));
        assert_eq!(samples_to_duration(1, 0), Duration::ZERO);
        assert_eq!(ms_to_samples(1500, 16000), 24000);
    }

    #[test]
    fn encoded_wav_reads_back() {
        let samples: Vec<f32> = (0..160).map(|i| (i as f32 / 160.0) - 0.5).collect();
        let bytes = encode_wav(&samples, 16000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.len(), 160);
    }

    #[test]
    fn wav_file_is_chunked_as_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..3200 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let chunks = wav_chunks(&path, 100).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].samples.len(), 1600);
        assert!((chunks[0].samples[0] - 0.25).abs() < 1e-4);
    }
}
