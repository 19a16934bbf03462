//! Track Decoding
//!
//! Opens an audio file with symphonia and produces interleaved stereo `f32`
//! frames at the track's own sample rate. Mono sources are duplicated to both
//! channels; sources with more than two channels keep the first two.

use std::fmt;
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// An opened track positioned at its start
pub struct TrackDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    time_base: Option<TimeBase>,
    duration: Option<f64>,
    sample_buf: Option<SampleBuffer<f32>>,
    /// Frames still to discard after an accurate seek
    skip_frames: usize,
}

impl TrackDecoder {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint with the file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| EngineError::DecodeError(e.to_string()))?;

        let format = probed.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| EngineError::DecodeError("No audio track found".into()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| EngineError::DecodeError("Unknown sample rate".into()))?;
        let time_base = track.codec_params.time_base;
        let duration = track
            .codec_params
            .n_frames
            .map(|frames| frames as f64 / sample_rate as f64);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| EngineError::DecodeError(e.to_string()))?;

        debug!(
            "Opened {} ({} Hz, duration {:?})",
            path.display(),
            sample_rate,
            duration
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            time_base,
            duration,
            sample_buf: None,
            skip_frames: 0,
        })
    }

    /// Native sample rate of the track
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in seconds, if the container declares it
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Decode the next packet and append its frames to `out` as stereo
    ///
    /// Returns `Ok(false)` at the end of the stream. Corrupt packets are
    /// skipped.
    pub fn decode_next(&mut self, out: &mut Vec<f32>) -> EngineResult<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(EngineError::DecodeError(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => return Err(EngineError::DecodeError(e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);

            // Reallocate only when a packet is larger than any seen so far
            let too_small = self
                .sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < decoded.capacity() * channels);
            if too_small {
                self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }

            if let Some(buf) = self.sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);

                // Drop the frames between the packet start and a seek target
                let samples = buf.samples();
                let skip = (self.skip_frames * channels).min(samples.len());
                self.skip_frames -= skip / channels;
                append_stereo(&samples[skip..], channels, out);
            }
            return Ok(true);
        }
    }

    /// Jump to `seconds`; returns the position actually reached
    pub fn seek(&mut self, seconds: f64) -> EngineResult<f64> {
        let seconds = seconds.max(0.0);
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(seconds),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| EngineError::DecodeError(e.to_string()))?;
        self.decoder.reset();

        let skipped = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.skip_frames = (self.ts_to_seconds(skipped) * self.sample_rate as f64).round() as usize;
        Ok(self.ts_to_seconds(seeked.required_ts))
    }

    fn ts_to_seconds(&self, ts: u64) -> f64 {
        match self.time_base {
            Some(time_base) => {
                let time = time_base.calc_time(ts);
                time.seconds as f64 + time.frac
            }
            None => ts as f64 / self.sample_rate as f64,
        }
    }
}

impl fmt::Debug for TrackDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackDecoder")
            .field("track_id", &self.track_id)
            .field("sample_rate", &self.sample_rate)
            .field("duration", &self.duration)
            .finish()
    }
}

/// Fold interleaved `channels`-wide samples into stereo
fn append_stereo(samples: &[f32], channels: usize, out: &mut Vec<f32>) {
    match channels {
        1 => out.extend(samples.iter().flat_map(|&s| [s, s])),
        2 => out.extend_from_slice(samples),
        _ => out.extend(
            samples
                .chunks_exact(channels)
                .flat_map(|frame| [frame[0], frame[1]]),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file() {
        let err = TrackDecoder::open(Path::new("/nonexistent/track.wav")).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn test_append_stereo_duplicates_mono() {
        let mut out = Vec::new();
        append_stereo(&[0.25, -0.5], 1, &mut out);
        assert_eq!(out, vec![0.25, 0.25, -0.5, -0.5]);
    }

    #[test]
    fn test_append_stereo_drops_extra_channels() {
        let mut out = Vec::new();
        append_stereo(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, &mut out);
        assert_eq!(out, vec![1.0, 2.0, 4.0, 5.0]);
    }
}
