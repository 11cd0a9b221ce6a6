//! Audio spec declaration and the PCM16/WAV codec.
//!
//! This module never resamples and never mixes; it only validates a
//! requested spec against the whitelist and frames raw PCM16 bytes with an
//! optional WAV header. Resampling, if ever added, belongs in an explicit
//! configured stage per spec — never here.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Sample rates the gateway will negotiate. The engine's native rate must
/// match one of these exactly; there is no implicit resampling.
pub const SAMPLE_RATE_WHITELIST: &[u32] = &[16_000, 22_050, 24_000, 48_000];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    Pcm16Raw,
    Pcm16Wav,
}

impl AudioEncoding {
    pub fn wants_wav_header(self) -> bool {
        matches!(self, AudioEncoding::Pcm16Wav)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Mono,
    Stereo,
}

impl Channels {
    pub fn count(self) -> u8 {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }
}

impl TryFrom<u8> for Channels {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Channels::Mono),
            2 => Ok(Channels::Stereo),
            other => Err(CoreError::UnsupportedChannels(other)),
        }
    }
}

impl Serialize for Channels {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.count())
    }
}

impl<'de> Deserialize<'de> for Channels {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u8::deserialize(deserializer)?;
        Channels::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// A fully-resolved audio format: the rate, channel count and container
/// that chunks for a session will be framed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: Channels,
    pub encoding: AudioEncoding,
}

impl AudioSpec {
    pub fn new(sample_rate: u32, channels: Channels, encoding: AudioEncoding) -> CoreResult<Self> {
        if !SAMPLE_RATE_WHITELIST.contains(&sample_rate) {
            return Err(CoreError::UnsupportedSampleRate(
                sample_rate,
                SAMPLE_RATE_WHITELIST,
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
            encoding,
        })
    }

    /// Bytes per PCM16 frame (one sample per channel).
    pub fn frame_bytes(&self) -> usize {
        self.channels.count() as usize * 2
    }

    /// Bytes making up `millis` milliseconds of audio at this spec, rounded
    /// down to a whole frame.
    pub fn bytes_for_millis(&self, millis: u32) -> usize {
        let bytes_per_sec = self.sample_rate as usize * self.frame_bytes();
        let raw = bytes_per_sec * millis as usize / 1000;
        raw - (raw % self.frame_bytes())
    }

    /// Builds a 44-byte canonical WAV header. `data_len` is `None` for a
    /// streaming response whose total length isn't known yet, in which case
    /// the `data` chunk length (and the `RIFF` length) are written as the
    /// sentinel `0xFFFFFFFF` per spec §4.4.
    pub fn wav_header(&self, data_len: Option<u32>) -> [u8; 44] {
        let mut header = [0u8; 44];
        let channels = self.channels.count() as u16;
        let bits_per_sample: u16 = 16;
        let byte_rate = self.sample_rate * self.frame_bytes() as u32;
        let block_align = self.frame_bytes() as u16;
        let data_len = data_len.unwrap_or(u32::MAX);
        let riff_len = data_len.checked_add(36).unwrap_or(u32::MAX);

        header[0..4].copy_from_slice(b"RIFF");
        header[4..8].copy_from_slice(&riff_len.to_le_bytes());
        header[8..12].copy_from_slice(b"WAVE");
        header[12..16].copy_from_slice(b"fmt ");
        header[16..20].copy_from_slice(&16u32.to_le_bytes());
        header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
        header[22..24].copy_from_slice(&channels.to_le_bytes());
        header[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
        header[32..34].copy_from_slice(&block_align.to_le_bytes());
        header[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());
        header[36..40].copy_from_slice(b"data");
        header[40..44].copy_from_slice(&data_len.to_le_bytes());
        header
    }
}

/// Packs PCM16 samples into little-endian bytes.
pub fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Unpacks little-endian PCM16 bytes into samples. Grounded on the
/// cross-chunk carry idiom used to decode streamed PCM, inverted here for
/// a single contiguous buffer.
pub fn le_bytes_to_samples(bytes: &[u8], channels: u8) -> CoreResult<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(CoreError::MisalignedPcm(bytes.len(), channels));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unlisted_sample_rate() {
        let err = AudioSpec::new(8000, Channels::Mono, AudioEncoding::Pcm16Raw).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedSampleRate(8000, _)));
    }

    #[test]
    fn wav_header_sentinel_when_streaming() {
        let spec = AudioSpec::new(16_000, Channels::Mono, AudioEncoding::Pcm16Wav).unwrap();
        let header = spec.wav_header(None);
        assert_eq!(&header[40..44], &u32::MAX.to_le_bytes());
        assert_eq!(&header[0..4], b"RIFF");
    }

    #[test]
    fn round_trips_pcm16() {
        let samples: Vec<i16> = vec![0, 1, -1, i16::MAX, i16::MIN];
        let bytes = samples_to_le_bytes(&samples);
        let back = le_bytes_to_samples(&bytes, 1).unwrap();
        assert_eq!(samples, back);
    }

    #[test]
    fn bytes_for_millis_rounds_to_frame() {
        let spec = AudioSpec::new(16_000, Channels::Mono, AudioEncoding::Pcm16Raw).unwrap();
        // 20ms @ 16kHz mono 16-bit = 16000 * 2 * 20 / 1000 = 640 bytes, already frame-aligned.
        assert_eq!(spec.bytes_for_millis(20), 640);
    }
}
