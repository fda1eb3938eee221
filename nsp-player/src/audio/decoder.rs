//! Audio decoder using symphonia
//!
//! Decodes a whole file (WAV, FLAC, MP3, AAC, Vorbis) into an in-memory
//! [`SampleBuffer`] at its native sample rate. Nothing is resampled; the
//! session decides what to do when the file rate differs from the output rate.

use crate::audio::SampleBuffer;
use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer as InterleavedBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// File extensions offered by the library browser
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "flac", "mp3", "ogg", "m4a", "aac"];

/// True when `path` has an extension the decoder is expected to handle.
pub fn is_supported_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decodes audio files into sample buffers.
pub trait AudioDecoder: Send + Sync {
    /// Decode `path` completely.
    ///
    /// # Errors
    /// `Error::Decode` when the file is missing, unsupported, or holds no audio.
    fn decode(&self, path: &Path) -> Result<SampleBuffer>;
}

/// Symphonia-backed decoder
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<SampleBuffer> {
        debug!("Decoding entire file: {}", path.display());

        let decode_error = |reason: String| Error::Decode {
            path: path.to_path_buf(),
            reason,
        };

        let file = std::fs::File::open(path).map_err(|e| decode_error(format!("cannot open: {}", e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| decode_error(format!("unsupported format: {}", e)))?;

        let mut format = probed.format;

        // Get the default audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| decode_error("no audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| decode_error("sample rate not found".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| decode_error(format!("failed to create decoder: {}", e)))?;

        let mut samples: Vec<f32> = Vec::new();
        let mut channels: Option<u16> = codec_params.channels.map(|c| c.count() as u16);
        let mut interleaved: Option<InterleavedBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(e) => {
                    end_of_packets(e, path).map_err(decode_error)?;
                    break;
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    channels.get_or_insert(spec.channels.count() as u16);

                    let frames = decoded.capacity();
                    let needed = frames * spec.channels.count();
                    if interleaved.as_ref().map_or(true, |buf| buf.capacity() < needed) {
                        interleaved = Some(InterleavedBuffer::<f32>::new(frames as u64, spec));
                    }
                    if let Some(buf) = interleaved.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        samples.extend_from_slice(buf.samples());
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packet: skip it, keep going
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => return Err(decode_error(format!("decoder failure: {}", e))),
            }
        }

        let channels = channels.ok_or_else(|| decode_error("channel count not found".to_string()))?;
        if samples.is_empty() {
            return Err(decode_error("file contains no audio frames".to_string()));
        }

        debug!(
            "Decoded {} frames: sample_rate={}, channels={}",
            samples.len() / channels.max(1) as usize,
            sample_rate,
            channels
        );

        SampleBuffer::new(samples, channels, sample_rate).map_err(|e| decode_error(e.to_string()))
    }
}

/// Classify the error that ended packet reading: the end of the file (or a
/// stream reset, which this decoder does not follow) finishes decoding, any
/// other read error fails the whole file.
fn end_of_packets(err: SymphoniaError, path: &Path) -> std::result::Result<(), String> {
    match err {
        SymphoniaError::IoError(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            debug!("Reached end of file");
            Ok(())
        }
        SymphoniaError::ResetRequired => {
            warn!("Stream reset required in {}, stopping decode", path.display());
            Ok(())
        }
        e => Err(format!("error reading packet: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_audio_file(Path::new("a/b/tone.wav")));
        assert!(is_supported_audio_file(Path::new("LOUD.MP3")));
        assert!(is_supported_audio_file(Path::new("x.flac")));
        assert!(!is_supported_audio_file(Path::new("notes.txt")));
        assert!(!is_supported_audio_file(Path::new("no_extension")));
    }

    #[test]
    fn test_packet_read_errors() {
        let path = Path::new("clip.wav");
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "end");
        assert!(end_of_packets(SymphoniaError::IoError(eof), path).is_ok());
        assert!(end_of_packets(SymphoniaError::ResetRequired, path).is_ok());

        let broken = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad chunk");
        let reason = end_of_packets(SymphoniaError::IoError(broken), path).unwrap_err();
        assert!(reason.contains("bad chunk"));
        assert!(end_of_packets(SymphoniaError::DecodeError("malformed"), path).is_err());
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let result = SymphoniaDecoder.decode(Path::new("/nonexistent/file.wav"));
        match result {
            Err(Error::Decode { path, .. }) => assert_eq!(path, Path::new("/nonexistent/file.wav")),
            other => panic!("Expected Decode error, got {:?}", other),
        }
    }
}
