//! Audio subsystem
//!
//! Decoding, synthesis, and the output streams the scheduler drives.

pub mod buffer;
pub mod decoder;
pub mod output;
pub mod simulated;
pub mod stream;
pub mod tone;
pub mod types;

pub use buffer::{FillStatus, FrameCursor};
pub use decoder::{is_supported_audio_file, AudioDecoder, SymphoniaDecoder};
pub use output::{CpalBackend, CpalCatalog};
pub use simulated::{ActivityRecorder, SimulatedBackend, StreamActivity};
pub use stream::{EndOfStream, EndOfStreamWait, OutputBackend, PlaybackStream};
pub use tone::TestTone;
pub use types::{SampleBuffer, StreamState};
