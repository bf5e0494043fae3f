//! Audio I/O and whole-track processing

pub mod buffer;
pub mod decoder;
pub mod ffmpeg;
pub mod mix;
pub mod pitch_shift;
pub mod resampler;
pub mod wav;

pub use buffer::AudioBuffer;
pub use decoder::{decode_audio_file, decode_mono};
pub use resampler::Resampler;
