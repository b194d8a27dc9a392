//! Audio capture module
//!
//! Input devices, and the framing of their raw data into fixed-size buffers.

mod device;
mod framer;
mod microphone;
mod synthetic;

pub use device::{InputDevice, InputFormat, InputTap, RawDataCallback, SampleFormat};
pub use framer::FrameAssembler;
pub use microphone::{AudioConfig, MicrophoneError, MicrophoneInput};
pub use synthetic::{FrameGenerator, SyntheticInput};
