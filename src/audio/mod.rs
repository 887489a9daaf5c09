//! Audio staging between the host callback and the network task

mod buffer;
mod encoder;


pub use buffer::StreamBuffer;
pub use encoder::{AudioEncoder, EncoderFormat};
