//! Frame-level encoding and decoding over a [`Transport`](crate::Transport).

mod buffer;
mod framed;

pub use buffer::StreamBuffer;
pub use framed::FrameCodec;
