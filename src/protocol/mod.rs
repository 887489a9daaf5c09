//! Wire protocols spoken by a RAOP sender

#![allow(missing_docs)]

pub mod crypto;
pub mod raop;
pub mod rtp;
pub mod rtsp;
pub mod sdp;
