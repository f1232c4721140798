//! Size-constrained re-encoding of animations into GIFs.
//!
//! This module knows nothing about Telegram. It takes a media file on disk
//! and a size budget and degrades the output quality step by step until the
//! result fits.

mod config;
mod encoder;
mod ffmpeg;
mod schedule;
mod transcoder;

pub(crate) use config::Config;
pub use encoder::*;
pub use ffmpeg::Ffmpeg;
pub use schedule::*;
pub use transcoder::*;
