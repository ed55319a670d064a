//! Durability layer for kvindex
//!
//! This crate implements the command log codec:
//! - Frame encoding/decoding with CRC32 checksums
//! - `write_command`/`read_command` for buffered index mutations
//!
//! The host's transaction log decides when frames are written and replayed;
//! this crate only knows how a single command is laid out.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command_log;
pub mod encoding;

pub use command_log::{read_command, write_command, CommandLogReader};
pub use encoding::{decode_frame, encode_frame, FrameRead, FRAME_HEADER_SIZE, MAX_FRAME_LEN};
