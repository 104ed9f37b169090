//! # Audio Module
//!
//! Per-guild playback for the bot.
//!
//! ### [`queue`] - Queue
//! - Strict FIFO of unresolved requests
//!
//! ### [`player`] - Playback driver
//! - One active stream per guild, generation-tagged stream ends
//! - Pause/resume/stop/skip/volume on the active source
//!
//! ### [`session`] - Voice sessions
//! - Join/leave per guild; leaving clears the queue
//!
//! ### [`output`] - songbird backend
//! - Streams resolved tracks over HTTP into the voice connection

pub mod output;
pub mod player;
pub mod queue;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
