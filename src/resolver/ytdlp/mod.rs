//! yt-dlp integration
//!
//! Runs the `yt-dlp` executable as a child process and reads its JSON
//! output (`-J`). One process per lookup, bounded by a worker semaphore.
//!
//! Project: https://github.com/yt-dlp/yt-dlp

pub mod dto;
mod adapter;
mod client;

pub use adapter::{stream_url, to_media_info, to_media_list};
pub use client::YtDlpClient;
