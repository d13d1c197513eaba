//! Spotify Web API integration
//!
//! Fetches track, album and playlist metadata with an app-only
//! (client-credentials) token.
//!
//! API docs: https://developer.spotify.com/documentation/web-api

pub mod dto;
mod adapter;
mod client;

pub use adapter::{album_tracks, playlist_tracks, track};
pub use client::SpotifyClient;
