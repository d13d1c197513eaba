//! Adapter layer: Convert Spotify DTOs to CatalogTrack
//!
//! This is the ONLY place where Spotify DTO types are converted to catalog types.

use super::dto;
use crate::catalog::CatalogTrack;

fn artist_names(artists: &[dto::Artist]) -> Vec<String> {
    artists.iter().map(|a| a.name.clone()).collect()
}

/// First image is the largest one.
fn cover(images: &[dto::Image]) -> Option<String> {
    images.first().map(|i| i.url.clone())
}

/// Convert a full track.
pub fn track(track: &dto::Track) -> CatalogTrack {
    CatalogTrack {
        title: track.name.clone(),
        artists: artist_names(&track.artists),
        album: track.album.as_ref().map(|a| a.name.clone()),
        duration_ms: track.duration_ms,
        external_url: track.external_urls.spotify.clone(),
        thumbnail: track.album.as_ref().and_then(|a| cover(&a.images)),
    }
}

/// Convert album tracks, which inherit the album's name and cover.
pub fn album_tracks(album: &dto::Album, items: &[dto::SimplifiedTrack]) -> Vec<CatalogTrack> {
    let thumbnail = cover(&album.images);
    items
        .iter()
        .map(|t| CatalogTrack {
            title: t.name.clone(),
            artists: artist_names(&t.artists),
            album: Some(album.name.clone()),
            duration_ms: t.duration_ms,
            external_url: t.external_urls.spotify.clone(),
            thumbnail: thumbnail.clone(),
        })
        .collect()
}

/// Convert playlist items, skipping removed (null) tracks.
pub fn playlist_tracks(items: &[dto::PlaylistItem]) -> Vec<CatalogTrack> {
    items
        .iter()
        .filter_map(|item| item.track.as_ref())
        .map(track)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_conversion() {
        let dto: dto::Track = serde_json::from_str(
            r#"{
                "name": "Get Lucky",
                "artists": [{"name": "Daft Punk"}, {"name": "Pharrell Williams"}],
                "album": {"name": "Random Access Memories",
                          "images": [{"url": "big", "width": 640, "height": 640},
                                     {"url": "small", "width": 64, "height": 64}]},
                "duration_ms": 369626,
                "external_urls": {"spotify": "https://open.spotify.com/track/abc"}
            }"#,
        )
        .unwrap();

        let t = track(&dto);
        assert_eq!(t.title, "Get Lucky");
        assert_eq!(t.artists, vec!["Daft Punk", "Pharrell Williams"]);
        assert_eq!(t.album.as_deref(), Some("Random Access Memories"));
        assert_eq!(t.thumbnail.as_deref(), Some("big"));
        assert_eq!(t.external_url.as_deref(), Some("https://open.spotify.com/track/abc"));
    }

    #[test]
    fn test_album_tracks_inherit_cover() {
        let album: dto::Album = serde_json::from_str(
            r#"{
                "name": "Discovery",
                "images": [{"url": "cover"}],
                "tracks": {"items": [
                    {"name": "One More Time", "artists": [{"name": "Daft Punk"}], "duration_ms": 320000},
                    {"name": "Aerodynamic", "artists": [{"name": "Daft Punk"}], "duration_ms": 212000}
                ], "next": null}
            }"#,
        )
        .unwrap();

        let tracks = album_tracks(&album, &album.tracks.items);
        assert_eq!(tracks.len(), 2);
        assert!(tracks.iter().all(|t| t.thumbnail.as_deref() == Some("cover")));
        assert!(tracks.iter().all(|t| t.album.as_deref() == Some("Discovery")));
    }

    #[test]
    fn test_playlist_skips_null_tracks() {
        let page: dto::Page<dto::PlaylistItem> = serde_json::from_str(
            r#"{
                "items": [
                    {"track": {"name": "A", "artists": [], "duration_ms": 1000}},
                    {"track": null}
                ],
                "next": "https://api.spotify.com/v1/playlists/x/tracks?offset=100"
            }"#,
        )
        .unwrap();

        let tracks = playlist_tracks(&page.items);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "A");
        assert!(page.next.is_some());
    }
}
