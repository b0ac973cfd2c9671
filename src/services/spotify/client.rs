use super::{AccessToken, SavedTracksPage, SpotifyApi, TokenEndpoint, TokenGrant, SCOPES};
use crate::config::{Config, SpotifyCredentials};
use crate::error::{AppError, Result};
use crate::models::{AudioFeatures, CreatedPlaylist, Device, SpotifyProfile, Track};
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

const PLAYLIST_WEB_URL: &str = "https://open.spotify.com/playlist";

#[derive(Debug, Clone)]
pub struct SpotifyClient {
    api_url: String,
    accounts_url: String,
    credentials: SpotifyCredentials,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ApiProfile {
    id: String,
    display_name: Option<String>,
    email: Option<String>,
    followers: Option<ApiFollowers>,
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiFollowers {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    // null for local files
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    album: Option<ApiAlbum>,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    popularity: u32,
    uri: String,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SavedTracksBody {
    items: Option<Vec<SavedItem>>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SavedItem {
    track: Option<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct TrackList {
    items: Option<Vec<Option<ApiTrack>>>,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    tracks: Option<TrackList>,
}

#[derive(Debug, Deserialize)]
struct AudioFeaturesBody {
    audio_features: Option<Vec<Option<ApiAudioFeatures>>>,
}

#[derive(Debug, Deserialize)]
struct DevicesBody {
    devices: Option<Vec<Device>>,
}

#[derive(Debug, Deserialize)]
struct ApiAudioFeatures {
    id: String,
    valence: f32,
    energy: f32,
}

impl ApiTrack {
    fn into_track(self) -> Option<Track> {
        Some(Track {
            id: self.id?,
            name: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            album: self.album.map(|a| a.name).unwrap_or_default(),
            duration_ms: self.duration_ms,
            popularity: self.popularity,
            uri: self.uri,
        })
    }
}

impl SpotifyClient {
    pub fn new(config: &Config, credentials: SpotifyCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_url: config.spotify_api_url.trim_end_matches('/').to_string(),
            accounts_url: config.spotify_accounts_url.trim_end_matches('/').to_string(),
            credentials,
            client,
        })
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        request.send().await.map_err(|e| transport_error(what, e))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &AccessToken,
        url: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        let request = self.client.get(url).bearer_auth(token.secret()).query(query);
        let response = check_status(self.send(request, what).await?, what).await?;
        parse_body(response, what).await
    }

    async fn token_request(&self, form: &[(&str, &str)], what: &str) -> Result<Response> {
        let request = self
            .client
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(form);

        self.send(request, what).await
    }
}

#[async_trait]
impl TokenEndpoint for SpotifyClient {
    fn authorize_url(&self, state: &str) -> Result<String> {
        let scope = SCOPES.join(" ");
        let url = Url::parse_with_params(
            &format!("{}/authorize", self.accounts_url),
            &[
                ("client_id", self.credentials.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.credentials.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid accounts URL: {}", e)))?;

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let response = self
            .token_request(
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", &self.credentials.redirect_uri),
                ],
                "code exchange",
            )
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Spotify rejected authorization code: {}", truncate(&body));
            return Err(AppError::Validation(
                "Spotify authorization code was rejected or expired".to_string(),
            ));
        }

        let response = check_status(response, "code exchange").await?;
        let token: TokenResponse = parse_body(response, "code exchange").await?;
        Ok(token.into())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let response = self
            .token_request(
                &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
                "token refresh",
            )
            .await?;

        // invalid_grant: the refresh token was revoked or already rotated
        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        ) {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Spotify rejected refresh token: {}", truncate(&body));
            return Err(AppError::RefreshFailed);
        }

        let response = check_status(response, "token refresh").await?;
        let token: TokenResponse = parse_body(response, "token refresh").await?;
        Ok(token.into())
    }
}

impl From<TokenResponse> for TokenGrant {
    fn from(token: TokenResponse) -> Self {
        TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token.filter(|t| !t.is_empty()),
            expires_in: token.expires_in,
        }
    }
}

#[async_trait]
impl SpotifyApi for SpotifyClient {
    async fn current_user(&self, token: &AccessToken) -> Result<SpotifyProfile> {
        let url = format!("{}/me", self.api_url);
        let profile: ApiProfile = self.get_json(token, &url, &[], "profile").await?;

        Ok(SpotifyProfile {
            id: profile.id,
            display_name: profile.display_name,
            email: profile.email,
            followers: profile.followers.map(|f| f.total).unwrap_or(0),
            images: profile.images.into_iter().map(|i| i.url).collect(),
        })
    }

    async fn saved_tracks(
        &self,
        token: &AccessToken,
        limit: u32,
        offset: u32,
    ) -> Result<SavedTracksPage> {
        let url = format!("{}/me/tracks", self.api_url);
        let body: SavedTracksBody = self
            .get_json(
                token,
                &url,
                &[("limit", limit.to_string()), ("offset", offset.to_string())],
                "saved tracks",
            )
            .await?;

        let has_more = body.next.is_some();
        let (items, page_len) = match body.items {
            Some(entries) => {
                let page_len = entries.len();
                let tracks = entries
                    .into_iter()
                    .filter_map(|entry| entry.track.and_then(ApiTrack::into_track))
                    .collect();
                (Some(tracks), page_len)
            }
            None => (None, 0),
        };

        Ok(SavedTracksPage {
            items,
            page_len,
            has_more,
        })
    }

    async fn top_tracks(
        &self,
        token: &AccessToken,
        limit: u32,
        time_range: &str,
    ) -> Result<Vec<Track>> {
        let url = format!("{}/me/top/tracks", self.api_url);
        let body: TrackList = self
            .get_json(
                token,
                &url,
                &[("limit", limit.to_string()), ("time_range", time_range.to_string())],
                "top tracks",
            )
            .await?;

        into_tracks(body, "top tracks")
    }

    async fn search_tracks(
        &self,
        token: &AccessToken,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Track>> {
        let url = format!("{}/search", self.api_url);
        let body: SearchBody = self
            .get_json(
                token,
                &url,
                &[
                    ("q", query.to_string()),
                    ("type", "track".to_string()),
                    ("limit", limit.to_string()),
                ],
                "track search",
            )
            .await?;

        let tracks = body.tracks.ok_or_else(|| {
            AppError::UpstreamMalformed(format!("search for '{}' returned no tracks object", query))
        })?;
        into_tracks(tracks, "track search")
    }

    async fn audio_features(
        &self,
        token: &AccessToken,
        track_ids: &[String],
    ) -> Result<HashMap<String, AudioFeatures>> {
        if track_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/audio-features", self.api_url);
        let body: AudioFeaturesBody = self
            .get_json(token, &url, &[("ids", track_ids.join(","))], "audio features")
            .await?;

        let features = body.audio_features.ok_or_else(|| {
            AppError::UpstreamMalformed("audio features response had no feature list".to_string())
        })?;

        Ok(features
            .into_iter()
            .flatten()
            .map(|f| {
                (
                    f.id,
                    AudioFeatures {
                        valence: f.valence,
                        energy: f.energy,
                    },
                )
            })
            .collect())
    }

    async fn create_playlist(
        &self,
        token: &AccessToken,
        owner_id: &str,
        name: &str,
        description: &str,
    ) -> Result<CreatedPlaylist> {
        let body = json!({
            "name": name,
            "description": description,
            "public": false,
        });

        let current = self.client.post(format!("{}/me/playlists", self.api_url));
        let response = self
            .send(current.bearer_auth(token.secret()).json(&body), "playlist creation")
            .await?;

        // 404/405 means this call shape was refused outright and nothing was created,
        // so the owner-scoped form is safe to try.
        let response = if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
        ) {
            tracing::debug!(
                "Playlist endpoint answered {}, retrying with owner-scoped endpoint",
                response.status()
            );
            let legacy = self
                .client
                .post(format!("{}/users/{}/playlists", self.api_url, owner_id));
            self.send(legacy.bearer_auth(token.secret()).json(&body), "playlist creation")
                .await?
        } else {
            response
        };

        let response = check_status(response, "playlist creation").await?;
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|e| transport_error("playlist creation", e))?;

        normalize_created_playlist(&text, location.as_deref())
    }

    async fn add_tracks(
        &self,
        token: &AccessToken,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<()> {
        let url = format!("{}/playlists/{}/tracks", self.api_url, playlist_id);
        let request = self
            .client
            .post(url)
            .bearer_auth(token.secret())
            .json(&json!({ "uris": uris }));

        check_status(self.send(request, "add tracks").await?, "add tracks").await?;
        Ok(())
    }

    async fn devices(&self, token: &AccessToken) -> Result<Vec<Device>> {
        let url = format!("{}/me/player/devices", self.api_url);
        let body: DevicesBody = self.get_json(token, &url, &[], "devices").await?;

        body.devices
            .ok_or_else(|| AppError::UpstreamMalformed("devices response had no device list".to_string()))
    }

    async fn play(&self, token: &AccessToken, uri: &str, device_id: Option<&str>) -> Result<()> {
        let url = format!("{}/me/player/play", self.api_url);
        let mut request = self
            .client
            .put(url)
            .bearer_auth(token.secret())
            .json(&json!({ "uris": [uri] }));
        if let Some(device_id) = device_id {
            request = request.query(&[("device_id", device_id)]);
        }

        let response = self.send(request, "playback").await?;
        // NO_ACTIVE_DEVICE, or the requested device is gone
        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Spotify playback found no device: {}", truncate(&body));
            return Err(AppError::NotFound(
                "No active Spotify device. Open Spotify on a device and try again.".to_string(),
            ));
        }

        check_status(response, "playback").await?;
        Ok(())
    }
}

/// Collapses every playlist-creation response shape into one id + URL.
///
/// Accepts the playlist object directly, wrapped under `body` or `playlist`,
/// or an empty body with a `Location` header pointing at the new playlist.
pub(crate) fn normalize_created_playlist(body: &str, location: Option<&str>) -> Result<CreatedPlaylist> {
    let value: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body).map_err(|e| {
            AppError::UpstreamMalformed(format!(
                "playlist creation body is not JSON ({}): {}",
                e,
                truncate(body)
            ))
        })?
    };

    let object = ["body", "playlist"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find(|inner| inner.get("id").is_some())
        .unwrap_or(&value);

    let id = object
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| location.and_then(playlist_id_from_location))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            AppError::UpstreamMalformed(format!(
                "playlist creation response has no playlist id: {}",
                truncate(body)
            ))
        })?;

    let url = object
        .pointer("/external_urls/spotify")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}/{}", PLAYLIST_WEB_URL, id));

    Ok(CreatedPlaylist { id, url })
}

fn playlist_id_from_location(location: &str) -> Option<String> {
    let (_, rest) = location.split_once("/playlists/")?;
    let id = rest.split(['/', '?']).next()?;
    (!id.is_empty()).then(|| id.to_string())
}

fn into_tracks(list: TrackList, what: &str) -> Result<Vec<Track>> {
    let items = list
        .items
        .ok_or_else(|| AppError::UpstreamMalformed(format!("{} response had no item list", what)))?;

    Ok(items
        .into_iter()
        .flatten()
        .filter_map(ApiTrack::into_track)
        .collect())
}

/// Maps non-success statuses onto the upstream error taxonomy.
async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    tracing::error!("Spotify {} failed: {} - {}", what, status, truncate(&body));

    Err(match status {
        StatusCode::UNAUTHORIZED => AppError::UpstreamAuth,
        StatusCode::FORBIDDEN => AppError::UpstreamPermission,
        StatusCode::TOO_MANY_REQUESTS => AppError::UpstreamRateLimited { retry_after },
        _ => AppError::ExternalApi(format!("Spotify {} failed with status {}", what, status)),
    })
}

async fn parse_body<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(what, e))?;

    serde_json::from_str(&text).map_err(|e| {
        AppError::UpstreamMalformed(format!("{} response did not parse ({}): {}", what, e, truncate(&text)))
    })
}

fn transport_error(what: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::UpstreamTimeout(format!("{} timed out", what))
    } else {
        AppError::ExternalApi(format!("Spotify {} request failed: {}", what, e))
    }
}

fn truncate(text: &str) -> &str {
    let mut end = text.len().min(300);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
