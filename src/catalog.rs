use crate::sequence::ChordEvent;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Song identifiers come back as numbers or strings depending on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SongId {
    Number(i64),
    Text(String),
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SongId::Number(n) => write!(f, "{}", n),
            SongId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Song {
    #[serde(alias = "song_id")]
    pub id: SongId,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default, alias = "author")]
    pub artist: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub img: Option<String>,
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)?;
        if !self.artist.is_empty() {
            write!(f, " by {}", self.artist)?;
        }
        match (&self.difficulty, &self.time) {
            (Some(difficulty), Some(time)) => write!(f, " ({}, {})", difficulty, time),
            (Some(detail), None) | (None, Some(detail)) => write!(f, " ({})", detail),
            (None, None) => Ok(()),
        }
    }
}

// Some catalog deployments answer `/songs` with a bare object when only one
// song exists.
#[derive(Deserialize)]
#[serde(untagged)]
enum SongList {
    Many(Vec<Song>),
    One(Song),
}

impl From<SongList> for Vec<Song> {
    fn from(list: SongList) -> Self {
        match list {
            SongList::Many(songs) => songs,
            SongList::One(song) => vec![song],
        }
    }
}

/// Client for the Song Catalog service.
pub struct SongCatalog {
    client: Client,
    base_url: String,
}

impl SongCatalog {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build catalog HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn list_songs(&self) -> Result<Vec<Song>> {
        let list: SongList = self.get_json(&format!("{}/songs", self.base_url)).await?;
        Ok(list.into())
    }

    /// Fetch a song's ordered chord sequence.
    pub async fn chords(&self, id: &SongId) -> Result<Vec<ChordEvent>> {
        self.get_json(&format!("{}/chords/{}", self.base_url, id))
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Catalog request failed: {}", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("Catalog returned HTTP {} for {}", status, url));
        }

        response
            .json()
            .await
            .with_context(|| format!("Unexpected catalog response from {}", url))
    }
}
