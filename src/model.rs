use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub const POSTER_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";
pub const POSTER_PLACEHOLDER_URL: &str = "https://via.placeholder.com/500x750?text=No+Image";
pub const TRAILER_BASE_URL: &str = "https://www.youtube.com/watch?v=";

/// Identifier assigned by the record store.
///
/// json-server hands out numeric ids in older releases and string ids in newer
/// ones, so human-readable input accepts either. Binary encodings (the sled trees)
/// always carry the string form.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        if deserializer.is_human_readable() {
            Ok(match Raw::deserialize(deserializer)? {
                Raw::Text(s) => RecordId(s),
                Raw::Number(n) => RecordId(n.to_string()),
            })
        } else {
            String::deserialize(deserializer).map(RecordId)
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        RecordId(id.to_string())
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId(id.to_owned())
    }
}

/// Catalog and record-store payloads sometimes carry `null` ratings.
fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    if deserializer.is_human_readable() {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
    } else {
        f64::deserialize(deserializer)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: RecordId,
    pub username: String,
    pub email: String,
    /// bcrypt hash, never the submitted password.
    pub password: String,
    #[serde(default)]
    pub favorites: Vec<FavoriteEntry>,
}

impl User {
    pub fn has_favorite(&self, movie_id: u64) -> bool {
        self.favorites.iter().any(|fav| fav.id == movie_id)
    }
}

/// Body of `POST /users`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub favorites: Vec<FavoriteEntry>,
}

impl NewUser {
    pub fn with_id(self, id: RecordId) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password: self.password,
            favorites: self.favorites,
        }
    }
}

/// The user as shown to the browser.
#[derive(Serialize, Debug)]
pub struct Profile<'a> {
    pub id: &'a RecordId,
    pub username: &'a str,
    pub email: &'a str,
    pub favorites: &'a [FavoriteEntry],
}

impl<'a> From<&'a User> for Profile<'a> {
    fn from(user: &'a User) -> Self {
        Profile {
            id: &user.id,
            username: &user.username,
            email: &user.email,
            favorites: &user.favorites,
        }
    }
}

/// Snapshot of a catalog movie taken when it was favorited.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FavoriteEntry {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub vote_average: f64,
}

impl FavoriteEntry {
    pub fn poster_url(&self) -> String {
        poster_url(self.poster_path.as_deref())
    }

    pub fn release_year(&self) -> Option<&str> {
        release_year(self.release_date.as_deref())
    }
}

impl From<&MovieDetail> for FavoriteEntry {
    fn from(movie: &MovieDetail) -> Self {
        FavoriteEntry {
            id: movie.id,
            title: movie.title.clone(),
            poster_path: movie.poster_path.clone(),
            release_date: movie.release_date.clone(),
            vote_average: movie.vote_average,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SearchHistoryEntry {
    pub id: RecordId,
    pub query: String,
    pub genre: String,
    pub year: String,
    pub rating: String,
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /searches`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewSearch {
    pub query: String,
    pub genre: String,
    pub year: String,
    pub rating: String,
    pub timestamp: DateTime<Utc>,
}

impl NewSearch {
    pub fn with_id(self, id: RecordId) -> SearchHistoryEntry {
        SearchHistoryEntry {
            id,
            query: self.query,
            genre: self.genre,
            year: self.year,
            rating: self.rating,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MovieSummary {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub vote_average: f64,
    #[serde(default)]
    pub genre_ids: Vec<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MoviePage {
    pub page: u32,
    pub results: Vec<MovieSummary>,
    pub total_pages: u32,
    pub total_results: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Genre {
    pub id: u64,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MovieDetail {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub vote_average: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CastMember {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub profile_path: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Video {
    pub key: String,
    pub site: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Video {
    pub fn is_youtube_trailer(&self) -> bool {
        self.site == "YouTube" && self.kind == "Trailer"
    }
}

pub fn poster_url(poster_path: Option<&str>) -> String {
    match poster_path {
        Some(path) if !path.is_empty() => format!("{}{}", POSTER_BASE_URL, path),
        _ => POSTER_PLACEHOLDER_URL.to_owned(),
    }
}

pub fn release_year(release_date: Option<&str>) -> Option<&str> {
    release_date
        .and_then(|date| date.split('-').next())
        .filter(|year| !year.is_empty())
}
