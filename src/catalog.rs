//! Read-only client for the movie catalog (TMDB v3 API).

use crate::error::{AppError, Result};
use crate::filter::MovieFilter;
use crate::model::*;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "catalog";
/// The catalog refuses to serve pages beyond this one.
pub const MAX_PAGES: u32 = 500;
pub const CAST_LIMIT: usize = 5;

pub struct CatalogClient {
    client: Client,
    base_url: String,
    api_key: String,
    language: String,
}

#[derive(Deserialize)]
struct GenreList {
    genres: Vec<Genre>,
}

#[derive(Deserialize)]
struct Credits {
    #[serde(default)]
    cast: Vec<CastMember>,
}

#[derive(Deserialize)]
struct Videos {
    #[serde(default)]
    results: Vec<Video>,
}

#[derive(Serialize, Debug)]
pub struct MovieDetails {
    pub movie: MovieDetail,
    pub cast: Vec<CastMember>,
    pub trailer_url: Option<String>,
}

impl CatalogClient {
    pub fn new(base_url: &str, api_key: &str, language: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::network(SERVICE, err))?;
        Ok(CatalogClient {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            language: language.to_owned(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("api_key", &self.api_key), ("language", &self.language)])
            .query(params)
            .send()
            .await
            .map_err(|err| AppError::network(SERVICE, err))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("Catalog resource {}", path)));
        }
        if !status.is_success() {
            debug!("{} {} answered {}", SERVICE, path, status);
            return Err(AppError::Server {
                service: SERVICE,
                status: status.as_u16(),
            });
        }
        response
            .json()
            .await
            .map_err(|err| AppError::network(SERVICE, err))
    }

    pub async fn trending(&self) -> Result<Vec<MovieSummary>> {
        let page: MoviePage = self.get("/trending/movie/week", &[]).await?;
        Ok(page.results)
    }

    pub async fn search(&self, query: &str, page: u32) -> Result<MoviePage> {
        let params = [("query", query.to_owned()), ("page", page.to_string())];
        self.get("/search/movie", &params).await.map(clamp_pages)
    }

    pub async fn discover(&self, filter: &MovieFilter, page: u32) -> Result<MoviePage> {
        let mut params = vec![("page", page.to_string())];
        params.extend(filter.discover_params());
        self.get("/discover/movie", &params).await.map(clamp_pages)
    }

    pub async fn genres(&self) -> Result<Vec<Genre>> {
        let list: GenreList = self.get("/genre/movie/list", &[]).await?;
        Ok(list.genres)
    }

    pub async fn movie(&self, id: u64) -> Result<MovieDetail> {
        self.get(&format!("/movie/{}", id), &[]).await
    }

    pub async fn credits(&self, id: u64) -> Result<Vec<CastMember>> {
        let credits: Credits = self.get(&format!("/movie/{}/credits", id), &[]).await?;
        Ok(credits.cast)
    }

    pub async fn videos(&self, id: u64) -> Result<Vec<Video>> {
        let videos: Videos = self.get(&format!("/movie/{}/videos", id), &[]).await?;
        Ok(videos.results)
    }

    /// Movie, credits and videos fetched concurrently. Any failure fails the whole.
    pub async fn details(&self, id: u64) -> Result<MovieDetails> {
        let (movie, cast, videos) =
            tokio::try_join!(self.movie(id), self.credits(id), self.videos(id))?;
        Ok(assemble_details(movie, cast, videos))
    }
}

fn clamp_pages(mut page: MoviePage) -> MoviePage {
    page.total_pages = page.total_pages.min(MAX_PAGES);
    page
}

fn assemble_details(movie: MovieDetail, mut cast: Vec<CastMember>, videos: Vec<Video>) -> MovieDetails {
    cast.truncate(CAST_LIMIT);
    let trailer_url = videos
        .iter()
        .find(|video| video.is_youtube_trailer())
        .map(|video| format!("{}{}", TRAILER_BASE_URL, video.key));
    MovieDetails {
        movie,
        cast,
        trailer_url,
    }
}
