use crate::catalog::MAX_PAGES;
use crate::model::MovieSummary;
use serde::Deserialize;
use std::collections::HashSet;

/// Query string of the movie search. Empty values mean "any".
#[derive(Deserialize, Debug, Default, Clone)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub page: Option<u32>,
}

impl SearchParams {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).clamp(1, MAX_PAGES)
    }

    pub fn query(&self) -> Option<&str> {
        Some(self.query.trim()).filter(|q| !q.is_empty())
    }

    pub fn filter(&self) -> MovieFilter {
        MovieFilter {
            genre: self.genre.trim().parse().ok(),
            year: Some(self.year.trim())
                .filter(|y| !y.is_empty())
                .map(str::to_owned),
            min_rating: self.rating.trim().parse().ok(),
        }
    }

    /// A fresh submission, as opposed to paging through one.
    pub fn is_new_search(&self) -> bool {
        self.page() == 1 && (self.query().is_some() || !self.filter().is_empty())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MovieFilter {
    pub genre: Option<u64>,
    pub year: Option<String>,
    pub min_rating: Option<f64>,
}

impl MovieFilter {
    pub fn is_empty(&self) -> bool {
        self.genre.is_none() && self.year.is_none() && self.min_rating.is_none()
    }

    pub fn matches(&self, movie: &MovieSummary) -> bool {
        if let Some(genre) = self.genre {
            if !movie.genre_ids.contains(&genre) {
                return false;
            }
        }
        if let Some(year) = &self.year {
            match &movie.release_date {
                Some(date) if date.starts_with(year.as_str()) => {}
                _ => return false,
            }
        }
        if let Some(rating) = self.min_rating {
            if movie.vote_average < rating {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, movies: Vec<MovieSummary>) -> Vec<MovieSummary> {
        movies.into_iter().filter(|m| self.matches(m)).collect()
    }

    /// Query pairs understood by the catalog's discover endpoint.
    pub fn discover_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(genre) = self.genre {
            params.push(("with_genres", genre.to_string()));
        }
        if let Some(year) = &self.year {
            params.push(("primary_release_year", year.clone()));
        }
        if let Some(rating) = self.min_rating {
            params.push(("vote_average.gte", rating.to_string()));
        }
        params
    }
}

/// Keeps the first occurrence of each movie id.
pub fn dedup_movies(movies: Vec<MovieSummary>) -> Vec<MovieSummary> {
    let mut seen = HashSet::new();
    movies.into_iter().filter(|m| seen.insert(m.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: u64, genres: &[u64], date: &str, rating: f64) -> MovieSummary {
        MovieSummary {
            id,
            title: format!("Movie {}", id),
            poster_path: None,
            release_date: Some(date.to_owned()),
            vote_average: rating,
            genre_ids: genres.to_vec(),
        }
    }

    fn ids(movies: &[MovieSummary]) -> Vec<u64> {
        movies.iter().map(|m| m.id).collect()
    }

    #[test]
    fn empty_strings_mean_no_filter() {
        let params = SearchParams::default();
        assert!(params.filter().is_empty());
        assert_eq!(params.query(), None);
        assert_eq!(params.page(), 1);
        assert!(!params.is_new_search());
    }

    #[test]
    fn page_stays_within_catalog_limit() {
        let page = |page| SearchParams {
            page: Some(page),
            ..SearchParams::default()
        };
        assert_eq!(page(0).page(), 1);
        assert_eq!(page(MAX_PAGES).page(), MAX_PAGES);
        assert_eq!(page(501).page(), MAX_PAGES);
        assert_eq!(page(u32::MAX).page(), MAX_PAGES);
    }

    #[test]
    fn filters_by_genre_year_and_rating() {
        let movies = vec![
            summary(1, &[28, 12], "2010-07-16", 8.4),
            summary(2, &[18], "2010-01-01", 9.0),
            summary(3, &[28], "1999-03-31", 8.7),
            summary(4, &[28], "2010-05-05", 5.0),
        ];
        let params = SearchParams {
            genre: "28".to_owned(),
            year: "2010".to_owned(),
            rating: "7".to_owned(),
            ..Default::default()
        };
        assert_eq!(ids(&params.filter().apply(movies)), vec![1]);
    }

    #[test]
    fn missing_release_date_fails_year_filter() {
        let mut movie = summary(1, &[], "", 6.0);
        movie.release_date = None;
        let filter = MovieFilter {
            year: Some("2020".to_owned()),
            ..Default::default()
        };
        assert!(!filter.matches(&movie));
        assert!(MovieFilter::default().matches(&movie));
    }

    #[test]
    fn discover_params_only_for_set_filters() {
        let filter = MovieFilter {
            genre: Some(35),
            year: None,
            min_rating: Some(7.0),
        };
        assert_eq!(
            filter.discover_params(),
            vec![
                ("with_genres", "35".to_owned()),
                ("vote_average.gte", "7".to_owned())
            ]
        );
    }

    #[test]
    fn movies_are_shown_once() {
        let movies = vec![
            summary(1, &[], "", 1.0),
            summary(2, &[], "", 1.0),
            summary(1, &[], "", 1.0),
        ];
        assert_eq!(ids(&dedup_movies(movies)), vec![1, 2]);
    }

    #[test]
    fn paging_is_not_a_new_search() {
        let params = SearchParams {
            query: "alien".to_owned(),
            page: Some(2),
            ..Default::default()
        };
        assert!(!params.is_new_search());
    }
}
