//! json-server compatible record store over HTTP.

use crate::database::RecordStore;
use crate::error::{AppError, Result};
use crate::model::*;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const SERVICE: &str = "record store";

pub struct HttpRecordStore {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct FavoritesPatch<'a> {
    favorites: &'a [FavoriteEntry],
}

impl HttpRecordStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::network(SERVICE, err))?;
        Ok(HttpRecordStore {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|err| AppError::network(SERVICE, err))?;
        let status = response.status();
        if !status.is_success() {
            debug!("{} answered {}", SERVICE, status);
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
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn get_user_by_id(&self, id: &RecordId) -> Result<User> {
        let request = self.client.get(self.url(&format!("/users/{}", id)));
        match self.send(request).await {
            Err(AppError::Server { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(AppError::NotFound(format!("User {}", id)))
            }
            other => other,
        }
    }

    async fn find_users_by_username(&self, username: &str) -> Result<Vec<User>> {
        let request = self
            .client
            .get(self.url("/users"))
            .query(&[("username", username)]);
        self.send(request).await
    }

    async fn patch_user_favorites(
        &self,
        id: &RecordId,
        favorites: &[FavoriteEntry],
    ) -> Result<User> {
        let request = self
            .client
            .patch(self.url(&format!("/users/{}", id)))
            .json(&FavoritesPatch { favorites });
        self.send(request).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let request = self.client.post(self.url("/users")).json(&user);
        self.send(request).await
    }

    async fn create_search(&self, search: NewSearch) -> Result<SearchHistoryEntry> {
        let request = self.client.post(self.url("/searches")).json(&search);
        self.send(request).await
    }

    async fn recent_searches(&self, limit: usize) -> Result<Vec<SearchHistoryEntry>> {
        let limit_param = limit.to_string();
        let request = self.client.get(self.url("/searches")).query(&[
            ("_sort", "timestamp"),
            ("_order", "desc"),
            ("_limit", limit_param.as_str()),
        ]);
        let mut entries: Vec<SearchHistoryEntry> = self.send(request).await?;
        // json-server 1.x ignores `_order` and `_limit`.
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }
}
