//! Favorites live as a denormalized list on the user record, so every change is a
//! read-modify-write of that list: re-read the record, edit the list, patch it back,
//! then refresh the session. Concurrent writers for the same user race and the last
//! patch wins.

use crate::database::RecordStore;
use crate::error::{AppError, Result};
use crate::model::{FavoriteEntry, RecordId, User};
use crate::session::SessionStore;
use log::{debug, warn};

#[derive(Debug, Clone)]
pub enum Intent {
    Add(FavoriteEntry),
    Remove(u64),
    Toggle(FavoriteEntry),
}

impl Intent {
    fn movie_id(&self) -> u64 {
        match self {
            Intent::Add(entry) | Intent::Toggle(entry) => entry.id,
            Intent::Remove(id) => *id,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Applied {
    pub favorites: Vec<FavoriteEntry>,
    pub favorited: bool,
    pub changed: bool,
}

/// Computes the favorites list after `intent`. Never introduces a duplicate id.
pub fn apply(favorites: &[FavoriteEntry], intent: &Intent) -> Applied {
    let movie_id = intent.movie_id();
    let position = favorites.iter().position(|fav| fav.id == movie_id);
    let mut favorites = favorites.to_vec();
    match (intent, position) {
        (Intent::Add(entry), None) | (Intent::Toggle(entry), None) => {
            favorites.push(entry.clone());
            Applied {
                favorites,
                favorited: true,
                changed: true,
            }
        }
        (Intent::Remove(_), Some(index)) | (Intent::Toggle(_), Some(index)) => {
            favorites.remove(index);
            Applied {
                favorites,
                favorited: false,
                changed: true,
            }
        }
        (Intent::Add(_), Some(_)) => Applied {
            favorites,
            favorited: true,
            changed: false,
        },
        (Intent::Remove(_), None) => Applied {
            favorites,
            favorited: false,
            changed: false,
        },
    }
}

#[derive(Debug)]
pub struct Membership {
    pub favorited: bool,
    /// The record as it now stands in the store, also cached in the session.
    pub user: User,
}

pub struct FavoritesSynchronizer<'a> {
    records: &'a dyn RecordStore,
    sessions: &'a SessionStore,
}

impl<'a> FavoritesSynchronizer<'a> {
    pub fn new(records: &'a dyn RecordStore, sessions: &'a SessionStore) -> Self {
        FavoritesSynchronizer { records, sessions }
    }

    pub async fn toggle(
        &self,
        token: &str,
        user_id: &RecordId,
        entry: FavoriteEntry,
    ) -> Result<Membership> {
        self.sync(token, user_id, Intent::Toggle(entry)).await
    }

    pub async fn add(
        &self,
        token: &str,
        user_id: &RecordId,
        entry: FavoriteEntry,
    ) -> Result<Membership> {
        self.sync(token, user_id, Intent::Add(entry)).await
    }

    pub async fn remove(&self, token: &str, user_id: &RecordId, movie_id: u64) -> Result<Membership> {
        self.sync(token, user_id, Intent::Remove(movie_id)).await
    }

    /// Membership according to the store, not the session cache.
    pub async fn is_favorite(&self, user_id: &RecordId, movie_id: u64) -> Result<bool> {
        let user = self.records.get_user_by_id(user_id).await?;
        Ok(user.has_favorite(movie_id))
    }

    async fn sync(&self, token: &str, user_id: &RecordId, intent: Intent) -> Result<Membership> {
        let current = self
            .records
            .get_user_by_id(user_id)
            .await
            .map_err(sync_failed)?;
        let applied = apply(&current.favorites, &intent);
        let user = if applied.changed {
            self.records
                .patch_user_favorites(user_id, &applied.favorites)
                .await
                .map_err(sync_failed)?
        } else {
            debug!("favorites of user {} already up to date", user_id);
            current
        };
        if !self.sessions.save(token, &user)? {
            warn!("session ended while updating favorites of user {}", user_id);
        }
        Ok(Membership {
            favorited: applied.favorited,
            user,
        })
    }
}

fn sync_failed(err: AppError) -> AppError {
    warn!("favorites sync failed: {}", err);
    AppError::FavoritesSync(Box::new(err))
}
