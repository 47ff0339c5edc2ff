use crate::error::{AppError, Result};
use crate::model::*;
use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};

/// CRUD over the `users` and `searches` collections of the record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_user_by_id(&self, id: &RecordId) -> Result<User>;
    /// An empty result means "no such user".
    async fn find_users_by_username(&self, username: &str) -> Result<Vec<User>>;
    /// Replaces the whole favorites list of the user.
    async fn patch_user_favorites(
        &self,
        id: &RecordId,
        favorites: &[FavoriteEntry],
    ) -> Result<User>;
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn create_search(&self, search: NewSearch) -> Result<SearchHistoryEntry>;
    /// Newest first, at most `limit` entries.
    async fn recent_searches(&self, limit: usize) -> Result<Vec<SearchHistoryEntry>>;
}

const USERS: &[u8] = b"users";
const USERS_USERNAME: &[u8] = b"users_username";
const SEARCHES: &[u8] = b"searches";

fn serialize_id(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn parse_id(id: &RecordId) -> Option<[u8; 8]> {
    id.0.parse::<u64>().ok().map(serialize_id)
}

fn user_not_found(id: &RecordId) -> AppError {
    AppError::NotFound(format!("User {}", id))
}

/// The embedded store used when no remote record store is configured.
#[async_trait]
impl RecordStore for sled::Db {
    async fn get_user_by_id(&self, id: &RecordId) -> Result<User> {
        let key = parse_id(id).ok_or_else(|| user_not_found(id))?;
        let users = self.open_tree(USERS)?;
        let data = users.get(key)?.ok_or_else(|| user_not_found(id))?;
        Ok(bincode::deserialize(&data)?)
    }

    async fn find_users_by_username(&self, username: &str) -> Result<Vec<User>> {
        let users_username = self.open_tree(USERS_USERNAME)?;
        let users = self.open_tree(USERS)?;
        match users_username.get(username.as_bytes())? {
            Some(id) => match users.get(&id)? {
                Some(data) => Ok(vec![bincode::deserialize(&data)?]),
                None => {
                    log::warn!("Bad index users_username for {}", username);
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    async fn patch_user_favorites(
        &self,
        id: &RecordId,
        favorites: &[FavoriteEntry],
    ) -> Result<User> {
        let key = parse_id(id).ok_or_else(|| user_not_found(id))?;
        let users = self.open_tree(USERS)?;
        let data = users.get(key)?.ok_or_else(|| user_not_found(id))?;
        let mut user: User = bincode::deserialize(&data)?;
        user.favorites = favorites.to_vec();
        users.insert(key, bincode::serialize(&user)?)?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let users = self.open_tree(USERS)?;
        let users_username = self.open_tree(USERS_USERNAME)?;
        let id = self.generate_id()?;
        let user = user.with_id(RecordId::from(id));
        let encoded = bincode::serialize(&user)?;
        let result = (&users, &users_username).transaction(|(users, users_username)| {
            if users_username.get(user.username.as_bytes())?.is_some() {
                return Err(ConflictableTransactionError::Abort(()));
            }
            users_username.insert(user.username.as_bytes(), &serialize_id(id)[..])?;
            users.insert(&serialize_id(id)[..], encoded.as_slice())?;
            Ok(())
        });
        match result {
            Ok(()) => Ok(user),
            Err(TransactionError::Abort(())) => Err(AppError::DuplicateUsername),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    async fn create_search(&self, search: NewSearch) -> Result<SearchHistoryEntry> {
        let searches = self.open_tree(SEARCHES)?;
        let id = self.generate_id()?;
        let entry = search.with_id(RecordId::from(id));
        searches.insert(serialize_id(id), bincode::serialize(&entry)?)?;
        Ok(entry)
    }

    async fn recent_searches(&self, limit: usize) -> Result<Vec<SearchHistoryEntry>> {
        let searches = self.open_tree(SEARCHES)?;
        let mut entries = searches
            .iter()
            .values()
            .map(|data| -> Result<SearchHistoryEntry> { Ok(bincode::deserialize(&data?)?) })
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }
}
