//! Server-side sessions.
//!
//! A session caches the user record fetched at login (and after every favorites
//! change) under a random token. The token is the only thing the browser holds; it
//! travels in the identity cookie. Entries carry an expiry that is checked on every
//! read.

use crate::error::Result;
use crate::model::User;
use chrono::{Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SESSIONS: &[u8] = b"sessions";

#[derive(Serialize, Deserialize)]
struct SessionEntry {
    user: User,
    /// Unix timestamp, seconds.
    expires_at: i64,
}

impl SessionEntry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[derive(Clone)]
pub struct SessionStore {
    tree: sled::Tree,
    ttl: Duration,
}

impl SessionStore {
    pub fn open(db: &sled::Db, ttl: Duration) -> Result<Self> {
        Ok(SessionStore {
            tree: db.open_tree(SESSIONS)?,
            ttl,
        })
    }

    /// Starts a session for `user` and returns its token.
    pub fn create(&self, user: &User) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        let entry = SessionEntry {
            user: user.clone(),
            expires_at: (Utc::now() + self.ttl).timestamp(),
        };
        self.tree
            .insert(token.as_bytes(), bincode::serialize(&entry)?)?;
        debug!("session started for {}", user.username);
        Ok(token)
    }

    pub fn load(&self, token: &str) -> Result<Option<User>> {
        Ok(self.live_entry(token)?.map(|entry| entry.user))
    }

    /// Overwrites the cached record. Returns `false` when the session is gone.
    pub fn save(&self, token: &str, user: &User) -> Result<bool> {
        match self.live_entry(token)? {
            Some(mut entry) => {
                entry.user = user.clone();
                self.tree
                    .insert(token.as_bytes(), bincode::serialize(&entry)?)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn clear(&self, token: &str) -> Result<()> {
        self.tree.remove(token.as_bytes())?;
        Ok(())
    }

    /// Drops every expired session, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let mut removed = 0;
        for item in self.tree.iter() {
            let (key, data) = item?;
            let entry: SessionEntry = bincode::deserialize(&data)?;
            if entry.is_expired(now) {
                self.tree.remove(key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn live_entry(&self, token: &str) -> Result<Option<SessionEntry>> {
        let data = match self.tree.get(token.as_bytes())? {
            Some(data) => data,
            None => return Ok(None),
        };
        let entry: SessionEntry = bincode::deserialize(&data)?;
        if entry.is_expired(Utc::now().timestamp()) {
            debug!("session for {} expired", entry.user.username);
            self.tree.remove(token.as_bytes())?;
            return Ok(None);
        }
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::temporary_db;
    use crate::model::{FavoriteEntry, RecordId};

    fn user() -> User {
        User {
            id: RecordId::from(1),
            username: "ann".to_owned(),
            email: "ann@example.com".to_owned(),
            password: "hash".to_owned(),
            favorites: Vec::new(),
        }
    }

    #[test]
    fn create_load_clear() {
        let db = temporary_db();
        let sessions = SessionStore::open(&db, Duration::hours(1)).unwrap();
        let token = sessions.create(&user()).unwrap();
        assert_eq!(sessions.load(&token).unwrap(), Some(user()));
        sessions.clear(&token).unwrap();
        assert_eq!(sessions.load(&token).unwrap(), None);
        sessions.clear(&token).unwrap();
    }

    #[test]
    fn save_overwrites_cached_user() {
        let db = temporary_db();
        let sessions = SessionStore::open(&db, Duration::hours(1)).unwrap();
        let token = sessions.create(&user()).unwrap();
        let mut updated = user();
        updated.favorites.push(FavoriteEntry {
            id: 278,
            title: "The Shawshank Redemption".to_owned(),
            poster_path: None,
            release_date: None,
            vote_average: 8.7,
        });
        assert!(sessions.save(&token, &updated).unwrap());
        assert_eq!(sessions.load(&token).unwrap(), Some(updated));
    }

    #[test]
    fn save_to_missing_session_is_ignored() {
        let db = temporary_db();
        let sessions = SessionStore::open(&db, Duration::hours(1)).unwrap();
        assert!(!sessions.save("nope", &user()).unwrap());
        assert_eq!(sessions.load("nope").unwrap(), None);
    }

    #[test]
    fn expired_sessions_are_absent() {
        let db = temporary_db();
        let sessions = SessionStore::open(&db, Duration::seconds(-1)).unwrap();
        let token = sessions.create(&user()).unwrap();
        assert_eq!(sessions.load(&token).unwrap(), None);
        assert!(db.open_tree(SESSIONS).unwrap().is_empty());
    }

    #[test]
    fn purge_removes_only_expired() {
        let db = temporary_db();
        let stale = SessionStore::open(&db, Duration::seconds(-1)).unwrap();
        let fresh = SessionStore::open(&db, Duration::hours(1)).unwrap();
        stale.create(&user()).unwrap();
        stale.create(&user()).unwrap();
        let token = fresh.create(&user()).unwrap();
        assert_eq!(fresh.purge_expired().unwrap(), 2);
        assert_eq!(fresh.load(&token).unwrap(), Some(user()));
    }
}
