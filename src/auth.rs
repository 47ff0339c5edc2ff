use crate::database::RecordStore;
use crate::error::{AppError, Result};
use crate::model::{NewUser, User};
use crate::session::SessionStore;
use log::{debug, info};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

pub const DEFAULT_LANDING: &str = "/home";
pub const AFTER_REGISTER: &str = "/login";

#[derive(Debug)]
pub enum AuthState {
    Anonymous,
    Authenticated { token: String, user: User },
}

impl AuthState {
    /// Resolves the identity token carried by the request, if any.
    pub fn resolve(sessions: &SessionStore, token: Option<String>) -> Result<Self> {
        let token = match token {
            Some(token) => token,
            None => return Ok(AuthState::Anonymous),
        };
        Ok(match sessions.load(&token)? {
            Some(user) => AuthState::Authenticated { token, user },
            None => AuthState::Anonymous,
        })
    }
}

#[derive(Deserialize, Debug)]
pub struct LoginParams {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct RegisterParams {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmPassword", alias = "confirm_password")]
    pub confirm_password: String,
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"\S+@\S+\.\S+").expect("valid email pattern"))
}

impl RegisterParams {
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty()
            || self.email.is_empty()
            || self.password.is_empty()
            || self.confirm_password.is_empty()
        {
            return Err(AppError::validation("All fields are required."));
        }
        if !email_pattern().is_match(&self.email) {
            return Err(AppError::validation("Please enter a valid email address."));
        }
        if self.password != self.confirm_password {
            return Err(AppError::validation("Passwords do not match."));
        }
        Ok(())
    }
}

/// Only local paths are honoured as post-login targets.
pub fn redirect_target(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => DEFAULT_LANDING,
    }
}

/// Hash checked when no user matches, so unknown names cost one bcrypt run too.
fn dummy_hash(cost: u32) -> Option<String> {
    static DUMMY: OnceLock<Option<(u32, String)>> = OnceLock::new();
    let hash = |cost| bcrypt::hash("flicklist", cost).ok();
    match DUMMY.get_or_init(|| hash(cost).map(|dummy| (cost, dummy))) {
        Some((cached, dummy)) if *cached == cost => Some(dummy.clone()),
        _ => hash(cost),
    }
}

fn verify_password(password: &str, hash: &str, cost: u32) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(valid) => valid,
        Err(err) => {
            debug!("stored password hash is unusable: {}", err);
            if let Some(dummy) = dummy_hash(cost) {
                let _ = bcrypt::verify(password, &dummy);
            }
            false
        }
    }
}

/// Checks the credentials and opens a session. Unknown users and wrong passwords
/// fail the same way.
pub async fn login(
    records: &dyn RecordStore,
    sessions: &SessionStore,
    params: &LoginParams,
    bcrypt_cost: u32,
) -> Result<(String, User)> {
    if params.username.is_empty() || params.password.is_empty() {
        return Err(AppError::validation(
            "Both username and password are required.",
        ));
    }
    let user = match records
        .find_users_by_username(&params.username)
        .await?
        .into_iter()
        .next()
    {
        Some(user) => user,
        None => {
            debug!("login for unknown user {}", params.username);
            if let Some(dummy) = dummy_hash(bcrypt_cost) {
                let _ = bcrypt::verify(&params.password, &dummy);
            }
            return Err(AppError::InvalidCredentials);
        }
    };
    if !verify_password(&params.password, &user.password, bcrypt_cost) {
        debug!("wrong password for {}", params.username);
        return Err(AppError::InvalidCredentials);
    }
    let token = sessions.create(&user)?;
    info!("{} logged in", user.username);
    Ok((token, user))
}

pub async fn register(
    records: &dyn RecordStore,
    params: RegisterParams,
    bcrypt_cost: u32,
) -> Result<User> {
    params.validate()?;
    if !records
        .find_users_by_username(&params.username)
        .await?
        .is_empty()
    {
        return Err(AppError::DuplicateUsername);
    }
    let user = records
        .create_user(NewUser {
            password: bcrypt::hash(&params.password, bcrypt_cost)?,
            username: params.username,
            email: params.email,
            favorites: Vec::new(),
        })
        .await?;
    info!("registered {}", user.username);
    Ok(user)
}

pub fn logout(sessions: &SessionStore, token: &str) -> Result<()> {
    sessions.clear(token)
}
