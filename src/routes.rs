use crate::auth::{self, AuthState, LoginParams, RegisterParams, AFTER_REGISTER};
use crate::catalog::{CatalogClient, MovieDetails};
use crate::database::RecordStore;
use crate::error::AppError;
use crate::favorites::{FavoritesSynchronizer, Membership};
use crate::filter::{dedup_movies, SearchParams};
use crate::model::*;
use crate::session::SessionStore;
use actix_identity::Identity;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{cookie::Key, error, http::header, web, HttpMessage, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub type Records = web::Data<dyn RecordStore>;
pub type Sessions = web::Data<SessionStore>;
pub type Catalog = web::Data<CatalogClient>;

pub const RECENT_SEARCHES: usize = 5;
/// Home page shows trending movies in steps of this many.
pub const TRENDING_STEP: usize = 10;

pub struct Settings {
    pub bcrypt_cost: u32,
}

fn log_error<E: std::fmt::Debug>(err: E, message: &'static str) -> error::Error {
    debug!("{:?}", err);
    error::ErrorInternalServerError(message)
}

pub fn session_middleware(key: Key) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("auth-cookie".to_owned())
        .cookie_secure(false)
        .build()
}

fn auth_state(sessions: &SessionStore, identity: Option<&Identity>) -> Result<AuthState, AppError> {
    AuthState::resolve(sessions, identity.and_then(|id| id.id().ok()))
}

/// The session token and cached user, or a 401 pointing back at the movie.
fn require_user(
    sessions: &SessionStore,
    identity: Option<&Identity>,
    movie_id: Option<u64>,
) -> Result<(String, User), AppError> {
    match auth_state(sessions, identity)? {
        AuthState::Authenticated { token, user } => Ok((token, user)),
        AuthState::Anonymous => Err(AppError::Unauthorized {
            login_url: match movie_id {
                Some(id) => format!("/login?next=/movie/{}", id),
                None => "/login".to_owned(),
            },
        }),
    }
}

async fn session(id: Option<Identity>, sessions: Sessions) -> actix_web::Result<HttpResponse> {
    let (_token, user) = require_user(&sessions, id.as_ref(), None)?;
    Ok(HttpResponse::Ok().json(Profile::from(&user)))
}

async fn login_post(
    req: HttpRequest,
    params: web::Json<LoginParams>,
    id: Option<Identity>,
    records: Records,
    sessions: Sessions,
    settings: web::Data<Settings>,
) -> actix_web::Result<HttpResponse> {
    let (token, user) =
        auth::login(records.get_ref(), &sessions, &params, settings.bcrypt_cost).await?;
    // Only a successful login replaces the session already held by this browser.
    if let Some(previous) = id.as_ref().and_then(|id| id.id().ok()) {
        auth::logout(&sessions, &previous)?;
    }
    Identity::login(&req.extensions(), token).map_err(|err| log_error(err, "Session error"))?;
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, auth::redirect_target(params.next.as_deref())))
        .json(Profile::from(&user)))
}

async fn register_post(
    params: web::Json<RegisterParams>,
    records: Records,
    settings: web::Data<Settings>,
) -> actix_web::Result<HttpResponse> {
    auth::register(records.get_ref(), params.into_inner(), settings.bcrypt_cost).await?;
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, AFTER_REGISTER))
        .finish())
}

async fn logout(id: Option<Identity>, sessions: Sessions) -> actix_web::Result<HttpResponse> {
    if let Some(id) = id {
        if let Ok(token) = id.id() {
            auth::logout(&sessions, &token)?;
        }
        id.logout();
    }
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, "/login"))
        .finish())
}

#[derive(Deserialize)]
struct TrendingParams {
    limit: Option<usize>,
}

async fn trending(
    params: web::Query<TrendingParams>,
    catalog: Catalog,
) -> actix_web::Result<HttpResponse> {
    let mut movies = dedup_movies(catalog.trending().await?);
    movies.truncate(params.limit.unwrap_or(TRENDING_STEP));
    Ok(HttpResponse::Ok().json(movies))
}

async fn record_search(records: &dyn RecordStore, params: &SearchParams) {
    let search = NewSearch {
        query: params.query.trim().to_owned(),
        genre: params.genre.clone(),
        year: params.year.clone(),
        rating: params.rating.clone(),
        timestamp: Utc::now(),
    };
    if let Err(err) = records.create_search(search).await {
        warn!("Error saving search query: {}", err);
    }
}

/// Free-text searches are filtered here; plain browsing lets the catalog filter.
async fn movies(
    params: web::Query<SearchParams>,
    records: Records,
    catalog: Catalog,
) -> actix_web::Result<HttpResponse> {
    let filter = params.filter();
    let page = params.page();
    if params.is_new_search() {
        record_search(records.get_ref(), &params).await;
    }
    let mut result = match params.query() {
        Some(query) => {
            let mut result = catalog.search(query, page).await?;
            result.results = filter.apply(result.results);
            result
        }
        None => catalog.discover(&filter, page).await?,
    };
    result.results = dedup_movies(result.results);
    Ok(HttpResponse::Ok().json(result))
}

async fn recent_searches(records: Records) -> actix_web::Result<HttpResponse> {
    let searches = records.recent_searches(RECENT_SEARCHES).await?;
    Ok(HttpResponse::Ok().json(searches))
}

async fn genres(catalog: Catalog) -> actix_web::Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(catalog.genres().await?))
}

#[derive(Serialize)]
struct MovieDetailsView {
    #[serde(flatten)]
    details: MovieDetails,
    /// Absent for anonymous visitors or when the store could not be asked.
    is_favorite: Option<bool>,
}

async fn favorite_state(
    records: &dyn RecordStore,
    sessions: &SessionStore,
    state: &AuthState,
    movie_id: u64,
) -> Option<bool> {
    match state {
        AuthState::Authenticated { user, .. } => {
            match FavoritesSynchronizer::new(records, sessions)
                .is_favorite(&user.id, movie_id)
                .await
            {
                Ok(favorited) => Some(favorited),
                Err(err) => {
                    warn!("Error checking favorites: {}", err);
                    None
                }
            }
        }
        AuthState::Anonymous => None,
    }
}

async fn movie_details(
    path: web::Path<u64>,
    id: Option<Identity>,
    records: Records,
    sessions: Sessions,
    catalog: Catalog,
) -> actix_web::Result<HttpResponse> {
    let movie_id = path.into_inner();
    let state = auth_state(&sessions, id.as_ref())?;
    let (details, is_favorite) = tokio::join!(
        catalog.details(movie_id),
        favorite_state(records.get_ref(), &sessions, &state, movie_id)
    );
    Ok(HttpResponse::Ok().json(MovieDetailsView {
        details: details?,
        is_favorite,
    }))
}

#[derive(Serialize)]
struct FavoriteView<'a> {
    #[serde(flatten)]
    entry: &'a FavoriteEntry,
    poster_url: String,
    year: Option<&'a str>,
}

impl<'a> From<&'a FavoriteEntry> for FavoriteView<'a> {
    fn from(entry: &'a FavoriteEntry) -> Self {
        FavoriteView {
            entry,
            poster_url: entry.poster_url(),
            year: entry.release_year(),
        }
    }
}

async fn favorites(
    id: Option<Identity>,
    records: Records,
    sessions: Sessions,
) -> actix_web::Result<HttpResponse> {
    let (_token, user) = require_user(&sessions, id.as_ref(), None)?;
    let current = records.get_user_by_id(&user.id).await?;
    let view: Vec<FavoriteView> = current.favorites.iter().map(FavoriteView::from).collect();
    Ok(HttpResponse::Ok().json(view))
}

#[derive(Serialize)]
struct MembershipView {
    movie_id: u64,
    favorited: bool,
    message: &'static str,
}

impl MembershipView {
    fn new(movie_id: u64, membership: &Membership) -> Self {
        MembershipView {
            movie_id,
            favorited: membership.favorited,
            message: if membership.favorited {
                "Added to favorites!"
            } else {
                "Removed from favorites!"
            },
        }
    }
}

async fn toggle_favorite(
    path: web::Path<u64>,
    id: Option<Identity>,
    records: Records,
    sessions: Sessions,
    catalog: Catalog,
) -> actix_web::Result<HttpResponse> {
    let movie_id = path.into_inner();
    let (token, user) = require_user(&sessions, id.as_ref(), Some(movie_id))?;
    let movie = catalog.movie(movie_id).await?;
    let membership = FavoritesSynchronizer::new(records.get_ref(), &sessions)
        .toggle(&token, &user.id, FavoriteEntry::from(&movie))
        .await?;
    Ok(HttpResponse::Ok().json(MembershipView::new(movie_id, &membership)))
}

async fn add_favorite(
    path: web::Path<u64>,
    id: Option<Identity>,
    records: Records,
    sessions: Sessions,
    catalog: Catalog,
) -> actix_web::Result<HttpResponse> {
    let movie_id = path.into_inner();
    let (token, user) = require_user(&sessions, id.as_ref(), Some(movie_id))?;
    let movie = catalog.movie(movie_id).await?;
    let membership = FavoritesSynchronizer::new(records.get_ref(), &sessions)
        .add(&token, &user.id, FavoriteEntry::from(&movie))
        .await?;
    Ok(HttpResponse::Ok().json(MembershipView::new(movie_id, &membership)))
}

async fn remove_favorite(
    path: web::Path<u64>,
    id: Option<Identity>,
    records: Records,
    sessions: Sessions,
) -> actix_web::Result<HttpResponse> {
    let movie_id = path.into_inner();
    let (token, user) = require_user(&sessions, id.as_ref(), Some(movie_id))?;
    let membership = FavoritesSynchronizer::new(records.get_ref(), &sessions)
        .remove(&token, &user.id, movie_id)
        .await?;
    Ok(HttpResponse::Ok().json(MembershipView::new(movie_id, &membership)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::post().to(login_post))
        .route("/register", web::post().to(register_post))
        .route("/logout", web::post().to(logout))
        .service(
            web::scope("/api")
                .route("/session", web::get().to(session))
                .route("/movies/trending", web::get().to(trending))
                .route("/movies", web::get().to(movies))
                .route("/movies/{id}", web::get().to(movie_details))
                .route("/genres", web::get().to(genres))
                .route("/searches/recent", web::get().to(recent_searches))
                .route("/favorites", web::get().to(favorites))
                .route("/favorites/{id}", web::put().to(add_favorite))
                .route("/favorites/{id}", web::delete().to(remove_favorite))
                .route("/favorites/{id}/toggle", web::post().to(toggle_favorite)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::temporary_db;
    use actix_identity::IdentityMiddleware;
    use actix_web::cookie::Cookie;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    macro_rules! test_app {
        ($db:expr) => {{
            let db: sled::Db = $db;
            let records: Records =
                web::Data::from(Arc::new(db.clone()) as Arc<dyn RecordStore>);
            let sessions =
                web::Data::new(SessionStore::open(&db, chrono::Duration::hours(1)).unwrap());
            // Never contacted by these tests.
            let catalog = web::Data::new(
                CatalogClient::new("http://127.0.0.1:9", "key", "en-US", Duration::from_secs(1))
                    .unwrap(),
            );
            test::init_service(
                App::new()
                    .wrap(IdentityMiddleware::default())
                    .wrap(session_middleware(Key::generate()))
                    .app_data(records)
                    .app_data(sessions)
                    .app_data(catalog)
                    .app_data(web::Data::new(Settings { bcrypt_cost: 4 }))
                    .configure(configure),
            )
            .await
        }};
    }

    fn auth_cookie(resp: &actix_web::dev::ServiceResponse) -> Cookie<'static> {
        resp.response()
            .cookies()
            .find(|cookie| cookie.name() == "auth-cookie")
            .expect("auth cookie")
            .into_owned()
    }

    fn registration() -> Value {
        json!({
            "username": "ann",
            "email": "ann@example.com",
            "password": "secret",
            "confirmPassword": "secret"
        })
    }

    #[actix_rt::test]
    async fn register_login_logout() {
        let app = test_app!(temporary_db());

        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(registration())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/login");

        let req = test::TestRequest::post()
            .uri("/login")
            .set_json(json!({"username": "ann", "password": "secret", "next": "/movie/550"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/movie/550");
        let cookie = auth_cookie(&resp);

        let req = test::TestRequest::get()
            .uri("/api/session")
            .cookie(cookie.clone())
            .to_request();
        let profile: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(profile["username"], "ann");
        assert!(profile.get("password").is_none());

        let req = test::TestRequest::post()
            .uri("/logout")
            .cookie(cookie.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);

        // The old cookie no longer maps to a session.
        let req = test::TestRequest::get()
            .uri("/api/session")
            .cookie(cookie)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn bad_login_is_unauthorized() {
        let app = test_app!(temporary_db());
        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(registration())
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/login")
            .set_json(json!({"username": "ann", "password": "nope"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn failed_login_keeps_existing_session() {
        let app = test_app!(temporary_db());
        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(registration())
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/login")
            .set_json(json!({"username": "ann", "password": "secret"}))
            .to_request();
        let cookie = auth_cookie(&test::call_service(&app, req).await);

        let req = test::TestRequest::post()
            .uri("/login")
            .cookie(cookie.clone())
            .set_json(json!({"username": "ann", "password": "wrong"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/session")
            .cookie(cookie)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_rt::test]
    async fn duplicate_registration_conflicts() {
        let app = test_app!(temporary_db());
        for expected in [StatusCode::FOUND, StatusCode::CONFLICT] {
            let req = test::TestRequest::post()
                .uri("/register")
                .set_json(registration())
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), expected);
        }
    }

    #[actix_rt::test]
    async fn anonymous_favorites_point_to_login() {
        let app = test_app!(temporary_db());
        let req = test::TestRequest::post()
            .uri("/api/favorites/550/toggle")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["login"], "/login?next=/movie/550");
    }

    #[actix_rt::test]
    async fn remove_and_list_favorites() {
        let db = temporary_db();
        let app = test_app!(db.clone());

        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(registration())
            .to_request();
        test::call_service(&app, req).await;
        let user = db.find_users_by_username("ann").await.unwrap().remove(0);
        let entry = |id: u64| FavoriteEntry {
            id,
            title: format!("Movie {}", id),
            poster_path: None,
            release_date: Some("2008-07-18".to_owned()),
            vote_average: 8.5,
        };
        db.patch_user_favorites(&user.id, &[entry(1), entry(2)])
            .await
            .unwrap();

        let req = test::TestRequest::post()
            .uri("/login")
            .set_json(json!({"username": "ann", "password": "secret"}))
            .to_request();
        let cookie = auth_cookie(&test::call_service(&app, req).await);

        let req = test::TestRequest::delete()
            .uri("/api/favorites/2")
            .cookie(cookie.clone())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["favorited"], false);
        assert_eq!(body["message"], "Removed from favorites!");

        let req = test::TestRequest::get()
            .uri("/api/favorites")
            .cookie(cookie)
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], 1);
        assert_eq!(body[0]["year"], "2008");
        assert_eq!(body[0]["poster_url"], POSTER_PLACEHOLDER_URL);
    }

    #[actix_rt::test]
    async fn recent_searches_are_listed() {
        let db = temporary_db();
        for query in ["alien", "heat"] {
            db.create_search(NewSearch {
                query: query.to_owned(),
                genre: String::new(),
                year: String::new(),
                rating: String::new(),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        }
        let app = test_app!(db);
        let req = test::TestRequest::get()
            .uri("/api/searches/recent")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }
}
