use super::error::*;
use super::handler;
use super::handler::RefreshCookie;
use crate::application_port::{Identity, SessionService};
use crate::server::Server;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, http, reject};

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let cookie = Arc::new(RefreshCookie {
        path: server.cookie_path.clone(),
        secure: server.cookie_secure,
        max_age_secs: server.refresh_ttl.as_secs(),
    });

    let login = warp::post()
        .and(warp::path("auth"))
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(with(server.session_service.clone()))
        .and(with(cookie.clone()))
        .and_then(handler::login);

    let refresh = warp::post()
        .and(warp::path("auth"))
        .and(warp::path("refresh-token"))
        .and(warp::path::end())
        .and(warp::cookie::optional(RefreshCookie::NAME))
        .and(with(server.session_service.clone()))
        .and(with(cookie.clone()))
        .and_then(handler::refresh);

    let logout = warp::post()
        .and(warp::path("auth"))
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(warp::cookie::optional(RefreshCookie::NAME))
        .and(with(server.session_service.clone()))
        .and(with(cookie.clone()))
        .and_then(handler::logout);

    let me = warp::get()
        .and(warp::path("auth"))
        .and(warp::path("me"))
        .and(warp::path::end())
        .and(with_verification(server.session_service.clone()))
        .and_then(handler::me);

    login.or(refresh).or(logout).or(me)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_verification(
    sessions: Arc<dyn SessionService>,
) -> impl Filter<Extract = (Identity,), Error = warp::Rejection> + Clone {
    warp::header::<String>(http::header::AUTHORIZATION.as_ref()).and_then(move |token: String| {
        let sessions = sessions.clone();
        async move {
            if let Some(token) = token.strip_prefix("Bearer ") {
                let identity = sessions
                    .verify_access(token)
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok(identity)
            } else {
                Err(reject::custom(ApiErrorCode::Unauthorized))
            }
        }
    })
}
