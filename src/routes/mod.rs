pub mod admin;
pub mod download;
pub mod public;
pub mod visits;

use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

use crate::config::AppConfig;

pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// Best-effort client address: proxy headers first, then the socket peer.
pub struct ClientIp(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let headers = request.headers();

        for name in ["CF-Connecting-IP", "True-Client-IP", "X-Real-IP"] {
            if let Some(ip) = headers.get_one(name) {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return Outcome::Success(ClientIp(ip.to_string()));
                }
            }
        }

        // X-Forwarded-For: client, proxy1, proxy2; the leftmost is the client
        if let Some(forwarded) = headers.get_one("X-Forwarded-For") {
            if let Some(ip) = forwarded.split(',').next() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return Outcome::Success(ClientIp(ip.to_string()));
                }
            }
        }

        let ip = request
            .client_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Outcome::Success(ClientIp(ip))
    }
}

/// Raw `User-Agent` header, empty when absent.
pub struct UserAgent(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserAgent {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let ua = request.headers().get_one("User-Agent").unwrap_or("");
        Outcome::Success(UserAgent(ua.to_string()))
    }
}

/// Admin access. Passes when no admin token is configured, otherwise the
/// request must carry it in `X-Admin-Token`.
pub struct AdminKey;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminKey {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let expected = match request.rocket().state::<AppConfig>() {
            Some(cfg) => cfg.admin.token.as_str(),
            None => return Outcome::Error((Status::InternalServerError, ())),
        };
        if expected.is_empty() {
            return Outcome::Success(AdminKey);
        }
        match request.headers().get_one(ADMIN_TOKEN_HEADER) {
            Some(given) if given == expected => Outcome::Success(AdminKey),
            _ => {
                log::warn!("Rejected admin request to {}", request.uri().path());
                Outcome::Error((Status::Unauthorized, ()))
            }
        }
    }
}
