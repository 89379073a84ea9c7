//! Acting-user extractor.

use std::future::{Ready, ready};

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};

use crate::config::USER_HEADER;

/// Name recorded when a request carries no user header.
pub const ANONYMOUS: &str = "anonymous";

/// The user a request acts as, taken from the `X-User` header.
///
/// Authentication happens upstream; this only carries the name through to
/// the `user` field of what the request touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

impl Actor {
    pub fn from_request_head(req: &HttpRequest) -> Self {
        let name = req
            .headers()
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(ANONYMOUS);
        Actor(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl FromRequest for Actor {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(Actor::from_request_head(req)))
    }
}
