use crate::auth::{AuthError, TokenVerifier};
use crate::error::ApiError;
use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web::Data, FromRequest, HttpRequest};
use futures::future::{ready, Ready};

/// Client context passed to routes.
/// Built from the `Authorization` header of each request; nothing is kept
/// between requests.
#[derive(Clone, Debug, Default)]
pub struct ClientCtx {
    /// Verified user id. None is an anonymous caller.
    user_id: Option<String>,
    /// Why a presented token was refused, if one was.
    auth_error: Option<AuthError>,
}

impl ClientCtx {
    pub fn from_request_parts(req: &HttpRequest, verifier: &TokenVerifier) -> Self {
        let header = match req.headers().get(header::AUTHORIZATION) {
            Some(value) => value,
            None => return Self::default(),
        };

        let result = header
            .to_str()
            .map_err(|_| AuthError::Invalid("malformed Authorization header".to_owned()))
            .and_then(|value| verifier.verify_header(value));

        match result {
            Ok(user_id) => Self {
                user_id: Some(user_id),
                auth_error: None,
            },
            Err(e) => {
                log::debug!("Rejected bearer token: {}", e);
                Self {
                    user_id: None,
                    auth_error: Some(e),
                }
            }
        }
    }

    /// Verified user id, if any. A refused token reads as anonymous here.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Require user to be logged in. Returns user_id or Unauthorized.
    pub fn require_login(&self) -> Result<&str, ApiError> {
        match (&self.user_id, &self.auth_error) {
            (Some(id), _) => Ok(id),
            (None, Some(e)) => Err(ApiError::Unauthorized(e.to_string())),
            (None, None) => Err(ApiError::Unauthorized(AuthError::MissingToken.to_string())),
        }
    }
}

/// This implementation is what actually provides the `client: ClientCtx` in the parameters of route functions.
impl FromRequest for ClientCtx {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.app_data::<Data<TokenVerifier>>() {
            Some(verifier) => ready(Ok(Self::from_request_parts(req, verifier))),
            None => ready(Err(ApiError::Internal(
                "Token verifier is not loaded.".to_owned(),
            ))),
        }
    }
}
