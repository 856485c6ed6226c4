use super::jwt::{JwtError, JwtService};
use crate::error::ApiError;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    http::header,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use actix_web::{FromRequest, HttpRequest};
use futures::future::{Ready, err, ok};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// Verifies the bearer token and stores the caller's id in request extensions.
#[derive(Clone)]
pub struct AuthMiddleware {
    jwt_service: Arc<JwtService>,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService) -> Self {
        Self {
            jwt_service: Arc::new(jwt_service),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            jwt_service: self.jwt_service.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    jwt_service: Arc<JwtService>,
}

/// Why a request to a scan route was turned away.
#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error("no bearer token")]
    MissingToken,
    #[error("malformed Authorization header")]
    MalformedHeader,
    #[error("token rejected: {0}")]
    BadToken(#[from] JwtError),
    #[error("subject {0:?} is not a user id")]
    BadSubject(String),
}

impl Rejection {
    fn body(&self) -> serde_json::Value {
        let message = match self {
            Rejection::MissingToken | Rejection::MalformedHeader => "Not authorized, no token",
            Rejection::BadToken(_) | Rejection::BadSubject(_) => "Not authorized, token failed",
        };
        serde_json::json!({"success": false, "message": message})
    }
}

fn caller_id(req: &ServiceRequest, jwt_service: &JwtService) -> Result<Uuid, Rejection> {
    let raw = match req.headers().get(header::AUTHORIZATION) {
        Some(value) => value.to_str().map_err(|_| Rejection::MalformedHeader)?,
        None => return Err(Rejection::MissingToken),
    };
    let token = raw
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(Rejection::MalformedHeader)?;

    let claims = jwt_service.verify_token(token)?;
    Uuid::parse_str(&claims.sub).map_err(|_| Rejection::BadSubject(claims.sub))
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let jwt_service = self.jwt_service.clone();

        Box::pin(async move {
            match caller_id(&req, &jwt_service) {
                Ok(user_id) => {
                    req.extensions_mut().insert(AuthenticatedUser(user_id));
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(rejection) => {
                    log::warn!("{} {} rejected: {}", req.method(), req.path(), rejection);

                    let (http_req, _payload) = req.into_parts();
                    let response = HttpResponse::Unauthorized()
                        .json(rejection.body())
                        .map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}

/// Identity placed in request extensions by [`AuthMiddleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        match req.extensions().get::<AuthenticatedUser>() {
            Some(user) => ok(*user),
            None => {
                log::warn!("No authenticated user on request for path: {}", req.path());
                err(ApiError::Unauthorized)
            }
        }
    }
}
