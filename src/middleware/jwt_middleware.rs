/// JWT Authentication Middleware
///
/// Validates the bearer access token and injects its claims into request
/// extensions for the route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::Signer;

/// Guards routes that require a valid, unexpired access token
pub struct JwtMiddleware {
    signer: Arc<Signer>,
}

impl JwtMiddleware {
    pub fn new(signer: Arc<Signer>) -> Self {
        Self { signer }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            signer: self.signer.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    signer: Arc<Signer>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        let verified = match bearer {
            None => {
                tracing::debug!("Missing or malformed Authorization header");
                None
            }
            Some(token) => match self.signer.verify(&token) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    tracing::debug!("Bearer token rejected: {}", e);
                    None
                }
            },
        };

        match verified {
            Some(claims) => {
                tracing::debug!(user_id = %claims.sub, jti = %claims.jti, "JWT validated");
                req.extensions_mut().insert(claims);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            None => {
                // Same answer for missing, expired and tampered tokens
                let response = HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "Unauthorized",
                    "code": "UNAUTHORIZED"
                }));
                Box::pin(async move {
                    Err(actix_web::error::InternalError::from_response("Unauthorized", response).into())
                })
            }
        }
    }
}
