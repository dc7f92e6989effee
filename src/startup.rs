use actix_web::{middleware::Logger, web, App, HttpServer};
use actix_web::dev::Server;
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::AuthServices;
use crate::configuration::JwtSettings;
use crate::error::ConfigError;
use crate::identity::PgIdentityStore;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{get_current_user, health_check, login, refresh_token};
use crate::store::PgRefreshTokenStore;

/// Token services backed by Postgres
pub fn build_services(pool: PgPool, jwt_config: &JwtSettings) -> Result<AuthServices, ConfigError> {
    let store = Arc::new(PgRefreshTokenStore::new(pool.clone()));
    let identity = Arc::new(PgIdentityStore::new(pool));
    AuthServices::new(jwt_config, store, identity)
}

pub fn run(listener: TcpListener, services: AuthServices) -> Result<Server, std::io::Error> {
    let signer = services.signer.clone();
    let services = web::Data::new(services);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(services.clone())

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/account/login", web::post().to(login))
            .route("/account/refresh-token", web::post().to(refresh_token))

            // Protected routes (require a valid access token)
            .service(
                web::resource("/account/me")
                    .wrap(JwtMiddleware::new(signer.clone()))
                    .route(web::get().to(get_current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
