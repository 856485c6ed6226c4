use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer};
use agro_backend::app::build_services;
use agro_backend::config::AppConfig;
use agro_backend::routes::configure_routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let services = match build_services(&config).await {
        Ok(services) => services,
        Err(e) => {
            log::error!("Failed to start services: {}", e);
            std::process::exit(1);
        }
    };

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);
    log::info!("Scan endpoint: {}/api/v1/detect", config.base_url);

    let allowed_origin = config.cors_allowed_origin.clone();
    HttpServer::new(move || {
        let cors = match &allowed_origin {
            Some(origin) => Cors::default().allowed_origin(origin),
            None => Cors::default().allow_any_origin(),
        };
        App::new()
            .wrap(Logger::default())
            .wrap(
                cors.allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .configure(|cfg| configure_routes(cfg, &services))
    })
    .bind(&bind_address)?
    .run()
    .await
}
