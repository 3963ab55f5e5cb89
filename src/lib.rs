pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;
pub mod validation;

use actix_web::web;

/// Route table shared by the binary and the integration tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health_check))
        .route("/auth/register", web::post().to(handlers::auth::register))
        .route("/auth/login", web::post().to(handlers::auth::login))
        .route("/auth/refresh", web::post().to(handlers::auth::refresh))
        .route("/users", web::get().to(handlers::users::list_users))
        .route(
            "/users/info-card",
            web::post().to(handlers::info_cards::create_info_card),
        )
        .route(
            "/users/info-card/{id}",
            web::patch().to(handlers::info_cards::update_info_card),
        )
        .route("/users/{id}", web::get().to(handlers::users::get_user))
        .route("/users/{id}", web::patch().to(handlers::users::update_user))
        .route("/users/{id}", web::delete().to(handlers::users::delete_user))
        .route("/assign-flat", web::post().to(handlers::users::assign_flat))
        .route("/flats", web::get().to(handlers::flats::list_flats))
        .route("/flats", web::post().to(handlers::flats::create_flat))
        .route("/flats/{id}", web::get().to(handlers::flats::get_flat))
        .route("/flats/{id}", web::patch().to(handlers::flats::update_flat))
        .route(
            "/flats/{id}/images",
            web::post().to(handlers::flats::add_images),
        )
        .route(
            "/flats/{id}/images/{image_id}",
            web::delete().to(handlers::flats::remove_image),
        )
        .route("/products", web::get().to(handlers::products::list_products))
        .route(
            "/products",
            web::post().to(handlers::products::create_product),
        )
        .route(
            "/products/{id}",
            web::get().to(handlers::products::get_product),
        )
        .route(
            "/products/{id}",
            web::patch().to(handlers::products::update_product),
        )
        .route(
            "/products/{id}",
            web::delete().to(handlers::products::delete_product),
        )
        .route(
            "/questions/change-status/{id}",
            web::post().to(handlers::questions::change_status),
        )
        .route(
            "/questions",
            web::get().to(handlers::questions::list_questions),
        )
        .route(
            "/questions",
            web::post().to(handlers::questions::create_question),
        )
        .route(
            "/questions/{id}",
            web::get().to(handlers::questions::get_question),
        )
        .route(
            "/questions/{id}",
            web::patch().to(handlers::questions::update_question),
        )
        .route(
            "/questions/{id}",
            web::delete().to(handlers::questions::delete_question),
        )
        .route(
            "/uploads/{name}",
            web::get().to(handlers::files::serve_upload),
        );
}
