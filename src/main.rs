use actix_cors::Cors;
use actix_web::middleware::NormalizePath;
use actix_web::{web, App, HttpServer};

use estate_backend::config::Config;
use estate_backend::state::AppState;
use estate_backend::{db, routes};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    let port = config.port;

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to initialize SQLite pool");
    let app_state = web::Data::new(AppState::new(pool, config));

    println!("estate-backend listening on 0.0.0.0:{}", port);

    HttpServer::new(move || {
        App::new()
            .wrap(NormalizePath::trim())
            .wrap(Cors::permissive())
            .app_data(app_state.clone())
            .configure(routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
