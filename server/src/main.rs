use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};

use dubsync_server::config::ServerConfig;
use dubsync_server::connection::ws_index;
use dubsync_server::server::spawn_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::from_env();
    log::info!(
        "serving episodes from {} on {}:{}",
        config.media_dir.display(),
        config.host,
        config.port
    );

    let srv_tx = spawn_server(&config);

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(srv_tx.clone()))
            .route("/ws/", web::get().to(ws_index))
    })
    .bind(config.bind_address())?
    .run()
    .await
}
