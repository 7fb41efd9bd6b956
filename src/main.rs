// src/main.rs
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use fleetms::config::Config;
use fleetms::handlers;
use fleetms::manager::ServerManager;
use fleetms::utils::{ActionLimiter, AdminNetworks, ReadLimiter};
use governor::RateLimiter;
use log::{error, info};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    // Initialize logger only once at the start
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env();
    info!("Managing servers under {}", config.servers_path.display());

    // Scans and actions run on this runtime; HTTP workers only queue requests.
    let manager = web::Data::new(ServerManager::open(config.manager_options()).await);
    let networks = web::Data::new(AdminNetworks(config.admin_allowed_networks.clone()));
    let action_limiter = web::Data::new(ActionLimiter(RateLimiter::keyed(config.action_quota())));
    let read_limiter = web::Data::new(ReadLimiter(RateLimiter::keyed(config.read_quota())));

    let bind = config.bind();
    info!("Starting admin server on {}", bind);
    let app_manager = manager.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_manager.clone())
            .app_data(networks.clone())
            .app_data(action_limiter.clone())
            .app_data(read_limiter.clone())
            .route("/", web::get().to(handlers::index::index))
            .route("/servers", web::get().to(handlers::servers::list_servers))
            .route("/servers/online", web::get().to(handlers::servers::online_servers))
            .route("/servers/offline", web::get().to(handlers::servers::offline_servers))
            .route("/servers/rcon", web::get().to(handlers::servers::rcon_servers))
            .route("/servers/{name}", web::get().to(handlers::servers::get_server))
            .route("/servers/{name}/start", web::post().to(handlers::actions::start_server))
            .route("/servers/{name}/stop", web::post().to(handlers::actions::stop_server))
            .route("/servers/{name}/rcon", web::post().to(handlers::actions::run_rcon))
            .route("/refresh", web::post().to(handlers::actions::refresh))
            .route("/failures", web::get().to(handlers::servers::scan_failures))
    })
    .bind(&bind);

    let result = match server {
        Ok(server) => server.run().await,
        Err(e) => {
            error!("Failed to bind {}: {}", bind, e);
            Err(e)
        }
    };

    manager.close().await;
    result
}
