use actix_web::web;

pub mod realtime;
pub mod sessions;

pub fn register(cfg: &mut web::ServiceConfig) {
    realtime::register_routes(cfg);
    sessions::register_routes(cfg);
}
