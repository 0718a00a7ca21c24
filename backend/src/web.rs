use actix_cors::Cors;
use actix_web::{
    http::header,
    middleware::Logger,
    web::{self, Data},
    App, HttpServer,
};

use crate::api;
use crate::auth::{Credentials, Hasher};
use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::db::Db;
use crate::devices::DeviceRegistry;
use crate::error::Result;
use crate::ingest::Ingestor;

/// Request-independent handles shared by all workers. The ingestor is wired
/// to the same broadcaster live viewers subscribe to.
#[derive(Clone)]
pub struct Services {
    pub registry: DeviceRegistry,
    pub ingestor: Ingestor,
    pub credentials: Credentials,
    pub broadcaster: Broadcaster,
}

impl Services {
    pub fn new(db: Db, hasher: Hasher) -> Result<Self> {
        let broadcaster = Broadcaster::default();
        let registry = DeviceRegistry::new(db.clone());
        let ingestor = Ingestor::new(db.clone(), registry.clone(), broadcaster.clone());
        let credentials = Credentials::new(db, hasher)?;

        Ok(Self {
            registry,
            ingestor,
            credentials,
            broadcaster,
        })
    }

    /// Registers the shared handles and all routes.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(Data::new(self.registry.clone()))
            .app_data(Data::new(self.ingestor.clone()))
            .app_data(Data::new(self.credentials.clone()))
            .app_data(Data::new(self.broadcaster.clone()));
        api::configure(cfg);
    }
}

/// `*` allows any origin; browsers refuse credentials with a wildcard, so
/// they are only supported for an explicit origin.
fn cors(origin: &str) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
        .allowed_header(header::CONTENT_TYPE)
        .max_age(3600);

    if origin == "*" {
        cors.allow_any_origin()
    } else {
        cors.allowed_origin(origin).supports_credentials()
    }
}

pub async fn new_http_server(config: &Config, services: Services) -> std::io::Result<()> {
    let origin = config.cors_origin.clone();

    HttpServer::new(move || {
        App::new()
            .configure(|cfg| services.configure(cfg))
            .wrap(cors(&origin))
            .wrap(Logger::default())
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
