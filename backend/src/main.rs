use anyhow::{Context as _, Result};
use backend::{auth::Hasher, config::Config, db::Db, web};
use log::info;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    let db = Db::connect(&config.database_url, config.pool_size)?;
    let services = web::Services::new(db, Hasher::new(config.hash_rounds))
        .context("failed to initialise services")?;

    info!("database: {}", config.database_url);
    info!("listening on http://{}:{}", config.host, config.port);
    info!("live updates on ws://{}:{}/ws", config.host, config.port);

    web::new_http_server(&config, services)
        .await
        .context("http server failed")?;
    Ok(())
}
