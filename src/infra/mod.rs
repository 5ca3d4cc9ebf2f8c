use crate::{adapters::persistence::PostgresPersistence, infra::db::init_db};

pub mod config;
pub mod crypto;
pub mod db;
pub mod dummy_gateway;
pub mod error;
pub mod renewal_worker;
pub mod setup;

pub use error::InfraError;

pub async fn postgres_persistence(database_url: &str) -> anyhow::Result<PostgresPersistence> {
    let pool = init_db(database_url).await?;
    let persistence = PostgresPersistence::new(pool);
    Ok(persistence)
}
