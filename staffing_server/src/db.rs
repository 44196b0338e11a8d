//! Connection pool construction.

use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

pub type DieselPool = Pool<AsyncPgConnection>;

/// Build the PostgreSQL pool. Connections are opened lazily on first use.
pub fn create_pool(database_url: &str, max_size: usize) -> anyhow::Result<DieselPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;
    Ok(pool)
}
