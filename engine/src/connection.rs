use crate::config::{PostgresConfig, SqliteConfig};
use crate::sql::{SQLITE_LOWER, SQLITE_NOCASE};
use deadpool_postgres::{
    HookError, Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime,
};
use error::{StoreError, StoreResult};
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value as SqlValue;
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub struct PostgresConnection {
    pub(crate) url: String,
    pub(crate) port: u16,
    pub(crate) db: String,
    pub(crate) user: String,
    pub(crate) password: String,
    pub(crate) command_timeout: Duration,
}

impl PostgresConnection {
    pub fn from_config(config: &PostgresConfig) -> Self {
        PostgresConnection {
            url: config.host.clone(),
            port: config.port,
            db: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            command_timeout: config.common.command_timeout(),
        }
    }

    fn config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.url)
            .port(self.port)
            .dbname(&self.db)
            .user(&self.user)
            .password(&self.password)
            .connect_timeout(self.command_timeout)
            .options(&format!(
                "-c statement_timeout={}",
                self.command_timeout.as_millis()
            ));
        config
    }
}

/// Postgres clients pooled by deadpool. Closed clients are dropped on
/// recycle, so are clients older than the configured lifetime.
pub(crate) struct PgPool {
    pool: Pool,
}

impl PgPool {
    pub(crate) fn new(connector: PostgresConnection, size: usize, lifetime: Option<Duration>) -> StoreResult<Self> {
        let manager = Manager::from_config(
            connector.config(),
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let mut builder = Pool::builder(manager)
            .max_size(size.max(1))
            .runtime(Runtime::Tokio1)
            .create_timeout(Some(connector.command_timeout))
            .wait_timeout(Some(connector.command_timeout));
        if let Some(lifetime) = lifetime {
            builder = builder.pre_recycle(deadpool_postgres::Hook::sync_fn(move |_, metrics| {
                if metrics.age() > lifetime {
                    debug!("retiring postgres client after {:?}", metrics.age());
                    return Err(HookError::Message("connection lifetime exceeded".into()));
                }
                Ok(())
            }));
        }
        let pool = builder.build().map_err(StoreError::backend)?;
        Ok(PgPool { pool })
    }

    pub(crate) async fn get(&self) -> StoreResult<Object> {
        self.pool.get().await.map_err(StoreError::backend)
    }

    pub(crate) fn close(&self) {
        self.pool.close();
    }
}

/// Lowering and comparing follow the unicode case mapping, the built-in
/// `lower()` and `NOCASE` only fold ASCII.
fn register_case_folding(connection: &Connection) -> rusqlite::Result<()> {
    connection.create_scalar_function(
        SQLITE_LOWER,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |context| {
            Ok(match SqlValue::try_from(context.get_raw(0))? {
                SqlValue::Text(text) => SqlValue::Text(text.to_lowercase()),
                other => other,
            })
        },
    )?;
    connection.create_collation(SQLITE_NOCASE, |a, b| a.to_lowercase().cmp(&b.to_lowercase()))
}

/// Opens the connections of the sqlite pool.
pub(crate) struct SqliteManager {
    path: String,
    in_memory: bool,
    busy_timeout: Duration,
}

impl r2d2::ManageConnection for SqliteManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let connection = if self.in_memory {
            Connection::open_in_memory()
        } else {
            Connection::open(&self.path)
        }?;
        connection.busy_timeout(self.busy_timeout)?;
        register_case_folding(&connection)?;
        Ok(connection)
    }

    fn is_valid(&self, connection: &mut Connection) -> Result<(), rusqlite::Error> {
        connection.execute_batch("")
    }

    fn has_broken(&self, _connection: &mut Connection) -> bool {
        false
    }
}

/// Blocking sqlite connections pooled by r2d2, work runs on the blocking pool.
#[derive(Clone)]
pub(crate) struct SqlitePool {
    pool: r2d2::Pool<SqliteManager>,
}

impl SqlitePool {
    pub(crate) fn open(config: &SqliteConfig) -> StoreResult<Self> {
        // every in-memory connection is a database of its own, it has to live as long as the pool
        let size = if config.is_in_memory() {
            1
        } else {
            config.pool_size.max(1)
        };
        let manager = SqliteManager {
            path: config.path.clone(),
            in_memory: config.is_in_memory(),
            busy_timeout: config.common.command_timeout(),
        };
        let pool = r2d2::Pool::builder()
            .max_size(size as u32)
            .min_idle(Some(1))
            .max_lifetime(None)
            .idle_timeout(None)
            .connection_timeout(config.common.command_timeout())
            .build(manager)
            .map_err(StoreError::backend)?;
        Ok(SqlitePool { pool })
    }

    pub(crate) async fn run<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(StoreError::backend)?;
            work(&mut connection)
        })
        .await
        .map_err(StoreError::backend)?
    }
}
