pub mod models;

use anyhow::{anyhow, Context as _};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{Error, Result};
use crate::schema::*;
use models::*;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// What the `measurements` table can hold. Resolved once when the store is
/// opened; databases created before devices existed have no device column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementSchema {
    pub device_ref: bool,
}

impl MeasurementSchema {
    pub const CURRENT: Self = Self { device_ref: true };

    fn detect(conn: &mut SqliteConnection) -> QueryResult<Self> {
        #[derive(QueryableByName)]
        struct Column {
            #[diesel(sql_type = diesel::sql_types::Text)]
            name: String,
        }

        let columns = diesel::sql_query("PRAGMA table_info(measurements)").load::<Column>(conn)?;

        Ok(Self {
            device_ref: columns.iter().any(|c| c.name == "device_id"),
        })
    }
}

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(r2d2::Error::QueryError)
    }
}

#[derive(Clone)]
pub struct Db {
    pool: DbPool,
    schema: MeasurementSchema,
}

impl Db {
    pub fn connect(database_url: &str, pool_size: u32) -> anyhow::Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)
            .with_context(|| format!("failed to open database {database_url}"))?;

        let mut conn = pool.get().context("failed to acquire database connection")?;
        conn.batch_execute("PRAGMA journal_mode = WAL;")
            .context("failed to enable write-ahead log")?;

        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow!("failed to run migrations: {e}"))?;
        for version in applied {
            log::info!("applied migration {version}");
        }

        let schema =
            MeasurementSchema::detect(&mut conn).context("failed to inspect measurements table")?;
        if !schema.device_ref {
            log::warn!(
                "measurements table has no device_id column, readings will be stored without a device"
            );
        }

        Ok(Self { pool, schema })
    }

    pub fn schema(&self) -> MeasurementSchema {
        self.schema
    }

    fn conn(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    // users

    pub fn insert_user(&self, user: &NewUser) -> Result<User> {
        diesel::insert_into(users::table)
            .values(user)
            .returning(User::as_returning())
            .get_result(&mut self.conn()?)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    Error::Conflict("Email already registered".to_owned())
                }
                e => e.into(),
            })
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(&mut self.conn()?)
            .optional()?)
    }

    pub fn users(&self) -> Result<Vec<User>> {
        Ok(users::table
            .order((users::created_at.desc(), users::id.desc()))
            .select(User::as_select())
            .load(&mut self.conn()?)?)
    }

    // devices

    pub fn insert_device(&self, device: &NewDevice) -> Result<Device> {
        diesel::insert_into(devices::table)
            .values(device)
            .returning(Device::as_returning())
            .get_result(&mut self.conn()?)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    Error::Conflict(format!("Device {} already registered", device.device_id))
                }
                DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    Error::Validation(format!("Unknown user_id {:?}", device.user_id))
                }
                e => e.into(),
            })
    }

    pub fn device_by_mac(&self, mac: &str) -> Result<Option<Device>> {
        Ok(devices::table
            .filter(devices::device_id.eq(mac))
            .select(Device::as_select())
            .first(&mut self.conn()?)
            .optional()?)
    }

    pub fn device_by_id(&self, id: i32) -> Result<Option<Device>> {
        Ok(devices::table
            .find(id)
            .select(Device::as_select())
            .first(&mut self.conn()?)
            .optional()?)
    }

    pub fn delete_device(&self, id: i32) -> Result<Option<Device>> {
        Ok(diesel::delete(devices::table.find(id))
            .returning(Device::as_returning())
            .get_result(&mut self.conn()?)
            .optional()?)
    }

    pub fn devices(&self) -> Result<Vec<Device>> {
        Ok(devices::table
            .order((devices::created_at.desc(), devices::id.desc()))
            .select(Device::as_select())
            .load(&mut self.conn()?)?)
    }

    // measurements

    pub fn insert_measurement(&self, mes: &NewMeasurement) -> Result<Measurement> {
        let mut conn = self.conn()?;

        if self.schema.device_ref {
            Ok(diesel::insert_into(measurements::table)
                .values(mes)
                .returning(Measurement::as_returning())
                .get_result(&mut conn)?)
        } else {
            let row = diesel::insert_into(measurements::table)
                .values(NewLegacyMeasurement::from(mes))
                .returning(LegacyMeasurement::as_returning())
                .get_result(&mut conn)?;
            Ok(row.into())
        }
    }

    pub fn latest_measurement(&self) -> Result<Option<Measurement>> {
        Ok(self.measurements(1)?.into_iter().next())
    }

    /// Newest first.
    pub fn measurements(&self, limit: i64) -> Result<Vec<Measurement>> {
        let mut conn = self.conn()?;
        let query = measurements::table
            .order((measurements::created_at.desc(), measurements::id.desc()))
            .limit(limit);

        if self.schema.device_ref {
            Ok(query.select(Measurement::as_select()).load(&mut conn)?)
        } else {
            let rows = query
                .select(LegacyMeasurement::as_select())
                .load::<LegacyMeasurement>(&mut conn)?;
            Ok(rows.into_iter().map(Measurement::from).collect())
        }
    }
}
