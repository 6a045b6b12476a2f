use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection};

use crate::actions;
use crate::config::AdminAccount;
use crate::error::{ShareError, StartupError};
use crate::storage::Storage;

pub const ADMIN_ROLE: &str = "administration";
pub const USER_ROLE: &str = "user";

const BUSY_TIMEOUT_MS: u32 = 5_000;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

embed_migrations!();

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        configure_connection(conn).map_err(diesel::r2d2::Error::QueryError)
    }
}

/// SQLite leaves foreign keys off unless asked per connection.
pub fn configure_connection(conn: &SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(&format!(
        "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
        BUSY_TIMEOUT_MS
    ))
}

pub fn create_pool(database_url: &str) -> Result<DbPool, StartupError> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)?;
    Ok(pool)
}

/// Brings the schema up to date and makes sure the fixed roles exist.
pub fn prepare(conn: &SqliteConnection) -> Result<(), ShareError> {
    embedded_migrations::run(conn)?;

    for role_name in &[ADMIN_ROLE, USER_ROLE] {
        if actions::get_role_by_name(role_name, conn)?.is_none() {
            actions::insert_new_role(role_name, conn)?;
            log::info!("Created role '{}'", role_name);
        }
    }

    Ok(())
}

pub fn bootstrap_admin(
    conn: &SqliteConnection,
    storage: &Storage,
    admin: &AdminAccount,
) -> Result<(), ShareError> {
    if actions::get_user_from_login(&admin.login, conn)?.is_some() {
        return Ok(());
    }

    crate::accounts::create_user(
        conn,
        storage,
        crate::accounts::NewAccount {
            login: &admin.login,
            name: None,
            password: &admin.password,
            email: None,
        },
        ADMIN_ROLE,
    )?;
    Ok(())
}
