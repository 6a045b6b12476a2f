use std::fs;

use diesel::prelude::*;
use tempfile::TempDir;

use crate::db;
use crate::models::{self, User};
use crate::storage::Storage;

/// In-memory database with the schema applied, plus scratch upload and
/// storage directories that live as long as the fixture.
pub struct Fixture {
    pub conn: SqliteConnection,
    pub storage: Storage,
    _upload_dir: TempDir,
    _storage_dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        sodiumoxide::init().unwrap();
        let conn = SqliteConnection::establish(":memory:").unwrap();
        db::configure_connection(&conn).unwrap();
        db::prepare(&conn).unwrap();

        let upload_dir = tempfile::tempdir().unwrap();
        let storage_dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(upload_dir.path(), storage_dir.path());

        Fixture {
            conn,
            storage,
            _upload_dir: upload_dir,
            _storage_dir: storage_dir,
        }
    }

    /// Inserts a user directly, skipping the password hash.
    pub fn user(&self, login: &str) -> User {
        let role = crate::actions::get_role_by_name(db::USER_ROLE, &self.conn)
            .unwrap()
            .unwrap();
        let user = User {
            id: models::generate_id(),
            login: login.to_string(),
            name: None,
            password_hash: "unused".to_string(),
            email: None,
            role_id: role.id,
        };
        crate::actions::insert_new_user(&user, &self.conn).unwrap();
        self.storage.create_user_upload_dir(login).unwrap();
        user
    }

    pub fn upload(&self, login: &str, name: &str, content: &[u8]) {
        fs::write(self.storage.user_upload_dir(login).join(name), content).unwrap();
    }
}
