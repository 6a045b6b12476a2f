use chrono::offset::Utc;
use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ShareError;
use crate::schema::{file_tokens, files, roles, users};

pub fn generate_timestamp() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Queryable, Insertable)]
pub struct Role {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Insertable)]
pub struct User {
    pub id: String,
    pub login: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub email: Option<String>,
    pub role_id: String,
}

/// A registered file. `storage_id` is the file's name inside the storage
/// directory.
#[derive(Debug, Clone, PartialEq, Queryable, Insertable, Serialize)]
pub struct File {
    pub id: String,
    pub name: String,
    pub storage_id: String,
    pub creation_date: NaiveDateTime,
    pub size: i64,
    pub owner_id: String,
}

impl File {
    pub fn new(owner: &User, name: &str, storage_id: String, size: i64) -> Self {
        File {
            id: generate_id(),
            name: name.to_string(),
            storage_id,
            creation_date: generate_timestamp(),
            size,
            owner_id: owner.id.clone(),
        }
    }
}

/// Shareable handle for one file. `downloads_max == 0` means unlimited.
#[derive(Debug, Clone, PartialEq, Queryable, Insertable, Serialize)]
pub struct FileToken {
    pub id: String,
    pub identifier: String,
    pub file_id: String,
    pub creation_date: NaiveDateTime,
    pub valid: bool,
    pub downloads_max: i32,
    pub downloads_total: i32,
}

impl FileToken {
    pub fn new(file: &File, identifier: String, downloads_max: i32) -> Self {
        FileToken {
            id: generate_id(),
            identifier,
            file_id: file.id.clone(),
            creation_date: generate_timestamp(),
            valid: true,
            downloads_max,
            downloads_total: 0,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.downloads_max == 0
    }

    pub fn limit_reached(&self) -> bool {
        !self.is_unlimited() && self.downloads_total >= self.downloads_max
    }

    pub fn check_redeemable(&self) -> Result<(), ShareError> {
        if !self.valid {
            Err(ShareError::TokenRevoked)
        } else if self.limit_reached() {
            Err(ShareError::DownloadLimitReached)
        } else {
            Ok(())
        }
    }
}
