use std::convert::TryFrom;

use diesel::prelude::*;
use sodiumoxide::crypto::hash::sha256;
use sodiumoxide::randombytes::randombytes;

use crate::actions;
use crate::error::ShareError;
use crate::models::{File, User};
use crate::storage::{self, Storage};

const STORAGE_ID_SALT_LEN: usize = 10;
const STORAGE_ID_ATTEMPTS: usize = 4;

/// Name a registered file gets inside the storage directory: the hex SHA-256
/// of the original name followed by a few random bytes. Says nothing about
/// the file's content.
pub fn create_storage_id(filename: &str) -> String {
    let mut input = filename.as_bytes().to_vec();
    input.extend_from_slice(&randombytes(STORAGE_ID_SALT_LEN));
    hex::encode(sha256::hash(&input))
}

fn unused_storage_id(
    conn: &SqliteConnection,
    storage: &Storage,
    filename: &str,
) -> Result<String, ShareError> {
    for _ in 0..STORAGE_ID_ATTEMPTS {
        let candidate = create_storage_id(filename);
        if !actions::storage_id_exists(&candidate, conn)? && !storage.storage_file_exists(&candidate)
        {
            return Ok(candidate);
        }
        log::warn!("Storage id collision for '{}', retrying", filename);
    }
    Err(ShareError::IdentifierExhausted("storage id"))
}

/// Moves `filename` from the owner's upload directory into storage and
/// records it. Nothing is written to the database unless the move succeeded;
/// if the insert fails the file is moved back.
pub fn register_file(
    conn: &SqliteConnection,
    storage: &Storage,
    owner: &User,
    filename: &str,
) -> Result<File, ShareError> {
    // anything that is not a plain entry name cannot be in the upload dir
    if !storage::is_path_component(filename) {
        log::info!("Rejected file name {:?} from '{}'", filename, owner.login);
        return Err(ShareError::FileNotFound(filename.to_string()));
    }

    let storage_id = unused_storage_id(conn, storage, filename)?;

    let not_found = |e: std::io::Error| {
        log::info!(
            "Could not register '{}' for '{}': {}",
            filename,
            owner.login,
            e
        );
        ShareError::FileNotFound(filename.to_string())
    };

    let size = storage
        .file_size_bytes(&owner.login, filename)
        .map_err(not_found)?;
    let size = i64::try_from(size).map_err(|_| ShareError::FileTooLarge(filename.to_string()))?;

    storage
        .move_to_storage(&owner.login, filename, &storage_id)
        .map_err(not_found)?;

    let file = File::new(owner, filename, storage_id, size);

    if let Err(e) = actions::insert_new_file(&file, conn) {
        if let Err(restore_error) =
            storage.restore_to_upload_dir(&owner.login, filename, &file.storage_id)
        {
            log::error!(
                "Could not move {} back to the upload dir of '{}' as '{}', kept in storage: {}",
                file.storage_id,
                owner.login,
                filename,
                restore_error
            );
        }
        return Err(e.into());
    }

    log::info!(
        "Registered '{}' of '{}' as {} ({} bytes)",
        file.name,
        owner.login,
        file.storage_id,
        file.size
    );
    Ok(file)
}
