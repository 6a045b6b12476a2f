use std::fs;
use std::io;

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use rand::{thread_rng, Rng};

use crate::actions;
use crate::error::ShareError;
use crate::models::{File, FileToken, User};
use crate::storage::Storage;

pub const TOKEN_IDENTIFIER_LEN: usize = 20;
pub const TOKEN_ALPHABET: &[u8] = b"acemnorsuvwxz1234567890";

const TOKEN_IDENTIFIER_ATTEMPTS: usize = 8;

pub fn generate_token_identifier() -> String {
    let mut rng = thread_rng();
    (0..TOKEN_IDENTIFIER_LEN)
        .map(|_| char::from(TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())]))
        .collect()
}

/// Creates a new valid token for `file`. `max_downloads == 0` means the
/// token can be used any number of times.
pub fn issue_token(
    conn: &SqliteConnection,
    file: &File,
    max_downloads: i32,
) -> Result<FileToken, ShareError> {
    if max_downloads < 0 {
        return Err(ShareError::InvalidDownloadLimit(max_downloads));
    }

    for _ in 0..TOKEN_IDENTIFIER_ATTEMPTS {
        let identifier = generate_token_identifier();
        if actions::token_identifier_exists(&identifier, conn)? {
            log::warn!("Token identifier collision, retrying");
            continue;
        }

        let token = FileToken::new(file, identifier, max_downloads);
        match actions::insert_new_file_token(&token, conn) {
            Ok(()) => {
                log::info!(
                    "Issued token {} for file {} (max downloads: {})",
                    token.identifier,
                    file.id,
                    token.downloads_max
                );
                return Ok(token);
            }
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                log::warn!("Token identifier taken concurrently, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ShareError::IdentifierExhausted("token identifier"))
}

/// Checks a token for a download and counts it. Revoked tokens and tokens
/// at their ceiling are refused. The stored file is opened and handed to
/// `prepare` first; the download is only counted once both succeeded.
pub fn redeem_token<T, F>(
    conn: &SqliteConnection,
    storage: &Storage,
    identifier: &str,
    prepare: F,
) -> Result<T, ShareError>
where
    F: FnOnce(&File, fs::File) -> Result<T, ShareError>,
{
    conn.transaction::<_, ShareError, _>(|| {
        let token =
            actions::get_token_by_identifier(identifier, conn)?.ok_or(ShareError::TokenNotFound)?;
        token.check_redeemable()?;

        let file = actions::get_file(&token.file_id, conn)?;
        let content = match storage.open_stored(&file.storage_id) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ShareError::StorageFileMissing(file.storage_id))
            }
            Err(e) => return Err(e.into()),
        };
        let prepared = prepare(&file, content)?;

        if actions::increment_token_downloads(&token.id, conn)? == 0 {
            // lost a race against another download or a revocation
            let current = actions::get_token_by_identifier(identifier, conn)?
                .ok_or(ShareError::TokenNotFound)?;
            current.check_redeemable()?;
            return Err(ShareError::DownloadLimitReached);
        }

        log::info!("Token {} redeemed for file {}", identifier, file.id);
        Ok(prepared)
    })
}

/// Marks a token of one of `owner`'s files as no longer usable.
pub fn revoke_token(
    conn: &SqliteConnection,
    owner: &User,
    identifier: &str,
) -> Result<FileToken, ShareError> {
    let mut token =
        actions::get_token_by_identifier(identifier, conn)?.ok_or(ShareError::TokenNotFound)?;
    if actions::get_file_for_owner(&token.file_id, &owner.id, conn)?.is_none() {
        return Err(ShareError::TokenNotFound);
    }

    actions::set_token_validity(&token.id, false, conn)?;
    token.valid = false;
    log::info!("Token {} revoked by '{}'", identifier, owner.login);
    Ok(token)
}
