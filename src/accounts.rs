use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::actions;
use crate::error::ShareError;
use crate::models::{self, User};
use crate::password;
use crate::storage::{self, Storage};

const LOGIN_MAX_LEN: usize = 32;

pub struct NewAccount<'a> {
    pub login: &'a str,
    pub name: Option<&'a str>,
    pub password: &'a str,
    pub email: Option<&'a str>,
}

fn validate_login(login: &str) -> Result<(), ShareError> {
    let allowed = login
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if login.len() > LOGIN_MAX_LEN || login.starts_with('.') || !allowed {
        return Err(ShareError::InvalidLogin(login.to_string()));
    }
    if !storage::is_path_component(login) {
        return Err(ShareError::InvalidLogin(login.to_string()));
    }
    Ok(())
}

/// Creates a user along with their upload directory. If the directory can't
/// be created the user row is rolled back.
pub fn create_user(
    conn: &SqliteConnection,
    storage: &Storage,
    account: NewAccount,
    role_name: &str,
) -> Result<User, ShareError> {
    validate_login(account.login)?;
    if account.password.is_empty() {
        return Err(ShareError::InvalidInput(
            "Password must not be empty".to_string(),
        ));
    }

    let password_hash = password::hash(account.password)?;

    let user = conn.transaction::<_, ShareError, _>(|| {
        let role = actions::get_role_by_name(role_name, conn)?
            .ok_or(ShareError::NotFound("role"))?;

        if actions::get_user_from_login(account.login, conn)?.is_some() {
            return Err(ShareError::UniquenessViolation("login"));
        }
        if let Some(email) = account.email {
            if actions::email_exists(email, conn)? {
                return Err(ShareError::UniquenessViolation("email"));
            }
        }

        let user = User {
            id: models::generate_id(),
            login: account.login.to_string(),
            name: account.name.map(str::to_string),
            password_hash,
            email: account.email.map(str::to_string),
            role_id: role.id,
        };

        actions::insert_new_user(&user, conn).map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                ShareError::UniquenessViolation("login or email")
            }
            e => e.into(),
        })?;

        storage.create_user_upload_dir(&user.login)?;
        Ok(user)
    })?;

    log::info!("Created user '{}'", user.login);
    Ok(user)
}

/// Unknown logins and wrong passwords are indistinguishable to the caller.
pub fn authenticate(
    conn: &SqliteConnection,
    login: &str,
    password: &str,
) -> Result<User, ShareError> {
    match actions::get_user_from_login(login, conn)? {
        Some(user) if password::verify(password, &user.password_hash) => Ok(user),
        _ => Err(ShareError::AuthenticationFailure),
    }
}
