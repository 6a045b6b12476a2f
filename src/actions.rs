use diesel::prelude::*;
use diesel::result::Error;

use crate::models;

pub fn get_role_by_name(
    role_name: &str,
    conn: &SqliteConnection,
) -> Result<Option<models::Role>, Error> {
    use crate::schema::roles::dsl::*;
    roles
        .filter(name.eq(role_name))
        .first::<models::Role>(conn)
        .optional()
}

pub fn get_role(role_id: &str, conn: &SqliteConnection) -> Result<models::Role, Error> {
    use crate::schema::roles::dsl::*;
    roles.filter(id.eq(role_id)).first::<models::Role>(conn)
}

pub fn insert_new_role(role_name: &str, conn: &SqliteConnection) -> Result<models::Role, Error> {
    use crate::schema::roles::dsl::*;
    let new_role = models::Role {
        id: models::generate_id(),
        name: role_name.to_string(),
    };
    diesel::insert_into(roles).values(&new_role).execute(conn)?;
    Ok(new_role)
}

pub fn get_user_from_login(
    login_to_query: &str,
    conn: &SqliteConnection,
) -> Result<Option<models::User>, Error> {
    use crate::schema::users::dsl::*;
    match users
        .filter(login.eq(login_to_query))
        .first::<models::User>(conn)
    {
        Ok(user) => Ok(Some(user)),
        Err(Error::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn email_exists(email_to_query: &str, conn: &SqliteConnection) -> Result<bool, Error> {
    use crate::schema::users::dsl::*;
    let matches = users
        .filter(email.eq(email_to_query))
        .select(diesel::dsl::count_star())
        .first::<i64>(conn)?;

    Ok(matches > 0)
}

pub fn insert_new_user(new_user: &models::User, conn: &SqliteConnection) -> Result<(), Error> {
    use crate::schema::users::dsl::*;
    diesel::insert_into(users).values(new_user).execute(conn)?;
    Ok(())
}

pub fn storage_id_exists(storage_id_val: &str, conn: &SqliteConnection) -> Result<bool, Error> {
    use crate::schema::files::dsl::*;
    let matches = files
        .filter(storage_id.eq(storage_id_val))
        .select(diesel::dsl::count_star())
        .first::<i64>(conn)?;

    Ok(matches > 0)
}

pub fn insert_new_file(new_file: &models::File, conn: &SqliteConnection) -> Result<(), Error> {
    use crate::schema::files::dsl::*;
    diesel::insert_into(files).values(new_file).execute(conn)?;
    Ok(())
}

#[cfg(test)]
pub fn count_files(conn: &SqliteConnection) -> Result<i64, Error> {
    use crate::schema::files::dsl::*;
    files.select(diesel::dsl::count_star()).first(conn)
}

pub fn get_files_for_owner(
    owner: &str,
    conn: &SqliteConnection,
) -> Result<Vec<models::File>, Error> {
    use crate::schema::files::dsl::*;
    files
        .filter(owner_id.eq(owner))
        .order(creation_date)
        .get_results(conn)
}

pub fn get_file(file_id: &str, conn: &SqliteConnection) -> Result<models::File, Error> {
    use crate::schema::files::dsl::*;
    files.filter(id.eq(file_id)).first::<models::File>(conn)
}

pub fn get_file_for_owner(
    file_id: &str,
    owner: &str,
    conn: &SqliteConnection,
) -> Result<Option<models::File>, Error> {
    use crate::schema::files::dsl::*;
    files
        .filter(id.eq(file_id).and(owner_id.eq(owner)))
        .first::<models::File>(conn)
        .optional()
}

pub fn token_identifier_exists(
    identifier_val: &str,
    conn: &SqliteConnection,
) -> Result<bool, Error> {
    use crate::schema::file_tokens::dsl::*;
    let matches = file_tokens
        .filter(identifier.eq(identifier_val))
        .select(diesel::dsl::count_star())
        .first::<i64>(conn)?;

    Ok(matches > 0)
}

pub fn insert_new_file_token(
    new_token: &models::FileToken,
    conn: &SqliteConnection,
) -> Result<(), Error> {
    use crate::schema::file_tokens::dsl::*;
    diesel::insert_into(file_tokens)
        .values(new_token)
        .execute(conn)?;
    Ok(())
}

pub fn get_tokens_for_file(
    file: &str,
    conn: &SqliteConnection,
) -> Result<Vec<models::FileToken>, Error> {
    use crate::schema::file_tokens::dsl::*;
    file_tokens
        .filter(file_id.eq(file))
        .order(creation_date)
        .get_results(conn)
}

pub fn get_token_by_identifier(
    identifier_val: &str,
    conn: &SqliteConnection,
) -> Result<Option<models::FileToken>, Error> {
    use crate::schema::file_tokens::dsl::*;
    file_tokens
        .filter(identifier.eq(identifier_val))
        .first::<models::FileToken>(conn)
        .optional()
}

/// Counts one download. Returns the number of rows touched, which is zero
/// when the token was revoked or its ceiling reached in the meantime.
pub fn increment_token_downloads(token_id: &str, conn: &SqliteConnection) -> Result<usize, Error> {
    use crate::schema::file_tokens::dsl::*;
    let target = file_tokens.filter(
        id.eq(token_id)
            .and(valid.eq(true))
            .and(downloads_max.eq(0).or(downloads_total.lt(downloads_max))),
    );

    diesel::update(target)
        .set(downloads_total.eq(downloads_total + 1))
        .execute(conn)
}

pub fn set_token_validity(
    token_id: &str,
    is_valid: bool,
    conn: &SqliteConnection,
) -> Result<(), Error> {
    use crate::schema::file_tokens::dsl::*;
    diesel::update(file_tokens.filter(id.eq(token_id)))
        .set(valid.eq(is_valid))
        .execute(conn)?;
    Ok(())
}
