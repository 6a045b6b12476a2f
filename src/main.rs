#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;

use actix_web::http::header::{
    self, Charset, ContentDisposition, DispositionParam, DispositionType, ExtendedValue,
    HeaderValue,
};
use actix_web::{get, middleware, post, web, App, HttpRequest, HttpResponse, HttpServer};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use sodiumoxide::base64;
use tokio_util::codec::{BytesCodec, FramedRead};

mod accounts;
mod actions;
mod config;
mod db;
mod error;
mod models;
mod password;
mod registration;
mod schema;
mod storage;
#[cfg(test)]
mod test_support;
mod tokens;

use db::DbPool;
use error::ShareError;
use storage::{Storage, UploadedFile};

#[derive(Deserialize)]
struct SignupRequestPayload {
    login: String,
    name: Option<String>,
    password: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct RegisterFileRequestPayload {
    name: String,
}

#[derive(Deserialize)]
struct IssueTokenRequestPayload {
    #[serde(default)]
    max_downloads: i32,
}

#[derive(Serialize)]
struct Profile {
    login: String,
    name: Option<String>,
    email: Option<String>,
    role: String,
}

#[derive(Serialize)]
struct UploadList {
    items: Vec<UploadedFile>,
}

#[derive(Serialize)]
struct FileList {
    items: Vec<models::File>,
}

#[derive(Serialize)]
struct TokenList {
    items: Vec<models::FileToken>,
}

fn basic_credentials(req: &HttpRequest) -> Result<(String, String), ShareError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ShareError::AuthenticationFailure)?;

    let encoded = value
        .strip_prefix("Basic ")
        .ok_or(ShareError::AuthenticationFailure)?;
    let decoded = base64::decode(encoded.trim(), base64::Variant::Original)
        .map_err(|_| ShareError::AuthenticationFailure)?;
    let decoded = String::from_utf8(decoded).map_err(|_| ShareError::AuthenticationFailure)?;

    let mut parts = decoded.splitn(2, ':');
    match (parts.next(), parts.next()) {
        (Some(login), Some(password)) if !login.is_empty() => {
            Ok((login.to_string(), password.to_string()))
        }
        _ => Err(ShareError::AuthenticationFailure),
    }
}

async fn current_user(
    req: &HttpRequest,
    pool: &web::Data<DbPool>,
) -> Result<models::User, ShareError> {
    let (login, password) = basic_credentials(req)?;
    let pool = pool.clone();
    let user = web::block(move || -> Result<models::User, ShareError> {
        let conn = pool.get()?;
        accounts::authenticate(&conn, &login, &password)
    })
    .await?;
    Ok(user)
}

#[post("/users")]
async fn signup(
    pool: web::Data<DbPool>,
    storage: web::Data<Storage>,
    payload: web::Json<SignupRequestPayload>,
) -> Result<HttpResponse, ShareError> {
    let payload = payload.into_inner();
    let user = web::block(move || -> Result<models::User, ShareError> {
        let conn = pool.get()?;
        accounts::create_user(
            &conn,
            &storage,
            accounts::NewAccount {
                login: &payload.login,
                name: payload.name.as_deref(),
                password: &payload.password,
                email: payload.email.as_deref(),
            },
            db::USER_ROLE,
        )
    })
    .await?;

    Ok(HttpResponse::Created().json(Profile {
        login: user.login,
        name: user.name,
        email: user.email,
        role: db::USER_ROLE.to_string(),
    }))
}

#[get("/my/profile")]
async fn my_profile(req: HttpRequest, pool: web::Data<DbPool>) -> Result<HttpResponse, ShareError> {
    let user = current_user(&req, &pool).await?;
    let role_id = user.role_id.clone();
    let role = web::block(move || -> Result<models::Role, ShareError> {
        let conn = pool.get()?;
        Ok(actions::get_role(&role_id, &conn)?)
    })
    .await?;

    Ok(HttpResponse::Ok().json(Profile {
        login: user.login,
        name: user.name,
        email: user.email,
        role: role.name,
    }))
}

#[get("/my/uploads")]
async fn my_uploads(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    storage: web::Data<Storage>,
) -> Result<HttpResponse, ShareError> {
    let user = current_user(&req, &pool).await?;
    let items = web::block(move || -> Result<Vec<UploadedFile>, ShareError> {
        Ok(storage.unregistered_files(&user.login)?.collect())
    })
    .await?;

    Ok(HttpResponse::Ok().json(UploadList { items }))
}

#[get("/my/files")]
async fn my_files(req: HttpRequest, pool: web::Data<DbPool>) -> Result<HttpResponse, ShareError> {
    let user = current_user(&req, &pool).await?;
    let items = web::block(move || -> Result<Vec<models::File>, ShareError> {
        let conn = pool.get()?;
        Ok(actions::get_files_for_owner(&user.id, &conn)?)
    })
    .await?;

    Ok(HttpResponse::Ok().json(FileList { items }))
}

#[post("/my/files")]
async fn register_file(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    storage: web::Data<Storage>,
    payload: web::Json<RegisterFileRequestPayload>,
) -> Result<HttpResponse, ShareError> {
    let user = current_user(&req, &pool).await?;
    let filename = payload.into_inner().name;
    let file = web::block(move || -> Result<models::File, ShareError> {
        let conn = pool.get()?;
        registration::register_file(&conn, &storage, &user, &filename)
    })
    .await?;

    Ok(HttpResponse::Created().json(file))
}

#[get("/my/files/{file_id}/tokens")]
async fn file_tokens(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    file_id: web::Path<String>,
) -> Result<HttpResponse, ShareError> {
    let user = current_user(&req, &pool).await?;
    let file_id = file_id.into_inner();
    let items = web::block(move || -> Result<Vec<models::FileToken>, ShareError> {
        let conn = pool.get()?;
        let file = actions::get_file_for_owner(&file_id, &user.id, &conn)?
            .ok_or(ShareError::NotFound("File"))?;
        Ok(actions::get_tokens_for_file(&file.id, &conn)?)
    })
    .await?;

    Ok(HttpResponse::Ok().json(TokenList { items }))
}

#[post("/my/files/{file_id}/tokens")]
async fn issue_token(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    file_id: web::Path<String>,
    payload: web::Json<IssueTokenRequestPayload>,
) -> Result<HttpResponse, ShareError> {
    let user = current_user(&req, &pool).await?;
    let file_id = file_id.into_inner();
    let max_downloads = payload.max_downloads;
    let token = web::block(move || -> Result<models::FileToken, ShareError> {
        let conn = pool.get()?;
        let file = actions::get_file_for_owner(&file_id, &user.id, &conn)?
            .ok_or(ShareError::NotFound("File"))?;
        tokens::issue_token(&conn, &file, max_downloads)
    })
    .await?;

    Ok(HttpResponse::Created().json(token))
}

#[post("/my/tokens/{identifier}/revoke")]
async fn revoke_token(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    identifier: web::Path<String>,
) -> Result<HttpResponse, ShareError> {
    let user = current_user(&req, &pool).await?;
    let identifier = identifier.into_inner();
    let token = web::block(move || -> Result<models::FileToken, ShareError> {
        let conn = pool.get()?;
        tokens::revoke_token(&conn, &user, &identifier)
    })
    .await?;

    Ok(HttpResponse::Ok().json(token))
}

/// Attachment header carrying the UTF-8 name percent-encoded, plus a plain
/// ASCII fallback for clients that ignore `filename*`.
fn content_disposition(name: &str) -> ContentDisposition {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();

    ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![
            DispositionParam::Filename(fallback),
            DispositionParam::FilenameExt(ExtendedValue {
                charset: Charset::Ext("UTF-8".to_string()),
                language_tag: None,
                value: name.as_bytes().to_vec(),
            }),
        ],
    }
}

#[get("/download/{identifier}")]
async fn download(
    pool: web::Data<DbPool>,
    storage: web::Data<Storage>,
    identifier: web::Path<String>,
) -> Result<HttpResponse, ShareError> {
    let identifier = identifier.into_inner();
    let (disposition, handle) =
        web::block(move || -> Result<(HeaderValue, std::fs::File), ShareError> {
            let conn = pool.get()?;
            // the header is built before the download counts
            tokens::redeem_token(&conn, &storage, &identifier, |file, content| {
                let disposition = content_disposition(&file.name).to_string();
                let disposition = HeaderValue::from_str(&disposition)
                    .map_err(|_| ShareError::InvalidFileName(file.name.clone()))?;
                Ok((disposition, content))
            })
        })
        .await?;

    let handle = tokio::fs::File::from_std(handle);
    let stream = FramedRead::new(handle, BytesCodec::new()).map_ok(web::BytesMut::freeze);

    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .header(header::CONTENT_DISPOSITION, disposition)
        .streaming(stream))
}

fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(signup)
        .service(my_profile)
        .service(my_uploads)
        .service(my_files)
        .service(register_file)
        .service(file_tokens)
        .service(issue_token)
        .service(revoke_token)
        .service(download);
}

fn exit_on_startup_error(error: impl std::fmt::Display) -> ! {
    log::error!("{}", error);
    eprintln!("{}", error);
    std::process::exit(1);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("actix_web=info,share_server=info"),
    )
    .init();

    let config = config::Config::from_env().unwrap_or_else(|e| exit_on_startup_error(e));
    if sodiumoxide::init().is_err() {
        exit_on_startup_error(error::StartupError::Sodium);
    }

    let storage = Storage::new(&config.upload_dir, &config.storage_dir);
    if let Err(e) = storage.check_permissions() {
        exit_on_startup_error(e);
    }

    // Set up database connection pool
    let pool = db::create_pool(&config.database_url).unwrap_or_else(|e| exit_on_startup_error(e));
    {
        let conn = pool.get().unwrap_or_else(|e| exit_on_startup_error(e));
        db::prepare(&conn).unwrap_or_else(|e| exit_on_startup_error(e));
        if let Some(admin) = &config.admin {
            db::bootstrap_admin(&conn, &storage, admin)
                .unwrap_or_else(|e| exit_on_startup_error(e));
        }
    }

    log::info!("Listening on {}", config.bind_address);
    HttpServer::new(move || {
        App::new()
            .data(pool.clone())
            .data(storage.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(&config.bind_address)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use tempfile::TempDir;

    struct Server {
        pool: DbPool,
        storage: Storage,
        _dirs: (TempDir, TempDir, TempDir),
    }

    fn server() -> Server {
        sodiumoxide::init().unwrap();
        let db_dir = tempfile::tempdir().unwrap();
        let upload_dir = tempfile::tempdir().unwrap();
        let storage_dir = tempfile::tempdir().unwrap();

        let pool = db::create_pool(db_dir.path().join("share.db").to_str().unwrap()).unwrap();
        db::prepare(&pool.get().unwrap()).unwrap();

        Server {
            pool,
            storage: Storage::new(upload_dir.path(), storage_dir.path()),
            _dirs: (db_dir, upload_dir, storage_dir),
        }
    }

    fn basic(login: &str, password: &str) -> String {
        let encoded = base64::encode(
            format!("{}:{}", login, password).as_bytes(),
            base64::Variant::Original,
        );
        format!("Basic {}", encoded)
    }

    #[actix_rt::test]
    async fn credentials_are_parsed_from_the_header() {
        let req = test::TestRequest::default()
            .header(header::AUTHORIZATION, basic("alice", "pa:ss"))
            .to_http_request();
        let (login, password) = basic_credentials(&req).unwrap();
        assert_eq!(login, "alice");
        assert_eq!(password, "pa:ss");

        let req = test::TestRequest::default()
            .header(header::AUTHORIZATION, "Bearer abc")
            .to_http_request();
        assert!(matches!(
            basic_credentials(&req),
            Err(ShareError::AuthenticationFailure)
        ));
    }

    #[test]
    fn disposition_header_is_always_valid() {
        let value = content_disposition("a\nb \"c\".txt").to_string();
        assert_eq!(
            value,
            "attachment; filename=\"a_b _c_.txt\"; filename*=UTF-8''a%0Ab%20%22c%22.txt"
        );
        assert!(HeaderValue::from_str(&value).is_ok());

        let value = content_disposition("résumé.pdf").to_string();
        assert!(value.contains("filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[actix_rt::test]
    async fn control_characters_in_names_still_download() {
        let server = server();
        let conn = server.pool.get().unwrap();
        let alice = accounts::create_user(
            &conn,
            &server.storage,
            accounts::NewAccount {
                login: "alice",
                name: None,
                password: "secret",
                email: None,
            },
            db::USER_ROLE,
        )
        .unwrap();
        std::fs::write(
            server.storage.user_upload_dir("alice").join("a\nb.txt"),
            b"line break",
        )
        .unwrap();
        let file = registration::register_file(&conn, &server.storage, &alice, "a\nb.txt").unwrap();
        let token = tokens::issue_token(&conn, &file, 1).unwrap();

        let mut app = test::init_service(
            App::new()
                .data(server.pool.clone())
                .data(server.storage.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/download/{}", token.identifier))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp.headers().get(header::CONTENT_DISPOSITION).unwrap();
        assert!(disposition
            .to_str()
            .unwrap()
            .ends_with("filename*=UTF-8''a%0Ab.txt"));
        assert_eq!(&test::read_body(resp).await[..], b"line break");

        let stored = actions::get_token_by_identifier(&token.identifier, &conn)
            .unwrap()
            .unwrap();
        assert_eq!(stored.downloads_total, 1);

        let req = test::TestRequest::get()
            .uri(&format!("/download/{}", token.identifier))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::GONE);
    }

    #[actix_rt::test]
    async fn share_flow_over_http() {
        let server = server();
        let storage = server.storage.clone();
        let mut app = test::init_service(
            App::new()
                .data(server.pool.clone())
                .data(server.storage.clone())
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/users")
            .set_json(&serde_json::json!({
                "login": "alice",
                "password": "secret",
                "email": "alice@example.org"
            }))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        std::fs::write(
            storage.user_upload_dir("alice").join("photo.png"),
            vec![9u8; 1024],
        )
        .unwrap();

        let req = test::TestRequest::get()
            .uri("/my/uploads")
            .header(header::AUTHORIZATION, basic("alice", "secret"))
            .to_request();
        let uploads: serde_json::Value = test::read_response_json(&mut app, req).await;
        assert_eq!(uploads["items"][0]["name"], "photo.png");
        assert_eq!(uploads["items"][0]["size"], 1024);
        assert!(uploads["items"][0].get("path").is_none());

        let req = test::TestRequest::post()
            .uri("/my/files")
            .header(header::AUTHORIZATION, basic("alice", "wrong"))
            .set_json(&serde_json::json!({ "name": "photo.png" }))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/my/files")
            .header(header::AUTHORIZATION, basic("alice", "secret"))
            .set_json(&serde_json::json!({ "name": "missing.txt" }))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/my/files")
            .header(header::AUTHORIZATION, basic("alice", "secret"))
            .set_json(&serde_json::json!({ "name": "photo.png" }))
            .to_request();
        let file: serde_json::Value = test::read_response_json(&mut app, req).await;
        assert_eq!(file["size"], 1024);
        let file_id = file["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri(&format!("/my/files/{}/tokens", file_id))
            .header(header::AUTHORIZATION, basic("alice", "secret"))
            .set_json(&serde_json::json!({ "max_downloads": 1 }))
            .to_request();
        let token: serde_json::Value = test::read_response_json(&mut app, req).await;
        let identifier = token["identifier"].as_str().unwrap().to_string();
        assert_eq!(identifier.len(), tokens::TOKEN_IDENTIFIER_LEN);

        let req = test::TestRequest::get()
            .uri(&format!("/download/{}", identifier))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert_eq!(body.len(), 1024);

        let req = test::TestRequest::get()
            .uri(&format!("/download/{}", identifier))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::GONE);
    }
}
