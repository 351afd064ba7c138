//! Items catalogue backed by MySQL, one connection per request.
//!
//! Run with:
//!   MYSQL__USER=root MYSQL__DATABASE=shop RUST_LOG=tsu_mysql=debug,info \
//!     cargo run --example items
//!
//! Try:
//!   curl -X POST http://localhost:3000/setup
//!   curl -X POST http://localhost:3000/items -d '{"name":"apple","price":"1.20"}'
//!   curl -X POST http://localhost:3000/items -d '{"name":"apple","price":"1.20"}'   # 500 Database Error, rolled back
//!   curl http://localhost:3000/items/apple
//!   curl http://localhost:3000/items/kiwi                                            # 404, nothing committed
//!   curl -X POST http://localhost:3000/items/apple/delete                            # 303, committed
//!   curl http://localhost:3000/readyz

use serde::Deserialize;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use tsu_mysql::db::{Converters, Cursor};
use tsu_mysql::middleware::mysql::{ConnectionConfig, MySqlPlugin};
use tsu_mysql::{Abort, HttpError, Request, Response, Route, Router, Server, StatusCode, health};

#[derive(Deserialize)]
struct NewItem {
    name: String,
    price: String,
}

#[tokio::main]
async fn main() -> Result<(), tsu_mysql::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // DECIMAL arrives as a string; keep it that way but tag the currency.
    let converters = Converters::new().with("DECIMAL", |v| match v {
        Value::String(s) => json!({ "amount": s, "currency": "EUR" }),
        other => other,
    });
    let config = ConnectionConfig::load("MYSQL")?
        .timezone("+00:00")
        .converters(converters);

    let app = Router::new()
        .install(MySqlPlugin::new(config))?
        .route(Route::post("/setup", setup).arg("db"))
        .route(Route::get("/items", list).arg("db").config("mysql.result_as_mapping", false))
        .route(Route::get("/items/{name}", show).arg("db"))
        .route(Route::post("/items", create).arg("db"))
        .route(Route::post("/items/{name}/delete", delete).arg("db"))
        .route(Route::get("/healthz", health::liveness))
        .route(Route::get("/readyz", health::readiness("db")).arg("db"));

    Server::bind("0.0.0.0:3000").serve(app).await
}

fn cursor(req: &mut Request) -> Result<Cursor, Abort> {
    req.take_arg("db").ok_or_else(|| Abort::missing_arg("db"))
}

fn json_body(value: &impl serde::Serialize) -> Response {
    Response::json(serde_json::to_vec(value).unwrap_or_default())
}

// POST /setup
async fn setup(mut req: Request) -> Result<Response, Abort> {
    let mut db = cursor(&mut req)?;
    db.execute(
        "CREATE TABLE IF NOT EXISTS items (
            id    BIGINT AUTO_INCREMENT PRIMARY KEY,
            name  VARCHAR(64) NOT NULL UNIQUE,
            price DECIMAL(10, 2) NOT NULL
        )",
        &[],
    )
    .await?;
    Ok(Response::status(StatusCode::NO_CONTENT))
}

// GET /items → positional rows, per the route overlay
async fn list(mut req: Request) -> Result<Response, Abort> {
    let mut db = cursor(&mut req)?;
    db.execute("SELECT id, name, price FROM items ORDER BY id", &[]).await?;
    Ok(json_body(&db.fetch_all()))
}

// GET /items/{name}
async fn show(mut req: Request) -> Result<Response, Abort> {
    let name = req.param("name").unwrap_or_default().to_owned();
    let mut db = cursor(&mut req)?;

    db.execute("SELECT id, name, price FROM items WHERE name = ?", &[json!(name)]).await?;
    match db.fetch_one() {
        Some(row) => Ok(json_body(&row)),
        None => Err(HttpError::not_found("Page not found").into()),
    }
}

// POST /items — a duplicate name is rolled back and answered with 500
async fn create(mut req: Request) -> Result<Response, Abort> {
    let item: NewItem = serde_json::from_slice(req.body())
        .map_err(|e| HttpError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    let mut db = cursor(&mut req)?;

    db.execute(
        "INSERT INTO items (name, price) VALUES (?, ?)",
        &[json!(item.name), json!(item.price)],
    )
    .await?;

    let location = format!("/items/{}", item.name);
    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("location", &location)
        .json(serde_json::to_vec(&json!({ "id": db.last_insert_id() })).unwrap_or_default()))
}

// POST /items/{name}/delete — redirect is a success signal, so the delete commits
async fn delete(mut req: Request) -> Result<Response, Abort> {
    let name = req.param("name").unwrap_or_default().to_owned();
    let mut db = cursor(&mut req)?;

    db.execute("DELETE FROM items WHERE name = ?", &[json!(name)]).await?;
    Err(Abort::redirect("/items"))
}
