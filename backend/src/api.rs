use actix_web::{
    delete, get, post,
    web::{self, Data},
    HttpRequest, HttpResponse,
};
use actix_ws::{CloseReason, Message};
use chrono::Utc;
use common::req::{HistoryQuery, Login, NewDevice, NewMeasurement, RegisterUser};
use futures_util::StreamExt as _;
use log::{debug, info, warn};
use serde_json::json;

use crate::auth::Credentials;
use crate::broadcast::{Broadcaster, Subscription};
use crate::devices::{DeviceRegistry, DEFAULT_LOCATION, DEFAULT_NAME};
use crate::error::{Error, Result};
use crate::ingest::Ingestor;

fn require<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Validation(message.to_owned())),
    }
}

/// Like `require`, but keeps surrounding whitespace; used for secrets.
fn require_exact<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Validation(message.to_owned())),
    }
}

fn or_default<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => default,
    }
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "OK",
        "message": "Backend is running",
        "timestamp": Utc::now(),
    }))
}

// auth

#[post("/api/auth/register")]
async fn api_register(
    body: web::Json<RegisterUser>,
    credentials: Data<Credentials>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let user = web::block(move || {
        const MISSING: &str = "All fields required";
        let name = require(&body.name, MISSING)?;
        let email = require(&body.email, MISSING)?;
        let password = require_exact(&body.password, MISSING)?;
        credentials.register(name, email, password)
    })
    .await??;

    Ok(HttpResponse::Created().json(json!({
        "message": "User registered",
        "user": user,
    })))
}

#[post("/api/auth/login")]
async fn api_login(body: web::Json<Login>, credentials: Data<Credentials>) -> Result<HttpResponse> {
    let body = body.into_inner();
    let user = web::block(move || {
        const MISSING: &str = "Email and password required";
        let email = require(&body.email, MISSING)?;
        let password = require_exact(&body.password, MISSING)?;
        credentials.authenticate(email, password)
    })
    .await??;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Login successful",
        "user": {
            "id": user.id,
            "name": user.name,
            "email": user.email,
        },
    })))
}

#[get("/api/auth")]
async fn api_users(credentials: Data<Credentials>) -> Result<HttpResponse> {
    let users = web::block(move || credentials.list()).await??;
    Ok(HttpResponse::Ok().json(json!({ "users": users })))
}

// devices

#[get("/api/devices")]
async fn api_devices(registry: Data<DeviceRegistry>) -> Result<HttpResponse> {
    let devices = web::block(move || registry.list()).await??;
    Ok(HttpResponse::Ok().json(json!({ "devices": devices })))
}

#[post("/api/devices")]
async fn api_register_device(
    body: web::Json<NewDevice>,
    registry: Data<DeviceRegistry>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let device = web::block(move || {
        let mac = require(&body.mac_address, "macAddress is required")?;
        registry.register(
            mac,
            or_default(&body.name, DEFAULT_NAME),
            or_default(&body.location, DEFAULT_LOCATION),
            body.user_id,
        )
    })
    .await??;

    Ok(HttpResponse::Created().json(json!({
        "message": "Device registered",
        "device": device,
    })))
}

#[get("/api/devices/{id}")]
async fn api_device(path: web::Path<String>, registry: Data<DeviceRegistry>) -> Result<HttpResponse> {
    let key = path.into_inner();
    let device = web::block(move || registry.find(&key)).await??;
    Ok(HttpResponse::Ok().json(json!({ "device": device })))
}

#[delete("/api/devices/{id}")]
async fn api_delete_device(
    path: web::Path<String>,
    registry: Data<DeviceRegistry>,
) -> Result<HttpResponse> {
    let key = path.into_inner();
    let device = web::block(move || registry.delete(&key)).await??;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Device deleted",
        "device": device,
    })))
}

// measurements

#[post("/api/measurements")]
async fn api_ingest(
    body: web::Json<NewMeasurement>,
    ingestor: Data<Ingestor>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let measurement = web::block(move || ingestor.ingest(&body)).await??;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Measurement received and broadcast",
        "data": measurement,
    })))
}

#[get("/api/measurements/latest")]
async fn api_latest(ingestor: Data<Ingestor>) -> Result<HttpResponse> {
    let measurement = web::block(move || ingestor.latest()).await??;
    Ok(HttpResponse::Ok().json(measurement))
}

#[get("/api/measurements/history")]
async fn api_history(
    query: web::Query<HistoryQuery>,
    ingestor: Data<Ingestor>,
) -> Result<HttpResponse> {
    let limit = query.into_inner().limit;
    let measurements = web::block(move || ingestor.history(limit.as_deref())).await??;
    Ok(HttpResponse::Ok().json(measurements))
}

// live updates

#[get("/ws")]
async fn ws_connect(
    req: HttpRequest,
    body: web::Payload,
    broadcaster: Data<Broadcaster>,
) -> actix_web::Result<HttpResponse> {
    let (response, session, messages) = actix_ws::handle(&req, body)?;
    let subscription = broadcaster.subscribe();
    actix_web::rt::spawn(relay(session, messages, subscription));
    Ok(response)
}

/// Forwards broadcast events to one viewer until either side goes away.
async fn relay(
    mut session: actix_ws::Session,
    mut messages: actix_ws::MessageStream,
    mut subscription: Subscription,
) {
    let id = subscription.id();
    info!("viewer {id} connected");

    let reason: Option<CloseReason> = loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break None };
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("failed to encode event for viewer {id}: {e}");
                        continue;
                    }
                };
                if session.text(frame).await.is_err() {
                    break None;
                }
            }
            msg = messages.next() => match msg {
                Some(Ok(Message::Ping(bytes))) => {
                    if session.pong(&bytes).await.is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Close(reason))) => break reason,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("viewer {id} protocol error: {e}");
                    break None;
                }
                None => break None,
            }
        }
    };

    if let Err(e) = session.close(reason).await {
        debug!("viewer {id} session already closed: {e:?}");
    }
    info!("viewer {id} disconnected");
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        Error::Validation(format!("Invalid JSON body: {err}")).into()
    }))
    .service(health)
    .service(api_register)
    .service(api_login)
    .service(api_users)
    .service(api_devices)
    .service(api_register_device)
    .service(api_device)
    .service(api_delete_device)
    .service(api_ingest)
    .service(api_latest)
    .service(api_history)
    .service(ws_connect);
}
