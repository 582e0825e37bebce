//! HTTP boundary.
//!
//! - `GET /`               raw contact listing, filtered by `email` / `phoneNumber`
//! - `POST /create-contact` administrative primary insert
//! - `POST /identify`       reconciliation

use std::time::Instant;

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::DbContact;
use crate::error::ErrorBody;
use crate::state::AppState;
use crate::types::{ContactInput, IdentifyResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_contacts))
        .route("/create-contact", post(create_contact))
        .route("/identify", post(identify))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Request body for `/identify` and `/create-contact`. Phone numbers are
/// accepted as JSON strings or numbers.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPayload {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<PhoneField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PhoneField {
    Text(String),
    Number(serde_json::Number),
}

impl PhoneField {
    fn into_string(self) -> String {
        match self {
            PhoneField::Text(s) => s,
            PhoneField::Number(n) => n.to_string(),
        }
    }
}

impl From<ContactPayload> for ContactInput {
    fn from(payload: ContactPayload) -> Self {
        ContactInput::new(
            payload.email,
            payload.phone_number.map(PhoneField::into_string),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFilter {
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedContact {
    pub message: &'static str,
    pub contact: DbContact,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

async fn list_contacts(
    State(state): State<AppState>,
    Query(filter): Query<ContactFilter>,
) -> Response {
    let email = filter.email.filter(|v| !v.is_empty());
    let phone = filter.phone_number.filter(|v| !v.is_empty());
    match state.contacts.list_contacts(email, phone).await {
        Ok(contacts) => (StatusCode::OK, Json(contacts)).into_response(),
        Err(err) => {
            log::error!("DB error listing contacts: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not connect to DB")
        }
    }
}

async fn create_contact(
    State(state): State<AppState>,
    Json(payload): Json<ContactPayload>,
) -> Response {
    match state.contacts.create_primary_contact(payload.into()).await {
        Ok(contact) => (
            StatusCode::CREATED,
            Json(CreatedContact {
                message: "Contact created",
                contact,
            }),
        )
            .into_response(),
        Err(err) => {
            log::error!("Error creating contact: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn identify(State(state): State<AppState>, Json(payload): Json<ContactPayload>) -> Response {
    match state.contacts.reconcile(payload.into()).await {
        Ok(contact) => (StatusCode::OK, Json(IdentifyResponse { contact })).into_response(),
        Err(err) if err.is_client_error() => {
            (StatusCode::BAD_REQUEST, Json(ErrorBody::from(&err))).into_response()
        }
        Err(err) => {
            log::error!("Error in /identify: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        }
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    log::info!(
        "{} {} -> {} in {}ms",
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}
