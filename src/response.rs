//! Standard response envelope helpers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: MetaCount,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: u64,
}

pub fn success_one<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(SuccessOne { data })).into_response()
}

pub fn success_many<T: Serialize>(status: StatusCode, data: Vec<T>) -> Response {
    let count = data.len() as u64;
    (
        status,
        Json(SuccessMany {
            data,
            meta: MetaCount { count },
        }),
    )
        .into_response()
}
