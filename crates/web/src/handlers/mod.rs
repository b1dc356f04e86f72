use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

mod common;
mod webhook;

pub fn build_router() -> Router<AppState> {
    Router::new().route("/", get(common::get_index)).route("/webhook", post(webhook::webhook))
}
