//! Extractors whose rejections speak the error envelope.
//!
//! axum's own `Json`, `Path` and `Query` reject with plain-text bodies;
//! these wrappers route the rejection through [`ApiError`] as `invalid_input`.

use axum::extract::{FromRequest, FromRequestParts};
use serde::Deserialize;

use torque_core::Page;

use crate::error::ApiError;

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Json<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

/// `?limit=&offset=` with the defaults of [`Page`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<PageParams> for Page {
    fn from(params: PageParams) -> Self {
        Page::new(params.limit, params.offset)
    }
}
