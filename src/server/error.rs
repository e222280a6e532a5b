use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::imgproc::ImageError;

/// API错误类型
pub struct AppError(pub anyhow::Error);

pub type Result<T, E = AppError> = std::result::Result<T, E>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // 图片无法解码属于请求错误
        let status = if self.0.downcast_ref::<ImageError>().is_some() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, format!("Something went wrong: {:#}", self.0)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
