use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::similar::SimilarError;

pub type Result<T> = std::result::Result<T, AppError>;

/// API错误类型
pub enum AppError {
    /// 记录不存在
    NotFound(String),
    /// 请求无法处理，例如记录缺少派生数据
    Unprocessable(String),
    /// 其他内部错误
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg).into_response(),
            Self::Internal(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Something went wrong: {}", err))
                    .into_response()
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<SimilarError> for AppError {
    fn from(err: SimilarError) -> Self {
        match err {
            SimilarError::NotFound(id) => Self::NotFound(format!("人脸记录不存在: {}", id)),
            SimilarError::MissingEmbedding(id) => {
                Self::Unprocessable(format!("人脸记录缺少特征向量: {}", id))
            }
            SimilarError::Backend(err) => Self::Internal(err),
        }
    }
}
