// API处理器模块
// 包含所有HTTP请求处理逻辑

pub mod credit_handlers;
pub mod health_handlers;
pub mod notify_handlers;
pub mod order_handlers;

// 重新导出处理器
pub use credit_handlers::*;
pub use health_handlers::*;
pub use notify_handlers::*;
pub use order_handlers::*;

use actix_web::HttpResponse;

use crate::error::PayError;
use crate::models::ApiResponse;

/// 把服务层错误映射为HTTP响应
pub fn error_response(e: &PayError) -> HttpResponse {
    match e {
        PayError::UnknownOrder(_) | PayError::PackageNotFound(_) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error(404, e.to_string()))
        }
        PayError::DuplicateOrder(_) | PayError::TerminalStateViolation { .. } => {
            HttpResponse::Conflict().json(ApiResponse::<()>::error(409, e.to_string()))
        }
        PayError::InsufficientBalance { .. } | PayError::MalformedPayload(_) => {
            HttpResponse::BadRequest().json(ApiResponse::<()>::error(400, e.to_string()))
        }
        PayError::Signature => {
            HttpResponse::Unauthorized().json(ApiResponse::<()>::error(401, e.to_string()))
        }
        PayError::GatewayTransient(_) => HttpResponse::ServiceUnavailable()
            .json(ApiResponse::<()>::error(503, "Payment gateway unavailable")),
        PayError::GatewayBusiness { .. } => HttpResponse::BadGateway()
            .json(ApiResponse::<()>::error(502, e.to_string())),
        PayError::AmountMismatch { .. } | PayError::Store(_) => {
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(500, "Internal server error"))
        }
    }
}
