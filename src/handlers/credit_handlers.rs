// 积分API处理器
// 余额查询与消费侧的扣减/退还接口

use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::error_response;
use crate::models::{ApiResponse, BalanceResponse};
use crate::state::AppState;

/// 扣减请求
///
/// operation_id由调用方生成并在重试间保持不变，同一operation_id
/// 的重复请求不会二次扣减
#[derive(Debug, Deserialize)]
pub struct DeductRequest {
    /// 用户ID
    pub user_id: Uuid,
    /// 扣减积分数
    pub cost: i64,
    /// 调用方操作ID
    pub operation_id: Uuid,
}

/// 退还请求
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// 原扣减的操作ID
    pub operation_id: Uuid,
    /// 退还原因
    pub reason: String,
}

/// 查询用户积分余额
///
/// GET /api/v1/credits/{user_id}/balance
///
/// 响应: BalanceResponse
pub async fn get_balance(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();

    match data.credit_service.balance(user_id).await {
        Ok(balance) => Ok(HttpResponse::Ok().json(ApiResponse::success(BalanceResponse {
            user_id,
            balance,
        }))),
        Err(e) => {
            log::error!("Failed to get balance for user {}: {}", user_id, e);
            Ok(error_response(&e))
        }
    }
}

/// 原子扣减积分
///
/// POST /api/v1/credits/deduct
///
/// 请求体: DeductRequest
/// 响应: BalanceResponse (扣减后余额)
pub async fn deduct_credits(
    data: web::Data<AppState>,
    request: web::Json<DeductRequest>,
) -> ActixResult<HttpResponse> {
    let request = request.into_inner();

    match data
        .credit_service
        .check_and_deduct(request.user_id, request.cost, request.operation_id)
        .await
    {
        Ok(balance) => {
            log::info!(
                "Deducted {} credits from user {} (operation {})",
                request.cost,
                request.user_id,
                request.operation_id
            );
            Ok(HttpResponse::Ok().json(ApiResponse::success(BalanceResponse {
                user_id: request.user_id,
                balance,
            })))
        }
        Err(e) => {
            log::warn!(
                "Credit deduction refused for user {} (operation {}): {}",
                request.user_id,
                request.operation_id,
                e
            );
            Ok(error_response(&e))
        }
    }
}

/// 退还一笔待结算扣减
///
/// POST /api/v1/credits/refund
///
/// 请求体: RefundRequest
pub async fn refund_credits(
    data: web::Data<AppState>,
    request: web::Json<RefundRequest>,
) -> ActixResult<HttpResponse> {
    let request = request.into_inner();

    match data
        .credit_service
        .refund(request.operation_id, &request.reason)
        .await
    {
        Ok(()) => {
            log::info!("Refunded deduction {} ({})", request.operation_id, request.reason);
            Ok(HttpResponse::Ok().json(ApiResponse::success("Refunded")))
        }
        Err(e) => {
            log::error!("Failed to refund deduction {}: {}", request.operation_id, e);
            Ok(error_response(&e))
        }
    }
}
