// 订单API处理器
// 处理订单创建、查询、取消等HTTP请求

use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::error_response;
use crate::models::{ApiResponse, CreateOrderRequest};
use crate::state::AppState;

/// 订单归属查询参数
#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    /// 用户ID
    pub user_id: Uuid,
}

/// 创建充值订单
///
/// POST /api/v1/orders
///
/// 请求体: CreateOrderRequest
/// 响应: CreateOrderResponse
pub async fn create_order(
    data: web::Data<AppState>,
    request: web::Json<CreateOrderRequest>,
    req: actix_web::HttpRequest,
) -> ActixResult<HttpResponse> {
    let client_ip = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string());

    let request = request.into_inner();
    match data
        .order_service
        .create_order(request.user_id, request.package_id, &client_ip)
        .await
    {
        Ok(response) => {
            log::info!(
                "Successfully created order: {} for user: {}",
                response.order_no,
                request.user_id
            );
            Ok(HttpResponse::Created().json(ApiResponse::success(response)))
        }
        Err(e) => {
            log::error!("Failed to create order for user {}: {}", request.user_id, e);
            Ok(error_response(&e))
        }
    }
}

/// 获取订单详情
///
/// GET /api/v1/orders/{order_no}?user_id=...
///
/// 响应: OrderResponse
pub async fn get_order(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<OwnerQuery>,
) -> ActixResult<HttpResponse> {
    let order_no = path.into_inner();

    match data.order_service.get_order(&order_no, query.user_id).await {
        Ok(order) => Ok(HttpResponse::Ok().json(ApiResponse::success(order))),
        Err(e) => {
            log::warn!("Failed to get order {}: {}", order_no, e);
            Ok(error_response(&e))
        }
    }
}

/// 取消待支付订单
///
/// POST /api/v1/orders/{order_no}/cancel?user_id=...
///
/// 响应: OrderResponse
pub async fn cancel_order(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<OwnerQuery>,
) -> ActixResult<HttpResponse> {
    let order_no = path.into_inner();

    match data.order_service.cancel(&order_no, query.user_id).await {
        Ok(order) => {
            log::info!("Order {} cancelled by user {}", order_no, query.user_id);
            Ok(HttpResponse::Ok().json(ApiResponse::success(order)))
        }
        Err(e) => {
            log::warn!("Failed to cancel order {}: {}", order_no, e);
            Ok(error_response(&e))
        }
    }
}
