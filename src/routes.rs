// API路由配置
// 定义所有HTTP接口的路由规则

use actix_web::{web, Scope};

use crate::handlers::*;

/// API v1路由配置
pub fn api_v1_routes() -> Scope {
    web::scope("/api/v1")
        // 订单路由
        .service(order_routes())
        // 积分路由
        .service(credit_routes())
        // 网关回调路由
        .route("/pay/notify", web::post().to(payment_notify))
        // 版本信息
        .route("/version", web::get().to(version_info))
}

/// 订单路由
fn order_routes() -> Scope {
    web::scope("/orders")
        .route("", web::post().to(create_order))
        .route("/{order_no}", web::get().to(get_order))
        .route("/{order_no}/cancel", web::post().to(cancel_order))
}

/// 积分路由
fn credit_routes() -> Scope {
    web::scope("/credits")
        .route("/deduct", web::post().to(deduct_credits))
        .route("/refund", web::post().to(refund_credits))
        .route("/{user_id}/balance", web::get().to(get_balance))
}

/// 公共路由 (无需认证)
pub fn public_routes() -> Scope {
    web::scope("").route("/health", web::get().to(health_check))
}
