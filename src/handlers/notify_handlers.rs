// 支付回调处理器
// 接收网关的异步支付结果通知，应答协议约定的XML确认报文

use actix_web::{web, HttpResponse, Result as ActixResult};

use crate::gateway::codec;
use crate::services::NotifyOutcome;
use crate::state::AppState;

/// 网关支付结果回调
///
/// POST /api/v1/pay/notify
///
/// 请求体: 网关签名XML报文
/// 响应: XML确认报文；返回FAIL会触发网关按自身计划重投
pub async fn payment_notify(
    data: web::Data<AppState>,
    body: String,
) -> ActixResult<HttpResponse> {
    match data.notify_service.handle_webhook(&body).await {
        Ok(outcome) => {
            match &outcome {
                NotifyOutcome::Paid => log::info!("Payment notification settled"),
                NotifyOutcome::Failed => log::info!("Payment failure notification processed"),
                NotifyOutcome::Duplicate => log::info!("Duplicate payment notification acked"),
                NotifyOutcome::LatePayment(status) => {
                    log::warn!("Late payment notification acked on {} order", status.as_str())
                }
            }
            Ok(HttpResponse::Ok()
                .content_type("text/xml")
                .body(codec::ack_success()))
        }
        Err(e) => {
            log::error!("Payment notification rejected: {}", e);
            Ok(HttpResponse::Ok()
                .content_type("text/xml")
                .body(codec::ack_fail(&e.to_string())))
        }
    }
}
