// 统一错误类型定义
// 回调验证、网关调用、订单状态机、积分账本共用的错误分类

use crate::models::OrderStatus;
use thiserror::Error;
use uuid::Uuid;

/// 核心错误分类
///
/// 传播策略:
/// - 验证/解析类错误在触碰订单存储之前被拒绝，永远到不了积分账本
/// - 仅 `GatewayTransient` 会被自动重试，且仅限出站调用
/// - 用户可见错误 (取消已结算订单、余额不足) 同步返回具体原因码
#[derive(Debug, Error)]
pub enum PayError {
    /// 回调签名验证失败
    #[error("invalid gateway signature")]
    Signature,

    /// 回调报文无法解析
    #[error("malformed gateway payload: {0}")]
    MalformedPayload(String),

    /// 回调指向的订单不存在 (大概率是开通配置问题，需要告警)
    #[error("unknown order: {0}")]
    UnknownOrder(String),

    /// 回调金额与订单金额不一致 (按欺诈信号处理，绝不发放积分)
    #[error("amount mismatch for order {order_no}: expected {expected} fen, gateway reported {reported} fen")]
    AmountMismatch {
        order_no: String,
        expected: i64,
        reported: i64,
    },

    /// 网关瞬时故障 (超时、5xx)，由调用方带退避重试
    #[error("gateway transient error: {0}")]
    GatewayTransient(String),

    /// 网关业务错误 (应答签名无效、订单不存在等)，不重试
    #[error("gateway business error [{code}]: {message}")]
    GatewayBusiness { code: String, message: String },

    /// 订单已处于终态，拒绝迁移 (例如取消时支付已抢先落地)
    #[error("order {order_no} already settled with status {status:?}")]
    TerminalStateViolation {
        order_no: String,
        status: OrderStatus,
    },

    /// 积分余额不足
    #[error("insufficient balance: {balance} points available, {required} required")]
    InsufficientBalance { balance: i64, required: i64 },

    /// 商户订单号重复
    #[error("duplicate order: {0}")]
    DuplicateOrder(String),

    /// 套餐不存在或已下架
    #[error("package not found or inactive: {0}")]
    PackageNotFound(Uuid),

    /// 存储层错误
    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),
}

impl PayError {
    /// 是否为可自动重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(self, PayError::GatewayTransient(_))
    }
}

pub type PayResult<T> = Result<T, PayError>;
