// 充值订单数据模型
// 定义订单生命周期相关的数据结构和状态机

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// 充值订单模型
///
/// `amount`/`points`/`bonus_points` 在创建时从套餐快照固定，
/// 之后永不重算，套餐改价不影响已创建订单
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Order {
    /// 内部订单号 (全局唯一)
    pub order_no: String,
    /// 商户订单号 (发送给网关，生命周期内不变)
    pub out_trade_no: String,
    /// 用户ID
    pub user_id: Uuid,
    /// 套餐ID
    pub package_id: Uuid,
    /// 订单金额 (元)
    pub amount: Decimal,
    /// 套餐积分
    pub points: i64,
    /// 赠送积分
    pub bonus_points: i64,
    /// 支付方式
    pub payment_method: PaymentMethod,
    /// 订单状态
    pub status: OrderStatus,
    /// 网关交易号 (支付成功前为空)
    pub gateway_transaction_id: Option<String>,
    /// 支付完成时间
    pub paid_at: Option<DateTime<Utc>>,
    /// 收到回调时间
    pub notified_at: Option<DateTime<Utc>>,
    /// 订单过期时间
    pub expires_at: DateTime<Utc>,
    /// 失败原因
    pub fail_reason: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 订单状态枚举
///
/// PENDING 之外的所有状态均为终态，终态之间不允许任何迁移
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "varchar")]
pub enum OrderStatus {
    /// 待支付
    #[sqlx(rename = "pending")]
    Pending,
    /// 已支付 (网关确认，终态)
    #[sqlx(rename = "paid")]
    Paid,
    /// 支付失败 (网关返回终态失败码)
    #[sqlx(rename = "failed")]
    Failed,
    /// 已取消 (用户发起，仅允许从PENDING迁移)
    #[sqlx(rename = "cancelled")]
    Cancelled,
    /// 已过期 (后台扫描发起，仅允许从PENDING迁移)
    #[sqlx(rename = "expired")]
    Expired,
}

impl OrderStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// 状态的数据库表示
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

/// 支付方式枚举 (目前仅接入一个网关)
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "varchar")]
pub enum PaymentMethod {
    /// 移动钱包网关
    #[sqlx(rename = "wallet")]
    Wallet,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Wallet
    }
}

/// 订单状态迁移的补丁字段
///
/// 仅在迁移成功时写入，None表示保持原值
#[derive(Debug, Default, Clone)]
pub struct OrderPatch {
    /// 网关交易号
    pub gateway_transaction_id: Option<String>,
    /// 支付完成时间
    pub paid_at: Option<DateTime<Utc>>,
    /// 收到回调时间
    pub notified_at: Option<DateTime<Utc>>,
    /// 失败原因
    pub fail_reason: Option<String>,
}

/// 守卫式状态迁移的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// 迁移是否实际发生
    pub applied: bool,
    /// 当前状态 (迁移成功时为目标状态，否则为数据库中的实际状态)
    pub current: OrderStatus,
}

/// 创建充值订单请求
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// 用户ID (会话管理在核心范围之外，由调用方传入)
    pub user_id: Uuid,
    /// 套餐ID
    pub package_id: Uuid,
}

/// 创建充值订单响应
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    /// 内部订单号
    pub order_no: String,
    /// 商户订单号
    pub out_trade_no: String,
    /// 订单金额 (元)
    pub amount: Decimal,
    /// 总积分 (套餐 + 赠送)
    pub total_points: i64,
    /// 扫码支付链接 (网关返回)
    pub code_url: Option<String>,
    /// 预支付交易会话标识 (网关返回)
    pub prepay_id: Option<String>,
    /// 订单过期时间
    pub expires_at: DateTime<Utc>,
}

/// 订单查询响应
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    /// 内部订单号
    pub order_no: String,
    /// 商户订单号
    pub out_trade_no: String,
    /// 订单状态
    pub status: OrderStatus,
    /// 订单金额 (元)
    pub amount: Decimal,
    /// 套餐积分
    pub points: i64,
    /// 赠送积分
    pub bonus_points: i64,
    /// 网关交易号
    pub gateway_transaction_id: Option<String>,
    /// 支付完成时间
    pub paid_at: Option<DateTime<Utc>>,
    /// 过期时间
    pub expires_at: DateTime<Utc>,
    /// 失败原因
    pub fail_reason: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// 检查订单是否已过期
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// 总积分 (套餐积分 + 赠送积分)
    pub fn total_points(&self) -> i64 {
        self.points + self.bonus_points
    }

    /// 转换为API响应格式
    pub fn to_response(&self) -> OrderResponse {
        OrderResponse {
            order_no: self.order_no.clone(),
            out_trade_no: self.out_trade_no.clone(),
            status: self.status,
            amount: self.amount,
            points: self.points,
            bonus_points: self.bonus_points,
            gateway_transaction_id: self.gateway_transaction_id.clone(),
            paid_at: self.paid_at,
            expires_at: self.expires_at,
            fail_reason: self.fail_reason.clone(),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_order() -> Order {
        let now = Utc::now();
        Order {
            order_no: "ORD20250101000001".to_string(),
            out_trade_no: "PAY20250101000001".to_string(),
            user_id: Uuid::new_v4(),
            package_id: Uuid::new_v4(),
            amount: Decimal::new(2990, 2),
            points: 300,
            bonus_points: 50,
            payment_method: PaymentMethod::Wallet,
            status: OrderStatus::Pending,
            gateway_transaction_id: None,
            paid_at: None,
            notified_at: None,
            expires_at: now + Duration::minutes(30),
            fail_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
    }

    #[test]
    fn test_order_expiry_check() {
        let order = sample_order();
        assert!(!order.is_expired(Utc::now()));
        assert!(order.is_expired(Utc::now() + Duration::hours(1)));
    }

    #[test]
    fn test_total_points() {
        let order = sample_order();
        assert_eq!(order.total_points(), 350);
    }
}
