// 积分账本数据模型
// 发放记录、账户余额、待结算扣减三张表的结构定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// 积分发放记录
///
/// order_no 上有唯一约束，这行记录的存在与否是
/// "该订单是否已发放过积分"的唯一事实来源，独立于订单状态
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct CreditGrant {
    /// 订单号 (唯一)
    pub order_no: String,
    /// 用户ID
    pub user_id: Uuid,
    /// 发放积分数 (套餐 + 赠送)
    pub points: i64,
    /// 发放时间
    pub created_at: DateTime<Utc>,
}

/// 积分账户
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct CreditAccount {
    /// 用户ID
    pub user_id: Uuid,
    /// 当前余额 (积分)
    pub balance: i64,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 待结算扣减记录
///
/// 由计费协作方以每次逻辑调用新生成的 operation_id 写入，
/// 下游调用完成后删除，失败后按 operation_id 原路退还
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct PendingDeduction {
    /// 操作ID (调用方生成，主键)
    pub operation_id: Uuid,
    /// 用户ID
    pub user_id: Uuid,
    /// 扣减积分数
    pub amount: i64,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// 余额查询响应
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// 用户ID
    pub user_id: Uuid,
    /// 当前余额 (积分)
    pub balance: i64,
}
