// 网关回调记录数据模型
// 每次入站回调投递记录一行，只用于去重和审计，从不直接修改订单状态

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// 回调投递记录
///
/// 记录的是"这次投递尝试"本身，订单状态的变化由OrderStore记录
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct NotifyRecord {
    /// 记录ID
    pub id: Uuid,
    /// 关联订单号 (订单不存在时记录回调中的商户订单号原文)
    pub order_no: String,
    /// 网关交易号 (回调中缺失时为空)
    pub gateway_transaction_id: Option<String>,
    /// 原始回调报文
    pub raw_payload: String,
    /// 签名验证结果
    pub sign_valid: bool,
    /// 处理状态
    pub process_status: NotifyProcessStatus,
    /// 同一订单此前已收到的投递次数
    pub retry_count: i32,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 回调处理状态枚举
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "varchar")]
pub enum NotifyProcessStatus {
    /// 已记录，尚未处理完
    #[sqlx(rename = "pending")]
    Pending,
    /// 处理成功
    #[sqlx(rename = "success")]
    Success,
    /// 处理失败
    #[sqlx(rename = "failed")]
    Failed,
}
