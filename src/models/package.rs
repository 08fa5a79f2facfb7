// 积分套餐数据模型
// 套餐目录的维护 (CRUD) 在核心范围之外，这里只定义订单创建时读取的快照形状

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// 积分套餐
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Package {
    /// 套餐ID
    pub id: Uuid,
    /// 套餐名称
    pub name: String,
    /// 售价 (元)
    pub amount: Decimal,
    /// 套餐积分
    pub points: i64,
    /// 赠送积分
    pub bonus_points: i64,
    /// 是否上架
    pub active: bool,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}
