// 输入验证工具函数

use anyhow::Result;
use rust_decimal::Decimal;

/// 验证订单金额: 必须为正且不超过两位小数 (分是网关的最小单位)
pub fn validate_amount(amount: &Decimal) -> Result<()> {
    if *amount <= Decimal::ZERO {
        anyhow::bail!("Amount must be positive");
    }
    if (amount * Decimal::from(100)).fract() != Decimal::ZERO {
        anyhow::bail!("Amount must not have sub-fen precision");
    }
    Ok(())
}

/// 验证积分数: 必须为正
pub fn validate_points(points: i64) -> Result<()> {
    if points <= 0 {
        anyhow::bail!("Points must be positive");
    }
    Ok(())
}
