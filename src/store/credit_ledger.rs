// 积分账本
// 订单支付成功的消费侧效果: 每订单至多发放一次积分；
// 另提供计费协作方使用的检查扣减/退还配对操作
//
// 持久账本是所有资金决策的唯一权威，任何缓存只做读优化

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{PayError, PayResult};

/// 积分账本接口
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// 按订单号幂等发放积分，返回发放后的余额
    ///
    /// 幂等性由credit_grants.order_no唯一约束保证：
    /// 崩溃恢复后的重放会命中已存在的发放记录，成为无副作用的no-op
    async fn grant_once(&self, order_no: &str, user_id: Uuid, points: i64) -> PayResult<i64>;

    /// 查询当前余额
    async fn balance(&self, user_id: Uuid) -> PayResult<i64>;

    /// 原子地验证余额充足并扣减，记录待结算扣减
    ///
    /// 余额不足时无任何副作用；operation_id重复时视为重试调用，
    /// 不再扣减，返回当前余额
    async fn check_and_deduct(
        &self,
        user_id: Uuid,
        cost: i64,
        operation_id: Uuid,
    ) -> PayResult<i64>;

    /// 按operation_id恰好一次地退还待结算扣减
    ///
    /// operation_id不存在或已结算时是no-op而非错误 (调用方可能在
    /// 部分失败后重试)
    async fn refund(&self, operation_id: Uuid, reason: &str) -> PayResult<()>;
}

/// 基于PostgreSQL的积分账本实现
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    /// 创建新的积分账本实例
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn grant_once(&self, order_no: &str, user_id: Uuid, points: i64) -> PayResult<i64> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO credit_grants (order_no, user_id, points, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (order_no) DO NOTHING
            "#,
        )
        .bind(order_no)
        .bind(user_id)
        .bind(points)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let balance: i64 = if inserted == 1 {
            sqlx::query_scalar(
                r#"
                INSERT INTO credit_accounts (user_id, balance, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (user_id) DO UPDATE
                    SET balance = credit_accounts.balance + EXCLUDED.balance,
                        updated_at = NOW()
                RETURNING balance
                "#,
            )
            .bind(user_id)
            .bind(points)
            .fetch_one(&mut *tx)
            .await?
        } else {
            log::info!(
                "Credit grant for order {} already exists, skipping payout",
                order_no
            );
            sqlx::query_scalar(
                "SELECT COALESCE((SELECT balance FROM credit_accounts WHERE user_id = $1), 0)",
            )
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await?;

        if inserted == 1 {
            log::info!(
                "Granted {} points to user {} for order {} (balance now {})",
                points,
                user_id,
                order_no,
                balance
            );
        }

        Ok(balance)
    }

    async fn balance(&self, user_id: Uuid) -> PayResult<i64> {
        let balance: i64 = sqlx::query_scalar(
            "SELECT COALESCE((SELECT balance FROM credit_accounts WHERE user_id = $1), 0)",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(balance)
    }

    async fn check_and_deduct(
        &self,
        user_id: Uuid,
        cost: i64,
        operation_id: Uuid,
    ) -> PayResult<i64> {
        let mut tx = self.pool.begin().await?;

        // operation_id重复 → 同一逻辑操作的重试，不再扣减
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT amount FROM pending_deductions WHERE operation_id = $1")
                .bind(operation_id)
                .fetch_optional(&mut *tx)
                .await?;

        if existing.is_some() {
            let balance: i64 = sqlx::query_scalar(
                "SELECT COALESCE((SELECT balance FROM credit_accounts WHERE user_id = $1), 0)",
            )
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(balance);
        }

        // 余额校验与扣减在同一条守卫式UPDATE里完成
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE credit_accounts
            SET balance = balance - $2, updated_at = NOW()
            WHERE user_id = $1 AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(cost)
        .fetch_optional(&mut *tx)
        .await?;

        match updated {
            Some(balance) => {
                sqlx::query(
                    r#"
                    INSERT INTO pending_deductions (operation_id, user_id, amount, created_at)
                    VALUES ($1, $2, $3, NOW())
                    "#,
                )
                .bind(operation_id)
                .bind(user_id)
                .bind(cost)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(balance)
            }
            None => {
                let balance: i64 = sqlx::query_scalar(
                    "SELECT COALESCE((SELECT balance FROM credit_accounts WHERE user_id = $1), 0)",
                )
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
                tx.rollback().await?;
                Err(PayError::InsufficientBalance {
                    balance,
                    required: cost,
                })
            }
        }
    }

    async fn refund(&self, operation_id: Uuid, reason: &str) -> PayResult<()> {
        let mut tx = self.pool.begin().await?;

        let deleted: Option<(Uuid, i64)> = sqlx::query_as(
            "DELETE FROM pending_deductions WHERE operation_id = $1 RETURNING user_id, amount",
        )
        .bind(operation_id)
        .fetch_optional(&mut *tx)
        .await?;

        match deleted {
            Some((user_id, amount)) => {
                sqlx::query(
                    "UPDATE credit_accounts SET balance = balance + $2, updated_at = NOW() \
                     WHERE user_id = $1",
                )
                .bind(user_id)
                .bind(amount)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                log::info!(
                    "Refunded {} points to user {} for operation {} ({})",
                    amount,
                    user_id,
                    operation_id,
                    reason
                );
            }
            None => {
                tx.commit().await?;
                // 已结算或从未存在，重试方视角是幂等成功
                log::debug!("Refund for operation {} is a no-op", operation_id);
            }
        }

        Ok(())
    }
}
