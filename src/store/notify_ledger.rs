// 回调投递账本
// 追加式记录每一次入站回调 (原始报文、验签结果、处理结果)，
// 供去重与审计使用；除处理状态外不做任何更新

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::PayResult;
use crate::models::NotifyProcessStatus;

/// 回调账本接口
#[async_trait]
pub trait NotifyLedger: Send + Sync {
    /// 记录一次投递尝试，返回记录ID
    async fn record_attempt(
        &self,
        order_no: &str,
        gateway_transaction_id: Option<&str>,
        raw_payload: &str,
        sign_valid: bool,
    ) -> PayResult<Uuid>;

    /// 写入处理结果
    async fn mark_processed(&self, notify_id: Uuid, outcome: NotifyProcessStatus) -> PayResult<()>;

    /// 去重检查: 该网关交易号是否已存在处理成功的记录
    ///
    /// 命中时回调被视为重放，直接正向应答，不再触碰业务逻辑
    async fn has_succeeded_for(&self, gateway_transaction_id: &str) -> PayResult<bool>;
}

/// 基于PostgreSQL的回调账本实现
pub struct PgNotifyLedger {
    pool: PgPool,
}

impl PgNotifyLedger {
    /// 创建新的回调账本实例
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotifyLedger for PgNotifyLedger {
    async fn record_attempt(
        &self,
        order_no: &str,
        gateway_transaction_id: Option<&str>,
        raw_payload: &str,
        sign_valid: bool,
    ) -> PayResult<Uuid> {
        let notify_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO notify_records (
                id, order_no, gateway_transaction_id, raw_payload, sign_valid,
                process_status, retry_count, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, 'pending',
                (SELECT COUNT(*) FROM notify_records WHERE order_no = $2),
                NOW(), NOW()
            )
            "#,
        )
        .bind(notify_id)
        .bind(order_no)
        .bind(gateway_transaction_id)
        .bind(raw_payload)
        .bind(sign_valid)
        .execute(&self.pool)
        .await?;

        Ok(notify_id)
    }

    async fn mark_processed(&self, notify_id: Uuid, outcome: NotifyProcessStatus) -> PayResult<()> {
        sqlx::query(
            "UPDATE notify_records SET process_status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(outcome)
        .bind(notify_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn has_succeeded_for(&self, gateway_transaction_id: &str) -> PayResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM notify_records
                WHERE gateway_transaction_id = $1 AND process_status = 'success'
            )
            "#,
        )
        .bind(gateway_transaction_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
