// 订单持久化存储
// 唯一的变更原语是守卫式状态迁移 (对期望前置状态做compare-and-swap)，
// 回调处理、过期扫描、用户取消的并发安全全部建立在这一个原语之上

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{PayError, PayResult};
use crate::models::{Order, OrderPatch, OrderStatus, TransitionOutcome};

/// 订单存储接口
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 插入PENDING新订单；商户订单号冲突时返回DuplicateOrder
    async fn create(&self, order: &Order) -> PayResult<()>;

    /// 按内部订单号查询
    async fn get(&self, order_no: &str) -> PayResult<Option<Order>>;

    /// 按商户订单号查询
    async fn get_by_out_trade_no(&self, out_trade_no: &str) -> PayResult<Option<Order>>;

    /// 守卫式状态迁移
    ///
    /// 仅当当前状态在`from`集合内时才写入`to`和补丁字段；
    /// 返回迁移是否发生以及数据库中的当前状态。
    /// 决策前不允许依赖任何进程内缓存的订单状态
    async fn transition(
        &self,
        order_no: &str,
        from: &[OrderStatus],
        to: OrderStatus,
        patch: OrderPatch,
    ) -> PayResult<TransitionOutcome>;

    /// 过期扫描的选取: 已过期仍为PENDING的订单
    async fn expired_pending(&self, now: DateTime<Utc>, limit: i64) -> PayResult<Vec<Order>>;
}

/// 基于PostgreSQL的订单存储实现
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// 创建新的订单存储实例
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ORDER_COLUMNS: &str = "order_no, out_trade_no, user_id, package_id, amount, points, \
     bonus_points, payment_method, status, gateway_transaction_id, paid_at, notified_at, \
     expires_at, fail_reason, created_at, updated_at";

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, order: &Order) -> PayResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                order_no, out_trade_no, user_id, package_id, amount, points,
                bonus_points, payment_method, status, expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            "#,
        )
        .bind(&order.order_no)
        .bind(&order.out_trade_no)
        .bind(order.user_id)
        .bind(order.package_id)
        .bind(order.amount)
        .bind(order.points)
        .bind(order.bonus_points)
        .bind(order.payment_method)
        .bind(order.status)
        .bind(order.expires_at)
        .bind(order.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                Err(PayError::DuplicateOrder(order.out_trade_no.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, order_no: &str) -> PayResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE order_no = $1",
            ORDER_COLUMNS
        ))
        .bind(order_no)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn get_by_out_trade_no(&self, out_trade_no: &str) -> PayResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE out_trade_no = $1",
            ORDER_COLUMNS
        ))
        .bind(out_trade_no)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn transition(
        &self,
        order_no: &str,
        from: &[OrderStatus],
        to: OrderStatus,
        patch: OrderPatch,
    ) -> PayResult<TransitionOutcome> {
        let from_states: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();

        let rows_affected = sqlx::query(
            r#"
            UPDATE orders SET
                status = $1,
                gateway_transaction_id = COALESCE($2, gateway_transaction_id),
                paid_at = COALESCE($3, paid_at),
                notified_at = COALESCE($4, notified_at),
                fail_reason = COALESCE($5, fail_reason),
                updated_at = NOW()
            WHERE order_no = $6 AND status = ANY($7)
            "#,
        )
        .bind(to)
        .bind(&patch.gateway_transaction_id)
        .bind(patch.paid_at)
        .bind(patch.notified_at)
        .bind(&patch.fail_reason)
        .bind(order_no)
        .bind(&from_states)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 1 {
            return Ok(TransitionOutcome {
                applied: true,
                current: to,
            });
        }

        // 守卫未命中：重读当前状态以便调用方分类处理
        let current: Option<OrderStatus> =
            sqlx::query_scalar("SELECT status FROM orders WHERE order_no = $1")
                .bind(order_no)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            Some(status) => Ok(TransitionOutcome {
                applied: false,
                current: status,
            }),
            None => Err(PayError::UnknownOrder(order_no.to_string())),
        }
    }

    async fn expired_pending(&self, now: DateTime<Utc>, limit: i64) -> PayResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders \
             WHERE status = 'pending' AND expires_at < $1 \
             ORDER BY expires_at ASC LIMIT $2",
            ORDER_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }
}
