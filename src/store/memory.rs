// 内存存储实现
// 与PostgreSQL实现遵守完全相同的契约 (守卫式迁移、唯一约束语义)，
// 供测试使用；所有变更在单把锁内完成以保持原子性

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{PayError, PayResult};
use crate::models::{
    CreditAccount, CreditGrant, NotifyProcessStatus, NotifyRecord, Order, OrderPatch, OrderStatus,
    Package, PendingDeduction, TransitionOutcome,
};
use crate::store::{CreditLedger, NotifyLedger, OrderStore, PackageStore};

/// 内存订单存储
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<String, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, order: &Order) -> PayResult<()> {
        let mut orders = self.orders.lock().unwrap();
        let duplicate = orders.contains_key(&order.order_no)
            || orders
                .values()
                .any(|o| o.out_trade_no == order.out_trade_no);
        if duplicate {
            return Err(PayError::DuplicateOrder(order.out_trade_no.clone()));
        }
        orders.insert(order.order_no.clone(), order.clone());
        Ok(())
    }

    async fn get(&self, order_no: &str) -> PayResult<Option<Order>> {
        Ok(self.orders.lock().unwrap().get(order_no).cloned())
    }

    async fn get_by_out_trade_no(&self, out_trade_no: &str) -> PayResult<Option<Order>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .find(|o| o.out_trade_no == out_trade_no)
            .cloned())
    }

    async fn transition(
        &self,
        order_no: &str,
        from: &[OrderStatus],
        to: OrderStatus,
        patch: OrderPatch,
    ) -> PayResult<TransitionOutcome> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(order_no)
            .ok_or_else(|| PayError::UnknownOrder(order_no.to_string()))?;

        if !from.contains(&order.status) {
            return Ok(TransitionOutcome {
                applied: false,
                current: order.status,
            });
        }

        order.status = to;
        if patch.gateway_transaction_id.is_some() {
            order.gateway_transaction_id = patch.gateway_transaction_id;
        }
        if patch.paid_at.is_some() {
            order.paid_at = patch.paid_at;
        }
        if patch.notified_at.is_some() {
            order.notified_at = patch.notified_at;
        }
        if patch.fail_reason.is_some() {
            order.fail_reason = patch.fail_reason;
        }
        order.updated_at = Utc::now();

        Ok(TransitionOutcome {
            applied: true,
            current: to,
        })
    }

    async fn expired_pending(&self, now: DateTime<Utc>, limit: i64) -> PayResult<Vec<Order>> {
        let orders = self.orders.lock().unwrap();
        let mut expired: Vec<Order> = orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|o| o.expires_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }
}

/// 内存回调账本
#[derive(Default)]
pub struct MemoryNotifyLedger {
    records: Mutex<Vec<NotifyRecord>>,
}

impl MemoryNotifyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试断言用: 当前全部记录的快照
    pub fn records(&self) -> Vec<NotifyRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyLedger for MemoryNotifyLedger {
    async fn record_attempt(
        &self,
        order_no: &str,
        gateway_transaction_id: Option<&str>,
        raw_payload: &str,
        sign_valid: bool,
    ) -> PayResult<Uuid> {
        let mut records = self.records.lock().unwrap();
        let retry_count = records.iter().filter(|r| r.order_no == order_no).count() as i32;
        let id = Uuid::new_v4();
        let now = Utc::now();
        records.push(NotifyRecord {
            id,
            order_no: order_no.to_string(),
            gateway_transaction_id: gateway_transaction_id.map(String::from),
            raw_payload: raw_payload.to_string(),
            sign_valid,
            process_status: NotifyProcessStatus::Pending,
            retry_count,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn mark_processed(&self, notify_id: Uuid, outcome: NotifyProcessStatus) -> PayResult<()> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.id == notify_id) {
            record.process_status = outcome;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn has_succeeded_for(&self, gateway_transaction_id: &str) -> PayResult<bool> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().any(|r| {
            r.gateway_transaction_id.as_deref() == Some(gateway_transaction_id)
                && r.process_status == NotifyProcessStatus::Success
        }))
    }
}

#[derive(Default)]
struct CreditState {
    /// order_no为键，唯一约束语义
    grants: HashMap<String, CreditGrant>,
    accounts: HashMap<Uuid, CreditAccount>,
    /// operation_id为键
    pending: HashMap<Uuid, PendingDeduction>,
}

impl CreditState {
    fn balance_of(&self, user_id: Uuid) -> i64 {
        self.accounts.get(&user_id).map(|a| a.balance).unwrap_or(0)
    }

    fn credit(&mut self, user_id: Uuid, delta: i64) -> i64 {
        let account = self.accounts.entry(user_id).or_insert_with(|| CreditAccount {
            user_id,
            balance: 0,
            updated_at: Utc::now(),
        });
        account.balance += delta;
        account.updated_at = Utc::now();
        account.balance
    }
}

/// 内存积分账本
#[derive(Default)]
pub struct MemoryCreditLedger {
    state: Mutex<CreditState>,
}

impl MemoryCreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试断言用: 某订单是否已发放
    pub fn grant_exists(&self, order_no: &str) -> bool {
        self.state.lock().unwrap().grants.contains_key(order_no)
    }

    /// 测试断言用: 发放记录总数
    pub fn grant_count(&self) -> usize {
        self.state.lock().unwrap().grants.len()
    }

    /// 测试环境准备: 直接写入余额
    pub fn set_balance(&self, user_id: Uuid, balance: i64) {
        self.state.lock().unwrap().accounts.insert(
            user_id,
            CreditAccount {
                user_id,
                balance,
                updated_at: Utc::now(),
            },
        );
    }
}

#[async_trait]
impl CreditLedger for MemoryCreditLedger {
    async fn grant_once(&self, order_no: &str, user_id: Uuid, points: i64) -> PayResult<i64> {
        let mut state = self.state.lock().unwrap();
        if !state.grants.contains_key(order_no) {
            state.grants.insert(
                order_no.to_string(),
                CreditGrant {
                    order_no: order_no.to_string(),
                    user_id,
                    points,
                    created_at: Utc::now(),
                },
            );
            state.credit(user_id, points);
        }
        Ok(state.balance_of(user_id))
    }

    async fn balance(&self, user_id: Uuid) -> PayResult<i64> {
        Ok(self.state.lock().unwrap().balance_of(user_id))
    }

    async fn check_and_deduct(
        &self,
        user_id: Uuid,
        cost: i64,
        operation_id: Uuid,
    ) -> PayResult<i64> {
        let mut state = self.state.lock().unwrap();

        if state.pending.contains_key(&operation_id) {
            return Ok(state.balance_of(user_id));
        }

        let balance = state.balance_of(user_id);
        if balance < cost {
            return Err(PayError::InsufficientBalance {
                balance,
                required: cost,
            });
        }

        state.credit(user_id, -cost);
        state.pending.insert(
            operation_id,
            PendingDeduction {
                operation_id,
                user_id,
                amount: cost,
                created_at: Utc::now(),
            },
        );
        Ok(balance - cost)
    }

    async fn refund(&self, operation_id: Uuid, _reason: &str) -> PayResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(deduction) = state.pending.remove(&operation_id) {
            state.credit(deduction.user_id, deduction.amount);
        }
        Ok(())
    }
}

/// 内存套餐目录
#[derive(Default)]
pub struct MemoryPackageStore {
    packages: Mutex<HashMap<Uuid, Package>>,
}

impl MemoryPackageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 测试环境准备: 写入套餐
    pub fn insert(&self, package: Package) {
        self.packages.lock().unwrap().insert(package.id, package);
    }
}

#[async_trait]
impl PackageStore for MemoryPackageStore {
    async fn get_active(&self, package_id: Uuid) -> PayResult<Option<Package>> {
        Ok(self
            .packages
            .lock()
            .unwrap()
            .get(&package_id)
            .filter(|p| p.active)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn pending_order(order_no: &str) -> Order {
        let now = Utc::now();
        Order {
            order_no: order_no.to_string(),
            out_trade_no: format!("PAY-{}", order_no),
            user_id: Uuid::new_v4(),
            package_id: Uuid::new_v4(),
            amount: Decimal::new(2990, 2),
            points: 300,
            bonus_points: 50,
            payment_method: Default::default(),
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

    #[tokio::test]
    async fn test_create_rejects_duplicate_out_trade_no() {
        let store = MemoryOrderStore::new();
        let order = pending_order("ORD1");
        store.create(&order).await.unwrap();

        let mut dup = pending_order("ORD2");
        dup.out_trade_no = order.out_trade_no.clone();
        assert!(matches!(
            store.create(&dup).await,
            Err(PayError::DuplicateOrder(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_guard() {
        let store = MemoryOrderStore::new();
        store.create(&pending_order("ORD1")).await.unwrap();

        let outcome = store
            .transition(
                "ORD1",
                &[OrderStatus::Pending],
                OrderStatus::Paid,
                OrderPatch::default(),
            )
            .await
            .unwrap();
        assert!(outcome.applied);

        // 终态之后守卫必须拒绝任何再迁移
        let outcome = store
            .transition(
                "ORD1",
                &[OrderStatus::Pending],
                OrderStatus::Cancelled,
                OrderPatch::default(),
            )
            .await
            .unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.current, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_transition_unknown_order() {
        let store = MemoryOrderStore::new();
        let result = store
            .transition(
                "MISSING",
                &[OrderStatus::Pending],
                OrderStatus::Paid,
                OrderPatch::default(),
            )
            .await;
        assert!(matches!(result, Err(PayError::UnknownOrder(_))));
    }

    #[tokio::test]
    async fn test_expired_pending_selection() {
        let store = MemoryOrderStore::new();
        let mut stale = pending_order("ORD1");
        stale.expires_at = Utc::now() - Duration::minutes(1);
        store.create(&stale).await.unwrap();
        store.create(&pending_order("ORD2")).await.unwrap();

        let expired = store.expired_pending(Utc::now(), 10).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].order_no, "ORD1");
    }

    #[tokio::test]
    async fn test_grant_once_is_idempotent() {
        let ledger = MemoryCreditLedger::new();
        let user = Uuid::new_v4();

        assert_eq!(ledger.grant_once("ORD1", user, 350).await.unwrap(), 350);
        assert_eq!(ledger.grant_once("ORD1", user, 350).await.unwrap(), 350);
        assert_eq!(ledger.grant_count(), 1);
        assert_eq!(ledger.balance(user).await.unwrap(), 350);
    }

    #[tokio::test]
    async fn test_check_and_deduct_and_refund() {
        let ledger = MemoryCreditLedger::new();
        let user = Uuid::new_v4();
        ledger.set_balance(user, 100);
        let op = Uuid::new_v4();

        assert_eq!(ledger.check_and_deduct(user, 40, op).await.unwrap(), 60);
        // 同一operation_id重试不再扣减
        assert_eq!(ledger.check_and_deduct(user, 40, op).await.unwrap(), 60);

        ledger.refund(op, "downstream call failed").await.unwrap();
        assert_eq!(ledger.balance(user).await.unwrap(), 100);
        // 再次退还同一operation_id是no-op
        ledger.refund(op, "retry").await.unwrap();
        assert_eq!(ledger.balance(user).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_insufficient_balance_has_no_side_effect() {
        let ledger = MemoryCreditLedger::new();
        let user = Uuid::new_v4();
        ledger.set_balance(user, 10);

        let result = ledger.check_and_deduct(user, 40, Uuid::new_v4()).await;
        assert!(matches!(
            result,
            Err(PayError::InsufficientBalance {
                balance: 10,
                required: 40
            })
        ));
        assert_eq!(ledger.balance(user).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_notify_ledger_dedup() {
        let ledger = MemoryNotifyLedger::new();
        let id = ledger
            .record_attempt("ORD1", Some("WX999"), "<xml/>", true)
            .await
            .unwrap();
        assert!(!ledger.has_succeeded_for("WX999").await.unwrap());

        ledger
            .mark_processed(id, NotifyProcessStatus::Success)
            .await
            .unwrap();
        assert!(ledger.has_succeeded_for("WX999").await.unwrap());
        assert!(!ledger.has_succeeded_for("WX000").await.unwrap());
    }

    #[tokio::test]
    async fn test_notify_ledger_counts_retries() {
        let ledger = MemoryNotifyLedger::new();
        ledger
            .record_attempt("ORD1", Some("WX999"), "<xml/>", true)
            .await
            .unwrap();
        ledger
            .record_attempt("ORD1", Some("WX999"), "<xml/>", true)
            .await
            .unwrap();
        let records = ledger.records();
        assert_eq!(records[0].retry_count, 0);
        assert_eq!(records[1].retry_count, 1);
    }
}
