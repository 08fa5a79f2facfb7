// 积分服务
// 在持久账本之上加一层只读余额缓存；每次成功的发放/扣减/退还
// 都显式失效缓存。资金决策永远由持久账本做出，缓存只服务余额展示

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::PayResult;
use crate::store::CreditLedger;

struct CacheEntry {
    balance: i64,
    cached_at: Instant,
}

/// 积分服务
pub struct CreditService {
    ledger: Arc<dyn CreditLedger>,
    cache: Mutex<HashMap<Uuid, CacheEntry>>,
    cache_ttl: Duration,
}

impl CreditService {
    /// 创建新的积分服务实例
    pub fn new(ledger: Arc<dyn CreditLedger>, cache_ttl: Duration) -> Self {
        Self {
            ledger,
            cache: Mutex::new(HashMap::new()),
            cache_ttl,
        }
    }

    /// 查询余额 (读穿缓存)
    pub async fn balance(&self, user_id: Uuid) -> PayResult<i64> {
        if let Some(balance) = self.cached_balance(user_id) {
            return Ok(balance);
        }

        let balance = self.ledger.balance(user_id).await?;
        self.update_cache(user_id, balance);
        Ok(balance)
    }

    /// 按订单号幂等发放积分
    pub async fn grant_once(&self, order_no: &str, user_id: Uuid, points: i64) -> PayResult<i64> {
        let balance = self.ledger.grant_once(order_no, user_id, points).await?;
        self.update_cache(user_id, balance);
        Ok(balance)
    }

    /// 原子检查扣减；充足性判定发生在账本内部，与缓存无关
    pub async fn check_and_deduct(
        &self,
        user_id: Uuid,
        cost: i64,
        operation_id: Uuid,
    ) -> PayResult<i64> {
        match self.ledger.check_and_deduct(user_id, cost, operation_id).await {
            Ok(balance) => {
                self.update_cache(user_id, balance);
                Ok(balance)
            }
            Err(e) => {
                // 失败也可能暴露缓存陈旧，丢弃该用户的缓存条目
                self.invalidate(user_id);
                Err(e)
            }
        }
    }

    /// 按operation_id退还待结算扣减
    pub async fn refund(&self, operation_id: Uuid, reason: &str) -> PayResult<()> {
        self.ledger.refund(operation_id, reason).await?;
        // 退还接口只拿得到operation_id，无法定位用户，整体失效
        self.cache.lock().unwrap().clear();
        Ok(())
    }

    fn cached_balance(&self, user_id: Uuid) -> Option<i64> {
        let cache = self.cache.lock().unwrap();
        cache
            .get(&user_id)
            .filter(|entry| entry.cached_at.elapsed() < self.cache_ttl)
            .map(|entry| entry.balance)
    }

    fn update_cache(&self, user_id: Uuid, balance: i64) {
        self.cache.lock().unwrap().insert(
            user_id,
            CacheEntry {
                balance,
                cached_at: Instant::now(),
            },
        );
    }

    fn invalidate(&self, user_id: Uuid) {
        self.cache.lock().unwrap().remove(&user_id);
    }
}
