// 应用状态管理
// 包含数据库连接池、配置信息与拼装好的服务实例

use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use anyhow::Result;
use sqlx::PgPool;

use crate::config::Config;
use crate::gateway::{HttpGatewayClient, RetryPolicy};
use crate::services::{CreditService, NotifyService, OrderService, SweepService};
use crate::store::{PgCreditLedger, PgNotifyLedger, PgOrderStore, PgPackageStore};

/// 应用全局状态
pub struct AppState {
    /// 数据库连接池
    pub db_pool: PgPool,
    /// 应用配置
    pub config: Config,
    /// 订单服务
    pub order_service: Arc<OrderService>,
    /// 回调处理服务
    pub notify_service: Arc<NotifyService>,
    /// 积分服务
    pub credit_service: Arc<CreditService>,
    /// 过期扫描服务
    pub sweep_service: Arc<SweepService>,
}

impl AppState {
    /// 从连接池和配置拼装全部服务
    pub fn new(db_pool: PgPool, config: Config) -> Result<Self> {
        let orders = Arc::new(PgOrderStore::new(db_pool.clone()));
        let packages = Arc::new(PgPackageStore::new(db_pool.clone()));
        let notifies = Arc::new(PgNotifyLedger::new(db_pool.clone()));
        let credit_ledger = Arc::new(PgCreditLedger::new(db_pool.clone()));

        let gateway = Arc::new(HttpGatewayClient::new(config.gateway.clone())?);
        let retry = RetryPolicy::new(
            config.gateway.max_attempts,
            Duration::from_millis(config.gateway.retry_base_ms),
        );

        let credit_service = Arc::new(CreditService::new(
            credit_ledger,
            Duration::from_secs(config.credit.cache_ttl_secs),
        ));

        let order_service = Arc::new(OrderService::new(
            orders.clone(),
            packages,
            gateway.clone(),
            credit_service.clone(),
            retry.clone(),
            chrono::Duration::seconds(config.order.ttl_secs),
        ));

        let notify_service = Arc::new(NotifyService::new(
            notifies,
            order_service.clone(),
            config.gateway.sign_type,
            config.gateway.api_secret.clone(),
        ));

        let sweep_service = Arc::new(SweepService::new(
            orders,
            gateway,
            order_service.clone(),
            retry,
            Duration::from_secs(config.order.sweep_interval_secs),
            config.order.sweep_batch,
        ));

        Ok(Self {
            db_pool,
            config,
            order_service,
            notify_service,
            credit_service,
            sweep_service,
        })
    }
}

/// 应用状态数据类型别名
pub type AppStateData = web::Data<AppState>;
