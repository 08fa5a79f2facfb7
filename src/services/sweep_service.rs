// 过期扫描服务
// 周期性兜底回调通道没能解决的订单: 对已过期的PENDING订单先主动
// 查单 (找回丢失的回调)，网关确认已支付则走与回调相同的落账路径，
// 否则迁移到EXPIRED
//
// 作为带关闭信号的显式后台任务运行，单轮扫描 sweep_once 可直接测试

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::{PayError, PayResult};
use crate::gateway::codec::{self, TradeState};
use crate::gateway::{GatewayApi, RetryPolicy};
use crate::models::{Order, OrderPatch, OrderStatus};
use crate::services::order_service::{OrderService, PaidSettlement};
use crate::store::OrderStore;

/// 单轮扫描统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// 本轮选中的过期PENDING订单数
    pub scanned: usize,
    /// 通过主动查单找回的已支付订单数
    pub recovered: usize,
    /// 迁移到EXPIRED的订单数
    pub expired: usize,
    /// 迁移到FAILED的订单数
    pub failed: usize,
    /// 本轮未能处理的订单数 (留待下一轮或人工)
    pub skipped: usize,
}

/// 过期扫描服务
pub struct SweepService {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn GatewayApi>,
    order_service: Arc<OrderService>,
    retry: RetryPolicy,
    interval: Duration,
    batch: i64,
}

impl SweepService {
    /// 创建新的扫描服务实例
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn GatewayApi>,
        order_service: Arc<OrderService>,
        retry: RetryPolicy,
        interval: Duration,
        batch: i64,
    ) -> Self {
        Self {
            orders,
            gateway,
            order_service,
            retry,
            interval,
            batch,
        }
    }

    /// 后台运行，直到收到关闭信号
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("Sweep task started (interval {:?})", self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(stats) if stats.scanned > 0 => {
                            log::info!(
                                "Sweep pass: {} scanned, {} recovered, {} expired, {} failed, {} skipped",
                                stats.scanned, stats.recovered, stats.expired, stats.failed, stats.skipped
                            );
                        }
                        Ok(_) => {}
                        Err(e) => log::error!("Sweep pass failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::info!("Sweep task shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// 执行一轮扫描
    pub async fn sweep_once(&self) -> PayResult<SweepStats> {
        let now = Utc::now();
        let expired = self.orders.expired_pending(now, self.batch).await?;

        let mut stats = SweepStats {
            scanned: expired.len(),
            ..Default::default()
        };

        for order in &expired {
            match self.resolve_order(order).await {
                Ok(resolution) => match resolution {
                    Resolution::Recovered => stats.recovered += 1,
                    Resolution::Expired => stats.expired += 1,
                    Resolution::Failed => stats.failed += 1,
                    Resolution::Skipped => stats.skipped += 1,
                },
                Err(e) => {
                    log::error!("Sweep could not resolve order {}: {}", order.order_no, e);
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }

    /// 解决单个过期订单: 先查单，支付成功走落账，否则过期
    async fn resolve_order(&self, order: &Order) -> PayResult<Resolution> {
        let query = self
            .retry
            .run("gateway order query", || {
                self.gateway.query_order(&order.out_trade_no)
            })
            .await;

        match query {
            Ok(reply) => match reply.trade_state {
                TradeState::Success => {
                    let transaction_id = reply.transaction_id.ok_or_else(|| {
                        PayError::MalformedPayload(
                            "paid query reply without transaction_id".to_string(),
                        )
                    })?;
                    let reported_fee = reply.total_fee.ok_or_else(|| {
                        PayError::MalformedPayload("paid query reply without total_fee".to_string())
                    })?;

                    log::info!(
                        "Recovered lost notification for order {} via query (transaction {}, {} yuan)",
                        order.order_no,
                        transaction_id,
                        codec::fen_to_yuan(reported_fee)
                    );
                    match self
                        .order_service
                        .settle_paid(order, &transaction_id, reported_fee, false)
                        .await?
                    {
                        PaidSettlement::Applied | PaidSettlement::AlreadyPaid => {
                            Ok(Resolution::Recovered)
                        }
                        // 查单期间被并发调用抢先终结，留给人工视角
                        PaidSettlement::DeadOrder(_) => Ok(Resolution::Skipped),
                    }
                }
                TradeState::PayError => {
                    self.order_service
                        .settle_failed(order, "gateway reported PAYERROR")
                        .await?;
                    Ok(Resolution::Failed)
                }
                _ => self.expire(order).await,
            },
            Err(e) => {
                // 查单不可用时仍然过期: 订单已超出有效期，真有钱到账
                // 会由迟到回调触发人工对账路径
                log::warn!(
                    "Order query for {} failed ({}), expiring without confirmation",
                    order.order_no,
                    e
                );
                self.expire(order).await
            }
        }
    }

    async fn expire(&self, order: &Order) -> PayResult<Resolution> {
        let outcome = self
            .orders
            .transition(
                &order.order_no,
                &[OrderStatus::Pending],
                OrderStatus::Expired,
                OrderPatch::default(),
            )
            .await?;

        if outcome.applied {
            log::info!("Order {} expired by sweep", order.order_no);
            Ok(Resolution::Expired)
        } else {
            Ok(Resolution::Skipped)
        }
    }
}

enum Resolution {
    Recovered,
    Expired,
    Failed,
    Skipped,
}
