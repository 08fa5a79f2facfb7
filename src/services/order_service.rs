// 订单服务
// 对账引擎的订单侧: 创建 (套餐快照 + 统一下单)、查询、取消，
// 以及回调与扫描共用的支付落账路径 settle_paid
//
// 所有依赖通过构造函数注入，不存在隐式全局单例

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::error::{PayError, PayResult};
use crate::gateway::{codec, CreateOrderCall, GatewayApi, RetryPolicy};
use crate::models::{
    CreateOrderResponse, Order, OrderPatch, OrderResponse, OrderStatus, PaymentMethod,
};
use crate::services::CreditService;
use crate::store::{OrderStore, PackageStore};
use crate::utils::{generate_order_no, validate_amount, validate_points};
use uuid::Uuid;

/// 支付落账结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidSettlement {
    /// 本次调用完成了PENDING→PAID迁移并发放积分
    Applied,
    /// 订单已是PAID (重复投递或崩溃恢复重放)；发放经幂等检查后补齐
    AlreadyPaid,
    /// 订单已死 (CANCELLED/EXPIRED/FAILED)，钱到了但订单救不回来，
    /// 需要人工对账，绝不静默丢弃
    DeadOrder(OrderStatus),
}

/// 订单服务
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    packages: Arc<dyn PackageStore>,
    gateway: Arc<dyn GatewayApi>,
    credits: Arc<CreditService>,
    retry: RetryPolicy,
    order_ttl: Duration,
}

impl OrderService {
    /// 创建新的订单服务实例
    pub fn new(
        orders: Arc<dyn OrderStore>,
        packages: Arc<dyn PackageStore>,
        gateway: Arc<dyn GatewayApi>,
        credits: Arc<CreditService>,
        retry: RetryPolicy,
        order_ttl: Duration,
    ) -> Self {
        Self {
            orders,
            packages,
            gateway,
            credits,
            retry,
            order_ttl,
        }
    }

    /// 创建充值订单
    ///
    /// 金额与积分在此刻从套餐快照固定；之后套餐改价不影响本订单。
    /// 先落库PENDING再调网关，下单失败时订单被置为FAILED
    pub async fn create_order(
        &self,
        user_id: Uuid,
        package_id: Uuid,
        client_ip: &str,
    ) -> PayResult<CreateOrderResponse> {
        let package = self
            .packages
            .get_active(package_id)
            .await?
            .ok_or(PayError::PackageNotFound(package_id))?;

        validate_amount(&package.amount)
            .map_err(|e| PayError::MalformedPayload(e.to_string()))?;
        validate_points(package.points + package.bonus_points)
            .map_err(|e| PayError::MalformedPayload(e.to_string()))?;

        let now = Utc::now();
        let order = Order {
            order_no: generate_order_no("ORD"),
            out_trade_no: generate_order_no("PAY"),
            user_id,
            package_id,
            amount: package.amount,
            points: package.points,
            bonus_points: package.bonus_points,
            payment_method: PaymentMethod::Wallet,
            status: OrderStatus::Pending,
            gateway_transaction_id: None,
            paid_at: None,
            notified_at: None,
            expires_at: now + self.order_ttl,
            fail_reason: None,
            created_at: now,
            updated_at: now,
        };

        self.orders.create(&order).await?;

        let call = CreateOrderCall {
            out_trade_no: order.out_trade_no.clone(),
            body: package.name.clone(),
            total_fee: codec::yuan_to_fen(order.amount)?,
            client_ip: client_ip.to_string(),
        };

        let reply = match self
            .retry
            .run("gateway unified order", || self.gateway.create_order(&call))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                // 下单失败的订单没有支付入口，直接置FAILED
                let _ = self
                    .orders
                    .transition(
                        &order.order_no,
                        &[OrderStatus::Pending],
                        OrderStatus::Failed,
                        OrderPatch {
                            fail_reason: Some(format!("unified order failed: {}", e)),
                            ..Default::default()
                        },
                    )
                    .await;
                return Err(e);
            }
        };

        log::info!(
            "Created order {} (out_trade_no {}) for user {}, amount {} yuan",
            order.order_no,
            order.out_trade_no,
            user_id,
            order.amount
        );

        Ok(CreateOrderResponse {
            order_no: order.order_no,
            out_trade_no: order.out_trade_no,
            amount: order.amount,
            total_points: order.points + order.bonus_points,
            code_url: reply.code_url,
            prepay_id: reply.prepay_id,
            expires_at: order.expires_at,
        })
    }

    /// 查询订单 (带归属校验)
    pub async fn get_order(&self, order_no: &str, user_id: Uuid) -> PayResult<OrderResponse> {
        let order = self
            .orders
            .get(order_no)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| PayError::UnknownOrder(order_no.to_string()))?;

        Ok(order.to_response())
    }

    /// 用户取消订单
    ///
    /// 仅允许从PENDING取消；支付已抢先落地时返回"已结算"，
    /// 而不是覆盖已有终态
    pub async fn cancel(&self, order_no: &str, user_id: Uuid) -> PayResult<OrderResponse> {
        let order = self
            .orders
            .get(order_no)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| PayError::UnknownOrder(order_no.to_string()))?;

        // 终态是吸收态，读到终态即可直接拒绝；PENDING仍须经守卫迁移裁决
        if order.status.is_terminal() {
            return Err(PayError::TerminalStateViolation {
                order_no: order.order_no,
                status: order.status,
            });
        }

        let outcome = self
            .orders
            .transition(
                &order.order_no,
                &[OrderStatus::Pending],
                OrderStatus::Cancelled,
                OrderPatch::default(),
            )
            .await?;

        if !outcome.applied {
            return Err(PayError::TerminalStateViolation {
                order_no: order.order_no,
                status: outcome.current,
            });
        }

        log::info!("Order {} cancelled by user {}", order_no, user_id);
        self.get_order(order_no, user_id).await
    }

    /// 支付成功落账 (回调路径与扫描路径共用)
    ///
    /// 顺序不可交换: 金额校验必须先于状态迁移，状态迁移必须先于积分
    /// 发放——发放的幂等键依赖迁移确实发生过。发放本身再由
    /// credit_grants唯一约束兜底，迁移后进程崩溃的重放会在这里补齐
    pub async fn settle_paid(
        &self,
        order: &Order,
        transaction_id: &str,
        reported_fee: i64,
        notified: bool,
    ) -> PayResult<PaidSettlement> {
        let expected_fee = codec::yuan_to_fen(order.amount)?;
        if reported_fee != expected_fee {
            log::error!(
                "ALERT amount mismatch on order {}: expected {} fen, gateway reported {} fen \
                 (transaction {}), refusing to credit",
                order.order_no,
                expected_fee,
                reported_fee,
                transaction_id
            );
            return Err(PayError::AmountMismatch {
                order_no: order.order_no.clone(),
                expected: expected_fee,
                reported: reported_fee,
            });
        }

        let now = Utc::now();
        let outcome = self
            .orders
            .transition(
                &order.order_no,
                &[OrderStatus::Pending],
                OrderStatus::Paid,
                OrderPatch {
                    gateway_transaction_id: Some(transaction_id.to_string()),
                    paid_at: Some(now),
                    notified_at: notified.then_some(now),
                    fail_reason: None,
                },
            )
            .await?;

        if outcome.applied {
            self.credits
                .grant_once(&order.order_no, order.user_id, order.total_points())
                .await?;
            log::info!(
                "Order {} settled as PAID (transaction {})",
                order.order_no,
                transaction_id
            );
            return Ok(PaidSettlement::Applied);
        }

        match outcome.current {
            OrderStatus::Paid => {
                // 已PAID: 重复投递，或上次在迁移与发放之间崩溃。
                // 发放按orderNo幂等，重放补齐即可
                self.credits
                    .grant_once(&order.order_no, order.user_id, order.total_points())
                    .await?;
                Ok(PaidSettlement::AlreadyPaid)
            }
            dead => {
                log::error!(
                    "ALERT late payment on dead order {} (status {:?}, transaction {}): \
                     money arrived for an order this system already finalized, \
                     manual reconciliation required",
                    order.order_no,
                    dead,
                    transaction_id
                );
                Ok(PaidSettlement::DeadOrder(dead))
            }
        }
    }

    /// 按商户订单号查询 (回调与扫描路径内部使用)
    pub(crate) async fn find_by_out_trade_no(&self, out_trade_no: &str) -> PayResult<Option<Order>> {
        self.orders.get_by_out_trade_no(out_trade_no).await
    }

    /// 网关报告终态失败时的落账
    pub(crate) async fn settle_failed(&self, order: &Order, reason: &str) -> PayResult<bool> {
        let outcome = self
            .orders
            .transition(
                &order.order_no,
                &[OrderStatus::Pending],
                OrderStatus::Failed,
                OrderPatch {
                    fail_reason: Some(reason.to_string()),
                    notified_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        if !outcome.applied {
            log::warn!(
                "Gateway failure report for order {} ignored, already {:?}",
                order.order_no,
                outcome.current
            );
        }
        Ok(outcome.applied)
    }
}
