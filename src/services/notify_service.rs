// 回调处理服务
// 入站回调的完整处理链: 解码 → 验签 → 订单定位 → 去重 → 金额校验
// → 守卫式迁移 → 幂等发放 → 记录处理结果
//
// 网关可能对同一事件回调零次、一次或多次，顺序任意，甚至在订单
// 本地已过期之后；本服务保证投递顺序不影响最终状态 (幂等收敛)

use std::sync::Arc;

use crate::error::{PayError, PayResult};
use crate::gateway::{codec, sign, NotifyPayload, SignType};
use crate::models::NotifyProcessStatus;
use crate::services::order_service::{OrderService, PaidSettlement};
use crate::store::NotifyLedger;

/// 回调处理结果 (全部正向应答网关)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// 本次投递完成了支付落账
    Paid,
    /// 网关报告终态失败，订单置FAILED
    Failed,
    /// 重复投递，业务逻辑未重放
    ///
    /// 重复也必须正向应答——网关对非成功应答会按自身策略持续重发
    Duplicate,
    /// 死订单上的迟到支付，已告警等待人工对账
    LatePayment(crate::models::OrderStatus),
}

/// 回调处理服务
pub struct NotifyService {
    notifies: Arc<dyn NotifyLedger>,
    order_service: Arc<OrderService>,
    sign_type: SignType,
    api_secret: String,
}

impl NotifyService {
    /// 创建新的回调处理服务实例
    pub fn new(
        notifies: Arc<dyn NotifyLedger>,
        order_service: Arc<OrderService>,
        sign_type: SignType,
        api_secret: String,
    ) -> Self {
        Self {
            notifies,
            order_service,
            sign_type,
            api_secret,
        }
    }

    /// 处理一次回调投递
    ///
    /// Ok(_) 映射为成功应答 (网关停止重发)；Err(_) 映射为失败应答。
    /// 验证与解析类错误在触碰订单存储之前被拒绝
    pub async fn handle_webhook(&self, raw: &str) -> PayResult<NotifyOutcome> {
        // 1. 解码；失败则不触碰任何存储
        let fields = codec::decode_xml(raw)?;
        let out_trade_no = fields.get("out_trade_no").cloned().unwrap_or_default();
        let transaction_id = fields.get("transaction_id").cloned();

        // 2. 验签；无效签名记录在案后拒绝
        let sign_ok = match fields.get("sign") {
            Some(signature) => {
                sign::verify(&fields, signature, self.sign_type, &self.api_secret)
                    .map_err(|e| PayError::MalformedPayload(e.to_string()))?
            }
            None => false,
        };
        if !sign_ok {
            let notify_id = self
                .notifies
                .record_attempt(
                    if out_trade_no.is_empty() { "unknown" } else { &out_trade_no },
                    transaction_id.as_deref(),
                    raw,
                    false,
                )
                .await?;
            self.notifies
                .mark_processed(notify_id, NotifyProcessStatus::Failed)
                .await?;
            log::warn!(
                "Rejected gateway notify with invalid signature (out_trade_no {:?})",
                out_trade_no
            );
            return Err(PayError::Signature);
        }

        let payload = NotifyPayload::from_fields(&fields)?;
        if payload.return_code != "SUCCESS" {
            return Err(PayError::MalformedPayload(format!(
                "notify with return_code {}",
                payload.return_code
            )));
        }

        // 3. 订单定位；找不到大概率是开通配置问题，记录并告警
        let order = match self
            .order_service
            .find_by_out_trade_no(&payload.out_trade_no)
            .await?
        {
            Some(order) => order,
            None => {
                let notify_id = self
                    .notifies
                    .record_attempt(
                        &payload.out_trade_no,
                        payload.transaction_id.as_deref(),
                        raw,
                        true,
                    )
                    .await?;
                self.notifies
                    .mark_processed(notify_id, NotifyProcessStatus::Failed)
                    .await?;
                log::error!(
                    "ALERT gateway notify for unknown order {} (transaction {:?})",
                    payload.out_trade_no,
                    payload.transaction_id
                );
                return Err(PayError::UnknownOrder(payload.out_trade_no));
            }
        };

        let notify_id = self
            .notifies
            .record_attempt(
                &order.order_no,
                payload.transaction_id.as_deref(),
                raw,
                true,
            )
            .await?;

        // 4. 去重: 该网关交易号已处理成功过 → 正向应答，不重放业务逻辑
        if let Some(txn) = &payload.transaction_id {
            if self.notifies.has_succeeded_for(txn).await? {
                self.notifies
                    .mark_processed(notify_id, NotifyProcessStatus::Success)
                    .await?;
                log::info!(
                    "Duplicate notify for order {} (transaction {}), acknowledged without replay",
                    order.order_no,
                    txn
                );
                return Ok(NotifyOutcome::Duplicate);
            }
        }

        // 网关报告终态失败
        if payload.is_failure() {
            self.order_service
                .settle_failed(&order, &payload.failure_reason())
                .await?;
            self.notifies
                .mark_processed(notify_id, NotifyProcessStatus::Success)
                .await?;
            return Ok(NotifyOutcome::Failed);
        }

        if !payload.is_success() {
            self.notifies
                .mark_processed(notify_id, NotifyProcessStatus::Failed)
                .await?;
            return Err(PayError::MalformedPayload(
                "notify is neither success nor failure".to_string(),
            ));
        }

        let transaction_id = payload.transaction_id.clone().ok_or_else(|| {
            PayError::MalformedPayload("success notify without transaction_id".to_string())
        })?;
        let reported_fee = payload.total_fee.ok_or_else(|| {
            PayError::MalformedPayload("success notify without total_fee".to_string())
        })?;

        // 5-7. 金额校验 → 守卫式迁移 → 幂等发放 (settle_paid内部保证顺序)
        let settlement = match self
            .order_service
            .settle_paid(&order, &transaction_id, reported_fee, true)
            .await
        {
            Ok(settlement) => settlement,
            Err(e) => {
                self.notifies
                    .mark_processed(notify_id, NotifyProcessStatus::Failed)
                    .await?;
                return Err(e);
            }
        };

        // 8. 记录处理结果
        self.notifies
            .mark_processed(notify_id, NotifyProcessStatus::Success)
            .await?;

        Ok(match settlement {
            PaidSettlement::Applied => NotifyOutcome::Paid,
            PaidSettlement::AlreadyPaid => NotifyOutcome::Duplicate,
            PaidSettlement::DeadOrder(status) => NotifyOutcome::LatePayment(status),
        })
    }
}
