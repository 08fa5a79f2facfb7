// 网关HTTP客户端
// 引擎需要的三个出站调用：统一下单、订单查询、退款
// 只做网络调用，不修改任何本地状态；错误按瞬时/业务二分

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::GatewayConfig;
use crate::error::{PayError, PayResult};
use crate::gateway::codec::{self, TradeState};
use crate::gateway::sign;
use crate::utils::generate_nonce;

/// 统一下单调用参数
#[derive(Debug, Clone)]
pub struct CreateOrderCall {
    /// 商户订单号
    pub out_trade_no: String,
    /// 商品描述
    pub body: String,
    /// 金额 (分)
    pub total_fee: i64,
    /// 用户端IP
    pub client_ip: String,
}

/// 统一下单应答
#[derive(Debug, Clone)]
pub struct CreateOrderReply {
    /// 预支付交易会话标识
    pub prepay_id: Option<String>,
    /// 扫码支付链接
    pub code_url: Option<String>,
    /// 解码后的原始字段集 (审计用)
    pub raw: BTreeMap<String, String>,
}

/// 订单查询应答
#[derive(Debug, Clone)]
pub struct QueryOrderReply {
    /// 交易状态
    pub trade_state: TradeState,
    /// 网关交易号
    pub transaction_id: Option<String>,
    /// 金额 (分)
    pub total_fee: Option<i64>,
}

/// 退款应答
#[derive(Debug, Clone)]
pub struct RefundReply {
    /// 网关退款单号
    pub refund_id: String,
}

/// 网关出站调用接口
///
/// 以trait注入ReconciliationEngine，替代任何隐式全局单例；
/// 测试用脚本化实现替换
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// 统一下单
    async fn create_order(&self, call: &CreateOrderCall) -> PayResult<CreateOrderReply>;

    /// 订单状态查询 (仅供扫描/对账路径使用，回调路径从不调用)
    async fn query_order(&self, out_trade_no: &str) -> PayResult<QueryOrderReply>;

    /// 退款
    async fn refund(
        &self,
        out_trade_no: &str,
        out_refund_no: &str,
        total_fee: i64,
        refund_fee: i64,
    ) -> PayResult<RefundReply>;
}

/// 基于reqwest的网关客户端实现
pub struct HttpGatewayClient {
    client: Client,
    config: GatewayConfig,
}

impl HttpGatewayClient {
    /// 创建新的网关客户端实例
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("CreditPay-Gateway/1.0")
            .build()?;

        Ok(Self { client, config })
    }

    /// 协议公共字段
    fn base_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("appid".to_string(), self.config.app_id.clone());
        fields.insert("mch_id".to_string(), self.config.merchant_id.clone());
        fields.insert("nonce_str".to_string(), generate_nonce(32));
        fields.insert(
            "sign_type".to_string(),
            self.config.sign_type.as_str().to_string(),
        );
        fields
    }

    /// 签名并编码为出站XML
    fn signed_xml(&self, mut fields: BTreeMap<String, String>) -> PayResult<String> {
        let signature = sign::sign(&fields, self.config.sign_type, &self.config.api_secret)
            .map_err(|e| PayError::GatewayBusiness {
                code: "SIGNING".to_string(),
                message: e.to_string(),
            })?;
        fields.insert("sign".to_string(), signature);
        Ok(codec::encode_xml(&fields))
    }

    /// 发送XML请求并解码应答
    async fn post_xml(&self, path: &str, xml: String) -> PayResult<BTreeMap<String, String>> {
        let url = format!("{}{}", self.config.api_base, path);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .body(xml)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PayError::GatewayTransient(format!(
                "gateway returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(PayError::GatewayBusiness {
                code: status.as_u16().to_string(),
                message: format!("unexpected HTTP status from gateway: {}", status),
            });
        }

        let body = response.text().await.map_err(classify_transport)?;
        codec::decode_xml(&body)
    }

    /// 校验应答的协议层结果
    ///
    /// 应答签名无效、通信失败、业务失败都是业务错误，不重试
    fn check_reply(&self, fields: &BTreeMap<String, String>) -> PayResult<()> {
        let signature = fields.get("sign").ok_or_else(|| PayError::GatewayBusiness {
            code: "NO_SIGN".to_string(),
            message: "gateway reply carries no signature".to_string(),
        })?;
        let valid = sign::verify(fields, signature, self.config.sign_type, &self.config.api_secret)
            .map_err(|e| PayError::GatewayBusiness {
                code: "SIGNING".to_string(),
                message: e.to_string(),
            })?;
        if !valid {
            return Err(PayError::GatewayBusiness {
                code: "BAD_SIGN".to_string(),
                message: "gateway reply signature mismatch".to_string(),
            });
        }

        if fields.get("return_code").map(String::as_str) != Some("SUCCESS") {
            return Err(PayError::GatewayBusiness {
                code: "RETURN_FAIL".to_string(),
                message: fields
                    .get("return_msg")
                    .cloned()
                    .unwrap_or_else(|| "gateway communication failure".to_string()),
            });
        }

        if let Some(result_code) = fields.get("result_code") {
            if result_code != "SUCCESS" {
                return Err(PayError::GatewayBusiness {
                    code: fields
                        .get("err_code")
                        .cloned()
                        .unwrap_or_else(|| "FAIL".to_string()),
                    message: fields
                        .get("err_code_des")
                        .cloned()
                        .unwrap_or_else(|| "gateway business failure".to_string()),
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl GatewayApi for HttpGatewayClient {
    async fn create_order(&self, call: &CreateOrderCall) -> PayResult<CreateOrderReply> {
        let mut fields = self.base_fields();
        fields.insert("body".to_string(), call.body.clone());
        fields.insert("out_trade_no".to_string(), call.out_trade_no.clone());
        fields.insert("total_fee".to_string(), call.total_fee.to_string());
        fields.insert("spbill_create_ip".to_string(), call.client_ip.clone());
        fields.insert("notify_url".to_string(), self.config.notify_url.clone());
        fields.insert("trade_type".to_string(), self.config.trade_type.clone());

        let xml = self.signed_xml(fields)?;
        let reply = self.post_xml("/pay/unifiedorder", xml).await?;
        self.check_reply(&reply)?;

        Ok(CreateOrderReply {
            prepay_id: reply.get("prepay_id").cloned(),
            code_url: reply.get("code_url").cloned(),
            raw: reply,
        })
    }

    async fn query_order(&self, out_trade_no: &str) -> PayResult<QueryOrderReply> {
        let mut fields = self.base_fields();
        fields.insert("out_trade_no".to_string(), out_trade_no.to_string());

        let xml = self.signed_xml(fields)?;
        let reply = self.post_xml("/pay/orderquery", xml).await?;
        self.check_reply(&reply)?;

        let trade_state = reply
            .get("trade_state")
            .ok_or_else(|| PayError::MalformedPayload("missing trade_state".to_string()))
            .and_then(|s| TradeState::parse(s))?;

        let total_fee = match reply.get("total_fee") {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                PayError::MalformedPayload(format!("invalid total_fee: {}", raw))
            })?),
            None => None,
        };

        Ok(QueryOrderReply {
            trade_state,
            transaction_id: reply.get("transaction_id").cloned(),
            total_fee,
        })
    }

    async fn refund(
        &self,
        out_trade_no: &str,
        out_refund_no: &str,
        total_fee: i64,
        refund_fee: i64,
    ) -> PayResult<RefundReply> {
        let mut fields = self.base_fields();
        fields.insert("out_trade_no".to_string(), out_trade_no.to_string());
        fields.insert("out_refund_no".to_string(), out_refund_no.to_string());
        fields.insert("total_fee".to_string(), total_fee.to_string());
        fields.insert("refund_fee".to_string(), refund_fee.to_string());

        let xml = self.signed_xml(fields)?;
        let reply = self.post_xml("/secapi/pay/refund", xml).await?;
        self.check_reply(&reply)?;

        let refund_id = reply
            .get("refund_id")
            .cloned()
            .ok_or_else(|| PayError::MalformedPayload("missing refund_id".to_string()))?;

        Ok(RefundReply { refund_id })
    }
}

/// reqwest传输层错误一律视为瞬时错误，由调用方带退避重试
fn classify_transport(e: reqwest::Error) -> PayError {
    PayError::GatewayTransient(e.to_string())
}

/// 有界指数退避重试策略
///
/// 仅重试瞬时错误，且仅用于下单/查单两条出站路径；
/// 回调处理路径必须立即应答网关，从不经过这里。
/// 显式的尝试上限与延迟基数使重试行为对测试可观测，
/// 不存在任何不可观测的后台定时器
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数 (含首次)
    pub max_attempts: u32,
    /// 首次重试延迟，之后逐次翻倍
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// 创建重试策略
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// 执行操作，瞬时错误按指数退避重试到上限
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> PayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = PayResult<T>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    log::warn!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        op_name,
                        attempt,
                        self.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
