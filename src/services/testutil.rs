// 服务层测试工具
// 内存存储 + 脚本化网关拼装出的完整引擎夹具，以及签名回调报文的构造

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{PayError, PayResult};
use crate::gateway::client::{CreateOrderReply, QueryOrderReply, RefundReply};
use crate::gateway::codec::TradeState;
use crate::gateway::{codec, sign, CreateOrderCall, GatewayApi, RetryPolicy, SignType};
use crate::models::Package;
use crate::services::{CreditService, NotifyService, OrderService};
use crate::store::memory::{
    MemoryCreditLedger, MemoryNotifyLedger, MemoryOrderStore, MemoryPackageStore,
};

pub const TEST_SECRET: &str = "unit-test-gateway-secret";

/// 脚本化网关: 按预置脚本应答，记录退款调用
#[derive(Default)]
pub struct ScriptedGateway {
    create_fail: Mutex<Option<(String, String)>>,
    query_replies: Mutex<VecDeque<PayResult<QueryOrderReply>>>,
    refund_calls: Mutex<Vec<(String, i64)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一次下单调用返回业务错误
    pub fn fail_next_create(&self, code: &str, message: &str) {
        *self.create_fail.lock().unwrap() = Some((code.to_string(), message.to_string()));
    }

    /// 预置一次查单应答
    pub fn push_query(&self, reply: QueryOrderReply) {
        self.query_replies.lock().unwrap().push_back(Ok(reply));
    }

    /// 预置一次查单错误
    pub fn push_query_err(&self, error: PayError) {
        self.query_replies.lock().unwrap().push_back(Err(error));
    }

    pub fn refund_calls(&self) -> Vec<(String, i64)> {
        self.refund_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayApi for ScriptedGateway {
    async fn create_order(&self, _call: &CreateOrderCall) -> PayResult<CreateOrderReply> {
        if let Some((code, message)) = self.create_fail.lock().unwrap().take() {
            return Err(PayError::GatewayBusiness { code, message });
        }
        Ok(CreateOrderReply {
            prepay_id: Some("wx-prepay-0001".to_string()),
            code_url: Some("weixin://wxpay/bizpayurl?pr=unit".to_string()),
            raw: BTreeMap::new(),
        })
    }

    async fn query_order(&self, _out_trade_no: &str) -> PayResult<QueryOrderReply> {
        match self.query_replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => Ok(QueryOrderReply {
                trade_state: TradeState::NotPay,
                transaction_id: None,
                total_fee: None,
            }),
        }
    }

    async fn refund(
        &self,
        out_trade_no: &str,
        _out_refund_no: &str,
        _total_fee: i64,
        refund_fee: i64,
    ) -> PayResult<RefundReply> {
        self.refund_calls
            .lock()
            .unwrap()
            .push((out_trade_no.to_string(), refund_fee));
        Ok(RefundReply {
            refund_id: "RF0001".to_string(),
        })
    }
}

/// 拼装好的引擎夹具
pub struct Fixture {
    pub order_service: Arc<OrderService>,
    pub notify_service: Arc<NotifyService>,
    pub orders: Arc<MemoryOrderStore>,
    pub notifies: Arc<MemoryNotifyLedger>,
    pub credits_ledger: Arc<MemoryCreditLedger>,
    pub credits: Arc<CreditService>,
    pub packages: Arc<MemoryPackageStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub package: Package,
    pub user_id: Uuid,
}

/// 构建夹具: 29.90元 / 300+50积分 的套餐，30分钟订单有效期
pub fn fixture() -> Fixture {
    let orders = Arc::new(MemoryOrderStore::new());
    let notifies = Arc::new(MemoryNotifyLedger::new());
    let credits_ledger = Arc::new(MemoryCreditLedger::new());
    let packages = Arc::new(MemoryPackageStore::new());
    let gateway = Arc::new(ScriptedGateway::new());

    let credits = Arc::new(CreditService::new(
        credits_ledger.clone(),
        std::time::Duration::from_secs(60),
    ));

    let package = Package {
        id: Uuid::new_v4(),
        name: "标准充值包 300积分".to_string(),
        amount: Decimal::new(2990, 2),
        points: 300,
        bonus_points: 50,
        active: true,
        created_at: Utc::now(),
    };
    packages.insert(package.clone());

    let order_service = Arc::new(OrderService::new(
        orders.clone(),
        packages.clone(),
        gateway.clone(),
        credits.clone(),
        RetryPolicy::new(2, std::time::Duration::ZERO),
        Duration::minutes(30),
    ));

    let notify_service = Arc::new(NotifyService::new(
        notifies.clone(),
        order_service.clone(),
        SignType::Md5,
        TEST_SECRET.to_string(),
    ));

    Fixture {
        order_service,
        notify_service,
        orders,
        notifies,
        credits_ledger,
        credits,
        packages,
        gateway,
        package,
        user_id: Uuid::new_v4(),
    }
}

/// 构造一条签名有效的支付成功回调
pub fn notify_xml(out_trade_no: &str, transaction_id: &str, total_fee: i64) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("return_code".to_string(), "SUCCESS".to_string());
    fields.insert("result_code".to_string(), "SUCCESS".to_string());
    fields.insert("appid".to_string(), "wx-unit-test".to_string());
    fields.insert("mch_id".to_string(), "1230000109".to_string());
    fields.insert("nonce_str".to_string(), "fixednonce0001".to_string());
    fields.insert("out_trade_no".to_string(), out_trade_no.to_string());
    fields.insert("transaction_id".to_string(), transaction_id.to_string());
    fields.insert("total_fee".to_string(), total_fee.to_string());

    let signature = sign::sign(&fields, SignType::Md5, TEST_SECRET).unwrap();
    fields.insert("sign".to_string(), signature);
    codec::encode_xml(&fields)
}

/// 构造一条签名有效的支付失败回调
pub fn failure_notify_xml(out_trade_no: &str, err_code: &str, err_code_des: &str) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("return_code".to_string(), "SUCCESS".to_string());
    fields.insert("result_code".to_string(), "FAIL".to_string());
    fields.insert("out_trade_no".to_string(), out_trade_no.to_string());
    fields.insert("err_code".to_string(), err_code.to_string());
    fields.insert("err_code_des".to_string(), err_code_des.to_string());

    let signature = sign::sign(&fields, SignType::Md5, TEST_SECRET).unwrap();
    fields.insert("sign".to_string(), signature);
    codec::encode_xml(&fields)
}

/// 篡改报文的一个字段值，签名随之失效
pub fn tampered(xml: &str) -> String {
    xml.replacen("SUCCESS", "SUCCESX", 1)
}
