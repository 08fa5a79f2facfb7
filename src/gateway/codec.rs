// 网关报文编解码
// 扁平XML文档与内部类型化记录之间的双向转换，以及元/分换算的唯一入口
//
// 原始报文永远不越过本模块边界：其他组件只接触类型化记录和BTreeMap字段集

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{PayError, PayResult};

/// 将字段集编码为网关的扁平XML文档
///
/// 所有值包在CDATA中，与遗留协议的惯例一致
pub fn encode_xml(fields: &BTreeMap<String, String>) -> String {
    let mut xml = String::from("<xml>");
    for (key, value) in fields {
        xml.push('<');
        xml.push_str(key);
        xml.push('>');
        xml.push_str("<![CDATA[");
        xml.push_str(value);
        xml.push_str("]]>");
        xml.push_str("</");
        xml.push_str(key);
        xml.push('>');
    }
    xml.push_str("</xml>");
    xml
}

/// 解析网关的扁平XML文档为字段集
///
/// 容忍未知字段 (向前兼容) 和缺失的可选字段；
/// 嵌套层级深于两层的内容被忽略，这在扁平协议中不应出现
pub fn decode_xml(raw: &str) -> PayResult<BTreeMap<String, String>> {
    let mut reader = Reader::from_str(raw);
    let mut fields = BTreeMap::new();
    let mut current_key: Option<String> = None;
    let mut depth: u32 = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth == 2 {
                    current_key =
                        Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    current_key = None;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(t)) => {
                if let Some(key) = &current_key {
                    let value = t
                        .unescape()
                        .map_err(|e| PayError::MalformedPayload(e.to_string()))?;
                    let value = value.trim();
                    if !value.is_empty() {
                        fields.insert(key.clone(), value.to_string());
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(key) = &current_key {
                    fields.insert(
                        key.clone(),
                        String::from_utf8_lossy(&t.into_inner()).into_owned(),
                    );
                }
            }
            // quick-xml在标签未闭合时也会正常给出Eof，须自行校验层级归零
            Ok(Event::Eof) => {
                if depth != 0 {
                    return Err(PayError::MalformedPayload(
                        "unexpected end of document".to_string(),
                    ));
                }
                break;
            }
            Ok(_) => {}
            Err(e) => return Err(PayError::MalformedPayload(e.to_string())),
        }
    }

    if fields.is_empty() {
        return Err(PayError::MalformedPayload(
            "payload contains no fields".to_string(),
        ));
    }

    Ok(fields)
}

/// 元转分
///
/// 网关侧金额一律为最小货币单位 (分) 的整数，
/// 其余组件一律使用十进制元，换算只发生在这里
pub fn yuan_to_fen(amount: Decimal) -> PayResult<i64> {
    let fen = amount * Decimal::from(100);
    if !fen.fract().is_zero() {
        return Err(PayError::MalformedPayload(format!(
            "amount {} has sub-fen precision",
            amount
        )));
    }
    fen.trunc()
        .to_i64()
        .ok_or_else(|| PayError::MalformedPayload(format!("amount {} out of range", amount)))
}

/// 分转元
pub fn fen_to_yuan(fen: i64) -> Decimal {
    Decimal::new(fen, 2)
}

/// 网关交易状态枚举 (查单应答)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeState {
    Success,
    NotPay,
    Closed,
    Refund,
    Revoked,
    UserPaying,
    PayError,
}

impl TradeState {
    /// 从协议字符串解析；未知状态按协议演进处理，归入PayError之外单独报错
    pub fn parse(s: &str) -> PayResult<Self> {
        match s {
            "SUCCESS" => Ok(TradeState::Success),
            "NOTPAY" => Ok(TradeState::NotPay),
            "CLOSED" => Ok(TradeState::Closed),
            "REFUND" => Ok(TradeState::Refund),
            "REVOKED" => Ok(TradeState::Revoked),
            "USERPAYING" => Ok(TradeState::UserPaying),
            "PAYERROR" => Ok(TradeState::PayError),
            other => Err(PayError::MalformedPayload(format!(
                "unknown trade state: {}",
                other
            ))),
        }
    }
}

/// 类型化的支付结果回调载荷
#[derive(Debug, Clone)]
pub struct NotifyPayload {
    /// 商户订单号
    pub out_trade_no: String,
    /// 网关交易号
    pub transaction_id: Option<String>,
    /// 支付金额 (分)
    pub total_fee: Option<i64>,
    /// 通信结果码
    pub return_code: String,
    /// 业务结果码
    pub result_code: Option<String>,
    /// 业务错误码
    pub err_code: Option<String>,
    /// 业务错误描述
    pub err_code_des: Option<String>,
}

impl NotifyPayload {
    /// 从解码后的字段集提取类型化载荷
    pub fn from_fields(fields: &BTreeMap<String, String>) -> PayResult<Self> {
        let out_trade_no = fields
            .get("out_trade_no")
            .cloned()
            .ok_or_else(|| PayError::MalformedPayload("missing out_trade_no".to_string()))?;
        let return_code = fields
            .get("return_code")
            .cloned()
            .ok_or_else(|| PayError::MalformedPayload("missing return_code".to_string()))?;

        let total_fee = match fields.get("total_fee") {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                PayError::MalformedPayload(format!("invalid total_fee: {}", raw))
            })?),
            None => None,
        };

        Ok(Self {
            out_trade_no,
            transaction_id: fields.get("transaction_id").cloned(),
            total_fee,
            return_code,
            result_code: fields.get("result_code").cloned(),
            err_code: fields.get("err_code").cloned(),
            err_code_des: fields.get("err_code_des").cloned(),
        })
    }

    /// 网关是否报告支付成功
    pub fn is_success(&self) -> bool {
        self.return_code == "SUCCESS" && self.result_code.as_deref() == Some("SUCCESS")
    }

    /// 网关是否报告终态失败
    pub fn is_failure(&self) -> bool {
        self.return_code == "SUCCESS" && self.result_code.as_deref() == Some("FAIL")
    }

    /// 失败原因摘要
    pub fn failure_reason(&self) -> String {
        match (&self.err_code, &self.err_code_des) {
            (Some(code), Some(des)) => format!("{}: {}", code, des),
            (Some(code), None) => code.clone(),
            _ => "gateway reported failure".to_string(),
        }
    }
}

/// 回调应答: 成功确认 (网关停止重发)
pub fn ack_success() -> String {
    let mut fields = BTreeMap::new();
    fields.insert("return_code".to_string(), "SUCCESS".to_string());
    fields.insert("return_msg".to_string(), "OK".to_string());
    encode_xml(&fields)
}

/// 回调应答: 失败确认 (网关按自身策略重发)
pub fn ack_fail(msg: &str) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("return_code".to_string(), "FAIL".to_string());
    fields.insert("return_msg".to_string(), msg.to_string());
    encode_xml(&fields)
}
