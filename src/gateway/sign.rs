// 网关签名工具
// 实现网关遗留协议的确定性请求/应答签名与验证 (MD5 / HMAC-SHA256)

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// 签名算法枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignType {
    /// MD5摘要 (网关默认)
    Md5,
    /// HMAC-SHA256，以商户密钥为key
    HmacSha256,
}

impl SignType {
    /// 协议中的算法标识
    pub fn as_str(&self) -> &'static str {
        match self {
            SignType::Md5 => "MD5",
            SignType::HmacSha256 => "HMAC-SHA256",
        }
    }

    /// 从配置字符串解析
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "MD5" => Ok(SignType::Md5),
            "HMAC-SHA256" => Ok(SignType::HmacSha256),
            other => anyhow::bail!("Unsupported sign type: {}", other),
        }
    }
}

/// 构造签名原串
///
/// 丢弃空值字段和`sign`字段本身，按字典序拼接 `k=v&...&key=SECRET`。
/// 数值字段必须在传入前序列化为规范字符串 (无千分位、无多余小数位)，
/// 否则双方签名会静默不一致
pub fn canonical_string(fields: &BTreeMap<String, String>, secret: &str) -> String {
    let mut parts: Vec<String> = fields
        .iter()
        .filter(|(k, v)| k.as_str() != "sign" && !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    parts.push(format!("key={}", secret));
    parts.join("&")
}

/// 对字段集生成签名
///
/// 纯函数，无网络与时钟访问；相同输入永远产出相同签名
///
/// # Arguments
/// * `fields` - 待签名字段集 (BTreeMap保证字典序)
/// * `sign_type` - 签名算法
/// * `secret` - 商户API密钥
///
/// # Returns
/// * 大写十六进制签名字符串
pub fn sign(fields: &BTreeMap<String, String>, sign_type: SignType, secret: &str) -> Result<String> {
    let message = canonical_string(fields, secret);

    match sign_type {
        SignType::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(message.as_bytes());
            Ok(hex::encode_upper(hasher.finalize()))
        }
        SignType::HmacSha256 => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .context("Invalid HMAC key")?;
            mac.update(message.as_bytes());
            Ok(hex::encode_upper(mac.finalize().into_bytes()))
        }
    }
}

/// 验证字段集的签名
///
/// 重新计算后做常量时间比较
pub fn verify(
    fields: &BTreeMap<String, String>,
    signature: &str,
    sign_type: SignType,
    secret: &str,
) -> Result<bool> {
    let expected = sign(fields, sign_type, secret)?;
    Ok(constant_time_eq(&expected, &signature.to_uppercase()))
}

/// 常量时间字符串比较 (防止时序攻击)
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}
