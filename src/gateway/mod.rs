// 网关协议模块
// 签名、编解码、出站客户端；原始报文不越过本模块边界

pub mod client;
pub mod codec;
pub mod sign;

pub use client::{CreateOrderCall, GatewayApi, HttpGatewayClient, RetryPolicy};
pub use codec::NotifyPayload;
pub use sign::SignType;
