//! Wire messages exchanged with connected clients
//!
//! Every message is `{"type": "<MESSAGE_TYPE>", "payload": {...}}`.
//! Inbound: NEW_ORDER, CANCEL_ORDER, SUBMIT_SIGNATURE.
//! Outbound: ORDER_ADDED, ORDER_PENDING, ORDER_SUCCESS, ORDER_CANCELLED,
//! REQUEST_SIGNATURE, ERROR.

use serde::{Deserialize, Serialize};
use std::fmt;
use types::errors::ErrorCode;
use types::ids::Hash;
use types::numeric::Amount;
use types::order::Order;
use types::signing::Signature;
use types::trade::Trade;

/// Message type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    NewOrder,
    CancelOrder,
    SubmitSignature,
    OrderAdded,
    OrderPending,
    OrderSuccess,
    OrderCancelled,
    RequestSignature,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::NewOrder => "NEW_ORDER",
            MessageType::CancelOrder => "CANCEL_ORDER",
            MessageType::SubmitSignature => "SUBMIT_SIGNATURE",
            MessageType::OrderAdded => "ORDER_ADDED",
            MessageType::OrderPending => "ORDER_PENDING",
            MessageType::OrderSuccess => "ORDER_SUCCESS",
            MessageType::OrderCancelled => "ORDER_CANCELLED",
            MessageType::RequestSignature => "REQUEST_SIGNATURE",
            MessageType::Error => "ERROR",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Message received from a connected account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    NewOrder(Order),
    CancelOrder(CancelRequest),
    SubmitSignature(SignatureResponse),
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ClientMessage::NewOrder(_) => MessageType::NewOrder,
            ClientMessage::CancelOrder(_) => MessageType::CancelOrder,
            ClientMessage::SubmitSignature(_) => MessageType::SubmitSignature,
        }
    }
}

/// Owner's request to cancel a resting order, signed over the order hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub order_hash: Hash,
    pub signature: Signature,
}

/// Taker's answer to REQUEST_SIGNATURE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureResponse {
    pub taker_order_hash: Hash,
    pub trades: Vec<TradeSignature>,
    /// Signature over the residual order's hash, if one was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_order: Option<Signature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSignature {
    pub trade_hash: Hash,
    pub signature: Signature,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Lifecycle event delivered to one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    OrderAdded(Order),
    OrderPending(TradeNotice),
    OrderSuccess(TradeNotice),
    OrderCancelled(Order),
    RequestSignature(SignatureRequest),
    Error(ErrorPayload),
}

impl EngineEvent {
    pub fn message_type(&self) -> MessageType {
        match self {
            EngineEvent::OrderAdded(_) => MessageType::OrderAdded,
            EngineEvent::OrderPending(_) => MessageType::OrderPending,
            EngineEvent::OrderSuccess(_) => MessageType::OrderSuccess,
            EngineEvent::OrderCancelled(_) => MessageType::OrderCancelled,
            EngineEvent::RequestSignature(_) => MessageType::RequestSignature,
            EngineEvent::Error(_) => MessageType::Error,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        EngineEvent::Error(ErrorPayload {
            code,
            message: message.into(),
            order_hash: None,
            trade_hash: None,
        })
    }

    pub fn order_error(code: ErrorCode, message: impl Into<String>, order_hash: Hash) -> Self {
        EngineEvent::Error(ErrorPayload {
            code,
            message: message.into(),
            order_hash: Some(order_hash),
            trade_hash: None,
        })
    }

    pub fn trade_error(code: ErrorCode, message: impl Into<String>, trade_hash: Hash) -> Self {
        EngineEvent::Error(ErrorPayload {
            code,
            message: message.into(),
            order_hash: None,
            trade_hash: Some(trade_hash),
        })
    }
}

/// An order together with the trade that moved it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeNotice {
    pub order: Order,
    pub trade: Trade,
}

/// Trade terms the taker must sign before on-chain submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequest {
    pub taker_order_hash: Hash,
    pub matches: Vec<MatchedTrade>,
    /// Residual record to sign, if the taker was REPLACED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_order: Option<Order>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedTrade {
    pub maker_order: Order,
    pub trade: Trade,
    /// Exact quote-token consideration of the trade
    pub quote_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_hash: Option<Hash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_hash: Option<Hash>,
}
