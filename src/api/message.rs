//! API request and response envelopes

use crate::error::MarketError;
use crate::negotiation::SellerAction;
use crate::pricing::AccountAttributes;
use crate::types::{ListingId, NegotiationId, Role, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One request per line. `caller` stands in for the signed-in user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    OpenNegotiation {
        caller: UserId,
        listing_id: ListingId,
        price: u64,
        #[serde(default)]
        message: Option<String>,
        contact: String,
    },
    PostSellerMessage {
        caller: UserId,
        negotiation_id: NegotiationId,
        action: SellerAction,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        price: Option<u64>,
    },
    PostBuyerMessage {
        caller: UserId,
        negotiation_id: NegotiationId,
        price: u64,
        #[serde(default)]
        content: Option<String>,
    },
    GetNegotiationThread {
        caller: UserId,
        negotiation_id: NegotiationId,
    },
    GetNegotiation {
        caller: UserId,
        negotiation_id: NegotiationId,
    },
    ListMyNegotiations {
        caller: UserId,
        role: Role,
    },
    ListForListing {
        caller: UserId,
        listing_id: ListingId,
    },
    SuggestPrice {
        attributes: AccountAttributes,
    },
    ResumeCascades,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// One response per request line
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: &MarketError) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }
}
