use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateBidderPositionInput {
    #[serde(rename = "saleID")]
    pub sale_id: String,
    #[serde(rename = "artworkID")]
    pub artwork_id: String,
    pub max_bid_amount_cents: i64,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(from = "String")]
pub enum MutationStatus {
    Success,
    Other(String),
}

impl From<String> for MutationStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "SUCCESS" => MutationStatus::Success,
            _ => MutationStatus::Other(value),
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateBidderPositionResult {
    pub status: MutationStatus,
    pub position: Option<CreatedPosition>,
    #[serde(default)]
    pub message_header: Option<String>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPosition {
    #[serde(rename = "internalID")]
    pub id: String,
    pub sale_artwork: Option<SaleArtworkRef>,
}

impl CreatedPosition {
    /// Bidder registration the server attached the new position to.
    pub fn bidder_id(&self) -> Option<&str> {
        self.sale_artwork
            .as_ref()?
            .sale
            .as_ref()?
            .registration_status
            .as_ref()
            .map(|registration| registration.id.as_str())
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct SaleArtworkRef {
    pub sale: Option<SaleRef>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaleRef {
    pub registration_status: Option<InternalRef>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct InternalRef {
    #[serde(rename = "internalID")]
    pub id: String,
}

/// Server-owned status of a bidder position. Anything besides the three
/// known values is a failure reported by the server (sale closed, reserve
/// not met, live bidding started...).
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(from = "String")]
pub enum PositionStatus {
    Pending,
    Winning,
    Outbid,
    Failed(String),
}

impl From<String> for PositionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PENDING" => PositionStatus::Pending,
            "WINNING" => PositionStatus::Winning,
            "OUTBID" => PositionStatus::Outbid,
            _ => PositionStatus::Failed(value),
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Pending => write!(f, "PENDING"),
            PositionStatus::Winning => write!(f, "WINNING"),
            PositionStatus::Outbid => write!(f, "OUTBID"),
            PositionStatus::Failed(status) => write!(f, "{}", status),
        }
    }
}

/// Read-only snapshot of a bidder position as returned by one poll.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct BidderPositionSnapshot {
    pub status: PositionStatus,
    pub position: InternalRef,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn creation_result_exposes_bidder_id() {
        let result: CreateBidderPositionResult = serde_json::from_value(json!({
            "status": "SUCCESS",
            "position": {
                "internalID": "position-1",
                "saleArtwork": { "sale": { "registrationStatus": { "internalID": "bidder-9" } } }
            },
            "messageHeader": null
        }))
        .unwrap();
        assert_eq!(result.status, MutationStatus::Success);
        let position = result.position.unwrap();
        assert_eq!(position.id, "position-1");
        assert_eq!(position.bidder_id(), Some("bidder-9"));
    }

    #[test]
    fn unknown_statuses_are_kept() {
        let status: PositionStatus = serde_json::from_value(json!("RESERVE_NOT_MET")).unwrap();
        assert_eq!(status, PositionStatus::Failed("RESERVE_NOT_MET".to_string()));
        assert_eq!(status.to_string(), "RESERVE_NOT_MET");

        let status: MutationStatus = serde_json::from_value(json!("BIDDER_NOT_QUALIFIED")).unwrap();
        assert_eq!(status, MutationStatus::Other("BIDDER_NOT_QUALIFIED".to_string()));
    }

    #[test]
    fn input_uses_upstream_field_names() {
        let input = CreateBidderPositionInput {
            sale_id: "s".to_string(),
            artwork_id: "a".to_string(),
            max_bid_amount_cents: 100,
        };
        assert_eq!(
            serde_json::to_value(input).unwrap(),
            json!({ "saleID": "s", "artworkID": "a", "maxBidAmountCents": 100 })
        );
    }
}
