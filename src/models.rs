use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use teloxide::types::FileId;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(dead_code)]
pub struct UserRow {
  pub id: i64, // tg id
  pub username: Option<String>,
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  pub notifications_disabled: bool,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiamondRow {
  pub id: i64,
  pub stock_number: String,
  pub shape: String,
  pub carat_points: i64, // hundredths of a carat
  pub color: String,
  pub clarity: String,
  pub image_file_id: Option<FileId>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
  Pending,
  Active,
  Ended,
  Settled,
  Cancelled,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown auction status: {0}")]
pub struct UnknownStatus(String);

impl AuctionStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Active => "active",
      Self::Ended => "ended",
      Self::Settled => "settled",
      Self::Cancelled => "cancelled",
    }
  }

  pub fn accepts_bids(self) -> bool {
    matches!(self, Self::Active)
  }

  pub fn can_transition_to(self, next: Self) -> bool {
    matches!(
      (self, next),
      (Self::Pending, Self::Active)
        | (Self::Pending, Self::Cancelled)
        | (Self::Active, Self::Ended)
        | (Self::Active, Self::Cancelled)
        | (Self::Ended, Self::Settled)
    )
  }
}

impl FromStr for AuctionStatus {
  type Err = UnknownStatus;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value {
      "pending" => Ok(Self::Pending),
      "active" => Ok(Self::Active),
      "ended" => Ok(Self::Ended),
      "settled" => Ok(Self::Settled),
      "cancelled" => Ok(Self::Cancelled),
      other => Err(UnknownStatus(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionRow {
  pub id: i64,
  pub diamond_id: i64,
  pub seller_tg_id: i64,
  pub starting_price: i64,
  pub min_increment: i64,
  pub currency: String,
  pub current_price: i64,
  pub bid_count: i64,
  pub status: AuctionStatus,
  pub ends_at: DateTime<Utc>,
  pub winner_tg_id: Option<i64>,
  pub created_at: DateTime<Utc>,
}

impl AuctionRow {
  /// The only amount the next bid may carry.
  pub fn next_bid_amount(&self) -> i64 {
    self.current_price.saturating_add(self.min_increment)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(dead_code)]
pub struct BidRow {
  pub id: i64,
  pub auction_id: i64,
  pub bidder_tg_id: i64,
  pub bidder_name: String,
  pub amount: i64,
  pub created_at: DateTime<Utc>,
}

/// Analytics fact kinds. Write path only, never read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
  ButtonClicked,
  BidAccepted,
  BidRejected,
  NotificationSent,
}

impl EventKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::ButtonClicked => "button_clicked",
      Self::BidAccepted => "bid_accepted",
      Self::BidRejected => "bid_rejected",
      Self::NotificationSent => "notification_sent",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::AuctionRow;
  use super::AuctionStatus;
  use chrono::Utc;

  #[test]
  fn status_round_trips_through_text() {
    for status in [
      AuctionStatus::Pending,
      AuctionStatus::Active,
      AuctionStatus::Ended,
      AuctionStatus::Settled,
      AuctionStatus::Cancelled,
    ] {
      assert_eq!(status.as_str().parse::<AuctionStatus>(), Ok(status));
    }
  }

  #[test]
  fn rejects_unknown_status() {
    assert!("open".parse::<AuctionStatus>().is_err());
  }

  #[test]
  fn only_active_accepts_bids() {
    assert!(AuctionStatus::Active.accepts_bids());
    assert!(!AuctionStatus::Pending.accepts_bids());
    assert!(!AuctionStatus::Ended.accepts_bids());
    assert!(!AuctionStatus::Settled.accepts_bids());
    assert!(!AuctionStatus::Cancelled.accepts_bids());
  }

  #[test]
  fn lifecycle_transitions() {
    assert!(AuctionStatus::Pending.can_transition_to(AuctionStatus::Active));
    assert!(AuctionStatus::Pending.can_transition_to(AuctionStatus::Cancelled));
    assert!(AuctionStatus::Active.can_transition_to(AuctionStatus::Ended));
    assert!(AuctionStatus::Active.can_transition_to(AuctionStatus::Cancelled));
    assert!(AuctionStatus::Ended.can_transition_to(AuctionStatus::Settled));

    assert!(!AuctionStatus::Ended.can_transition_to(AuctionStatus::Active));
    assert!(!AuctionStatus::Settled.can_transition_to(AuctionStatus::Ended));
    assert!(!AuctionStatus::Cancelled.can_transition_to(AuctionStatus::Active));
  }

  #[test]
  fn next_bid_is_one_increment_above_current() {
    let auction = AuctionRow {
      id: 1,
      diamond_id: 1,
      seller_tg_id: 10,
      starting_price: 1000,
      min_increment: 100,
      currency: "USD".to_string(),
      current_price: 1100,
      bid_count: 1,
      status: AuctionStatus::Active,
      ends_at: Utc::now(),
      winner_tg_id: None,
      created_at: Utc::now(),
    };
    assert_eq!(auction.next_bid_amount(), 1200);
  }
}
