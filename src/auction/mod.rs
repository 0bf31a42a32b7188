use thiserror::Error;

pub mod ledger;
pub mod lifecycle;

/// Rejection taxonomy for a bid attempt. Every variant maps to a distinct
/// user-facing reason; only `Contention` arises from the mutation itself,
/// everything else is decided before the ledger is touched.
#[derive(Debug, Error)]
pub enum BidError {
  #[error(transparent)]
  Storage(#[from] anyhow::Error),
  #[error("auction not found")]
  NotFound,
  #[error("auction has not started")]
  NotStarted,
  #[error("auction deadline passed")]
  Expired,
  #[error("auction is closed")]
  Closed,
  #[error("sellers cannot bid on their own auction")]
  SelfBid,
  #[error("bidder is inside the cooldown window")]
  RateLimited,
  #[error("lost the price race {0} time(s)")]
  Contention(u32),
}

impl BidError {
  pub fn user_message(&self) -> String {
    match self {
      Self::Storage(_) => "Temporary error placing your bid, try again later.".to_string(),
      Self::NotFound => "❓ Auction not found.".to_string(),
      Self::NotStarted => "🕰️ This auction has not started yet.".to_string(),
      Self::Expired => "⏰ Time's up! This auction has ended.".to_string(),
      Self::Closed => "🔒 This auction is closed.".to_string(),
      Self::SelfBid => "🙅 You cannot bid on your own auction.".to_string(),
      Self::RateLimited => "⏳ Easy! Wait a few seconds before bidding again.".to_string(),
      Self::Contention(_) => "⚡ The price just moved. Please try again.".to_string(),
    }
  }

  /// Short code recorded with `bid_rejected` analytics events.
  pub fn reason_code(&self) -> &'static str {
    match self {
      Self::Storage(_) => "storage",
      Self::NotFound => "not_found",
      Self::NotStarted => "not_started",
      Self::Expired => "expired",
      Self::Closed => "closed",
      Self::SelfBid => "self_bid",
      Self::RateLimited => "rate_limited",
      Self::Contention(_) => "contention",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::BidError;

  #[test]
  fn every_rejection_has_a_specific_message() {
    let errors = [
      BidError::NotFound,
      BidError::NotStarted,
      BidError::Expired,
      BidError::Closed,
      BidError::SelfBid,
      BidError::RateLimited,
      BidError::Contention(3),
    ];
    let messages: Vec<String> = errors.iter().map(BidError::user_message).collect();
    for (i, message) in messages.iter().enumerate() {
      assert!(!message.is_empty());
      for other in &messages[i + 1 ..] {
        assert_ne!(message, other);
      }
    }
  }

  #[test]
  fn reason_codes_are_stable() {
    assert_eq!(BidError::Expired.reason_code(), "expired");
    assert_eq!(BidError::SelfBid.reason_code(), "self_bid");
    assert_eq!(BidError::Contention(3).reason_code(), "contention");
  }
}
