use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::auction::BidError;
use crate::auction::ledger;
use crate::db::Db;
use crate::models::AuctionRow;
use crate::models::AuctionStatus;

/// Pure status/deadline half of the gate. Returns `Expired` when the row
/// still says active but the deadline has passed; the caller is responsible
/// for flipping the row to ended.
pub fn window_open(auction: &AuctionRow, now: DateTime<Utc>) -> Result<(), BidError> {
  match auction.status {
    AuctionStatus::Active if now >= auction.ends_at => Err(BidError::Expired),
    AuctionStatus::Active => Ok(()),
    AuctionStatus::Pending => Err(BidError::NotStarted),
    AuctionStatus::Ended | AuctionStatus::Settled | AuctionStatus::Cancelled => Err(BidError::Closed),
  }
}

/// Full pure gate: window first (cheap, actor-independent), then self-bid.
pub fn bid_gate(auction: &AuctionRow, actor_tg_id: i64, now: DateTime<Utc>) -> Result<(), BidError> {
  window_open(auction, now)?;
  if actor_tg_id == auction.seller_tg_id {
    return Err(BidError::SelfBid);
  }
  Ok(())
}

/// Runs every eligibility rule in order and returns the auction row a
/// passing bid may be placed against. Side effect: an active auction whose
/// deadline has passed is flipped to ended before the rejection is returned,
/// so no bid is ever accepted past the deadline even if no sweep has run.
#[instrument(skip(db))]
pub async fn check_bid_eligibility(
  db: &Db,
  auction_id: i64,
  actor_tg_id: i64,
  cooldown_ms: i64,
) -> Result<AuctionRow, BidError> {
  let auction = db.get_auction(auction_id).await?.ok_or(BidError::NotFound)?;

  if let Err(err) = bid_gate(&auction, actor_tg_id, Utc::now()) {
    if matches!(err, BidError::Expired) {
      expire_lazily(db, &auction).await?;
    }
    return Err(err);
  }

  if ledger::recent_bid_by(db, auction_id, actor_tg_id, cooldown_ms).await? {
    return Err(BidError::RateLimited);
  }

  Ok(auction)
}

async fn expire_lazily(db: &Db, auction: &AuctionRow) -> Result<(), BidError> {
  if db.mark_auction_ended(auction.id).await? {
    info!(auction_id = auction.id, ends_at = %auction.ends_at, "lazily ended auction past deadline");
  }
  Ok(())
}

#[derive(Debug)]
pub enum EndOutcome {
  Ended(AuctionRow),
  NotFound,
  NotActive(AuctionStatus),
}

/// `active -> ended`, requested by the admin flow. The status condition is
/// enforced by the datastore update, so a concurrent end attempt resolves to
/// `NotActive` instead of double-applying.
#[instrument(skip(db))]
pub async fn end_auction(db: &Db, auction_id: i64) -> Result<EndOutcome> {
  let Some(auction) = db.get_auction(auction_id).await? else {
    return Ok(EndOutcome::NotFound);
  };

  if !db.mark_auction_ended(auction_id).await? {
    return Ok(match db.get_auction(auction_id).await? {
      Some(current) => EndOutcome::NotActive(current.status),
      None => EndOutcome::NotFound,
    });
  }

  info!(auction_id, seller_tg_id = auction.seller_tg_id, "auction ended");
  let mut ended = auction;
  ended.status = AuctionStatus::Ended;
  Ok(EndOutcome::Ended(ended))
}

/// `ended -> settled`, recording the winner. Settlement only exists for
/// auctions that produced a winner.
#[instrument(skip(db))]
pub async fn settle_auction(db: &Db, auction: &AuctionRow, winner_tg_id: i64) -> Result<bool> {
  if !auction.status.can_transition_to(AuctionStatus::Settled) {
    warn!(auction_id = auction.id, status = auction.status.as_str(), "settle requested for unsettleable auction");
    return Ok(false);
  }
  let settled = db.mark_auction_settled(auction.id, winner_tg_id).await?;
  if settled {
    info!(auction_id = auction.id, winner_tg_id, "auction settled");
  }
  Ok(settled)
}

#[cfg(test)]
mod tests {
  use super::bid_gate;
  use super::window_open;
  use crate::auction::BidError;
  use crate::models::AuctionRow;
  use crate::models::AuctionStatus;
  use chrono::Duration;
  use chrono::Utc;

  fn auction(status: AuctionStatus, ends_in_secs: i64) -> AuctionRow {
    let now = Utc::now();
    AuctionRow {
      id: 7,
      diamond_id: 3,
      seller_tg_id: 100,
      starting_price: 1000,
      min_increment: 100,
      currency: "USD".to_string(),
      current_price: 1000,
      bid_count: 0,
      status,
      ends_at: now + Duration::seconds(ends_in_secs),
      winner_tg_id: None,
      created_at: now,
    }
  }

  #[test]
  fn open_window_accepts() {
    let row = auction(AuctionStatus::Active, 3600);
    assert!(window_open(&row, Utc::now()).is_ok());
  }

  #[test]
  fn deadline_passed_is_expired() {
    let row = auction(AuctionStatus::Active, -1);
    assert!(matches!(window_open(&row, Utc::now()), Err(BidError::Expired)));
  }

  #[test]
  fn pending_is_not_started() {
    let row = auction(AuctionStatus::Pending, 3600);
    assert!(matches!(window_open(&row, Utc::now()), Err(BidError::NotStarted)));
  }

  #[test]
  fn terminal_states_are_closed() {
    for status in [AuctionStatus::Ended, AuctionStatus::Settled, AuctionStatus::Cancelled] {
      let row = auction(status, 3600);
      assert!(matches!(window_open(&row, Utc::now()), Err(BidError::Closed)));
    }
  }

  #[test]
  fn seller_cannot_bid() {
    let row = auction(AuctionStatus::Active, 3600);
    assert!(matches!(bid_gate(&row, row.seller_tg_id, Utc::now()), Err(BidError::SelfBid)));
    assert!(bid_gate(&row, 200, Utc::now()).is_ok());
  }

  #[test]
  fn expiry_is_checked_before_self_bid() {
    // the window rejection wins even for the seller, keeping reason codes
    // independent of the actor
    let row = auction(AuctionStatus::Active, -1);
    assert!(matches!(bid_gate(&row, row.seller_tg_id, Utc::now()), Err(BidError::Expired)));
  }
}
