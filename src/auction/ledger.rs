use chrono::Duration;
use chrono::Utc;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::auction::BidError;
use crate::auction::lifecycle;
use crate::db::Db;
use crate::models::AuctionRow;

/// Read-compute-CAS cycles attempted before a race is surfaced as
/// `Contention`.
pub const MAX_CAS_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct BidAccepted {
  pub bid_id: i64,
  pub amount: i64,
  pub previous_price: i64,
  /// Auction row as of the successful swap.
  pub auction: AuctionRow,
  /// Most recent holder of a strictly lower bid, excluding the new bidder.
  pub outbid: Option<(i64, i64)>,
}

/// Places the single next-increment bid for `bidder_tg_id`.
///
/// Each attempt reads the latest persisted auction row, computes
/// `current_price + min_increment`, and tries the conditional update that
/// advances the price only if nobody moved it in between. The bid row is
/// inserted only after the swap succeeds, so a stale price can never be
/// recorded. Losing the swap retries the whole cycle; the window is
/// re-validated on every read because the auction may close mid-race.
#[instrument(skip(db, bidder_name))]
pub async fn place_bid(
  db: &Db,
  auction_id: i64,
  bidder_tg_id: i64,
  bidder_name: &str,
) -> Result<BidAccepted, BidError> {
  for attempt in 1 ..= MAX_CAS_ATTEMPTS {
    let auction = db.get_auction(auction_id).await?.ok_or(BidError::NotFound)?;

    if let Err(err) = lifecycle::window_open(&auction, Utc::now()) {
      if matches!(err, BidError::Expired) && db.mark_auction_ended(auction_id).await? {
        info!(auction_id, "lazily ended auction past deadline during bid");
      }
      return Err(err);
    }

    let expected = auction.current_price;
    let amount = auction.next_bid_amount();

    if db.try_advance_price(auction_id, expected, amount).await? {
      let bid_id = db.insert_bid(auction_id, bidder_tg_id, bidder_name, amount).await?;
      let outbid = db.previous_highest_bid(auction_id, amount, bidder_tg_id).await?;
      info!(auction_id, bidder_tg_id, amount, attempt, "bid accepted");

      let mut refreshed = auction;
      refreshed.current_price = amount;
      refreshed.bid_count += 1;
      return Ok(BidAccepted {
        bid_id,
        amount,
        previous_price: expected,
        auction: refreshed,
        outbid,
      });
    }

    warn!(auction_id, bidder_tg_id, attempt, "price moved during bid, retrying");
  }

  Err(BidError::Contention(MAX_CAS_ATTEMPTS))
}

/// Latest committed price.
#[instrument(skip(db))]
pub async fn current_price(db: &Db, auction_id: i64) -> Result<i64, BidError> {
  let auction = db.get_auction(auction_id).await?.ok_or(BidError::NotFound)?;
  Ok(auction.current_price)
}

/// True when the bidder already placed a bid on this auction inside the
/// cooldown window. Per-auction, never global.
#[instrument(skip(db))]
pub async fn recent_bid_by(db: &Db, auction_id: i64, bidder_tg_id: i64, window_ms: i64) -> Result<bool, BidError> {
  if window_ms <= 0 {
    return Ok(false);
  }
  let since = Utc::now() - Duration::milliseconds(window_ms);
  Ok(db.has_bid_since(auction_id, bidder_tg_id, since).await?)
}
