use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::utils::markdown;

use crate::bot::action::bid_data;
use crate::models::AuctionRow;
use crate::models::AuctionStatus;
use crate::models::DiamondRow;
use crate::util::format_carat;
use crate::util::format_money;

fn status_label(status: AuctionStatus) -> &'static str {
  match status {
    AuctionStatus::Pending => "NOT STARTED",
    AuctionStatus::Active => "OPEN FOR BIDS",
    AuctionStatus::Ended => "ENDED",
    AuctionStatus::Settled => "SETTLED",
    AuctionStatus::Cancelled => "CANCELLED",
  }
}

pub fn render_auction_card(diamond: &DiamondRow, auction: &AuctionRow) -> String {
  let escaped_id = markdown::escape(&format!("#{}", auction.id));
  let stone = format!(
    "{} {} · {} · {}",
    diamond.shape,
    format_carat(diamond.carat_points),
    diamond.color,
    diamond.clarity
  );
  let escaped_stone = markdown::escape(&stone);

  let mut text = format!("💎 *{}* — *{}*", escaped_id, escaped_stone);
  text.push_str(&format!("\n📦 Stock {}", markdown::escape(&diamond.stock_number)));

  if auction.bid_count == 0 {
    let line = markdown::escape(&format!(
      "💰 Starting at: {}",
      format_money(auction.current_price, &auction.currency)
    ));
    text.push_str(&format!("\n\n{}", line));
  } else {
    let line = markdown::escape(&format!(
      "💰 Current price: {} ({} bid(s))",
      format_money(auction.current_price, &auction.currency),
      auction.bid_count
    ));
    text.push_str(&format!("\n\n{}", line));
  }

  if auction.status.accepts_bids() {
    let line = markdown::escape(&format!(
      "⏫ Next bid: {}",
      format_money(auction.next_bid_amount(), &auction.currency)
    ));
    text.push_str(&format!("\n{}", line));
    let deadline = markdown::escape(&format!("⏰ Ends: {}", auction.ends_at.format("%Y-%m-%d %H:%M UTC")));
    text.push_str(&format!("\n{}", deadline));
  }

  text.push_str(&format!("\n📣 Status: {}", status_label(auction.status)));
  text
}

/// Bidding UI offers exactly one action: the next increment. No free-form
/// amounts.
pub fn auction_card_keyboard(auction: &AuctionRow) -> InlineKeyboardMarkup {
  if !auction.status.accepts_bids() {
    return InlineKeyboardMarkup::default();
  }
  let label = format!("💸 Bid {}", format_money(auction.next_bid_amount(), &auction.currency));
  InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
    label,
    bid_data(auction.id, None),
  )]])
}

#[cfg(test)]
mod tests {
  use super::auction_card_keyboard;
  use super::render_auction_card;
  use crate::models::AuctionRow;
  use crate::models::AuctionStatus;
  use crate::models::DiamondRow;
  use chrono::Duration;
  use chrono::Utc;

  fn diamond() -> DiamondRow {
    DiamondRow {
      id: 3,
      stock_number: "DD-1042".to_string(),
      shape: "Round".to_string(),
      carat_points: 152,
      color: "F".to_string(),
      clarity: "VS1".to_string(),
      image_file_id: None,
      created_at: Utc::now(),
    }
  }

  fn auction(status: AuctionStatus, bid_count: i64, current_price: i64) -> AuctionRow {
    AuctionRow {
      id: 12,
      diamond_id: 3,
      seller_tg_id: 100,
      starting_price: 100000,
      min_increment: 10000,
      currency: "USD".to_string(),
      current_price,
      bid_count,
      status,
      ends_at: Utc::now() + Duration::hours(2),
      winner_tg_id: None,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn fresh_auction_shows_starting_price() {
    let text = render_auction_card(&diamond(), &auction(AuctionStatus::Active, 0, 100000));
    assert!(text.contains("Starting at"));
    assert!(text.contains("USD 1000"));
    assert!(text.contains("Next bid"));
    assert!(text.contains("OPEN FOR BIDS"));
  }

  #[test]
  fn contested_auction_shows_current_price_and_count() {
    let text = render_auction_card(&diamond(), &auction(AuctionStatus::Active, 3, 130000));
    assert!(text.contains("Current price"));
    assert!(text.contains("USD 1300"));
    assert!(text.contains("3 bid"));
  }

  #[test]
  fn closed_card_has_no_deadline_or_next_bid() {
    let text = render_auction_card(&diamond(), &auction(AuctionStatus::Ended, 3, 130000));
    assert!(!text.contains("Next bid"));
    assert!(!text.contains("Ends:"));
    assert!(text.contains("ENDED"));
  }

  #[test]
  fn keyboard_offers_exactly_the_next_increment() {
    let keyboard = auction_card_keyboard(&auction(AuctionStatus::Active, 1, 110000));
    assert_eq!(keyboard.inline_keyboard.len(), 1);
    assert_eq!(keyboard.inline_keyboard[0].len(), 1);
    let button = &keyboard.inline_keyboard[0][0];
    assert!(button.text.contains("USD 1200.00"));
  }

  #[test]
  fn no_keyboard_once_closed() {
    for status in [AuctionStatus::Pending, AuctionStatus::Ended, AuctionStatus::Cancelled] {
      let keyboard = auction_card_keyboard(&auction(status, 1, 110000));
      assert!(keyboard.inline_keyboard.is_empty());
    }
  }
}
