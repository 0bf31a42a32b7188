use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use tracing::instrument;
use tracing::warn;

use crate::auction::ledger::BidAccepted;
use crate::bot::action::bid_data;
use crate::bot::context::AppContext;
use crate::models::AuctionRow;
use crate::models::EventKind;
use crate::util::format_money;

/// Informs the seller and the outbid bidder about a committed bid. Strictly
/// downstream of the ledger write: every failure here is logged and
/// swallowed, the bid stands regardless.
#[instrument(skip(bot, ctx, accepted))]
pub async fn fan_out_bid(bot: &Bot, ctx: &AppContext, accepted: &BidAccepted, bidder_label: &str) {
  let auction = &accepted.auction;

  if let Err(err) = notify_seller_new_bid(bot, ctx, auction, bidder_label, accepted.amount).await {
    warn!(error = %err, auction_id = auction.id, "failed to notify seller about new bid");
  }

  if let Err(err) = notify_outbid(bot, ctx, accepted, bidder_label).await {
    warn!(error = %err, auction_id = auction.id, "failed to notify outbid bidder");
  }
}

async fn notify_seller_new_bid(
  bot: &Bot,
  ctx: &AppContext,
  auction: &AuctionRow,
  bidder_label: &str,
  amount: i64,
) -> Result<()> {
  if ctx.db().notifications_disabled(auction.seller_tg_id).await? {
    return Ok(());
  }

  bot
    .send_message(
      ChatId(auction.seller_tg_id),
      format!(
        "💎 New bid on auction #{}: {} offered {}.",
        auction.id,
        bidder_label,
        format_money(amount, &auction.currency),
      ),
    )
    .await?;
  record_notification(ctx, auction.id, auction.seller_tg_id, "seller_new_bid", None).await;
  Ok(())
}

/// The outbid notice carries a counter-bid button whose tracking id links a
/// later press back to this send.
async fn notify_outbid(bot: &Bot, ctx: &AppContext, accepted: &BidAccepted, new_bidder_label: &str) -> Result<()> {
  let Some((outbid_tg_id, previous_amount)) = accepted.outbid else {
    return Ok(());
  };
  if ctx.db().notifications_disabled(outbid_tg_id).await? {
    return Ok(());
  }

  let auction = &accepted.auction;
  let tracking = format!("ob{}", accepted.bid_id);
  let counter_label = format!("💸 Bid {}", format_money(auction.next_bid_amount(), &auction.currency));
  let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
    counter_label,
    bid_data(auction.id, Some(&tracking)),
  )]]);

  bot
    .send_message(
      ChatId(outbid_tg_id),
      format!(
        "⚠️ Your bid of {} on auction #{} was beaten by {}. New highest bid: {}.",
        format_money(previous_amount, &auction.currency),
        auction.id,
        new_bidder_label,
        format_money(accepted.amount, &auction.currency),
      ),
    )
    .reply_markup(keyboard)
    .await?;
  record_notification(ctx, auction.id, outbid_tg_id, "outbid", Some(&tracking)).await;
  Ok(())
}

/// End-of-auction fan-out: winner notice to the final highest bidder, ended
/// summary to the seller. Returns the winner (id, amount) when one exists so
/// the caller can settle. Each delivery is independent; one failure never
/// blocks the other recipient.
#[instrument(skip(bot, ctx))]
pub async fn fan_out_auction_ended(bot: &Bot, ctx: &AppContext, auction: &AuctionRow) -> Result<Option<(i64, i64)>> {
  let top = ctx.db().top_bid(auction.id).await?;

  if let Some((winner_id, _, amount)) = &top {
    match ctx.db().notifications_disabled(*winner_id).await {
      Ok(true) => {},
      Ok(false) => {
        let text = format!(
          "🏆 Congratulations! You won auction #{} with a bid of {}. The seller will contact you to settle.",
          auction.id,
          format_money(*amount, &auction.currency),
        );
        match bot.send_message(ChatId(*winner_id), text).await {
          Ok(_) => record_notification(ctx, auction.id, *winner_id, "winner", None).await,
          Err(err) => warn!(error = %err, auction_id = auction.id, winner_id, "failed to notify winner"),
        }
      },
      Err(err) => warn!(error = %err, auction_id = auction.id, winner_id, "failed to check winner mute flag"),
    }
  }

  let seller_text = match &top {
    Some((_, winner_name, amount)) => format!(
      "🏁 Auction #{} ended. Final price: {} ({}).",
      auction.id,
      format_money(*amount, &auction.currency),
      winner_name,
    ),
    None => format!("🏁 Auction #{} ended with no bids.", auction.id),
  };
  match ctx.db().notifications_disabled(auction.seller_tg_id).await {
    Ok(true) => {},
    Ok(false) => match bot.send_message(ChatId(auction.seller_tg_id), seller_text).await {
      Ok(_) => record_notification(ctx, auction.id, auction.seller_tg_id, "auction_ended", None).await,
      Err(err) => warn!(error = %err, auction_id = auction.id, "failed to notify seller about auction end"),
    },
    Err(err) => warn!(error = %err, auction_id = auction.id, "failed to check seller mute flag"),
  }

  Ok(top.map(|(winner_id, _, amount)| (winner_id, amount)))
}

async fn record_notification(ctx: &AppContext, auction_id: i64, recipient: i64, detail: &str, tracking: Option<&str>) {
  if let Err(err) = ctx
    .db()
    .insert_event(
      Some(auction_id),
      Some(recipient),
      EventKind::NotificationSent,
      Some(detail),
      tracking,
    )
    .await
  {
    warn!(error = %err, auction_id, detail, "failed to record notification event");
  }
}
