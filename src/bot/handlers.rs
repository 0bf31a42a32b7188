use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::dispatching::UpdateHandler;
use teloxide::dispatching::dialogue::Dialogue;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::InputFile;
use teloxide::types::Message;
use teloxide::types::MessageId;
use teloxide::types::ParseMode;
use teloxide::types::User;
use teloxide::utils::command::BotCommands;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::auction::BidError;
use crate::auction::ledger;
use crate::auction::lifecycle;
use crate::auction::lifecycle::EndOutcome;
use crate::bot::Command;
use crate::bot::DialogueStorage;
use crate::bot::HandlerResult;
use crate::bot::action::CallbackAction;
use crate::bot::action::MenuTarget;
use crate::bot::card::auction_card_keyboard;
use crate::bot::card::render_auction_card;
use crate::bot::context::AppContext;
use crate::bot::dedup::CachedReply;
use crate::bot::notify;
use crate::bot::state::ConversationState;
use crate::models::AuctionRow;
use crate::models::EventKind;
use crate::util::bidder_label;
use crate::util::format_money;

type SharedContext = Arc<AppContext>;
type BotDialogue = Dialogue<ConversationState, DialogueStorage>;

const MAIN_MENU_TEXT: &str = "💎 What would you like to do?";

/// Hard ceiling on callback handling. Fail closed instead of leaving the
/// press hanging past the provider's own patience.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_schema() -> UpdateHandler<anyhow::Error> {
  let message_handler = Update::filter_message()
    .enter_dialogue::<Message, DialogueStorage, ConversationState>()
    .branch(command_branch())
    .branch(dptree::case![ConversationState::EndAuction { admin_tg_id }].endpoint(handle_end_auction_message))
    .branch(dptree::endpoint(handle_idle_text));

  let callback_handler = Update::filter_callback_query()
    .enter_dialogue::<CallbackQuery, DialogueStorage, ConversationState>()
    .endpoint(handle_callback_query);

  dptree::entry().branch(message_handler).branch(callback_handler)
}

fn command_branch() -> UpdateHandler<anyhow::Error> {
  dptree::entry()
    .filter_command::<Command>()
    .branch(dptree::case![Command::Start].endpoint(handle_start))
    .branch(dptree::case![Command::Help].endpoint(handle_help))
}

#[instrument(skip(bot, ctx, dialogue, msg))]
async fn handle_start(bot: Bot, dialogue: BotDialogue, ctx: SharedContext, msg: Message) -> HandlerResult {
  dialogue.reset().await?;
  let user = msg.from.as_ref().context("message missing sender")?;
  ensure_user_record(&ctx, user).await?;
  let user_id = user.id.0 as i64;
  info!(user_id, chat_id = %msg.chat.id, "received /start command");
  bot
    .send_message(msg.chat.id, MAIN_MENU_TEXT)
    .reply_markup(main_menu_keyboard(&ctx, user_id))
    .await?;
  Ok(())
}

#[instrument(skip(bot, msg))]
async fn handle_help(bot: Bot, msg: Message) -> HandlerResult {
  info!(chat_id = %msg.chat.id, "received /help command");
  let mut text = Command::descriptions().to_string();
  text.push_str("\n\nBrowse live auctions from the menu and bid with one tap. Use /start to open the menu again.");
  bot.send_message(msg.chat.id, text).await?;
  Ok(())
}

fn main_menu_keyboard(ctx: &SharedContext, user_id: i64) -> InlineKeyboardMarkup {
  let mut rows = vec![vec![InlineKeyboardButton::callback(
    "💎 Live auctions",
    "menu:auctions".to_string(),
  )]];

  rows.push(vec![
    InlineKeyboardButton::callback("🪙 My bids", "menu:my_bids".to_string()),
    InlineKeyboardButton::callback("⚙️ My settings", "menu:settings".to_string()),
  ]);

  if ctx.is_admin(user_id) {
    rows.push(vec![InlineKeyboardButton::callback(
      "🛡️ Admin panel",
      "menu:admin".to_string(),
    )]);
  }

  InlineKeyboardMarkup::new(rows)
}

fn admin_menu_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    vec![InlineKeyboardButton::callback(
      "🏁 End auction",
      "admin:end_auction".to_string(),
    )],
    vec![InlineKeyboardButton::callback("⬅️ Main menu", "menu:root".to_string())],
  ])
}

fn main_menu_only_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
    "⬅️ Main menu",
    "menu:root".to_string(),
  )]])
}

fn settings_menu_keyboard(notifications_disabled: bool) -> InlineKeyboardMarkup {
  let toggle_label = if notifications_disabled {
    "🔔 Enable updates"
  } else {
    "🔕 Mute updates"
  };

  InlineKeyboardMarkup::new(vec![
    vec![InlineKeyboardButton::callback(
      toggle_label.to_string(),
      "settings:toggle_notifications".to_string(),
    )],
    vec![InlineKeyboardButton::callback("⬅️ Main menu", "menu:root".to_string())],
  ])
}

/// Edit helper that tolerates the provider reporting an unchanged message.
async fn edit_plain(
  bot: &Bot,
  chat: ChatId,
  message_id: MessageId,
  text: String,
  keyboard: InlineKeyboardMarkup,
) -> HandlerResult {
  let request = bot.edit_message_text(chat, message_id, text).reply_markup(keyboard);
  match request.await {
    Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
    Err(err) => Err(err.into()),
  }
}

#[instrument(skip(bot, ctx))]
async fn show_main_menu(
  bot: &Bot,
  ctx: &SharedContext,
  chat: ChatId,
  message_id: MessageId,
  user_id: i64,
) -> HandlerResult {
  edit_plain(bot, chat, message_id, MAIN_MENU_TEXT.to_string(), main_menu_keyboard(ctx, user_id)).await?;
  info!(user_id, chat_id = %chat, message_id = %message_id, "rendered main menu");
  Ok(())
}

#[instrument(skip(bot))]
async fn show_admin_menu(bot: &Bot, chat: ChatId, message_id: MessageId) -> HandlerResult {
  edit_plain(
    bot,
    chat,
    message_id,
    "🛡️ Admin panel\n\nChoose an action:".to_string(),
    admin_menu_keyboard(),
  )
  .await
}

#[instrument(skip(bot, ctx))]
async fn show_settings_menu(
  bot: &Bot,
  ctx: &SharedContext,
  chat: ChatId,
  message_id: MessageId,
  user_id: i64,
) -> HandlerResult {
  let notifications_disabled = ctx.db().notifications_disabled(user_id).await?;
  let status_line = if notifications_disabled {
    "🔕 Notifications are OFF"
  } else {
    "🔔 Notifications are ON"
  };
  edit_plain(
    bot,
    chat,
    message_id,
    format!("⚙️ Settings\n\n{}\nToggle below to control auction updates.", status_line),
    settings_menu_keyboard(notifications_disabled),
  )
  .await
}

#[instrument(skip(bot, ctx))]
async fn show_live_auctions(bot: &Bot, ctx: &SharedContext, chat: ChatId, message_id: MessageId) -> HandlerResult {
  let auctions = ctx.db().list_active_auctions().await?;
  if auctions.is_empty() {
    info!(chat_id = %chat, "no live auctions to display");
    edit_plain(
      bot,
      chat,
      message_id,
      "💎 No live auctions right now. Check back soon.".to_string(),
      main_menu_only_keyboard(),
    )
    .await?;
    return Ok(());
  }

  info!(chat_id = %chat, count = auctions.len(), "rendering live auctions menu");
  let keyboard = build_auctions_keyboard(ctx, &auctions).await;
  edit_plain(
    bot,
    chat,
    message_id,
    "💎 Live auctions — tap one to view:".to_string(),
    keyboard,
  )
  .await
}

async fn build_auctions_keyboard(ctx: &SharedContext, auctions: &[AuctionRow]) -> InlineKeyboardMarkup {
  use futures::future::join_all;

  let diamonds = join_all(auctions.iter().map(|auction| ctx.db().get_diamond(auction.diamond_id))).await;

  let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
  for (auction, diamond) in auctions.iter().zip(diamonds.into_iter().map(|r| r.unwrap_or(None))) {
    let stone = match diamond {
      Some(diamond) => format!("{} {} {}", diamond.shape, diamond.color, diamond.clarity),
      None => format!("lot #{}", auction.id),
    };
    let label = truncate_button_text(
      &format!("{} — {}", format_money(auction.current_price, &auction.currency), stone),
      48,
    );
    rows.push(vec![InlineKeyboardButton::callback(label, format!("auction:{}", auction.id))]);
  }

  rows.push(vec![InlineKeyboardButton::callback(
    "⬅️ Main menu",
    "menu:root".to_string(),
  )]);

  InlineKeyboardMarkup::new(rows)
}

fn truncate_button_text(text: &str, max_chars: usize) -> String {
  if text.chars().count() <= max_chars {
    return text.to_string();
  }

  let guarded = max_chars.saturating_sub(3);
  if guarded == 0 {
    return "...".to_string();
  }

  let truncated: String = text.chars().take(guarded).collect();
  format!("{truncated}...")
}

#[instrument(skip(bot, ctx))]
async fn send_my_bids_list(bot: &Bot, ctx: &SharedContext, chat: ChatId, user_id: i64) -> HandlerResult {
  let auctions = ctx.db().list_user_bid_auctions(user_id).await?;

  if auctions.is_empty() {
    info!(user_id, chat_id = %chat, "no bids to display");
    bot.send_message(chat, "🪙 You have not placed any bids yet.").await?;
    return Ok(());
  }

  info!(user_id, chat_id = %chat, count = auctions.len(), "sending bid summary");
  bot
    .send_message(chat, format!("🪙 Your auctions ({}):", auctions.len()))
    .await?;

  for auction in auctions {
    if !send_auction_card(bot, ctx, chat, auction.id).await? {
      warn!(auction_id = auction.id, "auction missing while rendering bid list");
    }
  }

  Ok(())
}

async fn send_auction_card(bot: &Bot, ctx: &SharedContext, chat: ChatId, auction_id: i64) -> Result<bool> {
  let Some(auction) = ctx.db().get_auction(auction_id).await? else {
    return Ok(false);
  };
  let Some(diamond) = ctx.db().get_diamond(auction.diamond_id).await? else {
    warn!(auction_id, diamond_id = auction.diamond_id, "diamond missing for auction card");
    return Ok(false);
  };

  if let Some(file_id) = &diamond.image_file_id
    && let Err(err) = bot.send_photo(chat, InputFile::file_id(file_id.clone())).await
  {
    warn!(error = %err, auction_id, "failed to send diamond photo");
  }

  bot
    .send_message(chat, render_auction_card(&diamond, &auction))
    .parse_mode(ParseMode::MarkdownV2)
    .reply_markup(auction_card_keyboard(&auction))
    .await?;
  Ok(true)
}

/// Re-renders an already-displayed card after its auction row changed.
async fn refresh_auction_card(
  bot: &Bot,
  ctx: &SharedContext,
  chat: ChatId,
  message_id: MessageId,
  auction: &AuctionRow,
) -> Result<()> {
  let Some(diamond) = ctx.db().get_diamond(auction.diamond_id).await? else {
    warn!(auction_id = auction.id, diamond_id = auction.diamond_id, "diamond missing while refreshing card");
    return Ok(());
  };
  let request = bot
    .edit_message_text(chat, message_id, render_auction_card(&diamond, auction))
    .parse_mode(ParseMode::MarkdownV2)
    .reply_markup(auction_card_keyboard(auction));
  match request.await {
    Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
    Err(err) => Err(err.into()),
  }
}

#[instrument(skip(bot, ctx, dialogue, query))]
async fn handle_callback_query(
  bot: Bot,
  ctx: SharedContext,
  query: CallbackQuery,
  dialogue: BotDialogue,
) -> HandlerResult {
  ensure_user_record(&ctx, &query.from).await?;
  let user_id = query.from.id.0 as i64;
  let callback_id = query.id.to_string();
  let callback_data = query.data.as_deref().unwrap_or("");
  info!(user_id, callback = callback_data, "handling callback query");

  // A provider delivery retry gets the original reply and runs no side
  // effects again.
  if let Some(reply) = ctx.callback_cache().replay(&callback_id) {
    info!(user_id, callback = callback_data, "duplicate callback delivery, replaying cached reply");
    answer_callback(&bot, &query, &reply).await?;
    return Ok(());
  }

  let action = CallbackAction::parse(callback_data);
  let reply = match tokio::time::timeout(CALLBACK_TIMEOUT, run_action(&bot, &ctx, &dialogue, &query, action)).await {
    Ok(Ok(reply)) => reply,
    Ok(Err(err)) => {
      // the press must still be acknowledged, whatever broke
      warn!(error = ?err, user_id, callback = callback_data, "callback handler failed");
      CachedReply::alert("⚠️ Something went wrong. Please try again.")
    },
    Err(_) => {
      warn!(user_id, callback = callback_data, "callback handler timed out");
      CachedReply::alert("⏱️ That took too long. Please try again.")
    },
  };

  ctx.callback_cache().store(callback_id, reply.clone());
  answer_callback(&bot, &query, &reply).await?;
  Ok(())
}

async fn answer_callback(bot: &Bot, query: &CallbackQuery, reply: &CachedReply) -> Result<()> {
  let mut request = bot.answer_callback_query(query.id.clone());
  if let Some(text) = &reply.text {
    request = request.text(text.clone());
  }
  if reply.show_alert {
    request = request.show_alert(true);
  }
  request.await?;
  Ok(())
}

async fn run_action(
  bot: &Bot,
  ctx: &SharedContext,
  dialogue: &BotDialogue,
  query: &CallbackQuery,
  action: CallbackAction,
) -> Result<CachedReply> {
  let user_id = query.from.id.0 as i64;
  let message_ctx = query.message.as_ref().map(|message| (message.chat().id, message.id()));

  let reply = match action {
    CallbackAction::Menu(MenuTarget::Root) => {
      dialogue.reset().await?;
      if let Some((chat, message_id)) = message_ctx {
        show_main_menu(bot, ctx, chat, message_id, user_id).await?;
      }
      CachedReply::silent()
    },
    CallbackAction::Menu(MenuTarget::Auctions) => {
      dialogue.reset().await?;
      if let Some((chat, message_id)) = message_ctx {
        show_live_auctions(bot, ctx, chat, message_id).await?;
      }
      CachedReply::silent()
    },
    CallbackAction::Menu(MenuTarget::MyBids) => {
      if let Some((chat, _)) = message_ctx {
        send_my_bids_list(bot, ctx, chat, user_id).await?;
      }
      CachedReply::toast("🪙 Sent your bids.")
    },
    CallbackAction::Menu(MenuTarget::Settings) => {
      dialogue.reset().await?;
      if let Some((chat, message_id)) = message_ctx {
        show_settings_menu(bot, ctx, chat, message_id, user_id).await?;
      }
      CachedReply::silent()
    },
    CallbackAction::Menu(MenuTarget::Admin) => {
      if ctx.is_admin(user_id) {
        dialogue.reset().await?;
        if let Some((chat, message_id)) = message_ctx {
          show_admin_menu(bot, chat, message_id).await?;
        }
        CachedReply::silent()
      } else {
        CachedReply::toast("🛡️ Admins only.")
      }
    },
    CallbackAction::ShowAuction { auction_id } => {
      if let Some((chat, _)) = message_ctx {
        if send_auction_card(bot, ctx, chat, auction_id).await? {
          CachedReply::silent()
        } else {
          CachedReply::toast("❓ Auction not found.")
        }
      } else {
        CachedReply::silent()
      }
    },
    CallbackAction::Bid {
      auction_id,
      tracking_id,
    } => process_bid(bot, ctx, message_ctx, &query.from, auction_id, tracking_id.as_deref()).await?,
    CallbackAction::AdminEndAuction => {
      if ctx.is_admin(user_id) {
        dialogue.reset().await?;
        dialogue
          .update(ConversationState::EndAuction { admin_tg_id: user_id })
          .await?;
        if let Some((chat, _)) = message_ctx {
          bot
            .send_message(chat, "🏁 Send the auction ID to end, or type cancel to stop:")
            .await?;
        }
        CachedReply::toast("🏁 Awaiting auction ID.")
      } else {
        CachedReply::toast("🛡️ Admins only.")
      }
    },
    CallbackAction::ToggleNotifications => {
      let currently_disabled = ctx.db().notifications_disabled(user_id).await?;
      let next = !currently_disabled;
      ctx.db().set_notifications_disabled(user_id, next).await?;
      if let Some((chat, message_id)) = message_ctx {
        show_settings_menu(bot, ctx, chat, message_id, user_id).await?;
      }
      if next {
        CachedReply::toast("🔕 Notifications muted.")
      } else {
        CachedReply::toast("🔔 Notifications enabled.")
      }
    },
    CallbackAction::Unknown => {
      info!(user_id, "unrecognized callback action");
      CachedReply::toast("🤷 Unrecognized action.")
    },
  };

  Ok(reply)
}

/// The bid path. Gate through the state machine, commit through the ledger,
/// then treat everything after the commit as best-effort.
#[instrument(skip(bot, ctx, actor))]
async fn process_bid(
  bot: &Bot,
  ctx: &SharedContext,
  message_ctx: Option<(ChatId, MessageId)>,
  actor: &User,
  auction_id: i64,
  tracking_id: Option<&str>,
) -> Result<CachedReply> {
  let user_id = actor.id.0 as i64;
  record_event(ctx, Some(auction_id), Some(user_id), EventKind::ButtonClicked, Some("bid"), tracking_id).await;

  let gate = lifecycle::check_bid_eligibility(ctx.db(), auction_id, user_id, ctx.bid_cooldown_ms()).await;
  let (gated, attempt) = match gate {
    Ok(auction) => {
      let attempt = ledger::place_bid(ctx.db(), auction_id, user_id, &bidder_label(actor)).await;
      (Some(auction), attempt)
    },
    Err(err) => (None, Err(err)),
  };

  match attempt {
    Ok(accepted) => {
      record_event(
        ctx,
        Some(auction_id),
        Some(user_id),
        EventKind::BidAccepted,
        Some(&accepted.amount.to_string()),
        tracking_id,
      )
      .await;

      if let Some((chat, message_id)) = message_ctx
        && let Err(err) = refresh_auction_card(bot, ctx, chat, message_id, &accepted.auction).await
      {
        warn!(error = %err, auction_id, "failed to refresh auction card after bid");
      }
      notify::fan_out_bid(bot, ctx, &accepted, &bidder_label(actor)).await;

      Ok(CachedReply::toast(format!(
        "✅ Bid placed: {}",
        format_money(accepted.amount, &accepted.auction.currency)
      )))
    },
    Err(BidError::Storage(err)) => {
      warn!(error = %err, auction_id, user_id, "storage error during bid");
      record_event(ctx, Some(auction_id), Some(user_id), EventKind::BidRejected, Some("storage"), tracking_id).await;
      Ok(CachedReply::alert(BidError::Storage(err).user_message()))
    },
    Err(err) => {
      info!(auction_id, user_id, reason = err.reason_code(), "bid rejected");
      record_event(
        ctx,
        Some(auction_id),
        Some(user_id),
        EventKind::BidRejected,
        Some(err.reason_code()),
        tracking_id,
      )
      .await;

      let text = match (&err, &gated) {
        // after a lost race, show where the price actually landed
        (BidError::Contention(_), Some(auction)) => match ledger::current_price(ctx.db(), auction_id).await {
          Ok(price) => format!("⚡ The price just moved to {}. Try again!", format_money(price, &auction.currency)),
          Err(_) => err.user_message(),
        },
        _ => err.user_message(),
      };
      Ok(CachedReply::alert(text))
    },
  }
}

async fn record_event(
  ctx: &SharedContext,
  auction_id: Option<i64>,
  actor_tg_id: Option<i64>,
  kind: EventKind,
  detail: Option<&str>,
  tracking_id: Option<&str>,
) {
  if let Err(err) = ctx
    .db()
    .insert_event(auction_id, actor_tg_id, kind, detail, tracking_id)
    .await
  {
    warn!(error = %err, kind = kind.as_str(), "failed to record analytics event");
  }
}

#[instrument(skip(bot, ctx, dialogue, msg))]
async fn handle_end_auction_message(
  bot: Bot,
  dialogue: BotDialogue,
  ctx: SharedContext,
  msg: Message,
  admin_tg_id: i64,
) -> HandlerResult {
  let user = msg.from.as_ref().context("message missing sender")?;
  if user.id.0 as i64 != admin_tg_id {
    bot
      .send_message(msg.chat.id, "Only the admin who started this action can respond.")
      .await?;
    return Ok(());
  }

  let Some(raw_text) = message_text(&msg).map(|t| t.trim()).filter(|t| !t.is_empty()) else {
    bot
      .send_message(msg.chat.id, "🏁 Send the auction ID to end or type cancel to stop.")
      .await?;
    return Ok(());
  };

  info!(admin_tg_id, chat_id = %msg.chat.id, "processing end auction input");
  if raw_text.eq_ignore_ascii_case("cancel") {
    dialogue.reset().await?;
    bot.send_message(msg.chat.id, "❌ Auction closure cancelled.").await?;
    return Ok(());
  }

  let auction_id: i64 = match raw_text.parse() {
    Ok(value) => value,
    Err(_) => {
      bot.send_message(msg.chat.id, "🔢 Provide a numeric auction ID.").await?;
      return Ok(());
    },
  };

  match lifecycle::end_auction(ctx.db(), auction_id).await? {
    EndOutcome::NotFound => {
      bot.send_message(msg.chat.id, "❓ Auction not found.").await?;
    },
    EndOutcome::NotActive(status) => {
      dialogue.reset().await?;
      bot
        .send_message(
          msg.chat.id,
          format!("ℹ️ Auction #{} is already {}.", auction_id, status.as_str()),
        )
        .await?;
    },
    EndOutcome::Ended(auction) => {
      dialogue.reset().await?;
      bot
        .send_message(msg.chat.id, format!("🏁 Auction #{auction_id} ended."))
        .await?;

      match notify::fan_out_auction_ended(&bot, &ctx, &auction).await {
        Ok(Some((winner_id, _))) => {
          if let Err(err) = lifecycle::settle_auction(ctx.db(), &auction, winner_id).await {
            warn!(error = %err, auction_id, winner_id, "failed to settle ended auction");
          }
        },
        Ok(None) => info!(auction_id, "auction ended with no bids, nothing to settle"),
        Err(err) => warn!(error = %err, auction_id, "failed to fan out auction end"),
      }
    },
  }

  Ok(())
}

#[instrument(skip(bot, msg))]
async fn handle_idle_text(bot: Bot, msg: Message, state: ConversationState) -> HandlerResult {
  if matches!(state, ConversationState::Idle)
    && let Some(text) = msg.text()
  {
    if text.starts_with('/') {
      // unknown command, ignore to let telegram handle
    } else {
      info!(chat_id = %msg.chat.id, "idle state received unrecognized message");
      bot
        .send_message(msg.chat.id, "I did not understand that. Use the menu buttons or /help.")
        .await?;
    }
  }
  Ok(())
}

async fn ensure_user_record(ctx: &SharedContext, user: &User) -> Result<()> {
  ctx
    .db()
    .upsert_user(
      user.id.0 as i64,
      user.username.clone(),
      Some(user.first_name.clone()),
      user.last_name.clone(),
    )
    .await
    .context("failed to upsert user record")
}

fn message_text(msg: &Message) -> Option<&str> {
  msg.text().or_else(|| msg.caption())
}

#[cfg(test)]
mod tests {
  use super::truncate_button_text;

  #[test]
  fn short_labels_pass_through() {
    assert_eq!(truncate_button_text("USD 12.00 — Round F VS1", 48), "USD 12.00 — Round F VS1");
  }

  #[test]
  fn long_labels_are_truncated_with_ellipsis() {
    let label = truncate_button_text(&"x".repeat(60), 48);
    assert_eq!(label.chars().count(), 48);
    assert!(label.ends_with("..."));
  }
}
