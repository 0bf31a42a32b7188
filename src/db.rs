use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;
use sqlx::Pool;
use sqlx::Postgres;
use sqlx::Row;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::postgres::PgRow;
use tracing::instrument;

use crate::models::AuctionRow;
use crate::models::DiamondRow;
use crate::models::EventKind;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Db {
  pool: Pool<Postgres>,
}

fn auction_from_row(row: &PgRow) -> Result<AuctionRow> {
  let status: String = row.get("status");
  Ok(AuctionRow {
    id: row.get("id"),
    diamond_id: row.get("diamond_id"),
    seller_tg_id: row.get("seller_tg_id"),
    starting_price: row.get("starting_price"),
    min_increment: row.get("min_increment"),
    currency: row.get("currency"),
    current_price: row.get("current_price"),
    bid_count: row.get("bid_count"),
    status: status.parse()?,
    ends_at: row.get("ends_at"),
    winner_tg_id: row.get("winner_tg_id"),
    created_at: row.get("created_at"),
  })
}

impl Db {
  pub async fn connect(database_url: &str) -> Result<Self> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    MIGRATOR.run(&pool).await?;
    Ok(Self { pool })
  }

  #[instrument(skip(self))]
  pub async fn upsert_user(
    &self,
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
  ) -> Result<()> {
    sqlx::query(
      r#"
      INSERT INTO users (id, username, first_name, last_name)
      VALUES ($1, $2, $3, $4)
      ON CONFLICT (id) DO UPDATE SET
        username = EXCLUDED.username,
        first_name = EXCLUDED.first_name,
        last_name = EXCLUDED.last_name
      "#,
    )
    .bind(id)
    .bind(username)
    .bind(first_name)
    .bind(last_name)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn notifications_disabled(&self, user_id: i64) -> Result<bool> {
    let disabled =
      sqlx::query_scalar::<_, bool>("SELECT notifications_disabled FROM users WHERE id = $1 LIMIT 1")
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
    Ok(disabled.unwrap_or(false))
  }

  #[instrument(skip(self))]
  pub async fn set_notifications_disabled(&self, user_id: i64, disabled: bool) -> Result<()> {
    sqlx::query("UPDATE users SET notifications_disabled = $2 WHERE id = $1")
      .bind(user_id)
      .bind(disabled)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn get_diamond(&self, diamond_id: i64) -> Result<Option<DiamondRow>> {
    let row = sqlx::query(
      r#"
      SELECT id, stock_number, shape, carat_points, color, clarity, image_file_id, created_at
      FROM diamonds
      WHERE id = $1
      "#,
    )
    .bind(diamond_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(|row| DiamondRow {
      id: row.get("id"),
      stock_number: row.get("stock_number"),
      shape: row.get("shape"),
      carat_points: row.get("carat_points"),
      color: row.get("color"),
      clarity: row.get("clarity"),
      image_file_id: row.get::<Option<String>, _>("image_file_id").map(Into::into),
      created_at: row.get("created_at"),
    }))
  }

  #[instrument(skip(self))]
  pub async fn get_auction(&self, auction_id: i64) -> Result<Option<AuctionRow>> {
    let row = sqlx::query(
      r#"
      SELECT id, diamond_id, seller_tg_id, starting_price, min_increment, currency,
             current_price, bid_count, status, ends_at, winner_tg_id, created_at
      FROM auctions
      WHERE id = $1
      "#,
    )
    .bind(auction_id)
    .fetch_optional(&self.pool)
    .await?;
    row.as_ref().map(auction_from_row).transpose()
  }

  #[instrument(skip(self))]
  pub async fn list_active_auctions(&self) -> Result<Vec<AuctionRow>> {
    let rows = sqlx::query(
      r#"
      SELECT id, diamond_id, seller_tg_id, starting_price, min_increment, currency,
             current_price, bid_count, status, ends_at, winner_tg_id, created_at
      FROM auctions
      WHERE status = 'active'
      ORDER BY ends_at ASC
      "#,
    )
    .fetch_all(&self.pool)
    .await?;
    rows.iter().map(auction_from_row).collect()
  }

  #[instrument(skip(self))]
  pub async fn list_user_bid_auctions(&self, user_id: i64) -> Result<Vec<AuctionRow>> {
    let rows = sqlx::query(
      r#"
      SELECT DISTINCT ON (a.id)
        a.id,
        a.diamond_id,
        a.seller_tg_id,
        a.starting_price,
        a.min_increment,
        a.currency,
        a.current_price,
        a.bid_count,
        a.status,
        a.ends_at,
        a.winner_tg_id,
        a.created_at
      FROM auction_bids b
      INNER JOIN auctions a ON a.id = b.auction_id
      WHERE b.bidder_tg_id = $1
      ORDER BY a.id DESC
      "#,
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    rows.iter().map(auction_from_row).collect()
  }

  /// Compare-and-swap on the auction price. The update succeeds only when
  /// the row still carries `expected_price` and is still active; that single
  /// conditional statement is what serializes concurrent bids.
  #[instrument(skip(self))]
  pub async fn try_advance_price(&self, auction_id: i64, expected_price: i64, next_price: i64) -> Result<bool> {
    let result = sqlx::query(
      r#"
      UPDATE auctions
      SET current_price = $3, bid_count = bid_count + 1
      WHERE id = $1 AND current_price = $2 AND status = 'active'
      "#,
    )
    .bind(auction_id)
    .bind(expected_price)
    .bind(next_price)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  /// `active -> ended`. Conditional on the prior status so concurrent
  /// transitions cannot double-apply.
  #[instrument(skip(self))]
  pub async fn mark_auction_ended(&self, auction_id: i64) -> Result<bool> {
    let result = sqlx::query("UPDATE auctions SET status = 'ended' WHERE id = $1 AND status = 'active'")
      .bind(auction_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  /// `ended -> settled`, recording the winner.
  #[instrument(skip(self))]
  pub async fn mark_auction_settled(&self, auction_id: i64, winner_tg_id: i64) -> Result<bool> {
    let result =
      sqlx::query("UPDATE auctions SET status = 'settled', winner_tg_id = $2 WHERE id = $1 AND status = 'ended'")
        .bind(auction_id)
        .bind(winner_tg_id)
        .execute(&self.pool)
        .await?;
    Ok(result.rows_affected() > 0)
  }

  #[instrument(skip(self, bidder_name))]
  pub async fn insert_bid(&self, auction_id: i64, bidder_tg_id: i64, bidder_name: &str, amount: i64) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
      r#"
      INSERT INTO auction_bids (auction_id, bidder_tg_id, bidder_name, amount)
      VALUES ($1, $2, $3, $4)
      RETURNING id
      "#,
    )
    .bind(auction_id)
    .bind(bidder_tg_id)
    .bind(bidder_name)
    .bind(amount)
    .fetch_one(&self.pool)
    .await?;
    Ok(id)
  }

  /// Holder of the highest bid strictly below `below_amount`, excluding
  /// `excluding_bidder`. Drives the outbid notification.
  #[instrument(skip(self))]
  pub async fn previous_highest_bid(
    &self,
    auction_id: i64,
    below_amount: i64,
    excluding_bidder: i64,
  ) -> Result<Option<(i64, i64)>> {
    let row = sqlx::query(
      r#"
      SELECT bidder_tg_id, amount
      FROM auction_bids
      WHERE auction_id = $1 AND amount < $2 AND bidder_tg_id <> $3
      ORDER BY amount DESC, created_at ASC
      LIMIT 1
      "#,
    )
    .bind(auction_id)
    .bind(below_amount)
    .bind(excluding_bidder)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(|row| (row.get("bidder_tg_id"), row.get("amount"))))
  }

  #[instrument(skip(self))]
  pub async fn top_bid(&self, auction_id: i64) -> Result<Option<(i64, String, i64)>> {
    let row = sqlx::query(
      r#"
      SELECT bidder_tg_id, bidder_name, amount
      FROM auction_bids
      WHERE auction_id = $1
      ORDER BY amount DESC, created_at ASC
      LIMIT 1
      "#,
    )
    .bind(auction_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(|row| (row.get("bidder_tg_id"), row.get("bidder_name"), row.get("amount"))))
  }

  #[instrument(skip(self))]
  pub async fn has_bid_since(&self, auction_id: i64, bidder_tg_id: i64, since: DateTime<Utc>) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
      "SELECT EXISTS(SELECT 1 FROM auction_bids WHERE auction_id = $1 AND bidder_tg_id = $2 AND created_at > $3)",
    )
    .bind(auction_id)
    .bind(bidder_tg_id)
    .bind(since)
    .fetch_one(&self.pool)
    .await?;
    Ok(exists)
  }

  #[instrument(skip(self, detail, tracking_id))]
  pub async fn insert_event(
    &self,
    auction_id: Option<i64>,
    actor_tg_id: Option<i64>,
    kind: EventKind,
    detail: Option<&str>,
    tracking_id: Option<&str>,
  ) -> Result<()> {
    sqlx::query(
      r#"
      INSERT INTO auction_events (auction_id, actor_tg_id, kind, detail, tracking_id)
      VALUES ($1, $2, $3, $4, $5)
      "#,
    )
    .bind(auction_id)
    .bind(actor_tg_id)
    .bind(kind.as_str())
    .bind(detail)
    .bind(tracking_id)
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}
