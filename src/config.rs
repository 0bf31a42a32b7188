use std::env;

use anyhow::Context;
use anyhow::Result;

pub const DEFAULT_BID_COOLDOWN_MS: i64 = 5000;

#[derive(Debug, Clone)]
pub struct Config {
  pub bot_token: String,
  pub database_url: String,
  pub admins: Vec<i64>,
  pub bid_cooldown_ms: i64,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    let bot_token = env::var("BOT_TOKEN")
      .or_else(|_| env::var("TELOXIDE_TOKEN"))
      .context("BOT_TOKEN or TELOXIDE_TOKEN must be set")?;
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let admins_raw = env::var("ADMIN_IDS").unwrap_or_default();
    let admins = parse_admins(&admins_raw);
    let cooldown_raw = env::var("BID_COOLDOWN_MS").unwrap_or_default();
    let bid_cooldown_ms = parse_cooldown_ms(&cooldown_raw);
    Ok(Self {
      bot_token,
      database_url,
      admins,
      bid_cooldown_ms,
    })
  }
}

fn parse_admins(raw: &str) -> Vec<i64> {
  raw
    .split(',')
    .filter_map(|id| {
      let trimmed = id.trim();
      if trimmed.is_empty() {
        return None;
      }
      match trimmed.parse::<i64>() {
        Ok(value) => Some(value),
        Err(err) => {
          tracing::warn!(value = trimmed, error = %err, "invalid ADMIN_IDS entry");
          None
        },
      }
    })
    .collect()
}

fn parse_cooldown_ms(raw: &str) -> i64 {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return DEFAULT_BID_COOLDOWN_MS;
  }
  match trimmed.parse::<i64>() {
    Ok(value) if value >= 0 => value,
    Ok(value) => {
      tracing::warn!(value, "negative BID_COOLDOWN_MS, using default");
      DEFAULT_BID_COOLDOWN_MS
    },
    Err(err) => {
      tracing::warn!(value = trimmed, error = %err, "invalid BID_COOLDOWN_MS, using default");
      DEFAULT_BID_COOLDOWN_MS
    },
  }
}

#[cfg(test)]
mod tests {
  use super::DEFAULT_BID_COOLDOWN_MS;
  use super::parse_admins;
  use super::parse_cooldown_ms;

  #[test]
  fn parses_valid_admins() {
    let admins = parse_admins("1, 2 ,3");
    assert_eq!(admins, vec![1, 2, 3]);
  }

  #[test]
  fn skips_invalid_entries() {
    let admins = parse_admins("42,abc,  7");
    assert_eq!(admins, vec![42, 7]);
  }

  #[test]
  fn empty_input_yields_empty_list() {
    let admins = parse_admins("");
    assert!(admins.is_empty());
  }

  #[test]
  fn parses_cooldown_override() {
    assert_eq!(parse_cooldown_ms("2500"), 2500);
    assert_eq!(parse_cooldown_ms(" 0 "), 0);
  }

  #[test]
  fn falls_back_to_default_cooldown() {
    assert_eq!(parse_cooldown_ms(""), DEFAULT_BID_COOLDOWN_MS);
    assert_eq!(parse_cooldown_ms("fast"), DEFAULT_BID_COOLDOWN_MS);
    assert_eq!(parse_cooldown_ms("-5"), DEFAULT_BID_COOLDOWN_MS);
  }
}
