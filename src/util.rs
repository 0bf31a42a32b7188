use teloxide::types::User;

pub fn format_money(amount: i64, currency: &str) -> String {
  format!("{currency} {:.2}", (amount as f64) / 100.0)
}

pub fn format_carat(carat_points: i64) -> String {
  format!("{:.2} ct", (carat_points as f64) / 100.0)
}

/// Label shown to other parties when referring to a bidder.
pub fn bidder_label(user: &User) -> String {
  if let Some(username) = &user.username {
    format!("@{username}")
  } else if let Some(last) = &user.last_name {
    format!("{} {last}", user.first_name)
  } else {
    user.first_name.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::format_carat;
  use super::format_money;

  #[test]
  fn formats_currency() {
    assert_eq!(format_money(1234, "USD"), "USD 12.34");
    assert_eq!(format_money(110000, "AED"), "AED 1100.00");
  }

  #[test]
  fn formats_carat_points() {
    assert_eq!(format_carat(152), "1.52 ct");
    assert_eq!(format_carat(70), "0.70 ct");
  }
}
