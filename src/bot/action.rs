/// Callback-data grammar. Buttons carry colon-delimited action strings;
/// anything that does not parse is `Unknown` and gets a neutral
/// acknowledgement instead of a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
  Menu(MenuTarget),
  ShowAuction { auction_id: i64 },
  Bid { auction_id: i64, tracking_id: Option<String> },
  AdminEndAuction,
  ToggleNotifications,
  Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuTarget {
  Root,
  Auctions,
  MyBids,
  Settings,
  Admin,
}

const TRACK_PREFIX: &str = "track_";

impl CallbackAction {
  pub fn parse(data: &str) -> Self {
    let Some((prefix, rest)) = data.split_once(':') else {
      return Self::Unknown;
    };
    match prefix {
      "menu" => match rest {
        "root" => Self::Menu(MenuTarget::Root),
        "auctions" => Self::Menu(MenuTarget::Auctions),
        "my_bids" => Self::Menu(MenuTarget::MyBids),
        "settings" => Self::Menu(MenuTarget::Settings),
        "admin" => Self::Menu(MenuTarget::Admin),
        _ => Self::Unknown,
      },
      "auction" => match rest.parse::<i64>() {
        Ok(auction_id) => Self::ShowAuction { auction_id },
        Err(_) => Self::Unknown,
      },
      "bid" => {
        let (id_part, track_part) = match rest.split_once(':') {
          Some((id, track)) => (id, Some(track)),
          None => (rest, None),
        };
        let Ok(auction_id) = id_part.parse::<i64>() else {
          return Self::Unknown;
        };
        match track_part {
          None => Self::Bid {
            auction_id,
            tracking_id: None,
          },
          Some(track) => match track.strip_prefix(TRACK_PREFIX) {
            Some(id) if !id.is_empty() => Self::Bid {
              auction_id,
              tracking_id: Some(id.to_string()),
            },
            _ => Self::Unknown,
          },
        }
      },
      "admin" => match rest {
        "end_auction" => Self::AdminEndAuction,
        _ => Self::Unknown,
      },
      "settings" => match rest {
        "toggle_notifications" => Self::ToggleNotifications,
        _ => Self::Unknown,
      },
      _ => Self::Unknown,
    }
  }
}

/// Data string for a bid button, optionally correlated back to the
/// notification that carried it.
pub fn bid_data(auction_id: i64, tracking_id: Option<&str>) -> String {
  match tracking_id {
    Some(id) => format!("bid:{auction_id}:{TRACK_PREFIX}{id}"),
    None => format!("bid:{auction_id}"),
  }
}

#[cfg(test)]
mod tests {
  use super::CallbackAction;
  use super::MenuTarget;
  use super::bid_data;

  #[test]
  fn parses_plain_bid() {
    assert_eq!(
      CallbackAction::parse("bid:17"),
      CallbackAction::Bid {
        auction_id: 17,
        tracking_id: None
      }
    );
  }

  #[test]
  fn parses_tracked_bid() {
    assert_eq!(
      CallbackAction::parse("bid:17:track_ob42"),
      CallbackAction::Bid {
        auction_id: 17,
        tracking_id: Some("ob42".to_string())
      }
    );
  }

  #[test]
  fn bid_data_round_trips() {
    assert_eq!(
      CallbackAction::parse(&bid_data(5, None)),
      CallbackAction::Bid {
        auction_id: 5,
        tracking_id: None
      }
    );
    assert_eq!(
      CallbackAction::parse(&bid_data(5, Some("ob9"))),
      CallbackAction::Bid {
        auction_id: 5,
        tracking_id: Some("ob9".to_string())
      }
    );
  }

  #[test]
  fn parses_navigation() {
    assert_eq!(CallbackAction::parse("menu:auctions"), CallbackAction::Menu(MenuTarget::Auctions));
    assert_eq!(CallbackAction::parse("auction:3"), CallbackAction::ShowAuction { auction_id: 3 });
    assert_eq!(CallbackAction::parse("admin:end_auction"), CallbackAction::AdminEndAuction);
    assert_eq!(
      CallbackAction::parse("settings:toggle_notifications"),
      CallbackAction::ToggleNotifications
    );
  }

  #[test]
  fn malformed_input_is_unknown_not_a_panic() {
    for data in ["", "bid", "bid:", "bid:abc", "bid:1:nope", "bid:1:track_", "auction:x", "menu:payments", "boom:1"] {
      assert_eq!(CallbackAction::parse(data), CallbackAction::Unknown, "{data}");
    }
  }
}
