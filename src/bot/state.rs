use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "data")]
pub enum ConversationState {
  #[default]
  Idle,
  EndAuction {
    admin_tg_id: i64,
  },
}

#[cfg(test)]
mod tests {
  use super::ConversationState;

  #[test]
  fn default_state_is_idle() {
    assert_eq!(ConversationState::default(), ConversationState::Idle);
  }
}
