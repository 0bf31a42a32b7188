use teloxide::dispatching::dialogue::InMemStorage;

pub mod action;
pub mod card;
pub mod commands;
pub mod context;
pub mod dedup;
pub mod handlers;
pub mod notify;
pub mod state;

pub type HandlerResult = anyhow::Result<()>;
pub type DialogueStorage = InMemStorage<state::ConversationState>;

pub use commands::Command;
pub use context::AppContext;
pub use handlers::build_schema;
