mod command_registry;
mod intent_parser;

pub use command_registry::{CommandSpec, CHAT_HELP_COMMANDS, TOGGLE_COMMAND};
pub use intent_parser::{parse_intent, Intent};
