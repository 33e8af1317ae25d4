#[derive(Clone, Copy, Debug)]
pub struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Flips the idle feature. Named apart from a plain `/idle` so the two can
/// coexist on one command surface.
pub const TOGGLE_COMMAND: CommandSpec = CommandSpec {
    command: "idle-selfie",
    action: "toggle_idle",
};

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    TOGGLE_COMMAND,
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "busy",
        action: "toggle_busy",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
];

pub(crate) const TEXT_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "char",
        action: "character_reply",
    },
    CommandSpec {
        command: "narrate",
        action: "narrator_message",
    },
];

pub(crate) const SPEAKER_COMMAND: CommandSpec = CommandSpec {
    command: "as",
    action: "speaker_message",
};

pub(crate) const SETTING_COMMAND: CommandSpec = CommandSpec {
    command: "set",
    action: "update_setting",
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/idle-selfie",
    "/status",
    "/busy",
    "/char <text>",
    "/narrate <text>",
    "/as <name> <text>",
    "/set <key> <value>",
    "/help",
    "/quit",
];
