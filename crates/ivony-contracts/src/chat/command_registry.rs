#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is one raw argument, stored under `key`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawArgSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub key: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[RawArgSpec] = &[
    RawArgSpec {
        command: "prompt",
        action: "set_prompt",
        key: "prompt",
    },
    RawArgSpec {
        command: "copy",
        action: "copy_link",
        key: "target",
    },
];

pub(crate) const SETTING_COMMANDS: &[RawArgSpec] = &[
    RawArgSpec {
        command: "style",
        action: "set_style",
        key: "style",
    },
    RawArgSpec {
        command: "aspect",
        action: "set_aspect_ratio",
        key: "aspect_ratio",
    },
    RawArgSpec {
        command: "aspect_ratio",
        action: "set_aspect_ratio",
        key: "aspect_ratio",
    },
];

pub(crate) const MODE_COMMANDS: &[&str] = &["generate", "edit"];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "upload",
    action: "upload_image",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "submit",
        action: "submit",
    },
    CommandSpec {
        command: "clear_image",
        action: "clear_image",
    },
    CommandSpec {
        command: "gallery",
        action: "gallery",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/generate",
    "/edit",
    "/prompt",
    "/submit",
    "/upload",
    "/clear_image",
    "/style",
    "/aspect",
    "/copy",
    "/gallery",
    "/help",
    "/quit",
];
