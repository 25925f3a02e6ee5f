use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, RawArgSpec, MODE_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS,
    SETTING_COMMANDS, SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub settings_update: BTreeMap<String, Value>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            settings_update: BTreeMap::new(),
            command_args: BTreeMap::new(),
        }
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .or_else(|| self.settings_update.get(key))
            .and_then(Value::as_str)
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn find_raw_arg(command: &str, specs: &[RawArgSpec]) -> Option<RawArgSpec> {
    specs.iter().find(|spec| spec.command == command).copied()
}

fn parse_single_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    let parts: Vec<String> = match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    };
    parts.join(" ")
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(spec) = find_raw_arg(&command, RAW_ARG_COMMANDS) {
                let mut intent = Intent::new(spec.action, text);
                intent
                    .command_args
                    .insert(spec.key.to_string(), Value::String(arg.to_string()));
                if spec.action == "set_prompt" {
                    intent.prompt = Some(arg.to_string());
                }
                return intent;
            }

            if let Some(spec) = find_raw_arg(&command, SETTING_COMMANDS) {
                let mut intent = Intent::new(spec.action, text);
                intent
                    .settings_update
                    .insert(spec.key.to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if MODE_COMMANDS.iter().any(|value| *value == command) {
                let mut intent = Intent::new("set_mode", text);
                intent
                    .command_args
                    .insert("mode".to_string(), Value::String(command));
                return intent;
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("submit_prompt", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn blank_input_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
        assert_eq!(parse_intent("").action, "noop");
    }

    #[test]
    fn plain_text_submits_trimmed_prompt() {
        let intent = parse_intent("  A red fox in snow \n");
        assert_eq!(intent.action, "submit_prompt");
        assert_eq!(intent.prompt.as_deref(), Some("A red fox in snow"));
    }

    #[test]
    fn parse_mode_switches() {
        let generate = parse_intent("/generate");
        assert_eq!(generate.action, "set_mode");
        assert_eq!(generate.command_args["mode"], json!("generate"));

        let edit = parse_intent("/EDIT");
        assert_eq!(edit.action, "set_mode");
        assert_eq!(edit.command_args["mode"], json!("edit"));
    }

    #[test]
    fn parse_prompt_without_submit() {
        let intent = parse_intent("/prompt make it blue");
        assert_eq!(intent.action, "set_prompt");
        assert_eq!(intent.command_args["prompt"], json!("make it blue"));
        assert_eq!(intent.prompt.as_deref(), Some("make it blue"));
    }

    #[test]
    fn parse_upload_quoted_path() {
        let intent = parse_intent("/upload \"/tmp/my photo.png\"");
        assert_eq!(intent.action, "upload_image");
        assert_eq!(intent.command_args["path"], json!("/tmp/my photo.png"));

        let bare = parse_intent("/upload a.png");
        assert_eq!(bare.command_args["path"], json!("a.png"));
    }

    #[test]
    fn parse_setting_commands() {
        let style = parse_intent("/style anime");
        assert_eq!(style.action, "set_style");
        assert_eq!(style.settings_update["style"], json!("anime"));
        assert_eq!(style.arg_str("style"), Some("anime"));

        let aspect = parse_intent("/aspect 16:9");
        assert_eq!(aspect.action, "set_aspect_ratio");
        assert_eq!(aspect.settings_update["aspect_ratio"], json!("16:9"));

        let long_form = parse_intent("/aspect_ratio 3:4");
        assert_eq!(long_form.action, "set_aspect_ratio");
        assert_eq!(long_form.settings_update["aspect_ratio"], json!("3:4"));
    }

    #[test]
    fn parse_copy_target() {
        let intent = parse_intent("/copy 2");
        assert_eq!(intent.action, "copy_link");
        assert_eq!(intent.arg_str("target"), Some("2"));
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_intent("/submit").action, "submit");
        assert_eq!(parse_intent("/clear_image").action, "clear_image");
        assert_eq!(parse_intent("/gallery").action, "gallery");
        assert_eq!(parse_intent("/help").action, "help");
        assert_eq!(parse_intent("/quit").action, "quit");
        assert_eq!(parse_intent("/exit").action, "quit");
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }

    #[test]
    fn lone_slash_is_treated_as_prompt() {
        let intent = parse_intent("/ 1:1 scale");
        assert_eq!(intent.action, "submit_prompt");
        assert_eq!(intent.prompt.as_deref(), Some("/ 1:1 scale"));
    }
}
