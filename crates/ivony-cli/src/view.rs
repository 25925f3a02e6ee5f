use std::fmt::Write as _;

use ivony_contracts::gallery::{sample_gallery, split_data_url, GeneratedImage};
use ivony_contracts::settings::Mode;
use ivony_engine::SessionState;

const RULE: &str = "────────────────────────────────────────";

/// The submit trigger is only live while nothing is in flight.
pub fn submit_enabled(state: &SessionState) -> bool {
    !state.is_loading()
}

/// Renders the whole screen from session state.
pub fn render_view(state: &SessionState) -> String {
    let mut out = String::new();
    render_controls(&mut out, state);
    out.push_str(RULE);
    out.push('\n');
    render_gallery(&mut out, state);
    if let Some(message) = state.toast_message() {
        let _ = writeln!(out, "» {message}");
    }
    out
}

fn render_controls(out: &mut String, state: &SessionState) {
    let settings = state.settings();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Ivony");
    let _ = writeln!(out, "Mode: {}", mode_tabs(state.mode()));
    let _ = writeln!(
        out,
        "Style: {} · Aspect ratio: {}",
        settings.style, settings.aspect_ratio
    );
    if state.mode() == Mode::Edit {
        match state.uploaded_image() {
            Some(upload) => {
                let _ = writeln!(out, "Image: {}", upload.label());
            }
            None => {
                let _ = writeln!(out, "Image: none (use /upload <path>)");
            }
        }
    }
    let prompt = if state.prompt().trim().is_empty() {
        "(empty)"
    } else {
        state.prompt()
    };
    let _ = writeln!(out, "Prompt: {prompt}");
    if submit_enabled(state) {
        let _ = writeln!(out, "Submit: ready");
    } else {
        let _ = writeln!(out, "Submit: disabled while an image is being made");
    }
    if let Some(error) = state.error() {
        let _ = writeln!(out, "Error: {error}");
    }
}

fn mode_tabs(active: Mode) -> String {
    [Mode::Generate, Mode::Edit]
        .into_iter()
        .map(|mode| {
            let label = match mode {
                Mode::Generate => "Generate",
                Mode::Edit => "Edit",
            };
            if mode == active {
                format!("[{label}]")
            } else {
                label.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_gallery(out: &mut String, state: &SessionState) {
    if state.is_loading() {
        let _ = writeln!(out, "Creating your image…");
        return;
    }

    if state.results().is_empty() {
        let _ = writeln!(out, "Welcome to Ivony");
        let _ = writeln!(
            out,
            "Generate a new image or edit your own. Here are some samples for inspiration:"
        );
        for sample in sample_gallery() {
            let _ = writeln!(out, "  • {}", sample.prompt);
            let _ = writeln!(out, "    {}", sample.url);
        }
        return;
    }

    for (idx, image) in state.results().iter().enumerate() {
        render_card(out, idx + 1, image);
    }
    let _ = writeln!(out, "Use /copy <n> to copy a shareable link.");
}

fn render_card(out: &mut String, position: usize, image: &GeneratedImage) {
    let _ = writeln!(out, "[{position}] {}", image.id);
    let _ = writeln!(out, "    {}", image.prompt);
    let _ = writeln!(out, "    {}", short_url(&image.url));
}

/// Inline payloads are summarized instead of printed.
pub fn short_url(url: &str) -> String {
    match split_data_url(url) {
        Some((mime, payload)) => format!(
            "data:{mime};base64,… ({} chars)",
            payload.chars().count()
        ),
        None => url.to_string(),
    }
}

/// Resolves a 1-based card position or an image id.
pub fn find_result<'a>(state: &'a SessionState, target: &str) -> Option<&'a GeneratedImage> {
    let target = target.trim();
    if let Ok(position) = target.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|idx| state.results().get(idx));
    }
    state.results().iter().find(|image| image.id == target)
}
