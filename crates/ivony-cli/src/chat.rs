use std::io::{self, BufRead, ErrorKind, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use ivony_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use ivony_contracts::settings::{AspectRatio, ImageStyle, Mode};
use ivony_engine::{ImagePayload, Orchestrator, PendingAction, UploadedImage};

use crate::view::{find_result, render_view, submit_enabled};

const TICK_INTERVAL: Duration = Duration::from_millis(200);
const SHARE_TOAST: &str = "Shareable link copied!";

enum LoopEvent {
    Input(String),
    InputClosed,
    Settled {
        pending: PendingAction,
        outcome: Result<ImagePayload>,
    },
}

/// Line-oriented front end. All session mutation happens on the loop thread;
/// service calls run on a worker thread and report back over the channel.
pub struct ChatApp<W: Write> {
    orchestrator: Orchestrator,
    out: W,
    tx: mpsc::Sender<LoopEvent>,
    rx: mpsc::Receiver<LoopEvent>,
    input_closed: bool,
}

pub fn run_chat(orchestrator: Orchestrator) -> Result<()> {
    let mut app = ChatApp::new(orchestrator, io::stdout());
    app.spawn_stdin_reader()?;
    app.show_view()?;
    app.run()
}

impl<W: Write> ChatApp<W> {
    pub fn new(orchestrator: Orchestrator, out: W) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            orchestrator,
            out,
            tx,
            rx,
            input_closed: false,
        }
    }

    fn spawn_stdin_reader(&self) -> Result<()> {
        let tx = self.tx.clone();
        thread::Builder::new()
            .name("ivony-stdin".to_string())
            .spawn(move || {
                let stdin = io::stdin();
                let mut line = String::new();
                loop {
                    line.clear();
                    match stdin.lock().read_line(&mut line) {
                        Ok(0) => {
                            let _ = tx.send(LoopEvent::InputClosed);
                            break;
                        }
                        Ok(_) => {
                            let input = line.trim_end_matches(['\n', '\r']).to_string();
                            if tx.send(LoopEvent::Input(input)).is_err() {
                                break;
                            }
                        }
                        Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                        Err(_) => {
                            let _ = tx.send(LoopEvent::InputClosed);
                            break;
                        }
                    }
                }
            })
            .context("failed to start input reader")?;
        Ok(())
    }

    fn run(&mut self) -> Result<()> {
        loop {
            match self.rx.recv_timeout(TICK_INTERVAL) {
                Ok(LoopEvent::Input(line)) => {
                    if !self.handle_line(&line)? {
                        break;
                    }
                }
                Ok(LoopEvent::InputClosed) => {
                    self.input_closed = true;
                    if !self.orchestrator.state().is_loading() {
                        break;
                    }
                }
                Ok(LoopEvent::Settled { pending, outcome }) => {
                    self.settle(pending, outcome)?;
                    if self.input_closed {
                        break;
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            self.orchestrator.tick(Instant::now());
        }
        self.orchestrator.finish();
        Ok(())
    }

    /// Handles one input line. Returns `false` when the user asked to quit.
    pub fn handle_line(&mut self, line: &str) -> Result<bool> {
        let intent = parse_intent(line);
        match intent.action.as_str() {
            "noop" => {}
            "quit" => return Ok(false),
            "help" => {
                writeln!(self.out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
                writeln!(self.out, "Plain text sets the prompt and submits it.")?;
            }
            "submit_prompt" => {
                if !submit_enabled(self.orchestrator.state()) {
                    writeln!(self.out, "Still working on the previous image; please wait.")?;
                } else {
                    self.orchestrator
                        .set_prompt(intent.prompt.clone().unwrap_or_default());
                    self.submit()?;
                }
            }
            "submit" => {
                if !submit_enabled(self.orchestrator.state()) {
                    writeln!(self.out, "Still working on the previous image; please wait.")?;
                } else {
                    self.submit()?;
                }
            }
            "set_prompt" => {
                self.orchestrator
                    .set_prompt(intent.prompt.clone().unwrap_or_default());
                writeln!(self.out, "Prompt set. Use /submit to run it.")?;
            }
            "set_mode" => {
                let mode = match intent.arg_str("mode") {
                    Some("edit") => Mode::Edit,
                    _ => Mode::Generate,
                };
                self.orchestrator.set_mode(mode);
                self.show_view()?;
            }
            "set_style" => self.apply_setting(&intent, "style")?,
            "set_aspect_ratio" => self.apply_setting(&intent, "aspect_ratio")?,
            "upload_image" => self.upload(intent.arg_str("path").unwrap_or_default())?,
            "clear_image" => {
                if self.orchestrator.clear_upload() {
                    writeln!(self.out, "Uploaded image cleared.")?;
                } else {
                    writeln!(self.out, "No uploaded image to clear.")?;
                }
            }
            "copy_link" => self.copy_link(intent.arg_str("target").unwrap_or_default())?,
            "gallery" => self.show_view()?,
            _ => {
                let command = intent.arg_str("command").unwrap_or_default();
                writeln!(self.out, "Unknown command /{command}. Type /help for commands.")?;
            }
        }
        self.out.flush()?;
        Ok(true)
    }

    fn submit(&mut self) -> Result<()> {
        match self.orchestrator.begin_action() {
            Ok(pending) => {
                self.spawn_worker(pending);
                self.show_view()
            }
            Err(_) => self.show_view(),
        }
    }

    fn spawn_worker(&mut self, pending: PendingAction) {
        let service = self.orchestrator.service();
        let tx = self.tx.clone();
        let fallback = pending.clone();
        let spawned = thread::Builder::new()
            .name("ivony-image".to_string())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    pending.request().dispatch(service.as_ref())
                }))
                .unwrap_or_else(|_| Err(anyhow!("image worker stopped before returning a result")));
                let _ = tx.send(LoopEvent::Settled { pending, outcome });
            });
        if let Err(err) = spawned {
            let _ = self.orchestrator.settle_action(
                fallback,
                Err(anyhow!(err).context("failed to start image worker")),
            );
        }
    }

    fn settle(&mut self, pending: PendingAction, outcome: Result<ImagePayload>) -> Result<()> {
        if let Ok(image) = self.orchestrator.settle_action(pending, outcome) {
            writeln!(self.out, "New image {}.", image.id)?;
        }
        self.show_view()
    }

    fn apply_setting(&mut self, intent: &Intent, key: &str) -> Result<()> {
        let raw = intent.arg_str(key).unwrap_or_default();
        let applied = if key == "style" {
            raw.parse::<ImageStyle>()
                .map(|style| self.orchestrator.set_style(style))
        } else {
            raw.parse::<AspectRatio>()
                .map(|ratio| self.orchestrator.set_aspect_ratio(ratio))
        };
        match applied {
            Ok(()) => self.show_view(),
            Err(message) => {
                writeln!(self.out, "{message}")?;
                Ok(())
            }
        }
    }

    fn upload(&mut self, path: &str) -> Result<()> {
        if path.trim().is_empty() {
            writeln!(self.out, "/upload requires a path")?;
            return Ok(());
        }
        match UploadedImage::from_path(path) {
            Ok(upload) => {
                writeln!(self.out, "Uploaded {}.", upload.label())?;
                self.orchestrator.upload_image(upload);
                if self.orchestrator.state().mode() != Mode::Edit {
                    writeln!(self.out, "Switch to /edit to use it.")?;
                }
            }
            Err(err) => writeln!(self.out, "Upload failed: {err:#}")?,
        }
        Ok(())
    }

    fn copy_link(&mut self, target: &str) -> Result<()> {
        if self.orchestrator.state().is_loading() {
            writeln!(self.out, "The gallery is hidden while an image is being created.")?;
            return Ok(());
        }
        if find_result(self.orchestrator.state(), target).is_none() {
            writeln!(self.out, "No image matches '{}'.", target.trim())?;
            return Ok(());
        }
        self.orchestrator.notify(SHARE_TOAST, Instant::now());
        writeln!(self.out, "» {SHARE_TOAST}")?;
        Ok(())
    }

    fn show_view(&mut self) -> Result<()> {
        write!(self.out, "{}", render_view(self.orchestrator.state()))?;
        write!(self.out, "> ")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
impl<W: Write> ChatApp<W> {
    /// Drains worker results until nothing is pending or `timeout` passes.
    pub fn wait_idle(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        while self.orchestrator.state().is_loading() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            match self.rx.recv_timeout(remaining) {
                Ok(LoopEvent::Settled { pending, outcome }) => self.settle(pending, outcome)?,
                Ok(_) => {}
                Err(mpsc::RecvTimeoutError::Timeout) => return Ok(false),
                Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(false),
            }
        }
        Ok(true)
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn output(&self) -> &W {
        &self.out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc, Mutex};
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use image::{Rgb, RgbImage};
    use ivony_contracts::events::EventWriter;
    use ivony_contracts::settings::{AspectRatio, ImageStyle, Mode};
    use ivony_engine::{DryrunService, ImagePayload, ImageService, Orchestrator, SourceImage};

    use super::ChatApp;

    /// Blocks each call until the test releases it, counting calls.
    struct GatedService {
        release: Mutex<mpsc::Receiver<()>>,
        calls: Mutex<usize>,
    }

    impl GatedService {
        fn wait(&self) -> Result<ImagePayload> {
            if let Ok(mut calls) = self.calls.lock() {
                *calls += 1;
            }
            let release = self.release.lock().map_err(|_| anyhow!("gate poisoned"))?;
            release
                .recv()
                .map_err(|_| anyhow!("gate closed"))?;
            Ok(ImagePayload {
                data: "Zm9v".to_string(),
                mime_type: "image/png".to_string(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().map(|calls| *calls).unwrap_or_default()
        }
    }

    impl ImageService for GatedService {
        fn name(&self) -> &str {
            "gated"
        }

        fn generate(&self, _: &str, _: ImageStyle, _: AspectRatio) -> Result<ImagePayload> {
            self.wait()
        }

        fn edit(&self, _: &str, _: &SourceImage) -> Result<ImagePayload> {
            self.wait()
        }
    }

    struct CrashingService;

    impl ImageService for CrashingService {
        fn name(&self) -> &str {
            "crashing"
        }

        fn generate(&self, _: &str, _: ImageStyle, _: AspectRatio) -> Result<ImagePayload> {
            panic!("decoder overflow")
        }

        fn edit(&self, _: &str, _: &SourceImage) -> Result<ImagePayload> {
            panic!("decoder overflow")
        }
    }

    fn dryrun_app() -> ChatApp<Vec<u8>> {
        let orchestrator =
            Orchestrator::new(Arc::new(DryrunService), EventWriter::discard("session-chat"));
        ChatApp::new(orchestrator, Vec::new())
    }

    fn output(app: &ChatApp<Vec<u8>>) -> String {
        String::from_utf8_lossy(app.output()).to_string()
    }

    #[test]
    fn plain_text_generates_an_image() -> Result<()> {
        let mut app = dryrun_app();
        assert!(app.handle_line("A red fox in snow")?);
        assert!(app.wait_idle(Duration::from_secs(5))?);

        let state = app.orchestrator().state();
        assert_eq!(state.results().len(), 1);
        assert_eq!(state.results()[0].prompt, "A red fox in snow");
        assert_eq!(state.prompt(), "");
        assert!(output(&app).contains("New image img-"));
        Ok(())
    }

    #[test]
    fn submit_is_refused_while_loading() -> Result<()> {
        let (release_tx, release_rx) = mpsc::channel();
        let service = Arc::new(GatedService {
            release: Mutex::new(release_rx),
            calls: Mutex::new(0),
        });
        let orchestrator =
            Orchestrator::new(service.clone(), EventWriter::discard("session-gated"));
        let mut app = ChatApp::new(orchestrator, Vec::new());

        app.handle_line("first")?;
        assert!(app.orchestrator().state().is_loading());
        app.handle_line("second")?;
        app.handle_line("/submit")?;
        assert!(output(&app).contains("Still working on the previous image"));

        release_tx.send(())?;
        assert!(app.wait_idle(Duration::from_secs(5))?);
        assert_eq!(service.calls(), 1);
        assert_eq!(app.orchestrator().state().results().len(), 1);
        assert_eq!(app.orchestrator().state().results()[0].prompt, "first");
        Ok(())
    }

    #[test]
    fn worker_panic_settles_with_error_and_ends_loading() -> Result<()> {
        let orchestrator = Orchestrator::new(
            Arc::new(CrashingService),
            EventWriter::discard("session-crash"),
        );
        let mut app = ChatApp::new(orchestrator, Vec::new());

        app.handle_line("boat")?;
        assert!(app.wait_idle(Duration::from_secs(5))?);

        let state = app.orchestrator().state();
        assert!(!state.is_loading());
        assert!(state.results().is_empty());
        assert_eq!(
            state.error(),
            Some("Failed to generate image. Please try again. Error: image worker stopped before returning a result")
        );

        app.handle_line("boat")?;
        assert!(!output(&app).contains("Still working on the previous image"));
        assert!(app.wait_idle(Duration::from_secs(5))?);
        Ok(())
    }

    #[test]
    fn copy_link_is_refused_while_gallery_is_hidden() -> Result<()> {
        let (release_tx, release_rx) = mpsc::channel();
        let service = Arc::new(GatedService {
            release: Mutex::new(release_rx),
            calls: Mutex::new(0),
        });
        let orchestrator =
            Orchestrator::new(service.clone(), EventWriter::discard("session-gated"));
        let mut app = ChatApp::new(orchestrator, Vec::new());

        app.handle_line("first")?;
        release_tx.send(())?;
        assert!(app.wait_idle(Duration::from_secs(5))?);

        app.handle_line("second")?;
        assert!(app.orchestrator().state().is_loading());
        app.handle_line("/copy 1")?;
        assert!(output(&app).contains("The gallery is hidden while an image is being created."));
        assert!(app.orchestrator().state().toast_message().is_none());

        release_tx.send(())?;
        assert!(app.wait_idle(Duration::from_secs(5))?);
        app.handle_line("/copy 1")?;
        assert_eq!(
            app.orchestrator().state().toast_message(),
            Some("Shareable link copied!")
        );
        Ok(())
    }

    #[test]
    fn edit_flow_uses_uploaded_file() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("source photo.png");
        RgbImage::from_pixel(16, 12, Rgb([10, 120, 200])).save(&path)?;

        let mut app = dryrun_app();
        app.handle_line("/edit")?;
        app.handle_line("make it blue")?;
        assert!(output(&app).contains("Error: Please upload an image to edit."));
        assert!(app.orchestrator().state().results().is_empty());

        app.handle_line(&format!("/upload \"{}\"", path.display()))?;
        assert!(output(&app).contains("Uploaded source photo.png (16x12, image/png)."));
        app.handle_line("make it blue")?;
        assert!(app.wait_idle(Duration::from_secs(5))?);

        let state = app.orchestrator().state();
        assert_eq!(state.mode(), Mode::Edit);
        assert_eq!(state.results().len(), 1);
        assert!(state.error().is_none());
        Ok(())
    }

    #[test]
    fn settings_commands_validate_input() -> Result<()> {
        let mut app = dryrun_app();
        app.handle_line("/style anime")?;
        app.handle_line("/aspect 9:16")?;
        app.handle_line("/style watercolor")?;

        let settings = app.orchestrator().state().settings();
        assert_eq!(settings.style, ImageStyle::Anime);
        assert_eq!(settings.aspect_ratio, AspectRatio::Portrait);
        assert!(output(&app).contains("Unknown style 'watercolor'"));
        Ok(())
    }

    #[test]
    fn copy_link_shows_toast_for_known_cards_only() -> Result<()> {
        let mut app = dryrun_app();
        app.handle_line("/copy 1")?;
        assert!(output(&app).contains("No image matches '1'."));
        assert!(app.orchestrator().state().toast_message().is_none());

        app.handle_line("boat")?;
        app.wait_idle(Duration::from_secs(5))?;
        app.handle_line("/copy 1")?;
        assert_eq!(
            app.orchestrator().state().toast_message(),
            Some("Shareable link copied!")
        );
        Ok(())
    }

    #[test]
    fn quit_and_unknown_commands() -> Result<()> {
        let mut app = dryrun_app();
        assert!(app.handle_line("/frobnicate")?);
        assert!(output(&app).contains("Unknown command /frobnicate."));
        assert!(app.handle_line("/upload")?);
        assert!(output(&app).contains("/upload requires a path"));
        assert!(!app.handle_line("/quit")?);
        Ok(())
    }
}
