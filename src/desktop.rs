//! Desktop side effects: confirmation dialogs, notifications, opening links, clipboard.
//!
//! The traits are what the request pipeline depends on. The `Mac*` types drive the
//! stock macOS tools (`osascript`, `terminal-notifier`, `open`, `pbcopy`).

use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

/// Extra time granted to a prompt process beyond its own give-up timer.
pub const PROMPT_GRACE: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug)]
pub enum DesktopError {
    #[error("spawn {program} failed: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} failed (exit={exit_code:?}): {stderr}")]
    NonZeroExit {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("io failed: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub title: String,
    pub message: String,
    pub icon: Option<PathBuf>,
    /// `None` waits until the human answers.
    pub timeout: Option<Duration>,
}

/// Blocking accept/decline question to the person at the desktop.
///
/// `Ok(true)` only on an explicit accept. Implementations must honour `timeout`
/// by giving up (returning `Ok(false)` or an error).
#[async_trait]
pub trait PromptSurface: Send + Sync {
    async fn confirm(&self, req: &PromptRequest) -> Result<bool, DesktopError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, message: &str, icon: Option<&Path>)
        -> Result<(), DesktopError>;
}

#[async_trait]
pub trait UrlOpener: Send + Sync {
    async fn open(&self, url: &str) -> Result<(), DesktopError>;
}

#[async_trait]
pub trait ClipboardSink: Send + Sync {
    async fn set_text(&self, text: &str) -> Result<(), DesktopError>;

    /// `path` holds the image bytes; its extension identifies the format.
    async fn set_image(&self, path: &Path) -> Result<(), DesktopError>;
}

/// Bundle of collaborators shared by every request.
#[derive(Clone)]
pub struct Desktop {
    pub prompt: Arc<dyn PromptSurface>,
    pub notifier: Arc<dyn Notifier>,
    pub opener: Arc<dyn UrlOpener>,
    pub clipboard: Arc<dyn ClipboardSink>,
    pub icon: Option<PathBuf>,
}

impl Desktop {
    pub fn macos(icon: Option<PathBuf>) -> Self {
        Self {
            prompt: Arc::new(MacPrompt),
            notifier: Arc::new(MacNotifier),
            opener: Arc::new(MacUrlOpener),
            clipboard: Arc::new(MacClipboard),
            icon,
        }
    }

    /// The icon path, but only if the file is actually there.
    pub fn existing_icon(&self) -> Option<&Path> {
        self.icon.as_deref().filter(|p| p.exists())
    }

    /// Fire-and-forget notification. Failures are logged and dropped.
    pub fn notify_detached(&self, title: impl Into<String>, message: impl Into<String>) {
        let notifier = self.notifier.clone();
        let icon = self.existing_icon().map(Path::to_path_buf);
        let title = title.into();
        let message = message.into();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&title, &message, icon.as_deref()).await {
                debug!(error = %e, "notification failed");
            }
        });
    }
}

/// Escape a string for use inside an AppleScript string literal.
pub fn applescript_quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// AppleScript for the Accept/Decline dialog. Prints `accept` or `decline`.
pub fn dialog_script(req: &PromptRequest, icon: Option<&Path>) -> String {
    let secs = req.timeout.map(|t| t.as_secs()).unwrap_or(0);

    let mut display = String::from(
        "  display dialog theText with title theTitle buttons theButtons default button \"Accept\"",
    );
    let mut lines = vec![
        "set theButtons to {\"Decline\",\"Accept\"}".to_string(),
        format!("set theTitle to {}", applescript_quote(&req.title)),
        format!("set theText to {}", applescript_quote(&req.message)),
    ];
    if let Some(icon) = icon {
        lines.push(format!(
            "set theIcon to POSIX file {}",
            applescript_quote(&icon.to_string_lossy())
        ));
        display.push_str(" with icon theIcon");
    }
    if secs > 0 {
        lines.push(format!("set timeoutSeconds to {secs}"));
        display.push_str(" giving up after timeoutSeconds");
    }

    lines.extend([
        "try".to_string(),
        display,
        "  set btn to button returned of result".to_string(),
        "  set gu to false".to_string(),
        "  try".to_string(),
        "    set gu to gave up of result".to_string(),
        "  end try".to_string(),
        "on error".to_string(),
        "  return \"decline\"".to_string(),
        "end try".to_string(),
        "if gu then return \"decline\"".to_string(),
        "if btn is \"Accept\" then return \"accept\"".to_string(),
        "return \"decline\"".to_string(),
    ]);
    lines.join("\n")
}

async fn run_command(
    mut cmd: Command,
    program: &str,
    stdin: Option<&[u8]>,
    deadline: Option<Duration>,
) -> Result<String, DesktopError> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| DesktopError::Spawn {
        program: program.to_string(),
        message: e.to_string(),
    })?;

    if let Some(input) = stdin {
        let mut pipe = child
            .stdin
            .take()
            .ok_or_else(|| DesktopError::Io(format!("{program}: missing stdin")))?;
        pipe.write_all(input)
            .await
            .map_err(|e| DesktopError::Io(e.to_string()))?;
        drop(pipe);
    }

    let output = child.wait_with_output();
    let out = match deadline {
        Some(d) => tokio::time::timeout(d, output)
            .await
            .map_err(|_| DesktopError::Timeout(program.to_string()))?,
        None => output.await,
    }
    .map_err(|e| DesktopError::Io(e.to_string()))?;

    if !out.status.success() {
        return Err(DesktopError::NonZeroExit {
            program: program.to_string(),
            exit_code: out.status.code(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

fn osascript(script: &str) -> Command {
    let mut cmd = Command::new("osascript");
    cmd.arg("-e").arg(script);
    cmd
}

/// `display dialog` through `osascript`.
pub struct MacPrompt;

#[async_trait]
impl PromptSurface for MacPrompt {
    async fn confirm(&self, req: &PromptRequest) -> Result<bool, DesktopError> {
        let icon = req.icon.as_deref().filter(|p| p.exists());
        let script = dialog_script(req, icon);
        let deadline = req.timeout.map(|t| t.saturating_add(PROMPT_GRACE));
        let out = run_command(osascript(&script), "osascript", None, deadline).await?;
        Ok(out.eq_ignore_ascii_case("accept"))
    }
}

/// `terminal-notifier` when installed (supports a custom icon), else AppleScript.
pub struct MacNotifier;

#[async_trait]
impl Notifier for MacNotifier {
    async fn notify(
        &self,
        title: &str,
        message: &str,
        icon: Option<&Path>,
    ) -> Result<(), DesktopError> {
        let deadline = Some(Duration::from_secs(10));
        if let Ok(tn) = which::which("terminal-notifier") {
            let mut cmd = Command::new(tn);
            cmd.args(["-title", title, "-message", message]);
            if let Some(icon) = icon {
                cmd.arg("-appIcon").arg(icon);
            }
            run_command(cmd, "terminal-notifier", None, deadline).await?;
            return Ok(());
        }

        let script = format!(
            "display notification {} with title {}",
            applescript_quote(message),
            applescript_quote(title)
        );
        run_command(osascript(&script), "osascript", None, deadline).await?;
        Ok(())
    }
}

/// `/usr/bin/open`, retried inside the console user's session via `launchctl asuser`.
pub struct MacUrlOpener;

#[async_trait]
impl UrlOpener for MacUrlOpener {
    async fn open(&self, url: &str) -> Result<(), DesktopError> {
        let deadline = Some(Duration::from_secs(15));
        let mut cmd = Command::new("/usr/bin/open");
        cmd.arg(url);
        let first = match run_command(cmd, "open", None, deadline).await {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };
        debug!(error = %first, "open failed; retrying via launchctl asuser");

        let uid = unsafe { libc::getuid() };
        let mut cmd = Command::new("launchctl");
        cmd.arg("asuser")
            .arg(uid.to_string())
            .arg("/usr/bin/open")
            .arg(url);
        run_command(cmd, "launchctl", None, deadline).await?;
        Ok(())
    }
}

/// AppleScript picture class for an image file extension.
pub fn picture_class(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "JPEG picture",
        Some("tif") | Some("tiff") => "TIFF picture",
        Some("gif") => "GIF picture",
        _ => "«class PNGf»",
    }
}

/// `pbcopy` for text, AppleScript `set the clipboard` for images.
pub struct MacClipboard;

#[async_trait]
impl ClipboardSink for MacClipboard {
    async fn set_text(&self, text: &str) -> Result<(), DesktopError> {
        run_command(
            Command::new("pbcopy"),
            "pbcopy",
            Some(text.as_bytes()),
            Some(Duration::from_secs(10)),
        )
        .await?;
        Ok(())
    }

    async fn set_image(&self, path: &Path) -> Result<(), DesktopError> {
        let script = format!(
            "set the clipboard to (read (POSIX file {}) as {})",
            applescript_quote(&path.to_string_lossy()),
            picture_class(path)
        );
        run_command(
            osascript(&script),
            "osascript",
            None,
            Some(Duration::from_secs(15)),
        )
        .await?;
        Ok(())
    }
}
