#![allow(dead_code)]

pub mod bin;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{Request, Response},
    Router,
};
use serde_json::Value;
use spacedrop::{
    app,
    confirm::ConfirmSettings,
    desktop::{
        ClipboardSink, Desktop, DesktopError, Notifier, PromptRequest, PromptSurface, UrlOpener,
    },
    identity::IdentityResolver,
    policy_store::{Mode, PolicyPaths, PolicyRecord, PolicyStore, ValidModes},
    state::{AppState, Settings},
};
use std::{
    collections::{BTreeSet, HashMap},
    net::{IpAddr, SocketAddr},
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// Resolver backed by a fixed address table.
#[derive(Debug, Default, Clone)]
pub struct FixedResolver {
    pub peers: HashMap<IpAddr, u64>,
    pub self_addr: Option<IpAddr>,
}

impl FixedResolver {
    pub fn with(mut self, ip: &str, id: u64) -> Self {
        self.peers.insert(ip.parse().unwrap(), id);
        self
    }

    pub fn with_self(mut self, ip: &str, id: u64) -> Self {
        let addr: IpAddr = ip.parse().unwrap();
        self.peers.insert(addr, id);
        self.self_addr = Some(addr);
        self
    }
}

#[async_trait]
impl IdentityResolver for FixedResolver {
    async fn resolve(&self, addr: IpAddr) -> Option<u64> {
        self.peers.get(&addr).copied().filter(|id| *id > 0)
    }

    async fn self_address(&self) -> Option<IpAddr> {
        self.self_addr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Accept,
    Decline,
    Fail,
    Hang,
}

/// Prompt surface that answers from a script and records what it was asked.
#[derive(Debug)]
pub struct ScriptedPrompt {
    pub script: Script,
    pub calls: AtomicUsize,
    pub last: Mutex<Option<PromptRequest>>,
}

impl ScriptedPrompt {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<PromptRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl PromptSurface for ScriptedPrompt {
    async fn confirm(&self, req: &PromptRequest) -> Result<bool, DesktopError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(req.clone());
        match self.script {
            Script::Accept => Ok(true),
            Script::Decline => Ok(false),
            Script::Fail => Err(DesktopError::Spawn {
                program: "osascript".to_string(),
                message: "not available".to_string(),
            }),
            Script::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingOpener {
    pub opened: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingOpener {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl UrlOpener for RecordingOpener {
    async fn open(&self, url: &str) -> Result<(), DesktopError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DesktopError::NonZeroExit {
                program: "open".to_string(),
                exit_code: Some(1),
                stderr: "no handler".to_string(),
            });
        }
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        title: &str,
        message: &str,
        _icon: Option<&Path>,
    ) -> Result<(), DesktopError> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
        Ok(())
    }
}

/// Clipboard that keeps everything it was given. Images are read from the
/// staged path at call time, together with the path's extension.
#[derive(Debug, Default)]
pub struct RecordingClipboard {
    pub texts: Mutex<Vec<String>>,
    pub images: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingClipboard {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn images(&self) -> Vec<(String, Vec<u8>)> {
        self.images.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipboardSink for RecordingClipboard {
    async fn set_text(&self, text: &str) -> Result<(), DesktopError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn set_image(&self, path: &Path) -> Result<(), DesktopError> {
        let bytes = std::fs::read(path).map_err(|e| DesktopError::Io(e.to_string()))?;
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.images.lock().unwrap().push((ext, bytes));
        Ok(())
    }
}

pub fn policy(mode: Mode, personal: u64, contacts: &[u64]) -> PolicyRecord {
    PolicyRecord {
        mode,
        personal_user_id: personal,
        contacts_user_ids: contacts.iter().copied().collect::<BTreeSet<_>>(),
    }
}

pub fn no_prompts() -> ConfirmSettings {
    ConfirmSettings {
        require_confirm_on_foreign: false,
        ..ConfirmSettings::default()
    }
}

/// A fully wired in-process host with recording collaborators.
pub struct TestHost {
    pub dir: tempfile::TempDir,
    pub state: Arc<AppState>,
    pub prompt: Arc<ScriptedPrompt>,
    pub opener: Arc<RecordingOpener>,
    pub notifier: Arc<RecordingNotifier>,
    pub clipboard: Arc<RecordingClipboard>,
}

impl TestHost {
    pub fn new(
        rec: PolicyRecord,
        confirm: ConfirmSettings,
        resolver: FixedResolver,
        script: Script,
    ) -> Self {
        Self::with_limit(rec, confirm, resolver, script, 1024 * 1024)
    }

    pub fn with_limit(
        rec: PolicyRecord,
        confirm: ConfirmSettings,
        resolver: FixedResolver,
        script: Script,
        max_upload_bytes: usize,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let downloads_dir = dir.path().join("Downloads");
        std::fs::create_dir_all(&downloads_dir).unwrap();

        let paths = PolicyPaths::in_dir(dir.path().join("conf"));
        let policies = PolicyStore::from_record(paths, ValidModes::default(), rec);

        let prompt = ScriptedPrompt::new(script);
        let opener = Arc::new(RecordingOpener::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let clipboard = Arc::new(RecordingClipboard::default());

        let desktop = Desktop {
            prompt: prompt.clone(),
            notifier: notifier.clone(),
            opener: opener.clone(),
            clipboard: clipboard.clone(),
            icon: None,
        };

        let state = Arc::new(AppState {
            settings: Settings {
                app_title: "Spacedrop Test".to_string(),
                downloads_dir,
                confirm,
                max_upload_bytes,
            },
            policies: Arc::new(policies),
            resolver: Arc::new(resolver),
            desktop,
        });

        Self {
            dir,
            state,
            prompt,
            opener,
            notifier,
            clipboard,
        }
    }

    pub fn downloads(&self) -> &Path {
        &self.state.settings.downloads_dir
    }

    /// Router as seen from `peer`.
    pub fn router_from(&self, peer: &str) -> Router {
        let addr = SocketAddr::new(peer.parse().unwrap(), 50_123);
        app::build_router(self.state.clone()).layer(MockConnectInfo(addr))
    }
}

pub const BOUNDARY: &str = "spacedrop-test-boundary";

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn json_body(resp: Response<Body>) -> Value {
    let body = http_body_util::BodyExt::collect(resp.into_body())
        .await
        .unwrap();
    serde_json::from_slice(&body.to_bytes()).unwrap()
}

/// Give detached tasks (notifications) a chance to run.
pub async fn settle<F: Fn() -> bool>(done: F) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
