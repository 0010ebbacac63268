//! Shared fixtures and test doubles.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use logobatch_core::{
    compositor::CompositionRequest,
    notifier::OutgoingMail,
    AssetCatalog, AssetLayout, CompositionError, CompositionPipeline, Compositor, DeliveryError,
    DownloadError, LogoFetcher, Mailer, MessageTemplate, Notifier,
};

/// Writes a fixed logo; fails for URLs registered with `fail_on`.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    failing: Arc<Mutex<HashSet<String>>>,
    pub staged: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeFetcher {
    pub fn fail_on(self, url: &str) -> Self {
        self.failing.lock().unwrap().insert(url.to_string());
        self
    }
}

#[async_trait]
impl LogoFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        if self.failing.lock().unwrap().contains(url) {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        tokio::fs::write(dest, b"logo-bytes").await.unwrap();
        self.staged.lock().unwrap().push(dest.to_path_buf());
        Ok(())
    }
}

/// Returns `composed:<base file name>`; fails on the configured call number.
#[derive(Clone, Default)]
pub struct FakeCompositor {
    fail_on_call: Option<usize>,
    pub requests: Arc<Mutex<Vec<CompositionRequest>>>,
}

impl FakeCompositor {
    pub fn failing_on_call(n: usize) -> Self {
        Self {
            fail_on_call: Some(n),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Compositor for FakeCompositor {
    async fn compose(&self, request: &CompositionRequest) -> Result<Vec<u8>, CompositionError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if self.fail_on_call == Some(call) {
            return Err(CompositionError::EmptyPayload);
        }
        Ok(format!("composed:{}", request.base.file_name).into_bytes())
    }
}

/// Records every message; fails for addresses registered with `reject`.
#[derive(Clone, Default)]
pub struct FakeMailer {
    rejected: Arc<Mutex<HashSet<String>>>,
    pub sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl FakeMailer {
    pub fn reject(self, address: &str) -> Self {
        self.rejected.lock().unwrap().insert(address.to_string());
        self
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.to.clone()).collect()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        if self.rejected.lock().unwrap().contains(&mail.to) {
            return Err(DeliveryError::Build("mailbox unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

/// A temp directory laid out like a real batch root.
pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub layout: AssetLayout,
}

impl Workspace {
    pub fn new(products: &[&str], masks: &[&str], passthrough: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = AssetLayout::rooted_at(dir.path());
        for (folder, names) in [
            (&layout.products_dir, products),
            (&layout.masks_dir, masks),
            (&layout.passthrough_dir, passthrough),
        ] {
            std::fs::create_dir_all(folder).unwrap();
            for name in names {
                std::fs::write(folder.join(name), name.as_bytes()).unwrap();
            }
        }
        Self { dir, layout }
    }

    pub fn catalog(&self) -> AssetCatalog {
        AssetCatalog::load(&self.layout).unwrap()
    }

    pub fn pipeline(&self, fetcher: FakeFetcher, compositor: FakeCompositor) -> CompositionPipeline {
        CompositionPipeline::new(
            Arc::new(fetcher),
            Arc::new(compositor),
            &self.layout.staging_dir,
            &self.layout.output_dir,
        )
    }

    pub fn staged_files(&self) -> Vec<PathBuf> {
        list(&self.layout.staging_dir)
    }

    pub fn output_files(&self) -> Vec<String> {
        let mut names: Vec<_> = list(&self.layout.output_dir)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn notifier(mailer: FakeMailer) -> Notifier {
    Notifier::new(
        Box::new(mailer),
        "Forge Studio",
        "studio@forge.test",
        MessageTemplate::standard("Your designs", "Forge Studio"),
    )
}

fn list(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => vec![],
    }
}

/// One-connection HTTP server on a loopback port. Answers with a canned
/// response and hands back the raw request it received.
pub struct CannedServer {
    pub base_url: String,
    request: JoinHandle<Vec<u8>>,
}

impl CannedServer {
    pub async fn respond(status: u16, content_type: &str, body: &[u8]) -> Self {
        let mut response = format!(
            "HTTP/1.1 {status} Canned\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        Self::serve(Some(response)).await
    }

    /// Accepts the connection and never answers.
    pub async fn stalled() -> Self {
        Self::serve(None).await
    }

    async fn serve(response: Option<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let request = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let raw = read_request(&mut socket).await;
            match response {
                Some(response) => {
                    socket.write_all(&response).await.unwrap();
                    socket.shutdown().await.ok();
                }
                None => tokio::time::sleep(Duration::from_secs(30)).await,
            }
            raw
        });
        Self { base_url, request }
    }

    /// The request as received, lossily decoded.
    pub async fn request(self) -> String {
        String::from_utf8_lossy(&self.request.await.unwrap()).into_owned()
    }
}

/// Plain client that ignores proxy settings from the environment.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .unwrap()
}

async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);

        let Some(end) = find(&raw, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&raw[..end]).to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());
        match length {
            Some(len) if raw.len() >= end + 4 + len => break,
            Some(_) => {}
            None if head.contains("transfer-encoding: chunked") => {
                if raw.ends_with(b"0\r\n\r\n") {
                    break;
                }
            }
            None => break,
        }
    }
    raw
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
