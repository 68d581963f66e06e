//! Playwright browser automation
//!
//! One long-lived `node` process per engine runs [`DRIVER_SCRIPT`] and
//! executes commands sent as line-delimited JSON on its stdin:
//!
//! ```text
//! -> {"id": 7, "op": "perform", "page": 2, "selector": {...}, "action": {...}, "timeout": 5000}
//! <- {"id": 7, "ok": true, "value": null}
//! <- {"id": 8, "ok": false, "error": "Timeout 5000ms exceeded."}
//! ```
//!
//! Replies may arrive out of order; a reader task routes them by id.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use appcheck_common::HarnessConfig;

use crate::browser::{Action, BrowserEngine, BrowserPage, PageOptions, Query, Selector};
use crate::error::{E2eError, E2eResult};

/// Extra time granted on top of a command's own Playwright timeout
const REPLY_GRACE: Duration = Duration::from_secs(5);

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Node side of the driver protocol
pub const DRIVER_SCRIPT: &str = r#"
const readline = require('readline');
const pw = require(require.resolve('playwright', { paths: [process.cwd()] }));

let browser = null;
const pages = new Map();
let nextPage = 1;

function textOf(m) {
  return m.match === 'pattern' ? new RegExp(m.value) : m.value;
}

function resolve(root, sel) {
  switch (sel.kind) {
    case 'css': return root.locator(sel.css);
    case 'test_id': return root.getByTestId(sel.id);
    case 'role': {
      const opts = {};
      if (sel.name) {
        opts.name = textOf(sel.name);
        if (sel.name.match === 'exact') opts.exact = true;
      }
      return root.getByRole(sel.role, opts);
    }
    case 'title': return root.getByTitle(sel.title);
    case 'text': return root.getByText(textOf(sel.text), { exact: sel.text.match === 'exact' });
    case 'within': return resolve(resolve(root, sel.parent), sel.child);
    case 'nth': return resolve(root, sel.inner).nth(sel.index);
    default: throw new Error('unknown selector kind ' + sel.kind);
  }
}

function pageOf(cmd) {
  const entry = pages.get(cmd.page);
  if (!entry) throw new Error('no such page ' + cmd.page);
  return entry.page;
}

async function perform(loc, action, timeout) {
  switch (action.action) {
    case 'click': return loc.click({ timeout });
    case 'hover': return loc.hover({ timeout });
    case 'fill': return loc.fill(action.value, { timeout });
    case 'check': return loc.check({ timeout });
    case 'uncheck': return loc.uncheck({ timeout });
    case 'select_option': return loc.selectOption(action.value, { timeout });
    case 'press': return loc.press(action.key, { timeout });
    default: throw new Error('unknown action ' + action.action);
  }
}

async function query(loc, q, timeout) {
  const first = loc.first();
  switch (q.query) {
    case 'visible': return first.isVisible();
    case 'count': return loc.count();
    case 'text': return (await first.textContent({ timeout })) || '';
    case 'all_texts': return loc.allTextContents();
    case 'input_value': return first.inputValue({ timeout });
    case 'attribute': return first.getAttribute(q.name, { timeout });
    case 'class_list': {
      const cls = (await first.getAttribute('class', { timeout })) || '';
      return cls.split(/\s+/).filter(Boolean);
    }
    case 'css_value':
      return first.evaluate((el, p) => getComputedStyle(el).getPropertyValue(p), q.property);
    default: throw new Error('unknown query ' + q.query);
  }
}

async function handle(cmd) {
  switch (cmd.op) {
    case 'launch':
      browser = await pw[cmd.browser].launch({ headless: cmd.headless });
      return browser.version();
    case 'new_page': {
      const options = { baseURL: cmd.base_url, viewport: cmd.viewport };
      if (cmd.storage_state) options.storageState = cmd.storage_state;
      const context = await browser.newContext(options);
      const page = await context.newPage();
      const id = nextPage++;
      pages.set(id, { context, page });
      return id;
    }
    case 'goto': await pageOf(cmd).goto(cmd.path, { timeout: cmd.timeout }); return null;
    case 'url': return pageOf(cmd).url();
    case 'perform':
      await perform(resolve(pageOf(cmd), cmd.selector), cmd.action, cmd.timeout);
      return null;
    case 'query': return query(resolve(pageOf(cmd), cmd.selector), cmd.query, cmd.timeout);
    case 'storage_state': return pages.get(cmd.page).context.storageState();
    case 'close_page': {
      const entry = pages.get(cmd.page);
      if (entry) { pages.delete(cmd.page); await entry.context.close(); }
      return null;
    }
    case 'shutdown':
      if (browser) await browser.close();
      setTimeout(() => process.exit(0), 10);
      return null;
    default: throw new Error('unknown op ' + cmd.op);
  }
}

readline.createInterface({ input: process.stdin }).on('line', (line) => {
  let cmd;
  try { cmd = JSON.parse(line); } catch (e) { console.error('bad command: ' + line); return; }
  handle(cmd).then(
    (value) => process.stdout.write(JSON.stringify({ id: cmd.id, ok: true, value: value === undefined ? null : value }) + '\n'),
    (err) => process.stdout.write(JSON.stringify({ id: cmd.id, ok: false, error: String(err && err.message || err) }) + '\n'),
  );
});
"#;

/// Check that Playwright is installed
pub fn check_playwright_installed() -> E2eResult<()> {
    let output = Command::new("npx")
        .args(["playwright", "--version"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match output {
        Ok(status) if status.success() => Ok(()),
        _ => Err(E2eError::PlaywrightNotFound),
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Connection to the node driver process
struct Driver {
    stdin: tokio::sync::Mutex<ChildStdin>,
    child: tokio::sync::Mutex<Child>,
    pending: Pending,
    next_id: AtomicU64,
}

impl Driver {
    async fn spawn(config: &HarnessConfig, script_dir: &TempDir) -> E2eResult<Self> {
        let script_path = script_dir.path().join("driver.js");
        tokio::fs::write(&script_path, DRIVER_SCRIPT).await?;

        debug!("Starting Playwright driver: {}", script_path.display());
        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .current_dir(&config.browser.driver_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("failed to start node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[playwright] {}", line);
                }
            });
        }

        let pending: Pending = Arc::default();
        let routes = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<Reply>(&line) {
                    Ok(reply) => {
                        if let Some(tx) = routes.lock().remove(&reply.id) {
                            let _ = tx.send(reply);
                        }
                    }
                    Err(_) => debug!("[playwright stdout] {}", line),
                }
            }
            // Dropping the senders fails every in-flight call
            routes.lock().clear();
            debug!("Playwright driver output closed");
        });

        Ok(Self {
            stdin: tokio::sync::Mutex::new(stdin),
            child: tokio::sync::Mutex::new(child),
            pending,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, op: &str, mut args: Value, limit: Duration) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Value::Object(map) = &mut args {
            map.insert("id".to_string(), json!(id));
            map.insert("op".to_string(), json!(op));
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let mut line = serde_json::to_string(&args)?;
        line.push('\n');
        debug!("-> playwright #{} {}", id, op);
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.lock().remove(&id);
                return Err(E2eError::Playwright(format!("driver not accepting commands: {}", e)));
            }
            stdin.flush().await?;
        }

        let reply = match timeout(limit + REPLY_GRACE, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(E2eError::Playwright("driver exited".to_string())),
            Err(_) => {
                self.pending.lock().remove(&id);
                return Err(E2eError::timeout(format!("playwright {}", op), limit));
            }
        };

        debug!("<- playwright #{} ok={}", reply.id, reply.ok);
        if reply.ok {
            Ok(reply.value)
        } else {
            let message = reply.error.unwrap_or_else(|| "unknown driver error".to_string());
            if message.contains("Timeout") && message.contains("exceeded") {
                Err(E2eError::timeout(format!("playwright {}: {}", op, message), limit))
            } else {
                Err(E2eError::Browser(format!("{}: {}", op, message)))
            }
        }
    }

    async fn stop(&self) -> E2eResult<()> {
        let mut child = self.child.lock().await;

        if let Ok(Ok(status)) = timeout(SHUTDOWN_GRACE, child.wait()).await {
            debug!("Playwright driver exited: {}", status);
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                warn!("Playwright driver still running, sending SIGTERM (pid: {})", pid);
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
                    && timeout(Duration::from_millis(500), child.wait()).await.is_ok()
                {
                    return Ok(());
                }
            }
        }

        child.kill().await?;
        Ok(())
    }
}

/// Playwright-backed [`BrowserEngine`]
pub struct PlaywrightEngine {
    driver: Arc<Driver>,
    base_url: String,
    viewport: (u32, u32),
    action_timeout: Duration,
    navigation_timeout: Duration,
    closed: AtomicBool,
    _script_dir: TempDir,
}

impl PlaywrightEngine {
    /// Start the driver and launch the configured browser
    pub async fn launch(config: &HarnessConfig) -> E2eResult<Self> {
        check_playwright_installed()?;

        let script_dir = tempfile::tempdir()?;
        let driver = Driver::spawn(config, &script_dir).await?;
        let version = driver
            .call(
                "launch",
                json!({
                    "browser": config.browser.kind.as_str(),
                    "headless": config.browser.headless,
                }),
                config.timeouts.navigation(),
            )
            .await?;

        info!(
            "Launched {} {} (headless: {})",
            config.browser.kind.as_str(),
            version.as_str().unwrap_or("?"),
            config.browser.headless
        );

        Ok(Self {
            driver: Arc::new(driver),
            base_url: config.base_url.clone(),
            viewport: (config.browser.viewport_width, config.browser.viewport_height),
            action_timeout: config.timeouts.action(),
            navigation_timeout: config.timeouts.navigation(),
            closed: AtomicBool::new(false),
            _script_dir: script_dir,
        })
    }
}

#[async_trait]
impl BrowserEngine for PlaywrightEngine {
    async fn new_page(&self, options: PageOptions) -> E2eResult<Arc<dyn BrowserPage>> {
        let id = self
            .driver
            .call(
                "new_page",
                json!({
                    "base_url": self.base_url,
                    "viewport": { "width": self.viewport.0, "height": self.viewport.1 },
                    "storage_state": options.storage_state,
                }),
                self.navigation_timeout,
            )
            .await?;
        let id = id
            .as_u64()
            .ok_or_else(|| E2eError::Playwright(format!("bad page id {}", id)))?;

        Ok(Arc::new(PlaywrightPage {
            driver: self.driver.clone(),
            id,
            action_timeout: self.action_timeout,
            navigation_timeout: self.navigation_timeout,
        }))
    }

    async fn shutdown(&self) -> E2eResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Shutting down Playwright driver");
        if let Err(e) = self
            .driver
            .call("shutdown", json!({}), self.navigation_timeout)
            .await
        {
            warn!("Playwright shutdown command failed: {}", e);
        }
        self.driver.stop().await
    }
}

/// Page handle living inside the driver process
pub struct PlaywrightPage {
    driver: Arc<Driver>,
    id: u64,
    action_timeout: Duration,
    navigation_timeout: Duration,
}

impl PlaywrightPage {
    fn millis(d: Duration) -> u64 {
        d.as_millis() as u64
    }
}

#[async_trait]
impl BrowserPage for PlaywrightPage {
    async fn goto(&self, path: &str) -> E2eResult<()> {
        self.driver
            .call(
                "goto",
                json!({ "page": self.id, "path": path, "timeout": Self::millis(self.navigation_timeout) }),
                self.navigation_timeout,
            )
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> E2eResult<String> {
        let url = self
            .driver
            .call("url", json!({ "page": self.id }), self.action_timeout)
            .await?;
        Ok(url.as_str().unwrap_or_default().to_string())
    }

    async fn perform(&self, selector: &Selector, action: &Action) -> E2eResult<()> {
        self.driver
            .call(
                "perform",
                json!({
                    "page": self.id,
                    "selector": selector,
                    "action": action,
                    "timeout": Self::millis(self.action_timeout),
                }),
                self.action_timeout,
            )
            .await?;
        Ok(())
    }

    async fn query(&self, selector: &Selector, query: &Query) -> E2eResult<Value> {
        self.driver
            .call(
                "query",
                json!({
                    "page": self.id,
                    "selector": selector,
                    "query": query,
                    "timeout": Self::millis(self.action_timeout),
                }),
                self.action_timeout,
            )
            .await
    }

    async fn storage_state(&self) -> E2eResult<Value> {
        self.driver
            .call("storage_state", json!({ "page": self.id }), self.action_timeout)
            .await
    }

    async fn close(&self) -> E2eResult<()> {
        self.driver
            .call("close_page", json!({ "page": self.id }), self.action_timeout)
            .await?;
        Ok(())
    }
}
