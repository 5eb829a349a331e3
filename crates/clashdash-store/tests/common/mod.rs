//! Scripted router for store integration tests.
//!
//! The device interprets the small shell vocabulary the backends emit
//! (`cat`, `printf`, `uci`, `opkg`, `echo`) against in-memory state, models
//! UCI staging (`add`/`set`/`delete` are invisible until `commit`), issues
//! session tokens, and records every command together with the store state
//! observed when it arrived.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clashdash_luci::{Authenticator, Credentials, ExecError, RemoteExec, Session, TokenHolder};
use clashdash_store::{
    CancellationToken, Nikki, OpenClash, RuleBackend, RuleStore, Snapshot, StoreState,
};
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};

pub const RULES_PATH: &str = "/etc/openclash/custom/openclash_custom_rules.list";
pub const OPENCLASH_SWITCH: &str = "openclash.config.enable_custom_clash_rules";
pub const NIKKI_SWITCH: &str = "nikki.mixin.rule";
pub const CALL_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Failure injection
// ============================================================================

/// What happens to a call whose command matches a [`Fault`].
#[derive(Clone)]
pub enum Effect {
    /// Return this error without touching device state.
    Fail(ExecError),
    /// Answer with this output without running anything.
    Output(String),
    /// Apply the command, then never answer.
    ApplyThenHang,
    /// Signal `entered`, wait for `release`, then run normally.
    Block {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    },
}

struct Fault {
    needle: String,
    /// Matching calls to let through first.
    skip: usize,
    effect: Effect,
}

// ============================================================================
// Device state
// ============================================================================

type Section = BTreeMap<String, String>;

#[derive(Default)]
struct State {
    files: HashMap<String, String>,
    flags: HashMap<String, String>,
    opkg: String,
    /// Non-rule lines printed by `uci show`.
    uci_extra: Vec<String>,
    committed: Vec<Section>,
    staged: Option<Vec<Section>>,
    token_generation: u64,
    logins: u64,
    log: Vec<Call>,
    faults: Vec<Fault>,
}

/// One exec call as seen by the device.
#[derive(Debug, Clone)]
pub struct Call {
    pub command: String,
    /// Store state when the call arrived, if a store is being observed.
    pub observed: Option<StoreState>,
}

#[derive(Default)]
pub struct FakeDevice {
    state: Mutex<State>,
    observer: Mutex<Option<watch::Receiver<Snapshot>>>,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_file(self: &Arc<Self>, path: &str, content: &str) -> Arc<Self> {
        self.state.lock().files.insert(path.into(), content.into());
        self.clone()
    }

    pub fn with_flag(self: &Arc<Self>, key: &str, value: &str) -> Arc<Self> {
        self.state.lock().flags.insert(key.into(), value.into());
        self.clone()
    }

    pub fn with_opkg(self: &Arc<Self>, status: &str) -> Arc<Self> {
        self.state.lock().opkg = status.into();
        self.clone()
    }

    /// Committed rule sections, given as `(option, value)` lists.
    pub fn with_sections(self: &Arc<Self>, sections: &[&[(&str, &str)]]) -> Arc<Self> {
        let mut state = self.state.lock();
        state.committed = sections
            .iter()
            .map(|opts| {
                opts.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .collect();
        state.uci_extra = vec![
            "nikki.config=config".into(),
            "nikki.config.enabled='1'".into(),
            "nikki.mixin=mixin".into(),
        ];
        drop(state);
        self.clone()
    }

    /// Inject `effect` into the `skip + 1`-th call containing `needle`.
    pub fn fault_on(&self, needle: &str, skip: usize, effect: Effect) {
        self.state.lock().faults.push(Fault {
            needle: needle.into(),
            skip,
            effect,
        });
    }

    /// Record the store's state with every call from now on.
    pub fn observe(&self, rx: watch::Receiver<Snapshot>) {
        *self.observer.lock() = Some(rx);
    }

    /// Invalidate the current session token.
    pub fn expire_token(&self) {
        self.state.lock().token_generation += 1;
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn flag(&self, key: &str) -> Option<String> {
        self.state.lock().flags.get(key).cloned()
    }

    /// Committed value of `option` for every rule section.
    pub fn committed(&self, option: &str) -> Vec<Option<String>> {
        self.state
            .lock()
            .committed
            .iter()
            .map(|s| s.get(option).cloned())
            .collect()
    }

    pub fn has_staged(&self) -> bool {
        self.state.lock().staged.is_some()
    }

    pub fn logins(&self) -> u64 {
        self.state.lock().logins
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().log.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    fn current_token(&self) -> String {
        format!("tok-{}", self.state.lock().token_generation)
    }

    fn take_fault(&self, command: &str) -> Option<Effect> {
        let mut state = self.state.lock();
        let index = state
            .faults
            .iter()
            .position(|f| command.contains(&f.needle))?;
        let fault = &mut state.faults[index];
        if fault.skip > 0 {
            fault.skip -= 1;
            return None;
        }
        Some(state.faults.remove(index).effect)
    }

    fn apply(&self, command: &str) -> Result<String, ExecError> {
        let mut state = self.state.lock();
        let mut out = String::new();
        for words in split_commands(command) {
            out.push_str(&state.run(&words)?);
        }
        Ok(out)
    }
}

impl State {
    fn stage(&mut self) -> &mut Vec<Section> {
        let committed = &self.committed;
        self.staged.get_or_insert_with(|| committed.clone())
    }

    fn run(&mut self, words: &[String]) -> Result<String, ExecError> {
        let w: Vec<&str> = words.iter().map(String::as_str).collect();
        match w.as_slice() {
            ["cat", path, ..] => Ok(self.files.get(*path).cloned().unwrap_or_default()),
            ["printf", "%s", content, ">", path] => {
                self.files.insert(path.to_string(), content.to_string());
                Ok(String::new())
            }
            ["echo", text] => Ok(format!("{text}\n")),
            ["opkg", "status", ..] => Ok(self.opkg.clone()),
            ["uci", "-q", "get", key] => Ok(self
                .flags
                .get(*key)
                .map(|v| format!("{v}\n"))
                .unwrap_or_default()),
            ["uci", "-q", "show", package] => Ok(self.show(package)),
            ["uci", "add", _, "rule", ..] => {
                self.stage().push(Section::new());
                Ok(String::new())
            }
            ["uci", "delete", target] => {
                let index = section_index(target)
                    .ok_or_else(|| ExecError::Remote(format!("bad section {target}")))?;
                let staged = self.stage();
                if index >= staged.len() {
                    return Err(ExecError::Remote(format!("uci: Entry not found: {target}")));
                }
                staged.remove(index);
                Ok(String::new())
            }
            ["uci", "set", assignment] => {
                let (key, value) = assignment
                    .split_once('=')
                    .ok_or_else(|| ExecError::Remote(format!("bad set {assignment}")))?;
                match key.split_once(".@rule[-1].") {
                    Some((_, option)) => {
                        let last = self
                            .stage()
                            .last_mut()
                            .ok_or_else(|| ExecError::Remote("no section to set".into()))?;
                        last.insert(option.to_string(), value.to_string());
                    }
                    None => {
                        self.flags.insert(key.to_string(), value.to_string());
                    }
                }
                Ok(String::new())
            }
            ["uci", "commit", _] => {
                if let Some(staged) = self.staged.take() {
                    self.committed = staged;
                }
                Ok(String::new())
            }
            ["uci", "revert", _] => {
                self.staged = None;
                Ok(String::new())
            }
            other => Err(ExecError::Remote(format!("unknown command: {other:?}"))),
        }
    }

    fn show(&self, package: &str) -> String {
        let mut out = String::new();
        for line in &self.uci_extra {
            out.push_str(line);
            out.push('\n');
        }
        for (i, section) in self.committed.iter().enumerate() {
            out.push_str(&format!("{package}.@rule[{i}]=rule\n"));
            for (option, value) in section {
                let quoted = value.replace('\'', r"'\''");
                out.push_str(&format!("{package}.@rule[{i}].{option}='{quoted}'\n"));
            }
        }
        out
    }
}

fn section_index(target: &str) -> Option<usize> {
    let start = target.find("@rule[")? + "@rule[".len();
    let end = start + target[start..].find(']')?;
    target[start..end].parse().ok()
}

/// Split on `&&` into word lists, honouring single quotes and backslashes.
pub fn split_commands(command: &str) -> Vec<Vec<String>> {
    let mut commands = Vec::new();
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    word.push(q);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    word.push(next);
                }
            }
            '&' if chars.peek() == Some(&'&') => {
                chars.next();
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
                commands.push(std::mem::take(&mut words));
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    if !words.is_empty() {
        commands.push(words);
    }
    commands
}

#[async_trait]
impl RemoteExec for FakeDevice {
    async fn execute(&self, command: &str, token: &str) -> Result<String, ExecError> {
        if token != self.current_token() {
            return Err(ExecError::Auth("HTTP 403".into()));
        }

        let observed = self.observer.lock().as_ref().map(|rx| rx.borrow().state);
        self.state.lock().log.push(Call {
            command: command.to_string(),
            observed,
        });

        match self.take_fault(command) {
            None => self.apply(command),
            Some(Effect::Fail(err)) => Err(err),
            Some(Effect::Output(text)) => Ok(text),
            Some(Effect::ApplyThenHang) => {
                self.apply(command)?;
                std::future::pending().await
            }
            Some(Effect::Block { entered, release }) => {
                entered.notify_one();
                release.notified().await;
                self.apply(command)
            }
        }
    }
}

#[async_trait]
impl Authenticator for FakeDevice {
    async fn get_token(&self, username: &str, password: &str) -> Result<String, ExecError> {
        tokio::task::yield_now().await;
        if username != "root" || password != "secret" {
            return Err(ExecError::Auth("login rejected".into()));
        }
        self.state.lock().logins += 1;
        Ok(self.current_token())
    }
}

// ============================================================================
// Store construction
// ============================================================================

pub fn session(device: &Arc<FakeDevice>) -> Arc<Session> {
    let tokens = Arc::new(TokenHolder::new(
        device.clone(),
        Credentials::new("root", "secret"),
    ));
    Arc::new(Session::new(device.clone(), tokens, CALL_TIMEOUT))
}

pub fn openclash() -> Arc<dyn RuleBackend> {
    Arc::new(OpenClash::new(RULES_PATH, OPENCLASH_SWITCH))
}

pub fn nikki(min_version: &str) -> Arc<dyn RuleBackend> {
    Arc::new(Nikki::new(
        "nikki",
        NIKKI_SWITCH,
        min_version.parse().unwrap(),
    ))
}

pub fn store(device: &Arc<FakeDevice>, backend: Arc<dyn RuleBackend>) -> RuleStore {
    RuleStore::new(backend, session(device), CancellationToken::new())
}

pub fn targets(store: &RuleStore) -> Vec<String> {
    store
        .snapshot()
        .rules
        .rules
        .iter()
        .map(|r| r.target.clone())
        .collect()
}

pub const NIKKI_OPKG: &str = "Package: luci-app-nikki\nVersion: 1.19.2-r1\nStatus: install user installed\n";
