use std::{io::Write, sync::Arc};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::health::{self, BackgroundRefresh};
use crate::input::InputReader;
use crate::launcher::{Launcher, SshCommand};
use crate::probe::Prober;
use crate::registry::{DeviceClass, Registry, Selection, LOCAL_PREFIX};
use crate::settings::{Settings, SettingsStore};
use crate::shutdown::{ShutdownLatch, ShutdownSignal};
use crate::terminal::Terminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    StartupScan,
    MenuIdle,
    Refreshing,
    Connecting,
    Exiting,
}

/// How the control loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Quit,
    Interrupted(ShutdownSignal),
    /// A supervised session ended with this code.
    Session(i32),
}

impl Exit {
    pub fn code(&self) -> u8 {
        match self {
            Exit::Quit | Exit::Interrupted(_) => 0,
            Exit::Session(code) => u8::try_from(*code).unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MenuCommand {
    Quit,
    Refresh,
    Connect(Selection),
    Invalid,
}

fn parse_command(line: &str) -> MenuCommand {
    let token = line.trim().to_ascii_lowercase();
    match token.as_str() {
        "q" | "quit" | "exit" => MenuCommand::Quit,
        "r" | "refresh" => MenuCommand::Refresh,
        _ => parse_selection(&token).map_or(MenuCommand::Invalid, MenuCommand::Connect),
    }
}

/// `3` selects the third overlay row, `l2` the second local row.
fn parse_selection(token: &str) -> Option<Selection> {
    let (class, digits) = match token.strip_prefix(LOCAL_PREFIX) {
        Some(rest) => (DeviceClass::Local, rest),
        None => (DeviceClass::Overlay, token),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let position = digits.parse::<usize>().ok()?.checked_sub(1)?;
    Some(Selection { class, position })
}

/// The interactive control loop. Owns the registry and the settings store;
/// it is the only place settings get saved from.
pub struct App<P: Prober, L: Launcher, W: Write> {
    registry: Registry,
    store: SettingsStore,
    prober: Arc<P>,
    launcher: L,
    input: InputReader,
    terminal: Terminal<W>,
    background: Option<BackgroundRefresh>,
    state: State,
    latch: ShutdownLatch,
}

impl<P: Prober, L: Launcher, W: Write> App<P, L, W> {
    pub fn new(
        registry: Registry,
        store: SettingsStore,
        prober: Arc<P>,
        launcher: L,
        input: InputReader,
        terminal: Terminal<W>,
    ) -> Self {
        Self {
            registry,
            store,
            prober,
            launcher,
            input,
            terminal,
            background: None,
            state: State::StartupScan,
            latch: ShutdownLatch::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.store
    }

    pub fn terminal(&self) -> &Terminal<W> {
        &self.terminal
    }

    pub fn is_refreshing(&self) -> bool {
        self.background.is_some()
    }

    pub async fn run(&mut self) -> anyhow::Result<Exit> {
        if let Some(warning) = self.store.load_warning() {
            let text = format!("Could not load settings ({warning}), using defaults");
            self.terminal.warning(&text)?;
        }

        self.state = State::StartupScan;
        self.terminal.notice("Checking devices...")?;
        let started = Utc::now();
        health::check_concurrent(self.registry.devices_mut(), &self.prober).await;
        self.store.mark_refreshed(started);
        info!(devices = self.registry.len(), "startup scan complete");

        loop {
            self.state = State::MenuIdle;
            self.poll_background().await;
            self.schedule_background();

            self.terminal
                .render_menu(&self.registry, self.background.is_some())?;
            self.terminal.prompt("> ")?;
            let Some(line) = self.input.next_line().await else {
                break;
            };

            match parse_command(&line) {
                MenuCommand::Quit => break,
                MenuCommand::Refresh => self.refresh().await?,
                MenuCommand::Connect(selection) => {
                    if let Some(code) = self.connect(selection).await? {
                        self.shutdown().await;
                        return Ok(Exit::Session(code));
                    }
                }
                MenuCommand::Invalid => {
                    let text = format!("Invalid input `{}`", line.trim());
                    self.terminal.error(&text)?;
                }
            }
        }

        self.shutdown().await;
        Ok(Exit::Quit)
    }

    /// Apply a finished background refresh, if any.
    async fn poll_background(&mut self) {
        if !self.background.as_ref().is_some_and(BackgroundRefresh::is_finished) {
            return;
        }
        if let Some(refresh) = self.background.take() {
            let started = refresh.started_at();
            let outcomes = refresh.finish().await;
            health::apply(self.registry.devices_mut(), outcomes);
            self.store.mark_refreshed(started);
            info!("background refresh complete");
            self.save().await;
        }
    }

    fn schedule_background(&mut self) {
        if self.background.is_none() && self.store.refresh_due(Utc::now()) {
            self.background = Some(BackgroundRefresh::spawn(
                self.registry.targets(),
                Arc::clone(&self.prober),
            ));
        }
    }

    async fn refresh(&mut self) -> anyhow::Result<()> {
        self.state = State::Refreshing;
        if let Some(refresh) = self.background.take() {
            refresh.abort();
        }

        let started = Utc::now();
        let total = self.registry.len();
        let terminal = &mut self.terminal;
        let mut failed = None;
        health::check_sequential(self.registry.devices_mut(), &self.prober, |index, device| {
            if let Err(e) = terminal.progress(index, total, device) {
                failed.get_or_insert(e);
            }
        })
        .await;

        self.store.mark_refreshed(started);
        self.save().await;
        match failed {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// `Some(code)` once a supervised session has ended; `None` when control
    /// comes back to the menu.
    async fn connect(&mut self, selection: Selection) -> anyhow::Result<Option<i32>> {
        let Some(index) = self.registry.resolve(selection) else {
            let label = selection.class.label(selection.position);
            self.terminal.error(&format!("No device numbered {label}"))?;
            return Ok(None);
        };
        let device = self.registry.devices()[index].clone();

        if device.is_offline() {
            self.terminal.prompt(&format!(
                "{} appears offline. Connect anyway? [y/N] ",
                device.name
            ))?;
            let answer = self.input.next_line().await.unwrap_or_default();
            if !matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
                self.terminal.notice("Cancelled.")?;
                return Ok(None);
            }
        }

        self.store.reload_preferences().await;
        let default_user = device
            .user
            .clone()
            .unwrap_or_else(|| self.store.default_username.clone());
        self.terminal.prompt(&format!("Username [{default_user}]: "))?;
        let Some(answer) = self.input.next_line().await else {
            return Ok(None);
        };
        let username = match answer.trim() {
            "" => default_user,
            typed => typed.to_string(),
        };

        self.state = State::Connecting;
        let command = SshCommand::build(&device, &username, &self.store.ssh_options);
        self.terminal.notice(&format!("Connecting: {command}"))?;
        // the process image is about to be replaced
        self.save().await;

        match self.launcher.launch(&command) {
            Ok(code) => Ok(Some(code)),
            Err(e) => {
                warn!(device = %device.name, error = %e, "ssh launch failed");
                self.terminal.launch_failure(&e)?;
                Ok(None)
            }
        }
    }

    async fn save(&mut self) {
        if let Err(e) = self.store.save().await {
            warn!(error = %e, "failed to save settings");
            let _ = self.terminal.warning(&format!("Could not save settings: {e}"));
        }
    }

    /// Cancel outstanding work and persist settings. Runs once, whichever of
    /// quit, signal or drop gets here first.
    pub async fn shutdown(&mut self) {
        if !self.latch.trigger() {
            return;
        }
        self.state = State::Exiting;
        if let Some(refresh) = self.background.take() {
            // an interrupted refresh still counts from when it started
            self.store.mark_refreshed(refresh.abort());
            info!("cancelled background refresh");
        }
        if let Err(e) = self.store.save().await {
            error!(error = %e, "failed to save settings on exit");
        }
    }
}

impl<P: Prober, L: Launcher, W: Write> Drop for App<P, L, W> {
    fn drop(&mut self) {
        if !self.latch.trigger() {
            return;
        }
        if let Some(refresh) = self.background.take() {
            self.store.mark_refreshed(refresh.abort());
        }
        if let Err(e) = self.store.save_blocking() {
            error!(error = %e, "failed to save settings on exit");
        }
    }
}
