//! Wires the services together.
//!
//! Background threads (hotkey listener, watcher) never touch app state: they
//! post an [`AppEvent`] and the single loop in [`App::run`] acts on it.

use crate::config::AppConfig;
use crate::error::Result;
use crate::hotkey::{Hotkey, HotkeyService};
use crate::index::{LibraryManager, LibrarySet};
use crate::inserter::{InserterSettings, Insertion, TextInserter};
use crate::loader::LoadFailure;
use crate::models::Snippet;
use crate::watcher::LibraryWatcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The summon hotkey was pressed.
    Summon,
    LibrariesChanged,
    Insert(Snippet),
    ConfigChanged(AppConfig),
    Quit,
}

pub type EventSender = UnboundedSender<AppEvent>;

/// The snippet browser the user picks from.
pub trait Palette {
    /// Present the palette. A pick is reported by sending
    /// [`AppEvent::Insert`] on `events`.
    fn show(&mut self, events: &EventSender);

    /// Replace the snippets on display with a newer generation.
    fn refresh(&mut self, snapshot: Arc<LibrarySet>);
}

pub struct App {
    config: AppConfig,
    config_path: Option<PathBuf>,
    config_dirty: bool,
    libraries: Arc<LibraryManager>,
    hotkeys: HotkeyService,
    summon: Option<Hotkey>,
    watcher: LibraryWatcher,
    inserter: TextInserter,
    palette: Box<dyn Palette>,
    pending: Vec<Insertion>,
    tx: EventSender,
    rx: UnboundedReceiver<AppEvent>,
}

impl App {
    /// Build with the platform services selected from `config`.
    pub fn from_config(
        config: AppConfig,
        config_path: Option<PathBuf>,
        palette: Box<dyn Palette>,
    ) -> Result<Self> {
        let hotkeys = HotkeyService::new(config.hotkey.backend);
        let inserter = TextInserter::new(&config.clipboard)?;
        Ok(Self::new(config, config_path, hotkeys, inserter, palette))
    }

    pub fn new(
        config: AppConfig,
        config_path: Option<PathBuf>,
        hotkeys: HotkeyService,
        inserter: TextInserter,
        palette: Box<dyn Palette>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let libraries = Arc::new(LibraryManager::new(config.library_roots()));
        let watcher = LibraryWatcher::new(Duration::from_millis(config.watch.debounce_ms));

        Self {
            config,
            config_path,
            config_dirty: false,
            libraries,
            hotkeys,
            summon: None,
            watcher,
            inserter,
            palette,
            pending: Vec::new(),
            tx,
            rx,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn libraries(&self) -> &Arc<LibraryManager> {
        &self.libraries
    }

    /// A handle other parts of the program use to post events.
    pub fn events(&self) -> EventSender {
        self.tx.clone()
    }

    pub fn watcher(&self) -> &LibraryWatcher {
        &self.watcher
    }

    pub fn hotkeys(&self) -> &HotkeyService {
        &self.hotkeys
    }

    pub fn is_config_dirty(&self) -> bool {
        self.config_dirty
    }

    /// Load libraries and bring up the background services. Failures are
    /// logged; the app runs with whatever came up.
    pub fn startup(&mut self) {
        let failures = self.libraries.load_all();
        report_failures(&failures);
        self.palette.refresh(self.libraries.snapshot());

        self.register_summon();
        if let Err(e) = self.hotkeys.start() {
            error!(error = %e, "Hotkey listener did not start");
        }
        self.start_watcher();

        let snapshot = self.libraries.snapshot();
        info!(
            libraries = snapshot.libraries.len(),
            snippets = snapshot.snippet_count(),
            failures = failures.len(),
            "Started"
        );
    }

    /// Run until [`AppEvent::Quit`] or Ctrl+C, then shut down.
    pub async fn run(mut self) -> Result<()> {
        self.startup();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => {
                        if !self.handle(event) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = &mut ctrl_c => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        self.shutdown()
    }

    pub async fn next_event(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    /// Act on one event. Returns `false` once the app should stop.
    pub fn handle(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Summon => self.summon(),
            AppEvent::LibrariesChanged => self.reload(),
            AppEvent::Insert(snippet) => self.insert(&snippet),
            AppEvent::ConfigChanged(config) => self.apply_config(config),
            AppEvent::Quit => return false,
        }
        true
    }

    /// Stop background services, let pending clipboard restores finish and
    /// write the config if it changed.
    pub fn shutdown(&mut self) -> Result<()> {
        self.hotkeys.stop();
        self.hotkeys.unregister_all();
        self.watcher.stop();

        for insertion in self.pending.drain(..) {
            insertion.wait();
        }

        if self.config_dirty {
            if let Some(path) = &self.config_path {
                self.config.save(path)?;
            }
            self.config_dirty = false;
        }
        info!("Shut down");
        Ok(())
    }

    fn summon(&mut self) {
        if !self.config.palette.enabled {
            debug!("Palette disabled, ignoring summon");
            return;
        }
        // Before the palette can take focus.
        self.inserter.remember_focus();
        self.palette.show(&self.tx);
    }

    fn reload(&mut self) {
        let failures = self.libraries.reload();
        report_failures(&failures);
        self.palette.refresh(self.libraries.snapshot());
    }

    fn insert(&mut self, snippet: &Snippet) {
        self.pending.retain(Insertion::restore_pending);
        match self.inserter.insert(&snippet.content) {
            Ok(insertion) => {
                info!(library = %snippet.library_name, id = %snippet.id, "Inserted snippet");
                self.pending.push(insertion);
            }
            Err(e) => warn!(id = %snippet.id, error = %e, "Could not insert snippet"),
        }
    }

    fn apply_config(&mut self, mut config: AppConfig) {
        let corrected = config.validate_and_clamp();
        if corrected > 0 {
            warn!(corrected, "Adjusted out-of-range settings in new config");
        }
        let old = std::mem::replace(&mut self.config, config);

        if old.hotkey.backend != self.config.hotkey.backend {
            info!("Hotkey backend change takes effect after restart");
        }
        if old.hotkey.summon_palette != self.config.hotkey.summon_palette {
            self.register_summon();
        }

        self.inserter
            .set_settings(InserterSettings::from(&self.config.clipboard));

        let roots_changed = old.library_roots() != self.config.library_roots();
        if roots_changed {
            self.libraries.set_roots(self.config.library_roots());
        }
        if roots_changed || old.watch != self.config.watch {
            self.watcher = LibraryWatcher::new(Duration::from_millis(self.config.watch.debounce_ms));
            self.start_watcher();
        }
        self.reload();

        self.config_dirty = true;
    }

    fn register_summon(&mut self) {
        if let Some(previous) = self.summon.take() {
            if let Err(e) = self.hotkeys.unregister(&previous.to_string()) {
                warn!(hotkey = %previous, error = %e, "Could not release previous summon hotkey");
            }
        }

        let tx = self.tx.clone();
        match self.hotkeys.register(&self.config.hotkey.summon_palette, move || {
            let _ = tx.send(AppEvent::Summon);
        }) {
            Ok(hotkey) => self.summon = Some(hotkey),
            Err(e) => warn!(
                combo = %self.config.hotkey.summon_palette,
                error = %e,
                "Summon hotkey unavailable; use the pick command instead"
            ),
        }
    }

    fn start_watcher(&mut self) {
        if !self.config.watch.enabled {
            self.watcher.stop();
            return;
        }

        let tx = self.tx.clone();
        let roots = self.config.library_roots();
        if let Err(e) = self.watcher.start(&roots, move || {
            let _ = tx.send(AppEvent::LibrariesChanged);
        }) {
            error!(error = %e, "Library watcher did not start");
        }
    }
}

fn report_failures(failures: &[LoadFailure]) {
    for failure in failures {
        warn!(path = %failure.path.display(), reason = %failure.reason, "Library not loaded");
    }
}
