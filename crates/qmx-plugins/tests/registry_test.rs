//! Plugin registry lifecycle tests.
//!
//! Libraries are faked through the `LibraryLoader` seam: each fake library
//! exposes entry points generated by `plugin_entry_points!`, resolved by
//! symbol name exactly like a real `dlsym` lookup.

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use qmx_core::{Classify, ErrorKind};
use qmx_plugin_sdk::{
    plugin_entry_points, EntryPoints, Plugin, PluginError, PluginMeta, PluginResult, Version,
    GET_MODULE_SYMBOL, START_SYMBOL, STOP_SYMBOL,
};
use qmx_plugins::{
    platform_extension, LibraryError, LibraryHandle, LibraryLoader, LifecycleHook, PluginRegistry,
    PluginState, RegistryError,
};

type Log = Mutex<Vec<String>>;

/// Test plugin recording every hook call in a shared log.
struct Recorder {
    id: &'static str,
    minor: u64,
    log: &'static Log,
    fail: Option<(LifecycleHook, &'static AtomicBool)>,
}

impl Recorder {
    fn new(id: &'static str, minor: u64, log: &'static Log) -> Self {
        Self {
            id,
            minor,
            log,
            fail: None,
        }
    }

    /// Fail `hook` while `armed` is set.
    fn failing(mut self, hook: LifecycleHook, armed: &'static AtomicBool) -> Self {
        self.fail = Some((hook, armed));
        self
    }

    fn hook(&self, hook: LifecycleHook) -> PluginResult<()> {
        self.log.lock().push(format!("{} {}", self.id, hook));
        match self.fail {
            Some((failing, armed)) if failing == hook && armed.load(Ordering::SeqCst) => {
                Err(PluginError::Custom(format!("{} refused", hook)))
            }
            _ => Ok(()),
        }
    }
}

impl Plugin for Recorder {
    fn id(&self) -> &str {
        self.id
    }

    fn version(&self) -> Version {
        Version::new(1, self.minor, 0)
    }

    fn meta(&self) -> PluginMeta {
        let mut meta = PluginMeta::new();
        meta.insert("author".to_string(), "qmx".to_string());
        meta.insert("name".to_string(), self.id.to_string());
        meta
    }

    fn install(&mut self) -> PluginResult<()> {
        self.hook(LifecycleHook::Install)
    }

    fn uninstall(&mut self) -> PluginResult<()> {
        self.hook(LifecycleHook::Uninstall)
    }

    fn initialize(&mut self) -> PluginResult<()> {
        self.hook(LifecycleHook::Initialize)
    }

    fn shutdown(&mut self) -> PluginResult<()> {
        self.hook(LifecycleHook::Shutdown)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.log.lock().push(format!("{} drop", self.id));
    }
}

fn take(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock())
}

fn symbols(entry: EntryPoints) -> Vec<(&'static str, usize)> {
    vec![
        (GET_MODULE_SYMBOL, entry.get_module as usize),
        (START_SYMBOL, entry.start as usize),
        (STOP_SYMBOL, entry.stop as usize),
    ]
}

struct FakeLibrary {
    path: PathBuf,
    symbols: Vec<(&'static str, usize)>,
    live: Arc<AtomicUsize>,
}

impl LibraryHandle for FakeLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn get_symbol(&self, name: &str) -> Result<*const c_void, LibraryError> {
        self.symbols
            .iter()
            .find(|(symbol, _)| *symbol == name)
            .map(|(_, address)| *address as *const c_void)
            .ok_or_else(|| LibraryError::SymbolNotFound {
                symbol: name.to_string(),
                path: self.path.clone(),
            })
    }
}

impl Drop for FakeLibrary {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Loader serving fake libraries by file name.
#[derive(Default)]
struct FakeLoader {
    libraries: HashMap<String, Vec<(&'static str, usize)>>,
    live: Arc<AtomicUsize>,
}

impl FakeLoader {
    fn with(self, stem: &str, entry: EntryPoints) -> Self {
        self.with_symbols(stem, symbols(entry))
    }

    fn with_symbols(mut self, stem: &str, symbols: Vec<(&'static str, usize)>) -> Self {
        self.libraries.insert(lib_name(stem), symbols);
        self
    }

    /// Number of fake libraries currently open.
    fn live(&self) -> Arc<AtomicUsize> {
        self.live.clone()
    }
}

impl LibraryLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryHandle>, LibraryError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let symbols = self.libraries.get(&name).ok_or_else(|| LibraryError::Path {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "unknown fake library"),
        })?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeLibrary {
            path: path.to_path_buf(),
            symbols: symbols.clone(),
            live: self.live.clone(),
        }))
    }
}

fn lib_name(stem: &str) -> String {
    format!("{}.{}", stem, platform_extension())
}

/// Create empty files standing in for the fake libraries.
fn plugin_dir(stems: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for stem in stems {
        std::fs::write(dir.path().join(lib_name(stem)), b"").unwrap();
    }
    dir
}

static BROKEN_LOG: Log = parking_lot::const_mutex(Vec::new());
plugin_entry_points!(mod broken {
    module: "M",
    plugin: Recorder::new("broken", 0, &BROKEN_LOG),
});

#[test]
fn test_missing_stop_symbol_registers_nothing() {
    let mut table = symbols(broken::entry_points());
    table.retain(|(symbol, _)| *symbol != STOP_SYMBOL);
    let loader = FakeLoader::default().with_symbols("libbroken", table);
    let live = loader.live();

    let dir = plugin_dir(&["libbroken"]);
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();

    let err = registry.load(dir.path().join(lib_name("libbroken"))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingEntryPoint);
    assert!(matches!(
        err,
        RegistryError::MissingEntryPoint { symbol: "PluginStop", .. }
    ));

    assert!(registry.plugin_list("M").unwrap().is_empty());
    assert!(take(&BROKEN_LOG).is_empty());
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

static SINGLE_LOG: Log = parking_lot::const_mutex(Vec::new());
plugin_entry_points!(mod single {
    module: "M",
    plugin: Recorder::new("single", 0, &SINGLE_LOG),
});

#[test]
fn test_same_path_loads_once() {
    let dir = plugin_dir(&["libsingle"]);
    let loader = FakeLoader::default().with("libsingle", single::entry_points());
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();

    let id = registry.load(dir.path().join(lib_name("libsingle"))).unwrap();
    assert_eq!(id, "single");

    // Same file, once with the extension appended and once through `..`.
    let err = registry.load(dir.path().join("libsingle")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyLoaded);
    let detour = dir
        .path()
        .join("..")
        .join(dir.path().file_name().unwrap())
        .join(lib_name("libsingle"));
    assert!(matches!(
        registry.load(detour),
        Err(RegistryError::AlreadyLoaded(_))
    ));

    assert_eq!(registry.plugin_list("M").unwrap().len(), 1);
    assert_eq!(take(&SINGLE_LOG), vec!["single install"]);
}

static CODEC_LOG: Log = parking_lot::const_mutex(Vec::new());
plugin_entry_points!(mod audio_codec {
    module: "audio",
    plugin: Recorder::new("codec", 1, &CODEC_LOG),
});
plugin_entry_points!(mod video_codec {
    module: "video",
    plugin: Recorder::new("codec", 2, &CODEC_LOG),
});

#[test]
fn test_same_id_in_different_modules() {
    let dir = plugin_dir(&["libaudio", "libvideo"]);
    let loader = FakeLoader::default()
        .with("libaudio", audio_codec::entry_points())
        .with("libvideo", video_codec::entry_points());
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("audio").unwrap();
    registry.register_module("video").unwrap();

    registry.load(dir.path().join(lib_name("libaudio"))).unwrap();
    registry.load(dir.path().join(lib_name("libvideo"))).unwrap();

    assert_eq!(registry.plugin_list("audio").unwrap()["codec"], Version::new(1, 1, 0));
    assert_eq!(registry.plugin_list("video").unwrap()["codec"], Version::new(1, 2, 0));
}

static ORPHAN_LOG: Log = parking_lot::const_mutex(Vec::new());
plugin_entry_points!(mod orphan {
    module: "nowhere",
    plugin: Recorder::new("orphan", 0, &ORPHAN_LOG),
});

#[test]
fn test_module_must_be_registered() {
    let dir = plugin_dir(&["liborphan"]);
    let loader = FakeLoader::default().with("liborphan", orphan::entry_points());
    let live = loader.live();
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();

    let err = registry.load(dir.path().join(lib_name("liborphan"))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModuleNotRegistered);
    assert!(matches!(
        err,
        RegistryError::ModuleNotRegistered { ref module, .. } if module == "nowhere"
    ));

    // The plugin was never started.
    assert!(take(&ORPHAN_LOG).is_empty());
    assert_eq!(live.load(Ordering::SeqCst), 0);
    assert_eq!(registry.module_ids(), vec!["M"]);
}

static LATE_LOG: Log = parking_lot::const_mutex(Vec::new());
plugin_entry_points!(mod early {
    module: "M",
    plugin: Recorder::new("early", 0, &LATE_LOG),
});
plugin_entry_points!(mod late {
    module: "M",
    plugin: Recorder::new("late", 0, &LATE_LOG),
});

#[test]
fn test_initialize_once_and_late_loads() {
    let dir = plugin_dir(&["libearly", "liblate"]);
    let loader = FakeLoader::default()
        .with("libearly", early::entry_points())
        .with("liblate", late::entry_points());
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();

    registry.load(dir.path().join(lib_name("libearly"))).unwrap();
    assert_eq!(registry.plugin_state("M", "early").unwrap(), PluginState::Installed);

    registry.initialize().unwrap();
    assert_eq!(registry.plugin_state("M", "early").unwrap(), PluginState::Initialized);
    let err = registry.initialize().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyInitialized);

    registry.load(dir.path().join(lib_name("liblate"))).unwrap();
    assert_eq!(registry.plugin_state("M", "late").unwrap(), PluginState::Initialized);

    assert_eq!(
        take(&LATE_LOG),
        vec!["early install", "early initialize", "late install", "late initialize"]
    );
}

static AUTO_LOG: Log = parking_lot::const_mutex(Vec::new());
plugin_entry_points!(mod first {
    module: "M",
    plugin: Recorder::new("first", 1, &AUTO_LOG),
});
plugin_entry_points!(mod second {
    module: "M",
    plugin: Recorder::new("second", 2, &AUTO_LOG),
});
plugin_entry_points!(mod third {
    module: "M",
    plugin: Recorder::new("third", 3, &AUTO_LOG),
});

#[test]
fn test_auto_load_ignores_other_files() {
    let dir = plugin_dir(&["libc", "liba", "libb"]);
    std::fs::write(dir.path().join("README.txt"), b"not a plugin").unwrap();

    let loader = FakeLoader::default()
        .with("liba", first::entry_points())
        .with("libb", second::entry_points())
        .with("libc", third::entry_points());
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();

    let ids = registry.auto_load(dir.path()).unwrap();
    assert_eq!(ids, vec!["first", "second", "third"]);
    assert_eq!(registry.plugin_list("M").unwrap().len(), 3);
}

static PARTIAL_LOG: Log = parking_lot::const_mutex(Vec::new());
plugin_entry_points!(mod good {
    module: "M",
    plugin: Recorder::new("good", 0, &PARTIAL_LOG),
});

#[test]
fn test_auto_load_keeps_partial_progress() {
    // `libz` is unknown to the loader and fails after `liba` loaded.
    let dir = plugin_dir(&["liba", "libz"]);
    let loader = FakeLoader::default().with("liba", good::entry_points());
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();

    assert!(registry.auto_load(dir.path()).is_err());
    assert!(registry.plugin_list("M").unwrap().contains_key("good"));
}

#[test]
fn test_auto_load_rejects_bad_directories() {
    let registry = PluginRegistry::with_loader(FakeLoader::default());

    let dir = plugin_dir(&[]);
    std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
    assert!(matches!(
        registry.auto_load(dir.path()),
        Err(RegistryError::NoLibraries(_))
    ));

    let file = dir.path().join("notes.txt");
    assert!(matches!(
        registry.auto_load(&file),
        Err(RegistryError::NotADirectory(_))
    ));
}

static E2E_LOG: Log = parking_lot::const_mutex(Vec::new());
plugin_entry_points!(mod p1 {
    module: "M",
    plugin: Recorder::new("P1", 1, &E2E_LOG),
});
plugin_entry_points!(mod p2 {
    module: "M",
    plugin: Recorder::new("P2", 2, &E2E_LOG),
});
plugin_entry_points!(mod p3 {
    module: "M",
    plugin: Recorder::new("P3", 3, &E2E_LOG),
});

#[test]
fn test_end_to_end_module_lifecycle() {
    let dir = plugin_dir(&["libp1", "libp2", "libp3"]);
    let loader = FakeLoader::default()
        .with("libp1", p1::entry_points())
        .with("libp2", p2::entry_points())
        .with("libp3", p3::entry_points());
    let live = loader.live();
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();

    for stem in ["libp1", "libp2", "libp3"] {
        registry.load(dir.path().join(lib_name(stem))).unwrap();
    }
    let list = registry.plugin_list("M").unwrap();
    assert_eq!(list.len(), 3);
    assert_eq!(list["P1"], Version::new(1, 1, 0));
    assert_eq!(list["P2"], Version::new(1, 2, 0));
    assert_eq!(list["P3"], Version::new(1, 3, 0));

    let meta = registry.plugin_meta("M", "P2").unwrap();
    assert_eq!(meta.get("name").map(String::as_str), Some("P2"));

    registry.initialize().unwrap();
    take(&E2E_LOG);

    registry.unload("M", "P2").unwrap();
    assert_eq!(take(&E2E_LOG), vec!["P2 shutdown", "P2 uninstall", "P2 drop"]);
    let list = registry.plugin_list("M").unwrap();
    assert_eq!(list.keys().collect::<Vec<_>>(), vec!["P1", "P3"]);
    assert_eq!(live.load(Ordering::SeqCst), 2);

    registry.unregister_module("M").unwrap();
    assert_eq!(
        take(&E2E_LOG),
        vec![
            "P1 shutdown",
            "P1 uninstall",
            "P1 drop",
            "P3 shutdown",
            "P3 uninstall",
            "P3 drop",
        ]
    );
    assert!(registry.module_ids().is_empty());
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

static INSTALL_LOG: Log = parking_lot::const_mutex(Vec::new());
static INSTALL_ARMED: AtomicBool = AtomicBool::new(true);
plugin_entry_points!(mod stubborn {
    module: "M",
    plugin: Recorder::new("stubborn", 0, &INSTALL_LOG).failing(LifecycleHook::Install, &INSTALL_ARMED),
});

#[test]
fn test_failing_install_stops_plugin() {
    let dir = plugin_dir(&["libstubborn"]);
    let loader = FakeLoader::default().with("libstubborn", stubborn::entry_points());
    let live = loader.live();
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();

    let err = registry.load(dir.path().join(lib_name("libstubborn"))).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Hook { hook: LifecycleHook::Install, .. }
    ));
    assert_eq!(err.kind(), ErrorKind::Plugin);
    assert_eq!(take(&INSTALL_LOG), vec!["stubborn install", "stubborn drop"]);
    assert!(registry.plugin_list("M").unwrap().is_empty());
    assert_eq!(live.load(Ordering::SeqCst), 0);

    // The entry points are reusable once the failed instance is stopped.
    INSTALL_ARMED.store(false, Ordering::SeqCst);
    registry.load(dir.path().join(lib_name("libstubborn"))).unwrap();
    assert_eq!(take(&INSTALL_LOG), vec!["stubborn install"]);
}

static LATE_INIT_LOG: Log = parking_lot::const_mutex(Vec::new());
static LATE_INIT_ARMED: AtomicBool = AtomicBool::new(true);
plugin_entry_points!(mod reluctant {
    module: "M",
    plugin: Recorder::new("reluctant", 0, &LATE_INIT_LOG)
        .failing(LifecycleHook::Initialize, &LATE_INIT_ARMED),
});

#[test]
fn test_failing_late_initialize_uninstalls_plugin() {
    let dir = plugin_dir(&["libreluctant"]);
    let loader = FakeLoader::default().with("libreluctant", reluctant::entry_points());
    let live = loader.live();
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();
    registry.initialize().unwrap();

    let err = registry.load(dir.path().join(lib_name("libreluctant"))).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Hook { hook: LifecycleHook::Initialize, .. }
    ));
    assert_eq!(
        take(&LATE_INIT_LOG),
        vec![
            "reluctant install",
            "reluctant initialize",
            "reluctant uninstall",
            "reluctant drop",
        ]
    );
    assert!(registry.plugin_list("M").unwrap().is_empty());
    assert_eq!(live.load(Ordering::SeqCst), 0);

    LATE_INIT_ARMED.store(false, Ordering::SeqCst);
    registry.load(dir.path().join(lib_name("libreluctant"))).unwrap();
    assert_eq!(
        registry.plugin_state("M", "reluctant").unwrap(),
        PluginState::Initialized
    );
}

static RETRY_LOG: Log = parking_lot::const_mutex(Vec::new());
static RETRY_ARMED: AtomicBool = AtomicBool::new(true);
plugin_entry_points!(mod steady {
    module: "M",
    plugin: Recorder::new("steady", 0, &RETRY_LOG),
});
plugin_entry_points!(mod flaky {
    module: "M",
    plugin: Recorder::new("flaky", 0, &RETRY_LOG).failing(LifecycleHook::Initialize, &RETRY_ARMED),
});

#[test]
fn test_initialize_retry_skips_initialized_plugins() {
    let dir = plugin_dir(&["liba", "libb"]);
    let loader = FakeLoader::default()
        .with("liba", steady::entry_points())
        .with("libb", flaky::entry_points());
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();
    registry.auto_load(dir.path()).unwrap();
    take(&RETRY_LOG);

    assert!(registry.initialize().is_err());
    assert!(!registry.is_initialized());
    assert_eq!(registry.plugin_state("M", "steady").unwrap(), PluginState::Initialized);
    assert_eq!(registry.plugin_state("M", "flaky").unwrap(), PluginState::Installed);

    RETRY_ARMED.store(false, Ordering::SeqCst);
    registry.initialize().unwrap();
    assert!(registry.is_initialized());
    assert_eq!(
        take(&RETRY_LOG),
        vec!["steady initialize", "flaky initialize", "flaky initialize"]
    );
}

static UNREGISTER_LOG: Log = parking_lot::const_mutex(Vec::new());
static UNREGISTER_ARMED: AtomicBool = AtomicBool::new(true);
plugin_entry_points!(mod leaky {
    module: "M",
    plugin: Recorder::new("leaky", 0, &UNREGISTER_LOG)
        .failing(LifecycleHook::Uninstall, &UNREGISTER_ARMED),
});
plugin_entry_points!(mod tidy {
    module: "M",
    plugin: Recorder::new("tidy", 0, &UNREGISTER_LOG),
});

#[test]
fn test_unregister_stops_all_despite_hook_failure() {
    let dir = plugin_dir(&["liba", "libb"]);
    let loader = FakeLoader::default()
        .with("liba", leaky::entry_points())
        .with("libb", tidy::entry_points());
    let live = loader.live();
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();
    registry.auto_load(dir.path()).unwrap();
    take(&UNREGISTER_LOG);

    let err = registry.unregister_module("M").unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Hook { ref plugin, hook: LifecycleHook::Uninstall, .. } if plugin == "leaky"
    ));
    // Not initialized, so no shutdown hooks run.
    assert_eq!(
        take(&UNREGISTER_LOG),
        vec!["leaky uninstall", "leaky drop", "tidy uninstall", "tidy drop"]
    );
    assert!(registry.module_ids().is_empty());
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

static SOLO_LOG: Log = parking_lot::const_mutex(Vec::new());
plugin_entry_points!(mod solo {
    module: "M",
    plugin: Recorder::new("solo", 0, &SOLO_LOG),
});

#[test]
fn test_second_start_fails() {
    // Two files sharing one entry point set: the second start yields null.
    let dir = plugin_dir(&["liba", "libb"]);
    let loader = FakeLoader::default()
        .with("liba", solo::entry_points())
        .with("libb", solo::entry_points());
    let live = loader.live();
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("M").unwrap();

    registry.load(dir.path().join(lib_name("liba"))).unwrap();
    let err = registry.load(dir.path().join(lib_name("libb"))).unwrap_err();
    assert!(matches!(err, RegistryError::StartFailed(_)));
    assert_eq!(live.load(Ordering::SeqCst), 1);
    assert_eq!(registry.plugin_list("M").unwrap().len(), 1);
}

static TEARDOWN_LOG: Log = parking_lot::const_mutex(Vec::new());
plugin_entry_points!(mod alpha {
    module: "A",
    plugin: Recorder::new("alpha", 0, &TEARDOWN_LOG),
});
plugin_entry_points!(mod beta {
    module: "B",
    plugin: Recorder::new("beta", 0, &TEARDOWN_LOG),
});

#[test]
fn test_drop_tears_down_everything() {
    let dir = plugin_dir(&["liba", "libb"]);
    let loader = FakeLoader::default()
        .with("liba", alpha::entry_points())
        .with("libb", beta::entry_points());
    let live = loader.live();
    let registry = PluginRegistry::with_loader(loader);
    registry.register_module("A").unwrap();
    registry.register_module("B").unwrap();
    registry.auto_load(dir.path()).unwrap();
    registry.initialize().unwrap();
    take(&TEARDOWN_LOG);

    drop(registry);
    assert_eq!(
        take(&TEARDOWN_LOG),
        vec![
            "alpha shutdown",
            "alpha uninstall",
            "alpha drop",
            "beta shutdown",
            "beta uninstall",
            "beta drop",
        ]
    );
    assert_eq!(live.load(Ordering::SeqCst), 0);
}
