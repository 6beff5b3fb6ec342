//! Plugin registry — discovery, construction, configuration, and enablement.
//!
//! Plugins are compiled in and registered explicitly through a
//! [`PluginCatalog`]. Two catalogs are scanned: the built-in one and a
//! user-supplied one. [`discover`] concatenates them, and a user source whose
//! derived name collides with a built-in replaces it in place.
//!
//! Loading never aborts on a single bad plugin: factory failures, panics, and
//! configuration errors are logged, kept in [`PluginRegistry::load_failures`],
//! and the plugin is left out.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use mhub_domain::error::{BoxError, HandlerError, LoadError};
use mhub_domain::plugin_config::PluginConfig;

use crate::guard;
use crate::ports::{ConfigStore, Plugin, PluginContext, Task};
use crate::publisher::Publisher;

/// Constructor of a plugin instance.
pub type PluginFactory = Box<dyn Fn() -> Result<Box<dyn Plugin>, BoxError> + Send + Sync>;

/// Where a plugin source was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    /// Shipped with the hub.
    Builtin,
    /// Supplied by the embedding application or the operator.
    User,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str("builtin"),
            Self::User => f.write_str("user"),
        }
    }
}

/// A loadable plugin: derived name, origin, and factory.
pub struct PluginSource {
    name: String,
    origin: SourceOrigin,
    factory: PluginFactory,
}

impl PluginSource {
    /// Create a source. The name is derived from `identifier` (see [`derive_name`]).
    pub fn new<F>(identifier: &str, origin: SourceOrigin, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Plugin>, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: derive_name(identifier),
            origin,
            factory: Box::new(factory),
        }
    }

    /// Derived plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catalog the source came from.
    #[must_use]
    pub fn origin(&self) -> SourceOrigin {
        self.origin
    }
}

impl fmt::Debug for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSource")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Derive the stable plugin name from a source identifier.
///
/// Identifiers may be bare names (`"lirc"`) or path-like (`"plugins/lirc.rs"`);
/// both yield `"lirc"`.
#[must_use]
pub fn derive_name(identifier: &str) -> String {
    let trimmed = identifier.trim();
    Path::new(trimmed)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(trimmed)
        .to_string()
}

/// Ordered list of plugin sources from one location.
#[derive(Debug)]
pub struct PluginCatalog {
    origin: SourceOrigin,
    sources: Vec<PluginSource>,
}

impl PluginCatalog {
    /// An empty built-in catalog.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            origin: SourceOrigin::Builtin,
            sources: Vec::new(),
        }
    }

    /// An empty user catalog.
    #[must_use]
    pub fn user() -> Self {
        Self {
            origin: SourceOrigin::User,
            sources: Vec::new(),
        }
    }

    /// Register a fallible factory under `identifier`.
    #[must_use]
    pub fn with<F>(mut self, identifier: &str, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Plugin>, BoxError> + Send + Sync + 'static,
    {
        self.sources
            .push(PluginSource::new(identifier, self.origin, factory));
        self
    }

    /// Register a plugin type built through `Default`.
    #[must_use]
    pub fn with_default<P>(self, identifier: &str) -> Self
    where
        P: Plugin + Default + 'static,
    {
        self.with(identifier, || Ok(Box::new(P::default()) as Box<dyn Plugin>))
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Concatenate built-in then user sources, last-registered-wins on name.
///
/// A colliding source takes over the slot of the one it replaces, so the
/// dispatch order of everything else is unchanged by an override.
#[must_use]
pub fn discover(builtin: PluginCatalog, user: PluginCatalog) -> Vec<PluginSource> {
    let mut ordered: Vec<PluginSource> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for source in builtin.sources.into_iter().chain(user.sources) {
        if let Some(&slot) = slots.get(&source.name) {
            tracing::info!(
                plugin = %source.name,
                replaced = %ordered[slot].origin,
                by = %source.origin,
                "plugin source overridden"
            );
            ordered[slot] = source;
        } else {
            slots.insert(source.name.clone(), ordered.len());
            ordered.push(source);
        }
    }

    ordered
}

/// Resolve the configuration record of plugin `name`.
///
/// - A persisted record is used as-is, with `enabled` defaulting to `false`
///   when absent (an absent key is not written back).
/// - Without a persisted record, `declared_defaults` is used with
///   `enabled` forced to `false`, and the result is persisted so the
///   operator can opt in by editing it.
///
/// # Errors
///
/// Returns [`LoadError::Config`] when the store cannot be read or written.
pub fn resolve_config<S: ConfigStore + ?Sized>(
    store: &S,
    name: &str,
    declared_defaults: PluginConfig,
) -> Result<PluginConfig, LoadError> {
    let config_error = |source| LoadError::Config {
        name: name.to_string(),
        source,
    };

    if let Some(mut config) = store.load(name).map_err(config_error)? {
        tracing::debug!(plugin = %name, "loaded plugin configuration");
        if !config.has_enabled() {
            config.set_enabled(false);
        }
        return Ok(config);
    }

    tracing::debug!(plugin = %name, "creating default plugin configuration");
    let mut config = declared_defaults;
    config.set_enabled(false);
    store.save(name, &config).map_err(config_error)?;
    Ok(config)
}

/// Outcome of a plugin's `on_init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Not initialised yet.
    Pending,
    /// `on_init` returned successfully.
    Ready,
    /// `on_init` failed; the plugin is excluded from dispatch.
    Failed,
}

/// Registered periodic task, as seen through the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    /// Task name.
    pub name: String,
    /// Firing period.
    pub interval: Duration,
}

/// Identity and state of one loaded plugin.
pub struct PluginDescriptor {
    name: String,
    origin: SourceOrigin,
    instance: Box<dyn Plugin>,
    config: PluginConfig,
    enabled: bool,
    cache_dir: Option<PathBuf>,
    tasks: Vec<TaskInfo>,
    init: InitState,
}

impl PluginDescriptor {
    /// Registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catalog the plugin was loaded from.
    #[must_use]
    pub fn origin(&self) -> SourceOrigin {
        self.origin
    }

    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Whether the plugin takes part in dispatch and scheduling.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Periodic tasks declared by `on_init`.
    #[must_use]
    pub fn tasks(&self) -> &[TaskInfo] {
        &self.tasks
    }

    /// Initialisation state.
    #[must_use]
    pub fn init_state(&self) -> InitState {
        self.init
    }

    /// Prepared cache directory, if any.
    #[must_use]
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Borrow the plugin instance.
    #[must_use]
    pub fn plugin(&self) -> &dyn Plugin {
        self.instance.as_ref()
    }

    pub(crate) fn plugin_mut(&mut self) -> &mut dyn Plugin {
        self.instance.as_mut()
    }

    /// Whether the router should hand messages to this plugin.
    #[must_use]
    pub fn accepts_messages(&self) -> bool {
        self.enabled && self.init != InitState::Failed && self.instance.handles_messages()
    }

    /// Run `on_init` once and return the declared tasks.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::AlreadyInitialised`] on a second call, or the
    /// plugin's own failure (including a caught panic).
    pub async fn initialise(
        &mut self,
        publisher: &Publisher,
        shutdown: &CancellationToken,
    ) -> Result<Vec<Task>, HandlerError> {
        if self.init != InitState::Pending {
            return Err(HandlerError::AlreadyInitialised);
        }

        let ctx = PluginContext::new(
            self.name.clone(),
            self.config.clone(),
            self.cache_dir.clone(),
            publisher.clone(),
            shutdown.clone(),
        );

        match guard::isolate(self.instance.on_init(ctx)).await {
            Ok(tasks) => {
                self.tasks = tasks
                    .iter()
                    .map(|task| TaskInfo {
                        name: task.name().to_string(),
                        interval: task.interval(),
                    })
                    .collect();
                self.init = InitState::Ready;
                Ok(tasks)
            }
            Err(err) => {
                self.init = InitState::Failed;
                Err(err)
            }
        }
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("enabled", &self.enabled)
            .field("config", &self.config)
            .field("tasks", &self.tasks)
            .field("init", &self.init)
            .finish_non_exhaustive()
    }
}

/// Construct, identify, and configure one plugin.
///
/// When `cache_root` is given, `<cache_root>/<name>` is created for the plugin.
///
/// # Errors
///
/// Returns [`LoadError`] when the factory fails or panics, the instance has
/// an empty identity, configuration cannot be resolved, or the cache
/// directory cannot be created.
pub fn load<S: ConfigStore + ?Sized>(
    source: PluginSource,
    store: &S,
    cache_root: Option<&Path>,
) -> Result<PluginDescriptor, LoadError> {
    let PluginSource {
        name,
        origin,
        factory,
    } = source;

    let instance = match std::panic::catch_unwind(AssertUnwindSafe(|| factory())) {
        Ok(Ok(instance)) => instance,
        Ok(Err(source)) => return Err(LoadError::Construction { name, source }),
        Err(payload) => {
            return Err(LoadError::Construction {
                name,
                source: guard::panic_message(payload.as_ref()).into(),
            });
        }
    };

    if instance.name().trim().is_empty() {
        return Err(LoadError::MissingIdentity { name });
    }

    let config = resolve_config(store, &name, instance.default_config())?;
    let enabled = config.enabled();

    let cache_dir = match cache_root {
        Some(root) => {
            let dir = root.join(&name);
            if let Err(source) = std::fs::create_dir_all(&dir) {
                return Err(LoadError::CacheDir { name, source });
            }
            Some(dir)
        }
        None => None,
    };

    Ok(PluginDescriptor {
        name,
        origin,
        instance,
        config,
        enabled,
        cache_dir,
        tasks: Vec::new(),
        init: InitState::Pending,
    })
}

/// Owned arena of plugin descriptors, indexed by name, in discovery order.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    descriptors: Vec<PluginDescriptor>,
    index: HashMap<String, usize>,
    failures: Vec<LoadError>,
}

impl PluginRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every source in order, skipping and logging the ones that fail.
    pub fn load_all<S: ConfigStore + ?Sized>(
        sources: Vec<PluginSource>,
        store: &S,
        cache_root: Option<&Path>,
    ) -> Self {
        let mut registry = Self::new();

        for source in sources {
            match load(source, store, cache_root) {
                Ok(descriptor) => {
                    if descriptor.is_enabled() {
                        tracing::info!(plugin = %descriptor.name(), "registering plugin");
                    } else {
                        tracing::debug!(plugin = %descriptor.name(), "plugin is disabled");
                    }
                    registry.insert(descriptor);
                }
                Err(err) => {
                    let cause = std::error::Error::source(&err).map(ToString::to_string);
                    tracing::error!(%err, ?cause, "plugin cannot be loaded");
                    registry.failures.push(err);
                }
            }
        }

        registry
    }

    /// Add a descriptor; an existing one with the same name is replaced in place.
    pub fn insert(&mut self, descriptor: PluginDescriptor) {
        if let Some(&slot) = self.index.get(descriptor.name()) {
            self.descriptors[slot] = descriptor;
        } else {
            self.index
                .insert(descriptor.name().to_string(), self.descriptors.len());
            self.descriptors.push(descriptor);
        }
    }

    /// Enabled plugins, in discovery order.
    pub fn enabled_plugins(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.iter().filter(|d| d.enabled)
    }

    pub(crate) fn enabled_plugins_mut(&mut self) -> impl Iterator<Item = &mut PluginDescriptor> {
        self.descriptors.iter_mut().filter(|d| d.enabled)
    }

    /// Every loaded plugin, enabled or not, in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.iter()
    }

    /// Look up a plugin by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.index.get(name).map(|&slot| &self.descriptors[slot])
    }

    /// Failures recorded by [`load_all`](Self::load_all).
    #[must_use]
    pub fn load_failures(&self) -> &[LoadError] {
        &self.failures
    }

    /// Number of loaded plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether no plugin was loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Run `on_init` for every enabled plugin in order.
    ///
    /// Returns the declared tasks paired with their plugin name. Failing
    /// plugins are logged and contribute no tasks.
    pub async fn initialise(
        &mut self,
        publisher: &Publisher,
        shutdown: &CancellationToken,
    ) -> Vec<(String, Task)> {
        let mut scheduled = Vec::new();

        for descriptor in self.enabled_plugins_mut() {
            tracing::debug!(plugin = %descriptor.name(), "initialising plugin");
            match descriptor.initialise(publisher, shutdown).await {
                Ok(tasks) => {
                    let name = descriptor.name().to_string();
                    scheduled.extend(tasks.into_iter().map(|task| (name.clone(), task)));
                }
                Err(err) => {
                    tracing::error!(plugin = %descriptor.name(), %err, "plugin initialisation failed");
                }
            }
        }

        scheduled
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use mhub_domain::error::{PublishError, StoreError};
    use mhub_domain::message::Message;

    use super::*;
    use crate::memory_store::InMemoryConfigStore;
    use crate::ports::BusProducer;

    struct Named {
        name: &'static str,
        defaults: PluginConfig,
    }

    impl Named {
        fn boxed(name: &'static str) -> Result<Box<dyn Plugin>, BoxError> {
            Ok(Box::new(Self {
                name,
                defaults: PluginConfig::new(),
            }))
        }
    }

    #[async_trait]
    impl Plugin for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn default_config(&self) -> PluginConfig {
            self.defaults.clone()
        }

        async fn on_init(&mut self, _ctx: PluginContext) -> Result<Vec<Task>, HandlerError> {
            Ok(vec![Task::new("tick", Duration::from_secs(1), || async {
                Ok::<_, HandlerError>(())
            })])
        }
    }

    struct NullProducer;

    #[async_trait]
    impl BusProducer for NullProducer {
        async fn publish(&self, _message: &Message) -> Result<(), PublishError> {
            Ok(())
        }
    }

    struct BrokenStore;

    impl ConfigStore for BrokenStore {
        fn load(&self, _name: &str) -> Result<Option<PluginConfig>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk on fire")))
        }

        fn save(&self, _name: &str, _config: &PluginConfig) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn enabled() -> PluginConfig {
        let mut config = PluginConfig::new();
        config.set_enabled(true);
        config
    }

    fn names(sources: &[PluginSource]) -> Vec<(&str, SourceOrigin)> {
        sources.iter().map(|s| (s.name(), s.origin())).collect()
    }

    #[test]
    fn should_derive_name_from_path_like_identifier() {
        assert_eq!(derive_name("lirc"), "lirc");
        assert_eq!(derive_name("plugins/lirc.rs"), "lirc");
        assert_eq!(derive_name("  notify  "), "notify");
    }

    #[test]
    fn should_concatenate_builtin_then_user_sources() {
        let builtin = PluginCatalog::builtin()
            .with("heartbeat", || Named::boxed("heartbeat"))
            .with("notify", || Named::boxed("notify"));
        let user = PluginCatalog::user().with("custom", || Named::boxed("custom"));

        let sources = discover(builtin, user);
        assert_eq!(
            names(&sources),
            vec![
                ("heartbeat", SourceOrigin::Builtin),
                ("notify", SourceOrigin::Builtin),
                ("custom", SourceOrigin::User),
            ]
        );
    }

    #[test]
    fn should_let_user_source_override_builtin_in_place() {
        let builtin = PluginCatalog::builtin()
            .with("heartbeat", || Named::boxed("heartbeat"))
            .with("lirc", || Named::boxed("lirc"))
            .with("notify", || Named::boxed("notify"));
        let user = PluginCatalog::user().with("user_plugins/lirc.rs", || Named::boxed("my-lirc"));

        let sources = discover(builtin, user);
        assert_eq!(
            names(&sources),
            vec![
                ("heartbeat", SourceOrigin::Builtin),
                ("lirc", SourceOrigin::User),
                ("notify", SourceOrigin::Builtin),
            ]
        );

        let store = InMemoryConfigStore::default();
        let registry = PluginRegistry::load_all(sources, &store, None);
        let lirc = registry.get("lirc").unwrap();
        assert_eq!(lirc.origin(), SourceOrigin::User);
        assert_eq!(lirc.plugin().name(), "my-lirc");
    }

    #[test]
    fn should_synthesize_disabled_config_on_first_run() {
        let store = InMemoryConfigStore::default();
        let defaults = PluginConfig::new().with("socket", "/dev/lircd");

        let config = resolve_config(&store, "lirc", defaults).unwrap();

        assert!(!config.enabled());
        assert_eq!(config.get_str("socket"), Some("/dev/lircd"));
        assert_eq!(store.get("lirc"), Some(config));
    }

    #[test]
    fn should_force_disabled_even_if_defaults_enable() {
        let store = InMemoryConfigStore::default();
        let config = resolve_config(&store, "eager", enabled()).unwrap();
        assert!(!config.enabled());
        assert!(!store.get("eager").unwrap().enabled());
    }

    #[test]
    fn should_use_persisted_config_without_rewriting_it() {
        let persisted = enabled().with("socket", "/run/lirc");
        let store = InMemoryConfigStore::default().with_record("lirc", persisted.clone());

        let config =
            resolve_config(&store, "lirc", PluginConfig::new().with("socket", "/dev/lircd"))
                .unwrap();

        assert_eq!(config, persisted);
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn should_default_missing_enabled_key_to_false() {
        let store = InMemoryConfigStore::default()
            .with_record("rss", PluginConfig::new().with("feeds", serde_json::json!([])));

        let config = resolve_config(&store, "rss", PluginConfig::new()).unwrap();

        assert!(!config.enabled());
        assert!(store.get("rss").unwrap().get("enabled").is_none());
    }

    #[test]
    fn should_report_store_failure_as_load_error() {
        let result = resolve_config(&BrokenStore, "lirc", PluginConfig::new());
        assert!(matches!(result, Err(LoadError::Config { ref name, .. }) if name == "lirc"));
    }

    #[test]
    fn should_enable_plugin_on_second_startup_after_opt_in() {
        let store = InMemoryConfigStore::default();
        let catalog = || PluginCatalog::builtin().with("lirc", || Named::boxed("lirc"));

        let first = PluginRegistry::load_all(discover(catalog(), PluginCatalog::user()), &store, None);
        assert_eq!(first.enabled_plugins().count(), 0);
        assert_eq!(first.len(), 1);

        let mut edited = store.get("lirc").unwrap();
        edited.set_enabled(true);
        store.save("lirc", &edited).unwrap();

        let second =
            PluginRegistry::load_all(discover(catalog(), PluginCatalog::user()), &store, None);
        let enabled: Vec<_> = second.enabled_plugins().map(PluginDescriptor::name).collect();
        assert_eq!(enabled, vec!["lirc"]);
    }

    #[test]
    fn should_skip_failing_factories_and_keep_loading() {
        let store = InMemoryConfigStore::default()
            .with_record("good", enabled())
            .with_record("after", enabled());
        let builtin = PluginCatalog::builtin()
            .with("bad", || Err("missing socket library".into()))
            .with("good", || Named::boxed("good"))
            .with("panicky", || panic!("constructor blew up"))
            .with("after", || Named::boxed("after"));

        let registry = PluginRegistry::load_all(discover(builtin, PluginCatalog::user()), &store, None);

        let loaded: Vec<_> = registry.iter().map(PluginDescriptor::name).collect();
        assert_eq!(loaded, vec!["good", "after"]);
        assert_eq!(registry.load_failures().len(), 2);
        assert!(registry
            .load_failures()
            .iter()
            .all(|err| matches!(err, LoadError::Construction { .. })));
    }

    #[test]
    fn should_reject_plugin_without_identity() {
        let store = InMemoryConfigStore::default();
        let source = PluginSource::new("anon", SourceOrigin::User, || Named::boxed(""));

        let result = load(source, &store, None);

        assert!(matches!(result, Err(LoadError::MissingIdentity { ref name }) if name == "anon"));
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn should_keep_disabled_plugins_enumerable() {
        let store = InMemoryConfigStore::default().with_record("on", enabled());
        let builtin = PluginCatalog::builtin()
            .with("off", || Named::boxed("off"))
            .with("on", || Named::boxed("on"));

        let registry = PluginRegistry::load_all(discover(builtin, PluginCatalog::user()), &store, None);

        assert_eq!(registry.len(), 2);
        assert!(!registry.get("off").unwrap().is_enabled());
        let enabled: Vec<_> = registry.enabled_plugins().map(PluginDescriptor::name).collect();
        assert_eq!(enabled, vec!["on"]);
    }

    #[test]
    fn should_preserve_discovery_order_for_enabled_plugins() {
        let store = InMemoryConfigStore::default()
            .with_record("c", enabled())
            .with_record("a", enabled())
            .with_record("b", enabled());
        let builtin = PluginCatalog::builtin()
            .with("c", || Named::boxed("c"))
            .with("a", || Named::boxed("a"))
            .with("b", || Named::boxed("b"));

        let registry = PluginRegistry::load_all(discover(builtin, PluginCatalog::user()), &store, None);

        let order: Vec<_> = registry.enabled_plugins().map(PluginDescriptor::name).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn should_create_cache_directory_per_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryConfigStore::default();
        let source = PluginSource::new("notify", SourceOrigin::Builtin, || Named::boxed("notify"));

        let descriptor = load(source, &store, Some(dir.path())).unwrap();

        let expected = dir.path().join("notify");
        assert!(expected.is_dir());
        assert_eq!(descriptor.cache_dir(), Some(expected.as_path()));
    }

    #[tokio::test]
    async fn should_initialise_once_and_reject_second_call() {
        let store = InMemoryConfigStore::default().with_record("lirc", enabled());
        let source = PluginSource::new("lirc", SourceOrigin::Builtin, || Named::boxed("lirc"));
        let mut descriptor = load(source, &store, None).unwrap();
        let publisher = Publisher::new(Arc::new(NullProducer));
        let token = CancellationToken::new();

        let tasks = descriptor.initialise(&publisher, &token).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(descriptor.init_state(), InitState::Ready);
        assert_eq!(
            descriptor.tasks(),
            &[TaskInfo {
                name: "tick".to_string(),
                interval: Duration::from_secs(1),
            }]
        );

        let again = descriptor.initialise(&publisher, &token).await;
        assert!(matches!(again, Err(HandlerError::AlreadyInitialised)));
    }

    #[tokio::test]
    async fn should_initialise_only_enabled_plugins() {
        let store = InMemoryConfigStore::default().with_record("on", enabled());
        let builtin = PluginCatalog::builtin()
            .with("off", || Named::boxed("off"))
            .with("on", || Named::boxed("on"));
        let mut registry =
            PluginRegistry::load_all(discover(builtin, PluginCatalog::user()), &store, None);

        let tasks = registry
            .initialise(&Publisher::new(Arc::new(NullProducer)), &CancellationToken::new())
            .await;

        let owners: Vec<_> = tasks.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(owners, vec!["on"]);
        assert_eq!(registry.get("off").unwrap().init_state(), InitState::Pending);
    }

    #[tokio::test]
    async fn should_mark_failed_init_and_exclude_from_messages() {
        struct FailingInit {
            calls: Arc<Mutex<HashMap<&'static str, usize>>>,
        }

        #[async_trait]
        impl Plugin for FailingInit {
            fn name(&self) -> &str {
                "failing"
            }

            async fn on_init(&mut self, _ctx: PluginContext) -> Result<Vec<Task>, HandlerError> {
                *self.calls.lock().unwrap().entry("init").or_default() += 1;
                Err(HandlerError::failed("device missing"))
            }

            fn handles_messages(&self) -> bool {
                true
            }
        }

        let calls = Arc::new(Mutex::new(HashMap::new()));
        let shared = Arc::clone(&calls);
        let store = InMemoryConfigStore::default().with_record("failing", enabled());
        let builtin = PluginCatalog::builtin().with("failing", move || {
            Ok(Box::new(FailingInit {
                calls: Arc::clone(&shared),
            }) as Box<dyn Plugin>)
        });
        let mut registry =
            PluginRegistry::load_all(discover(builtin, PluginCatalog::user()), &store, None);

        let tasks = registry
            .initialise(&Publisher::new(Arc::new(NullProducer)), &CancellationToken::new())
            .await;

        assert!(tasks.is_empty());
        let descriptor = registry.get("failing").unwrap();
        assert_eq!(descriptor.init_state(), InitState::Failed);
        assert!(!descriptor.accepts_messages());
        assert_eq!(calls.lock().unwrap().get("init"), Some(&1));
    }
}
