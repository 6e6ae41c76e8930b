use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde_json::json;
use tracing::{debug, warn};
use zenoh_ros2_schema::{TypeRegistry, TypeResolver};

use crate::Builder;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::node::ZNodeBuilder;
use crate::transport::{Transport, ZenohTransport};

/// Zenoh JSON5 configuration file used when none is set on the builder.
pub const ENV_CONFIG_FILE: &str = "ZENOH_ROS2_CONFIG_FILE";
/// `key=json5;key=json5` overrides applied on top of the configuration.
pub const ENV_CONFIG_OVERRIDE: &str = "ZENOH_ROS2_CONFIG_OVERRIDE";
/// Domain id used when none is set on the builder.
pub const ENV_DOMAIN_ID: &str = "ROS_DOMAIN_ID";

#[derive(Debug, Default)]
pub struct GlobalCounter(AtomicU32);

impl GlobalCounter {
    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel)
    }
}

#[derive(Default)]
pub struct ZContextBuilder {
    domain_id: Option<u32>,
    config_file: Option<PathBuf>,
    config_overrides: Vec<(String, serde_json::Value)>,
    resolver: Option<Arc<dyn TypeResolver>>,
    transport: Option<Arc<dyn Transport>>,
}

impl ZContextBuilder {
    /// Set the ROS domain ID
    pub fn with_domain_id(mut self, domain_id: u32) -> Self {
        self.domain_id = Some(domain_id);
        self
    }

    /// Load configuration from a JSON5 file
    pub fn with_config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Add a JSON configuration override
    ///
    /// # Example
    /// ```no_run
    /// use serde_json::json;
    /// use zenoh_ros2_sdk::{Builder, ZContextBuilder};
    ///
    /// let ctx = ZContextBuilder::default()
    ///     .with_json("scouting/multicast/enabled", json!(false))
    ///     .with_json("connect/endpoints", json!(["tcp/127.0.0.1:7447"]))
    ///     .build()
    ///     .expect("Failed to build context");
    /// ```
    pub fn with_json<K: Into<String>, V: Into<serde_json::Value>>(mut self, key: K, value: V) -> Self {
        self.config_overrides.push((key.into(), value.into()));
        self
    }

    /// Convenience method: disable multicast scouting
    pub fn disable_multicast_scouting(self) -> Self {
        self.with_json("scouting/multicast/enabled", json!(false))
    }

    /// Convenience method: connect to specific endpoints
    pub fn with_connect_endpoints<I, S>(self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<String> = endpoints.into_iter().map(Into::into).collect();
        self.with_json("connect/endpoints", json!(endpoints))
    }

    /// Convenience method: connect to a zenoh router on localhost
    pub fn connect_to_local_zenohd(self) -> Self {
        self.with_connect_endpoints(["tcp/127.0.0.1:7447"])
    }

    /// Convenience method: set mode (peer, client, router)
    pub fn with_mode<S: Into<String>>(self, mode: S) -> Self {
        self.with_json("mode", json!(mode.into()))
    }

    /// Resolver for interface definitions not registered explicitly.
    pub fn with_resolver<R: TypeResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Use `transport` instead of opening a Zenoh session.
    ///
    /// Configuration files and overrides are ignored in that case.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Parse and apply overrides from the environment
    ///
    /// Expected format: `key1=value1;key2=value2`, values in JSON5.
    fn apply_env_overrides(&mut self) -> Result<()> {
        let Ok(overrides) = std::env::var(ENV_CONFIG_OVERRIDE) else {
            return Ok(());
        };
        debug!("[CTX] Applying config overrides from {ENV_CONFIG_OVERRIDE}: {overrides}");

        for pair in overrides.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::Config(format!(
                    "invalid {ENV_CONFIG_OVERRIDE} entry '{pair}', expected 'key=value'"
                ))
            })?;
            let (key, value) = (key.trim(), value.trim());
            let json_value = json5::from_str::<serde_json::Value>(value).map_err(|e| {
                Error::Config(format!(
                    "failed to parse {ENV_CONFIG_OVERRIDE} value for key '{key}': {e} (value: {value})"
                ))
            })?;
            debug!("[CTX] Override: {} = {}", key, json_value);
            self.config_overrides.push((key.to_string(), json_value));
        }
        Ok(())
    }

    fn resolve_domain_id(&self) -> Result<u32> {
        if let Some(domain_id) = self.domain_id {
            return Ok(domain_id);
        }
        match std::env::var(ENV_DOMAIN_ID) {
            Ok(value) if !value.trim().is_empty() => value.trim().parse().map_err(|_| {
                Error::Config(format!("{ENV_DOMAIN_ID} '{value}' is not a valid domain id"))
            }),
            _ => Ok(0),
        }
    }

    /// Zenoh configuration: builder file, else the environment file, else
    /// defaults; then every override in order.
    pub(crate) fn zenoh_config(&self) -> Result<zenoh::Config> {
        let file = self
            .config_file
            .clone()
            .or_else(|| std::env::var_os(ENV_CONFIG_FILE).map(PathBuf::from));

        let mut config = match file {
            Some(path) => zenoh::Config::from_file(&path).map_err(|e| {
                Error::Config(format!("failed to load {}: {e}", path.display()))
            })?,
            None => zenoh::Config::default(),
        };

        for (key, value) in &self.config_overrides {
            let value = value.to_string();
            config.insert_json5(key, &value).map_err(|e| {
                Error::Config(format!("failed to apply config override '{key}' = '{value}': {e}"))
            })?;
        }
        Ok(config)
    }
}

impl Builder for ZContextBuilder {
    type Output = ZContext;

    #[tracing::instrument(name = "ctx_build", skip(self), fields(
        domain_id = ?self.domain_id,
        config_file = ?self.config_file
    ))]
    fn build(mut self) -> Result<ZContext> {
        self.apply_env_overrides()?;
        let domain_id = self.resolve_domain_id()?;
        debug!(
            "[CTX] Building context: domain_id={}, overrides={}",
            domain_id,
            self.config_overrides.len()
        );

        let transport = match self.transport.take() {
            Some(transport) => {
                if !self.config_overrides.is_empty() || self.config_file.is_some() {
                    warn!("[CTX] Custom transport set, ignoring zenoh configuration");
                }
                transport
            }
            None => Arc::new(ZenohTransport::open(self.zenoh_config()?)?) as Arc<dyn Transport>,
        };

        let registry = match self.resolver {
            Some(resolver) => TypeRegistry::with_resolver(resolver),
            None => TypeRegistry::default(),
        };
        let graph = Graph::new(transport.clone(), domain_id)?;
        debug!("[CTX] Context ready: session={}", transport.session_id());

        Ok(ZContext {
            inner: Arc::new(ContextInner {
                transport,
                domain_id,
                counter: GlobalCounter::default(),
                registry: Arc::new(registry),
                graph,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

struct ContextInner {
    transport: Arc<dyn Transport>,
    domain_id: u32,
    // Shared by nodes and entities, like rmw_zenoh.
    counter: GlobalCounter,
    registry: Arc<TypeRegistry>,
    graph: Graph,
    closed: AtomicBool,
}

impl ContextInner {
    fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("[CTX] Shutting down session {}", self.transport.session_id());
        self.graph.close();
        self.transport.close()
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("[CTX] Failed to close session: {e}");
        }
    }
}

/// Shared handle to a session and its bookkeeping.
///
/// Every node and entity keeps a clone; the session closes when the last
/// clone is dropped or on [`ZContext::shutdown`].
#[derive(Clone)]
pub struct ZContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for ZContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZContext")
            .field("domain_id", &self.inner.domain_id)
            .field("session_id", &self.inner.transport.session_id())
            .finish_non_exhaustive()
    }
}

impl ZContext {
    pub fn create_node<S: AsRef<str>>(&self, name: S) -> ZNodeBuilder {
        ZNodeBuilder::new(self.clone(), name.as_ref())
    }

    pub fn domain_id(&self) -> u32 {
        self.inner.domain_id
    }

    pub fn session_id(&self) -> String {
        self.inner.transport.session_id()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Interface definitions and memoized type hashes.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.inner.registry
    }

    /// Entities discovered on this domain.
    pub fn graph(&self) -> &Graph {
        &self.inner.graph
    }

    pub(crate) fn next_id(&self) -> u32 {
        self.inner.counter.increment()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the session. Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.shutdown()
    }
}
