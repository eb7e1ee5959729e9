use serde::Deserialize;

/// How a proxy is considered healthy after its container starts
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthCheck {
    /// The container runtime reports the service as up
    #[default]
    Running,
    /// A TCP connection to the proxy port succeeds
    Tcp,
    /// A plain HTTP request to the proxy port answers with a status below 500
    Http {
        #[serde(default = "default_http_path")]
        path: String,
    },
}

/// How a version is materialized into the proxy's build/run configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildStrategy {
    /// Rebuild the service image from its Dockerfile with `--build-arg <version_arg>=<version>`
    Dockerfile { version_arg: String },
    /// Pull a published image; the tag is exported as `<tag_env>=<version>` for compose interpolation
    Image { tag_env: String },
}

/// A proxy under test
/// Immutable after load, one instance per proxy type
#[derive(Debug, Deserialize, Clone)]
pub struct ProxyDefinition {
    /// Identifier used on the command line and in results (e.g., "squid")
    pub id: String,
    /// Human readable name (e.g., "Squid")
    pub name: String,
    /// Versions to test, in order
    pub versions: Vec<String>,
    /// Port the proxy listens on, published on localhost
    pub port: u16,
    /// Compose service name (optional)
    /// Default: same as `id`
    #[serde(default)]
    pub service: Option<String>,
    /// Containers to capture traffic on (optional)
    /// Default: the proxy's own service
    #[serde(default)]
    pub capture_targets: Option<Vec<String>>,
    /// Health predicate
    /// Default: container running
    #[serde(default)]
    pub health: HealthCheck,
    /// Build/start strategy for a given version
    pub build: BuildStrategy,
}

/// Build arguments and environment that pin a service to one version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionBinding {
    pub build_args: Vec<(String, String)>,
    pub env: Vec<(String, String)>,
}

impl ProxyDefinition {
    pub fn service(&self) -> &str {
        self.service.as_deref().unwrap_or(&self.id)
    }

    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    pub fn bind_version(&self, version: &str) -> VersionBinding {
        match &self.build {
            BuildStrategy::Dockerfile { version_arg } => VersionBinding {
                build_args: vec![(version_arg.clone(), version.to_string())],
                env: Vec::new(),
            },
            BuildStrategy::Image { tag_env } => VersionBinding {
                build_args: Vec::new(),
                env: vec![(tag_env.clone(), version.to_string())],
            },
        }
    }

    /// Targets to capture on, falling back to `defaults` and then to the proxy's service
    pub fn capture_targets(&self, defaults: &[String]) -> Vec<String> {
        match &self.capture_targets {
            Some(targets) if !targets.is_empty() => targets.clone(),
            _ if !defaults.is_empty() => defaults.to_vec(),
            _ => vec![self.service().to_string()],
        }
    }
}

fn default_http_path() -> String {
    "/".to_string()
}
