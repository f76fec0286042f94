// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered configuration.
//!
//! Values merge in order: built-in defaults, then the configuration
//! backend (files with `include` support), then command-line
//! overrides. `check` freezes the result, rewriting multi-valued
//! options and rejecting invalid combinations.

mod file;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config: use either 'ca-cert-file' or 'ca-cert-dir' option, not both")]
    ConflictingCaOptions,
    #[error("config: usage of 'file' logger backend makes 'logfile' option mandatory")]
    FileLoggerWithoutLogfile,
    #[error("config: options 'partial' and 'daemon' are mutually exclusive")]
    PartialWithDaemon,
    #[error("config: options 'credentials' and 'daemon' are mutually exclusive")]
    CredentialsWithDaemon,
    #[error("config: unknown configuration backend '{0}'")]
    UnknownBackend(String),
    #[error("config: registry backend is only supported on windows")]
    RegistryUnsupported,
    #[error("can't read configuration file {0}: {1}")]
    Unreadable(PathBuf, std::io::Error),
}

/// Minimum accepted reload interval, seconds.
const CONF_RELOAD_INTERVAL_MIN: u64 = 60;

/// The frozen agent configuration.
///
/// Field names follow the option names with dashes mapped to
/// underscores.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server: Vec<String>,
    pub local: Vec<String>,
    pub delaytime: u64,
    pub lazy: bool,
    pub force: bool,
    pub set_forcerun: bool,
    pub wait: Option<u64>,

    pub tasks: Vec<String>,
    pub no_task: Vec<String>,
    pub no_category: Vec<String>,
    pub required_category: Vec<String>,
    pub partial: Vec<String>,
    pub credentials: Vec<String>,
    pub full: bool,
    pub full_inventory_postpone: u32,
    pub additional_content: Option<PathBuf>,
    pub backend_collect_timeout: u64,
    pub scan_homedirs: bool,
    pub scan_profiles: bool,
    pub assetname_support: u8,
    pub itemtype: Option<String>,
    pub glpi_version: Option<String>,
    pub html: bool,
    pub json: bool,
    pub tag: Option<String>,

    pub proxy: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
    pub ca_cert_dir: Option<PathBuf>,
    pub ca_cert_file: Option<PathBuf>,
    pub ssl_cert_file: Option<PathBuf>,
    pub ssl_fingerprint: Vec<String>,
    pub no_ssl_check: bool,
    pub no_compression: bool,
    pub timeout: u64,

    pub no_httpd: bool,
    pub httpd_ip: Option<String>,
    pub httpd_port: u16,
    pub httpd_trust: Vec<String>,
    pub listen: bool,

    pub logger: Vec<String>,
    pub logfile: Option<PathBuf>,
    pub logfile_maxsize: u64,
    pub logfacility: String,
    pub color: bool,
    pub debug: u8,

    pub conf_reload_interval: u64,
    pub daemon: bool,
    pub no_fork: bool,
    pub pidfile: Option<PathBuf>,
    pub vardir: Option<PathBuf>,

    /// Selected backend and forced file, kept for reloads.
    pub config_backend: String,
    pub conf_file: Option<PathBuf>,
    /// Raw command-line assignments, reapplied on reload so they keep
    /// overriding file values.
    pub cli_overrides: Vec<(String, String)>,

    /// Canonical paths of files already loaded; re-includes no-op.
    loaded: HashSet<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: Vec::new(),
            local: Vec::new(),
            delaytime: 3_600,
            lazy: false,
            force: false,
            set_forcerun: false,
            wait: None,
            tasks: Vec::new(),
            no_task: Vec::new(),
            no_category: Vec::new(),
            required_category: Vec::new(),
            partial: Vec::new(),
            credentials: Vec::new(),
            full: false,
            full_inventory_postpone: 14,
            additional_content: None,
            backend_collect_timeout: 180,
            scan_homedirs: false,
            scan_profiles: false,
            assetname_support: 1,
            itemtype: None,
            glpi_version: None,
            html: false,
            json: false,
            tag: None,
            proxy: None,
            user: None,
            password: None,
            oauth_client_id: None,
            oauth_client_secret: None,
            ca_cert_dir: None,
            ca_cert_file: None,
            ssl_cert_file: None,
            ssl_fingerprint: Vec::new(),
            no_ssl_check: false,
            no_compression: false,
            timeout: 180,
            no_httpd: false,
            httpd_ip: None,
            httpd_port: 62_354,
            httpd_trust: Vec::new(),
            listen: false,
            logger: vec!["stderr".to_string()],
            logfile: None,
            logfile_maxsize: 0,
            logfacility: "LOG_USER".to_string(),
            color: false,
            debug: 0,
            conf_reload_interval: 0,
            daemon: false,
            no_fork: false,
            pidfile: None,
            vardir: None,
            config_backend: "file".to_string(),
            conf_file: None,
            cli_overrides: Vec::new(),
            loaded: HashSet::new(),
        }
    }
}

impl Config {
    /// Load from the named backend: `file` (with an optional forced
    /// config file), `registry` (windows only), or `none`.
    pub fn load_backend(
        &mut self,
        backend: &str,
        conf_file: Option<&Path>,
    ) -> Result<(), ConfigError> {
        match backend {
            "none" => Ok(()),
            "registry" => {
                if cfg!(windows) {
                    // The registry hive mirrors the file options; this
                    // build reads files even on windows
                    Ok(())
                } else {
                    Err(ConfigError::RegistryUnsupported)
                }
            }
            "file" => {
                let path = match conf_file {
                    Some(path) => path.to_path_buf(),
                    None => default_conf_file(),
                };
                if conf_file.is_some() || path.is_file() {
                    self.load_file(&path)?;
                }
                Ok(())
            }
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }

    /// Load one configuration file, following `include` directives.
    ///
    /// Reloading an already-loaded file is a logged no-op, so reloads
    /// are idempotent.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !self.loaded.insert(canonical.clone()) {
            tracing::debug!("configuration file {} already loaded", canonical.display());
            return Ok(());
        }
        tracing::debug!("loading configuration from {}", canonical.display());

        let directives = file::parse_config_file(&canonical)?;
        for directive in directives {
            match directive {
                file::Directive::Set { key, value } => {
                    if !self.set(&key, &value) {
                        tracing::debug!("unknown configuration option {key}");
                    }
                }
                file::Directive::Include { path: include } => {
                    let resolved = if include.is_absolute() {
                        include
                    } else {
                        canonical.parent().unwrap_or(Path::new(".")).join(include)
                    };
                    self.include(&resolved)?;
                }
            }
        }
        Ok(())
    }

    fn include(&mut self, path: &Path) -> Result<(), ConfigError> {
        if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)
                .map_err(|e| ConfigError::Unreadable(path.to_path_buf(), e))?
                .flatten()
                .map(|entry| entry.path())
                .filter(|p| p.extension().map(|e| e == "cfg").unwrap_or(false))
                .collect();
            files.sort();
            for file in files {
                self.load_file(&file)?;
            }
            Ok(())
        } else if path.is_file() {
            self.load_file(path)
        } else {
            tracing::debug!("ignoring missing include {}", path.display());
            Ok(())
        }
    }

    /// Assign one option by its name. Returns false for unknown keys.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        fn flag(value: &str) -> bool {
            !matches!(value, "" | "0" | "no" | "false")
        }
        fn num<T: std::str::FromStr + Default>(value: &str) -> T {
            value.trim().parse().unwrap_or_default()
        }
        fn opt(value: &str) -> Option<String> {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        fn path(value: &str) -> Option<PathBuf> {
            opt(value).map(PathBuf::from)
        }
        fn list(value: &str) -> Vec<String> {
            value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        }

        match key {
            "server" => self.server.extend(list(value)),
            "local" => self.local.extend(list(value)),
            "delaytime" => self.delaytime = num(value),
            "lazy" => self.lazy = flag(value),
            "force" => self.force = flag(value),
            "wait" => self.wait = opt(value).and_then(|v| v.parse().ok()),
            "tasks" => self.tasks.extend(list(value)),
            "no-task" => self.no_task.extend(list(value)),
            "no-category" => self.no_category.extend(list(value)),
            "required-category" => self.required_category.extend(list(value)),
            "partial" => self.partial.extend(list(value)),
            "credentials" => self.credentials.push(value.trim().to_string()),
            "full" => self.full = flag(value),
            "full-inventory-postpone" => self.full_inventory_postpone = num(value),
            "additional-content" => self.additional_content = path(value),
            "backend-collect-timeout" => self.backend_collect_timeout = num(value),
            "scan-homedirs" => self.scan_homedirs = flag(value),
            "scan-profiles" => self.scan_profiles = flag(value),
            "assetname-support" => self.assetname_support = num(value),
            "itemtype" => self.itemtype = opt(value),
            "glpi-version" => self.glpi_version = opt(value),
            "html" => self.html = flag(value),
            "json" => self.json = flag(value),
            "tag" => self.tag = opt(value),
            "proxy" => self.proxy = opt(value),
            "user" => self.user = opt(value),
            "password" => self.password = opt(value),
            "oauth-client-id" => self.oauth_client_id = opt(value),
            "oauth-client-secret" => self.oauth_client_secret = opt(value),
            "ca-cert-dir" => self.ca_cert_dir = path(value),
            "ca-cert-file" => self.ca_cert_file = path(value),
            "ssl-cert-file" => self.ssl_cert_file = path(value),
            "ssl-fingerprint" => self.ssl_fingerprint.extend(list(value)),
            "no-ssl-check" => self.no_ssl_check = flag(value),
            "no-compression" => self.no_compression = flag(value),
            "timeout" => self.timeout = num(value),
            "no-httpd" => self.no_httpd = flag(value),
            "httpd-ip" => self.httpd_ip = opt(value),
            "httpd-port" => self.httpd_port = num(value),
            "httpd-trust" => self.httpd_trust.extend(list(value)),
            "listen" => self.listen = flag(value),
            "logger" => self.logger = list(value),
            "logfile" => self.logfile = path(value),
            "logfile-maxsize" => self.logfile_maxsize = num(value),
            "logfacility" => self.logfacility = value.trim().to_string(),
            "color" => self.color = flag(value),
            "debug" => self.debug = num(value),
            "conf-reload-interval" => self.conf_reload_interval = num(value),
            "daemon" => self.daemon = flag(value),
            "no-fork" => self.no_fork = flag(value),
            "pidfile" => self.pidfile = path(value),
            "vardir" => self.vardir = path(value),
            _ => return false,
        }
        true
    }

    /// Post-validation rewrites and mutually exclusive checks.
    pub fn check(&mut self) -> Result<(), ConfigError> {
        // A logfile implies the file backend
        if self.logfile.is_some() && !self.logger.iter().any(|l| l.eq_ignore_ascii_case("file")) {
            self.logger.push("file".to_string());
        }

        if self.ca_cert_file.is_some() && self.ca_cert_dir.is_some() {
            return Err(ConfigError::ConflictingCaOptions);
        }
        if self.logger.iter().any(|l| l.eq_ignore_ascii_case("file")) && self.logfile.is_none() {
            return Err(ConfigError::FileLoggerWithoutLogfile);
        }
        if self.daemon && !self.partial.is_empty() {
            return Err(ConfigError::PartialWithDaemon);
        }
        if self.daemon && !self.credentials.is_empty() {
            return Err(ConfigError::CredentialsWithDaemon);
        }

        // Multi-valued options may still carry embedded commas from
        // repeated flags
        for field in [
            &mut self.logger,
            &mut self.local,
            &mut self.server,
            &mut self.httpd_trust,
            &mut self.no_task,
            &mut self.no_category,
            &mut self.required_category,
            &mut self.tasks,
            &mut self.ssl_fingerprint,
            &mut self.partial,
        ] {
            *field = field
                .iter()
                .flat_map(|v| v.split(','))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
        }

        for path in [
            &mut self.ca_cert_file,
            &mut self.ca_cert_dir,
            &mut self.ssl_cert_file,
            &mut self.logfile,
            &mut self.vardir,
            &mut self.additional_content,
        ]
        .into_iter()
        .flatten()
        {
            *path = absolute(path);
        }

        if self.conf_reload_interval != 0
            && self.conf_reload_interval < CONF_RELOAD_INTERVAL_MIN
        {
            self.conf_reload_interval = CONF_RELOAD_INTERVAL_MIN;
        }

        Ok(())
    }

    /// Record and apply a command-line assignment so reloads can
    /// replay it over freshly read files.
    pub fn set_from_cli(&mut self, key: &str, value: &str) -> bool {
        if !self.set(key, value) {
            return false;
        }
        self.cli_overrides.push((key.to_string(), value.to_string()));
        true
    }

    /// Rebuild the configuration from scratch: defaults, backend
    /// files, then the recorded command-line overrides.
    pub fn reload(&self) -> Result<Config, ConfigError> {
        let mut fresh = Config::default();
        fresh.config_backend = self.config_backend.clone();
        fresh.conf_file = self.conf_file.clone();
        fresh.cli_overrides = self.cli_overrides.clone();
        fresh.load_backend(&self.config_backend, self.conf_file.as_deref())?;
        let overrides = fresh.cli_overrides.clone();
        for (key, value) in &overrides {
            fresh.set(key, value);
        }
        fresh.check()?;
        Ok(fresh)
    }

    /// Transport options for protocol clients.
    pub fn client_options(&self) -> qm_proto::ClientOptions {
        qm_proto::ClientOptions {
            user: self.user.clone(),
            password: self.password.clone(),
            oauth_client_id: self.oauth_client_id.clone(),
            oauth_client_secret: self.oauth_client_secret.clone(),
            ca_cert_file: self.ca_cert_file.clone(),
            ca_cert_dir: self.ca_cert_dir.clone(),
            ssl_cert_file: self.ssl_cert_file.clone(),
            ssl_fingerprint: self.ssl_fingerprint.clone(),
            no_ssl_check: self.no_ssl_check,
            no_compression: self.no_compression,
            proxy: self.proxy.clone(),
            timeout: self.timeout,
            debug: self.debug > 0,
        }
    }

    /// The local output format.
    pub fn local_format(&self) -> &'static str {
        if self.html {
            "html"
        } else if self.json {
            "json"
        } else {
            "xml"
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Default configuration file location.
pub fn default_conf_file() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("C:\\Program Files\\Quartermaster\\etc\\agent.cfg")
    } else {
        PathBuf::from("/etc/quartermaster/agent.cfg")
    }
}

/// Default persistent state location.
pub fn default_vardir() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("C:\\Program Files\\Quartermaster\\var")
    } else {
        PathBuf::from("/var/lib/quartermaster")
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
