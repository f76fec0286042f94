// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line surface.

use clap::Parser;

/// Quartermaster inventory agent
#[derive(Debug, Parser)]
#[command(name = "qm", version, about = "Quartermaster inventory and fleet-management agent")]
pub struct Args {
    /// Send tasks results to a server (repeatable)
    #[arg(short = 's', long, value_name = "URI")]
    pub server: Vec<String>,

    /// Write tasks results locally (directory, file, or - for stdout)
    #[arg(short = 'l', long, value_name = "PATH")]
    pub local: Vec<String>,

    /// Maximum delay before the first target run, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub delaytime: Option<u64>,

    /// Do not run the target if its next run date is in the future
    #[arg(long)]
    pub lazy: bool,

    /// Always force the full run on next agent start
    #[arg(long)]
    pub set_forcerun: bool,

    /// List available tasks and exit
    #[arg(long)]
    pub list_tasks: bool,

    /// Do not run the listed tasks (repeatable, comma-separated)
    #[arg(long, value_name = "TASK[,TASK]")]
    pub no_task: Vec<String>,

    /// Run only these tasks in order; the literal ... expands to every
    /// remaining task
    #[arg(long, value_name = "TASK[,TASK]")]
    pub tasks: Vec<String>,

    /// Do not inventory the listed categories (repeatable)
    #[arg(long, value_name = "CATEGORY[,CATEGORY]")]
    pub no_category: Vec<String>,

    /// List supported inventory categories and exit
    #[arg(long)]
    pub list_categories: bool,

    /// Scan user home directories
    #[arg(long)]
    pub scan_homedirs: bool,

    /// Scan user profiles
    #[arg(long)]
    pub scan_profiles: bool,

    /// Save the local inventory as HTML
    #[arg(long)]
    pub html: bool,

    /// Save the local inventory as JSON
    #[arg(long)]
    pub json: bool,

    /// Force an inventory even when the server did not ask for one
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Per-module collect timeout, seconds
    #[arg(long, value_name = "SECONDS")]
    pub backend_collect_timeout: Option<u64>,

    /// Merge an additional inventory content file (JSON or XML)
    #[arg(long, value_name = "FILE")]
    pub additional_content: Option<String>,

    /// Asset name policy: 1 = hostname, 2 = short hostname
    #[arg(long, value_name = "1|2")]
    pub assetname_support: Option<u8>,

    /// Run a partial inventory restricted to these categories
    #[arg(long, value_name = "CATEGORY[,CATEGORY]")]
    pub partial: Vec<String>,

    /// Credentials set for partial database or remote inventory
    /// (repeatable)
    #[arg(long, value_name = "K:V[,K:V]")]
    pub credentials: Vec<String>,

    /// Number of partial inventories allowed between two full ones
    #[arg(long, value_name = "N")]
    pub full_inventory_postpone: Option<u32>,

    /// Force a full inventory, ignoring the postpone counter
    #[arg(long)]
    pub full: bool,

    /// Categories always kept in a partial submission (repeatable)
    #[arg(long, value_name = "CATEGORY[,CATEGORY]")]
    pub required_category: Vec<String>,

    /// Declared asset item type
    #[arg(long, value_name = "TYPE")]
    pub itemtype: Option<String>,

    /// Proxy URL for server connections
    #[arg(short = 'P', long, value_name = "PROXY")]
    pub proxy: Option<String>,

    /// Basic authentication user
    #[arg(short = 'u', long, value_name = "USER")]
    pub user: Option<String>,

    /// Basic authentication password
    #[arg(short = 'p', long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// CA certificates directory
    #[arg(long, value_name = "DIR")]
    pub ca_cert_dir: Option<String>,

    /// CA certificates bundle file
    #[arg(long, value_name = "FILE")]
    pub ca_cert_file: Option<String>,

    /// Do not check server certificates
    #[arg(long)]
    pub no_ssl_check: bool,

    /// Trust these server certificate fingerprints (repeatable)
    #[arg(long, value_name = "FINGERPRINT")]
    pub ssl_fingerprint: Vec<String>,

    /// Disable wire compression
    #[arg(short = 'C', long)]
    pub no_compression: bool,

    /// Connection timeout, seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Disable the embedded HTTP server
    #[arg(long)]
    pub no_httpd: bool,

    /// Embedded HTTP server bind address
    #[arg(long, value_name = "IP")]
    pub httpd_ip: Option<String>,

    /// Embedded HTTP server port
    #[arg(long, value_name = "PORT")]
    pub httpd_port: Option<u16>,

    /// Trust these IPs or CIDR ranges on the embedded server
    /// (repeatable)
    #[arg(long, value_name = "IP|CIDR")]
    pub httpd_trust: Vec<String>,

    /// Enable the listener target when no other target is configured
    #[arg(long)]
    pub listen: bool,

    /// OAuth2 client id for server authentication
    #[arg(long, value_name = "ID")]
    pub oauth_client_id: Option<String>,

    /// OAuth2 client secret for server authentication
    #[arg(long, value_name = "SECRET")]
    pub oauth_client_secret: Option<String>,

    /// Logger backends: stderr, file, syslog (comma-separated)
    #[arg(long, value_name = "BACKEND[,BACKEND]")]
    pub logger: Option<String>,

    /// Log file path
    #[arg(long, value_name = "FILE")]
    pub logfile: Option<String>,

    /// Maximum log file size in MB before rotation
    #[arg(long, value_name = "MB")]
    pub logfile_maxsize: Option<u64>,

    /// Syslog facility
    #[arg(long, value_name = "FACILITY")]
    pub logfacility: Option<String>,

    /// Colorize stderr output
    #[arg(long)]
    pub color: bool,

    /// Configuration backend: file, registry, or none
    #[arg(long, value_name = "BACKEND")]
    pub config: Option<String>,

    /// Configuration file, forcing the file backend
    #[arg(long, value_name = "FILE")]
    pub conf_file: Option<String>,

    /// Configuration reload period, seconds (0 disables, minimum 60)
    #[arg(long, value_name = "SECONDS")]
    pub conf_reload_interval: Option<u64>,

    /// Wait a random delay up to N seconds before running
    #[arg(short = 'w', long, value_name = "SECONDS")]
    pub wait: Option<u64>,

    /// Run continuously in the background
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Stay in the foreground when running as a daemon
    #[arg(long)]
    pub no_fork: bool,

    /// Write the daemon pid to this file
    #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = "")]
    pub pidfile: Option<String>,

    /// Inventory tag
    #[arg(short = 't', long, value_name = "TAG")]
    pub tag: Option<String>,

    /// Raise the log level; repeat for more detail
    #[arg(long, action = clap::ArgAction::Count)]
    pub debug: u8,

    /// Print setup directories and exit
    #[arg(long)]
    pub setup: bool,

    /// Persistent state directory
    #[arg(long, value_name = "PATH")]
    pub vardir: Option<String>,

    /// Targeted GLPI server version
    #[arg(long, value_name = "VERSION")]
    pub glpi_version: Option<String>,
}

impl Args {
    /// Raw key/value assignments, in option order, for the config
    /// layering.
    pub fn overrides(&self) -> Vec<(String, String)> {
        let mut overrides: Vec<(String, String)> = Vec::new();
        let mut push = |key: &str, value: String| overrides.push((key.to_string(), value));

        for server in &self.server {
            push("server", server.clone());
        }
        for local in &self.local {
            push("local", local.clone());
        }
        if let Some(delaytime) = self.delaytime {
            push("delaytime", delaytime.to_string());
        }
        if self.lazy {
            push("lazy", "1".to_string());
        }
        if self.force {
            push("force", "1".to_string());
        }
        for task in &self.no_task {
            push("no-task", task.clone());
        }
        for task in &self.tasks {
            push("tasks", task.clone());
        }
        for category in &self.no_category {
            push("no-category", category.clone());
        }
        for category in &self.required_category {
            push("required-category", category.clone());
        }
        if self.scan_homedirs {
            push("scan-homedirs", "1".to_string());
        }
        if self.scan_profiles {
            push("scan-profiles", "1".to_string());
        }
        if self.html {
            push("html", "1".to_string());
        }
        if self.json {
            push("json", "1".to_string());
        }
        if let Some(timeout) = self.backend_collect_timeout {
            push("backend-collect-timeout", timeout.to_string());
        }
        if let Some(file) = &self.additional_content {
            push("additional-content", file.clone());
        }
        if let Some(policy) = self.assetname_support {
            push("assetname-support", policy.to_string());
        }
        for category in &self.partial {
            push("partial", category.clone());
        }
        for credentials in &self.credentials {
            push("credentials", credentials.clone());
        }
        if let Some(postpone) = self.full_inventory_postpone {
            push("full-inventory-postpone", postpone.to_string());
        }
        if self.full {
            push("full", "1".to_string());
        }
        if let Some(itemtype) = &self.itemtype {
            push("itemtype", itemtype.clone());
        }
        if let Some(proxy) = &self.proxy {
            push("proxy", proxy.clone());
        }
        if let Some(user) = &self.user {
            push("user", user.clone());
        }
        if let Some(password) = &self.password {
            push("password", password.clone());
        }
        if let Some(dir) = &self.ca_cert_dir {
            push("ca-cert-dir", dir.clone());
        }
        if let Some(file) = &self.ca_cert_file {
            push("ca-cert-file", file.clone());
        }
        if self.no_ssl_check {
            push("no-ssl-check", "1".to_string());
        }
        for fingerprint in &self.ssl_fingerprint {
            push("ssl-fingerprint", fingerprint.clone());
        }
        if self.no_compression {
            push("no-compression", "1".to_string());
        }
        if let Some(timeout) = self.timeout {
            push("timeout", timeout.to_string());
        }
        if self.no_httpd {
            push("no-httpd", "1".to_string());
        }
        if let Some(ip) = &self.httpd_ip {
            push("httpd-ip", ip.clone());
        }
        if let Some(port) = self.httpd_port {
            push("httpd-port", port.to_string());
        }
        for trust in &self.httpd_trust {
            push("httpd-trust", trust.clone());
        }
        if self.listen {
            push("listen", "1".to_string());
        }
        if let Some(id) = &self.oauth_client_id {
            push("oauth-client-id", id.clone());
        }
        if let Some(secret) = &self.oauth_client_secret {
            push("oauth-client-secret", secret.clone());
        }
        if let Some(logger) = &self.logger {
            push("logger", logger.clone());
        }
        if let Some(logfile) = &self.logfile {
            push("logfile", logfile.clone());
        }
        if let Some(maxsize) = self.logfile_maxsize {
            push("logfile-maxsize", maxsize.to_string());
        }
        if let Some(facility) = &self.logfacility {
            push("logfacility", facility.clone());
        }
        if self.color {
            push("color", "1".to_string());
        }
        if let Some(interval) = self.conf_reload_interval {
            push("conf-reload-interval", interval.to_string());
        }
        if let Some(wait) = self.wait {
            push("wait", wait.to_string());
        }
        if self.daemon {
            push("daemon", "1".to_string());
        }
        if self.no_fork {
            push("no-fork", "1".to_string());
        }
        if let Some(pidfile) = &self.pidfile {
            let path = if pidfile.is_empty() {
                default_pidfile()
            } else {
                pidfile.clone()
            };
            push("pidfile", path);
        }
        if let Some(tag) = &self.tag {
            push("tag", tag.clone());
        }
        if self.debug > 0 {
            push("debug", self.debug.to_string());
        }
        if let Some(vardir) = &self.vardir {
            push("vardir", vardir.clone());
        }
        if let Some(version) = &self.glpi_version {
            push("glpi-version", version.clone());
        }
        overrides
    }
}

fn default_pidfile() -> String {
    if cfg!(windows) {
        "C:\\Program Files\\Quartermaster\\var\\qm.pid".to_string()
    } else {
        "/var/run/qm.pid".to_string()
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
