use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::conf;
use crate::error::BuildError;
use crate::exec::ExecProvider;
use crate::instance::{DEFAULT_STARTUP_TIMEOUT, Instance};

pub const DEFAULT_SERVER_PORT: u16 = 6379;

const CONF_PREFIX: &str = "embers-server";

/// Readiness signatures across server generations; newer releases dropped
/// the port suffix from the line.
const SERVER_READY_PATTERN: &str = "(?:The server is now ready to accept connections on port)\
|(?:Ready to accept connections)";

/// Assembles a data-node [`Instance`].
///
/// Configuration comes either from inline `key value` setting lines or from
/// a pre-supplied config file, never both. Composers clone a template
/// builder and specialize it per member.
#[derive(Clone, Debug)]
pub struct ServerBuilder {
    exec: ExecProvider,
    port: u16,
    slave_of: Option<(String, u16)>,
    conf_path: Option<PathBuf>,
    settings: Vec<String>,
    ready: Option<Regex>,
    echo_output: bool,
    startup_timeout: Duration,
}

impl ServerBuilder {
    pub fn new() -> Self {
        ServerBuilder {
            exec: ExecProvider::redis_server(),
            port: DEFAULT_SERVER_PORT,
            slave_of: None,
            conf_path: None,
            settings: Vec::new(),
            ready: None,
            echo_output: false,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    pub fn exec_provider(mut self, exec: ExecProvider) -> Self {
        self.exec = exec;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Configures this node as a replica of `host:port`.
    pub fn slave_of(mut self, host: impl Into<String>, port: u16) -> Self {
        self.slave_of = Some((host.into(), port));
        self
    }

    /// Appends one `key value` configuration line.
    pub fn setting(mut self, line: impl Into<String>) -> Result<Self, BuildError> {
        if self.conf_path.is_some() {
            return Err(BuildError::ConflictingSettings);
        }
        self.settings.push(line.into());
        Ok(self)
    }

    /// Uses an existing config file instead of inline settings.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Result<Self, BuildError> {
        if !self.settings.is_empty() {
            return Err(BuildError::ConflictingSettings);
        }
        self.conf_path = Some(path.into());
        Ok(self)
    }

    /// Overrides the readiness pattern scanned for in process output.
    pub fn ready_pattern(mut self, ready: Regex) -> Self {
        self.ready = Some(ready);
        self
    }

    pub fn echo_output(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }

    pub fn startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    /// Inline settings collected so far.
    pub fn settings(&self) -> &[String] {
        &self.settings
    }

    pub fn build(&self) -> Result<Instance, BuildError> {
        let exe = self.exec.get()?;

        let mut args = vec![exe.to_string_lossy().into_owned()];
        let mut conf_file = None;
        if let Some(path) = &self.conf_path {
            args.push(path.display().to_string());
        } else if !self.settings.is_empty() {
            let file = conf::materialize(
                &format!("{CONF_PREFIX}-{}", self.port),
                &self.settings,
            )?;
            args.push(file.path().display().to_string());
            conf_file = Some(file);
        }
        args.push("--port".to_string());
        args.push(self.port.to_string());
        if let Some((host, port)) = &self.slave_of {
            args.push("--slaveof".to_string());
            args.push(host.clone());
            args.push(port.to_string());
        }

        let ready = match &self.ready {
            Some(ready) => ready.clone(),
            None => Regex::new(SERVER_READY_PATTERN).expect("readiness pattern compiles"),
        };

        let mut instance = Instance::new(args, self.port, ready)
            .with_startup_timeout(self.startup_timeout)
            .with_echo_output(self.echo_output);
        if let Some(file) = conf_file {
            instance = instance.with_conf_file(file);
        }
        Ok(instance)
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
