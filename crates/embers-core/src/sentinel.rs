use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::conf;
use crate::error::BuildError;
use crate::exec::ExecProvider;
use crate::instance::{DEFAULT_STARTUP_TIMEOUT, Instance};

pub const DEFAULT_SENTINEL_PORT: u16 = 26379;

const CONF_PREFIX: &str = "embers-sentinel";

const SENTINEL_READY_PATTERN: &str = "(?:Sentinel ID is)|(?:Sentinel runid is)";

/// Assembles a sentinel monitor [`Instance`].
///
/// A sentinel always runs from a config file: either a pre-supplied one or
/// a materialized file holding the monitor sections plus a `port` line.
#[derive(Clone, Debug)]
pub struct SentinelBuilder {
    exec: ExecProvider,
    port: u16,
    master_name: String,
    master_port: u16,
    quorum_size: u32,
    down_after_ms: u64,
    failover_timeout_ms: u64,
    parallel_syncs: u32,
    conf_path: Option<PathBuf>,
    settings: Vec<String>,
    echo_output: bool,
    startup_timeout: Duration,
}

impl SentinelBuilder {
    pub fn new() -> Self {
        SentinelBuilder {
            exec: ExecProvider::redis_server(),
            port: DEFAULT_SENTINEL_PORT,
            master_name: "mymaster".to_string(),
            master_port: 6379,
            quorum_size: 1,
            down_after_ms: 60_000,
            failover_timeout_ms: 180_000,
            parallel_syncs: 1,
            conf_path: None,
            settings: Vec::new(),
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

    pub fn master_name(mut self, name: impl Into<String>) -> Self {
        self.master_name = name.into();
        self
    }

    pub fn master_port(mut self, port: u16) -> Self {
        self.master_port = port;
        self
    }

    pub fn quorum_size(mut self, quorum: u32) -> Self {
        self.quorum_size = quorum;
        self
    }

    pub fn down_after_milliseconds(mut self, ms: u64) -> Self {
        self.down_after_ms = ms;
        self
    }

    pub fn failover_timeout(mut self, ms: u64) -> Self {
        self.failover_timeout_ms = ms;
        self
    }

    pub fn parallel_syncs(mut self, count: u32) -> Self {
        self.parallel_syncs = count;
        self
    }

    /// Appends one raw configuration line.
    pub fn setting(mut self, line: impl Into<String>) -> Result<Self, BuildError> {
        if self.conf_path.is_some() {
            return Err(BuildError::ConflictingSettings);
        }
        self.settings.push(line.into());
        Ok(self)
    }

    /// Uses an existing sentinel config file instead of inline settings.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Result<Self, BuildError> {
        if !self.settings.is_empty() {
            return Err(BuildError::ConflictingSettings);
        }
        self.conf_path = Some(path.into());
        Ok(self)
    }

    /// Emits the monitor section for the currently configured master name,
    /// master port and quorum. Called once per replication group.
    pub fn add_replication_group(self) -> Result<Self, BuildError> {
        let name = self.master_name.clone();
        let master_port = self.master_port;
        let quorum = self.quorum_size;
        let down_after = self.down_after_ms;
        let failover = self.failover_timeout_ms;
        let syncs = self.parallel_syncs;
        self.setting(format!("sentinel monitor {name} 127.0.0.1 {master_port} {quorum}"))?
            .setting(format!("sentinel down-after-milliseconds {name} {down_after}"))?
            .setting(format!("sentinel failover-timeout {name} {failover}"))?
            .setting(format!("sentinel parallel-syncs {name} {syncs}"))
    }

    pub fn echo_output(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }

    pub fn startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    pub fn settings(&self) -> &[String] {
        &self.settings
    }

    pub fn build(self) -> Result<Instance, BuildError> {
        // Without any explicit monitor lines, watch the default master.
        let this = if self.conf_path.is_none() && self.settings.is_empty() {
            self.add_replication_group()?
        } else {
            self
        };

        let exe = this.exec.get()?;
        let mut args = vec![exe.to_string_lossy().into_owned()];
        let mut conf_file = None;
        if let Some(path) = &this.conf_path {
            args.push(path.display().to_string());
        } else {
            let mut lines = this.settings.clone();
            lines.push(format!("port {}", this.port));

            let file = conf::materialize(&format!("{CONF_PREFIX}-{}", this.port), &lines)?;
            args.push(file.path().display().to_string());
            conf_file = Some(file);
        }
        args.push("--sentinel".to_string());
        args.push("--port".to_string());
        args.push(this.port.to_string());

        let ready = Regex::new(SENTINEL_READY_PATTERN).expect("readiness pattern compiles");
        let mut instance = Instance::new(args, this.port, ready)
            .with_startup_timeout(this.startup_timeout)
            .with_echo_output(this.echo_output);
        if let Some(file) = conf_file {
            instance = instance.with_conf_file(file);
        }
        Ok(instance)
    }
}

impl Default for SentinelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{Arch, Os};

    fn sh_exec() -> ExecProvider {
        ExecProvider::new("unused").with_override(Os::detect(), Arch::detect(), "/bin/sh")
    }

    #[test]
    fn arranges_args_as_exe_conf_sentinel_port() {
        let instance = SentinelBuilder::new()
            .exec_provider(sh_exec())
            .port(26380)
            .build()
            .unwrap();

        let args = instance.args();
        assert_eq!(args[0], "/bin/sh");
        assert!(args[1].ends_with(".conf"));
        assert_eq!(&args[2..], ["--sentinel", "--port", "26380"]);
    }

    #[test]
    fn default_conf_monitors_the_default_master() {
        let instance = SentinelBuilder::new()
            .exec_provider(sh_exec())
            .master_name("cache")
            .master_port(6400)
            .quorum_size(2)
            .build()
            .unwrap();

        let written = std::fs::read_to_string(&instance.args()[1]).unwrap();
        assert!(written.contains("sentinel monitor cache 127.0.0.1 6400 2"));
        assert!(written.contains("sentinel down-after-milliseconds cache 60000"));
        assert!(written.contains("sentinel failover-timeout cache 180000"));
        assert!(written.contains("sentinel parallel-syncs cache 1"));
        assert!(written.ends_with("port 26379\n"));
    }

    #[test]
    fn emits_one_monitor_section_per_group() {
        let instance = SentinelBuilder::new()
            .exec_provider(sh_exec())
            .master_name("one")
            .master_port(7001)
            .add_replication_group()
            .unwrap()
            .master_name("two")
            .master_port(7002)
            .add_replication_group()
            .unwrap()
            .build()
            .unwrap();

        let written = std::fs::read_to_string(&instance.args()[1]).unwrap();
        assert!(written.contains("sentinel monitor one 127.0.0.1 7001 1"));
        assert!(written.contains("sentinel monitor two 127.0.0.1 7002 1"));
    }

    #[test]
    fn rejects_inline_settings_after_config_file() {
        let err = SentinelBuilder::new()
            .config_file("/etc/sentinel.conf")
            .unwrap()
            .setting("sentinel monitor m 127.0.0.1 6379 1")
            .unwrap_err();
        assert!(matches!(err, BuildError::ConflictingSettings));
    }
}
