/*
 * SPDX-FileCopyrightText: 2022 Empo Inc.
 *
 * SPDX-License-Identifier: GPL-3.0-or-later
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{DaemonError, HandlerError, Result};
use crate::templates;

/// Non-blocking lifecycle callback (start, stop, pause, continue, reload)
/// or the blocking run entry point.
pub type Handler = Box<dyn Fn() -> std::result::Result<(), HandlerError> + Send + Sync>;

/// Receives one formatted message line.
pub type LogSink = Box<dyn Fn(&str) + Send + Sync>;

/// Mutates a [`Config`] under construction, see [`crate::options`].
pub type ConfigOption = Box<dyn FnOnce(&mut Config)>;

const SOME_METHODS_NOT_SPECIFIED: &str = "some methods are not specified in service configuration";

/// How the Windows service manager starts the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartMode {
    Auto,
    OnDemand,
    Disabled,
    Boot,
    System,
}

impl Default for StartMode {
    fn default() -> Self {
        StartMode::Auto
    }
}

/// Everything the drivers need to know about the service.
///
/// Built once (see [`Config::new`]) and shared read-only afterwards.
#[derive(Default)]
pub struct Config {
    pub name: String,
    pub description: String,
    pub dependencies: Vec<String>,

    /// Directory holding the pid file. SystemV and rc.d only.
    pub pid_dir: String,
    /// Pid file stem; `name` is used when empty.
    pub pid_name: String,

    /// SystemV and Upstart only.
    pub start_run_levels: Vec<u8>,
    /// SystemV and Upstart only.
    pub stop_run_levels: Vec<u8>,

    pub template_linux_upstart: String,
    pub template_linux_systemv: String,
    pub template_linux_systemd: String,
    pub template_macos_plist: String,
    pub template_freebsd_rcd: String,

    /// Silences the missing-handler warnings of [`Config::validate`].
    pub hide_methods_warning: bool,

    pub windows_start_mode: StartMode,
    pub windows_account_name: Option<String>,
    pub windows_account_password: Option<String>,

    pub start_handler: Option<Handler>,
    pub stop_handler: Option<Handler>,
    pub pause_handler: Option<Handler>,
    pub continue_handler: Option<Handler>,
    pub reload_handler: Option<Handler>,
    /// Blocking entry point. Replaces the default signal loop when set.
    pub run_handler: Option<Handler>,

    pub error_sink: Option<LogSink>,
    pub info_sink: Option<LogSink>,
}

impl Config {
    /// Config with the default templates, run levels, pid directory and
    /// stdio sinks, then `opts` applied in order.
    pub fn new<I>(opts: I) -> Self
    where
        I: IntoIterator<Item = ConfigOption>,
    {
        let mut cfg = Config {
            template_linux_upstart: templates::LINUX_UPSTART.to_string(),
            template_linux_systemv: templates::LINUX_SYSTEMV.to_string(),
            template_linux_systemd: templates::LINUX_SYSTEMD.to_string(),
            template_macos_plist: templates::MACOS_PLIST.to_string(),
            template_freebsd_rcd: templates::FREEBSD_RCD.to_string(),

            pid_dir: if cfg!(unix) { "/run".to_string() } else { String::new() },

            start_run_levels: vec![2, 3, 4, 5],
            stop_run_levels: vec![0, 1, 6],

            error_sink: Some(Box::new(|msg| eprintln!("{}", msg))),
            info_sink: Some(Box::new(|msg| println!("{}", msg))),

            ..Config::default()
        };
        cfg.apply(opts);
        cfg
    }

    pub fn apply<I>(&mut self, opts: I)
    where
        I: IntoIterator<Item = ConfigOption>,
    {
        for opt in opts {
            opt(self);
        }
    }

    /// Checks the mandatory sinks and handlers.
    ///
    /// Missing pause/continue/reload handlers only produce a note through the
    /// info sink. Missing start/stop handlers are reported through the error
    /// sink and fail. Both messages are suppressed by `hide_methods_warning`;
    /// the failure is not.
    pub fn validate(&self) -> Result<()> {
        if self.error_sink.is_none() {
            return Err(DaemonError::ErrorHandlerMissing);
        }
        if self.info_sink.is_none() {
            return Err(DaemonError::InfoHandlerMissing);
        }

        let optional: Vec<&str> = [
            ("Pause", self.pause_handler.is_some()),
            ("Continue", self.continue_handler.is_some()),
            ("Reload", self.reload_handler.is_some()),
        ]
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
        if !optional.is_empty() && !self.hide_methods_warning {
            self.info(&format!(
                "{}: {}",
                SOME_METHODS_NOT_SPECIFIED,
                optional.join(", ")
            ));
        }

        let required: Vec<&str> = [
            ("Start", self.start_handler.is_some()),
            ("Stop", self.stop_handler.is_some()),
        ]
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
        if !required.is_empty() {
            let missing = required.join(", ");
            if !self.hide_methods_warning {
                self.error(&format!("{}: {}", SOME_METHODS_NOT_SPECIFIED, missing));
            }
            return Err(DaemonError::RequiredHandlersMissing { missing });
        }

        Ok(())
    }

    /// `<pid_dir>/<pid_name or name>.pid`
    pub fn pid_file(&self) -> String {
        let stem = if self.pid_name.is_empty() {
            &self.name
        } else {
            &self.pid_name
        };
        format!("{}/{}.pid", self.pid_dir.trim_end_matches('/'), stem)
    }

    pub fn can_pause(&self) -> bool {
        self.pause_handler.is_some() && self.continue_handler.is_some()
    }

    pub(crate) fn error(&self, msg: &str) {
        if let Some(sink) = &self.error_sink {
            sink(msg);
        }
    }

    pub(crate) fn info(&self, msg: &str) {
        if let Some(sink) = &self.info_sink {
            sink(msg);
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("dependencies", &self.dependencies)
            .field("pid_file", &self.pid_file())
            .field("start_run_levels", &self.start_run_levels)
            .field("stop_run_levels", &self.stop_run_levels)
            .field("windows_start_mode", &self.windows_start_mode)
            .finish_non_exhaustive()
    }
}

/// Validates a possibly absent configuration.
pub fn check(config: Option<&Config>) -> Result<()> {
    config.ok_or(DaemonError::ConfigMissing)?.validate()
}

/// Service identity as it can be written in a TOML file.
///
/// Absent keys leave the corresponding [`Config`] field untouched.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub name: Option<String>,
    pub description: Option<String>,
    pub dependencies: Option<Vec<String>>,
    pub pid_dir: Option<String>,
    pub pid_name: Option<String>,
    pub start_run_levels: Option<Vec<u8>>,
    pub stop_run_levels: Option<Vec<u8>>,
    pub hide_methods_warning: Option<bool>,
    pub windows_start_mode: Option<StartMode>,
    pub windows_account_name: Option<String>,
}

impl ConfigFile {
    pub fn parse(tomlstr: &str) -> Result<Self> {
        toml::from_str(tomlstr).map_err(|e| DaemonError::ConfigFile { msg: e.to_string() })
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn apply_to(self, cfg: &mut Config) {
        if let Some(x) = self.name {
            cfg.name = x;
        }
        if let Some(x) = self.description {
            cfg.description = x;
        }
        if let Some(x) = self.dependencies {
            cfg.dependencies = x;
        }
        if let Some(x) = self.pid_dir {
            cfg.pid_dir = x;
        }
        if let Some(x) = self.pid_name {
            cfg.pid_name = x;
        }
        if let Some(x) = self.start_run_levels {
            cfg.start_run_levels = x;
        }
        if let Some(x) = self.stop_run_levels {
            cfg.stop_run_levels = x;
        }
        if let Some(x) = self.hide_methods_warning {
            cfg.hide_methods_warning = x;
        }
        if let Some(x) = self.windows_start_mode {
            cfg.windows_start_mode = x;
        }
        if self.windows_account_name.is_some() {
            cfg.windows_account_name = self.windows_account_name;
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::options;

    fn recording_config(
        opts: Vec<ConfigOption>,
    ) -> (Config, Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let infos = Arc::new(Mutex::new(Vec::new()));
        let (e, i) = (errors.clone(), infos.clone());
        let mut cfg = Config::new(vec![
            options::error_sink(move |m| e.lock().unwrap().push(m.to_string())),
            options::info_sink(move |m| i.lock().unwrap().push(m.to_string())),
        ]);
        cfg.apply(opts);
        (cfg, errors, infos)
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::new(vec![options::name("echod")]);
        assert_eq!(cfg.start_run_levels, vec![2, 3, 4, 5]);
        assert_eq!(cfg.stop_run_levels, vec![0, 1, 6]);
        assert_eq!(cfg.pid_file(), "/run/echod.pid");
        assert_eq!(cfg.windows_start_mode, StartMode::Auto);
        assert!(cfg.template_linux_systemd.contains("ExecStart"));
        assert!(cfg.error_sink.is_some() && cfg.info_sink.is_some());
    }

    #[test]
    fn test_pid_name_overrides_name() {
        let cfg = Config::new(vec![
            options::name("echod"),
            options::pid_dir("/var/run/"),
            options::pid_name("echo"),
        ]);
        assert_eq!(cfg.pid_file(), "/var/run/echo.pid");
    }

    #[test]
    fn test_check_missing_config() {
        assert!(matches!(check(None), Err(DaemonError::ConfigMissing)));
    }

    #[test]
    fn test_check_missing_sinks() {
        let cfg = Config::default();
        assert!(matches!(cfg.validate(), Err(DaemonError::ErrorHandlerMissing)));

        let cfg = Config {
            error_sink: Some(Box::new(|_| {})),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(DaemonError::InfoHandlerMissing)));
    }

    #[test]
    fn test_optional_handlers_warning() {
        let (cfg, errors, infos) = recording_config(vec![
            options::start_handler(|| Ok(())),
            options::stop_handler(|| Ok(())),
        ]);
        assert!(check(Some(&cfg)).is_ok());
        assert!(errors.lock().unwrap().is_empty());
        let infos = infos.lock().unwrap();
        assert_eq!(infos.len(), 1);
        assert!(infos[0].ends_with("Pause, Continue, Reload"));
    }

    #[test]
    fn test_required_handlers_missing() {
        let (cfg, errors, _) = recording_config(vec![options::start_handler(|| Ok(()))]);
        match cfg.validate() {
            Err(DaemonError::RequiredHandlersMissing { missing }) => assert_eq!(missing, "Stop"),
            other => panic!("unexpected result: {:?}", other.err()),
        }
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].ends_with(": Stop"));
    }

    #[test]
    fn test_hidden_warnings_still_fail() {
        let (cfg, errors, infos) = recording_config(vec![options::hide_methods_warning(true)]);
        assert!(matches!(
            cfg.validate(),
            Err(DaemonError::RequiredHandlersMissing { .. })
        ));
        assert!(errors.lock().unwrap().is_empty());
        assert!(infos.lock().unwrap().is_empty());
    }

    #[test]
    fn test_config_file() {
        let file = ConfigFile::parse(
            r##"
        name = "echod"
        description = "Echo daemon"
        dependencies = ["network.target"]
        start_run_levels = [3, 5]
        windows_start_mode = "on-demand"
        "##,
        )
        .unwrap();

        let mut cfg = Config::new(vec![options::pid_name("keep")]);
        file.apply_to(&mut cfg);
        assert_eq!(cfg.name, "echod");
        assert_eq!(cfg.dependencies, vec!["network.target".to_string()]);
        assert_eq!(cfg.start_run_levels, vec![3, 5]);
        assert_eq!(cfg.stop_run_levels, vec![0, 1, 6]);
        assert_eq!(cfg.pid_name, "keep");
        assert_eq!(cfg.windows_start_mode, StartMode::OnDemand);
    }

    #[test]
    fn test_config_file_invalid() {
        assert!(matches!(
            ConfigFile::parse("name = 3"),
            Err(DaemonError::ConfigFile { .. })
        ));
    }
}
