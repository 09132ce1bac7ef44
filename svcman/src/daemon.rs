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
use std::sync::Arc;

use crate::config::{check, Config};
use crate::error::{DaemonError, Result};
use crate::probe::{self, Subsystem};
use crate::svc::{self, Driver};
use crate::system::System;

const STATUS_NOT_INSTALLED: &str = "Service not installed";

/// Status line plus the outcome of a control operation.
#[derive(Debug)]
pub struct Outcome {
    pub message: String,
    pub result: Result<()>,
}

impl Outcome {
    fn ok(message: String) -> Self {
        Outcome {
            message,
            result: Ok(()),
        }
    }

    fn failed(message: String, err: DaemonError) -> Self {
        Outcome {
            message,
            result: Err(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<String> {
        self.result.map(|_| self.message)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(not(windows))]
fn success(action: &str) -> String {
    format!("{}\t\t\t\t\t[  \x1b[32mOK\x1b[0m  ]", action)
}

#[cfg(not(windows))]
fn failed(action: &str) -> String {
    format!("{}\t\t\t\t\t[\x1b[31mFAILED\x1b[0m]", action)
}

#[cfg(windows)]
fn success(action: &str) -> String {
    format!("{}\t\t\t\t\t[  OK  ]", action)
}

#[cfg(windows)]
fn failed(action: &str) -> String {
    format!("{}\t\t\t\t\t[FAILED]", action)
}

/// Installs and controls one service through the host's init subsystem.
///
/// The subsystem is chosen once, at construction.
pub struct Daemon {
    config: Arc<Config>,
    system: Arc<System>,
    kind: Subsystem,
    driver: Box<dyn Driver>,
}

impl Daemon {
    /// Validates `config` and binds the subsystem of the running host.
    pub fn new(config: Config) -> Result<Self> {
        check(Some(&config))?;
        let system = System::host();
        let kind = probe::detect(&system).ok_or(DaemonError::UnsupportedPlatform)?;
        Self::bind(config, system, kind)
    }

    /// Like [`Daemon::new`] but panics on an invalid configuration.
    pub fn must(config: Config) -> Self {
        match Self::new(config) {
            Ok(daemon) => daemon,
            Err(e) => panic!("{}", e),
        }
    }

    /// Validates `config` and drives `kind` on `system`.
    pub fn with_system(config: Config, system: System, kind: Subsystem) -> Result<Self> {
        check(Some(&config))?;
        Self::bind(config, system, kind)
    }

    fn bind(config: Config, system: System, kind: Subsystem) -> Result<Self> {
        let config = Arc::new(config);
        let system = Arc::new(system);
        let driver = svc::new_driver(kind, config.clone(), system.clone())?;
        Ok(Daemon {
            config,
            system,
            kind,
            driver,
        })
    }

    pub fn subsystem(&self) -> Subsystem {
        self.kind
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Unit file location, or the registered service name on Windows.
    pub fn path(&self) -> String {
        self.driver.path()
    }

    pub fn installed(&self) -> bool {
        self.driver.installed()
    }

    fn check_privileges(&self) -> Result<()> {
        // The SCM enforces its own access control.
        if self.kind == Subsystem::Scm {
            return Ok(());
        }
        self.system.check_privileges()
    }

    /// Runs the shared checks, then `op`, and formats the status line.
    fn control<F>(&self, verb: &str, op: F) -> Outcome
    where
        F: FnOnce(&dyn Driver) -> Result<()>,
    {
        let action = format!("{} {}:", verb, self.config.description);
        let result = self.check_privileges().and_then(|_| op(self.driver.as_ref()));
        match result {
            Ok(()) => Outcome::ok(success(&action)),
            Err(e) => {
                log::debug!("{} {} failed: {}", verb, self.config.name, e);
                Outcome::failed(failed(&action), e)
            }
        }
    }

    pub fn install(&self, args: &[String]) -> Outcome {
        self.control("Install", |d| {
            if d.installed() {
                return Err(DaemonError::AlreadyInstalled);
            }
            d.install(args)
        })
    }

    pub fn uninstall(&self) -> Outcome {
        self.control("Uninstalling", |d| {
            if !d.installed() {
                return Err(DaemonError::NotInstalled);
            }
            d.uninstall()
        })
    }

    pub fn start(&self) -> Outcome {
        self.control("Starting", |d| {
            if !d.installed() {
                return Err(DaemonError::NotInstalled);
            }
            if d.running().1 {
                return Err(DaemonError::AlreadyRunning);
            }
            d.start()
        })
    }

    pub fn stop(&self) -> Outcome {
        self.control("Stopping", |d| {
            if !d.installed() {
                return Err(DaemonError::NotInstalled);
            }
            if !d.running().1 {
                return Err(DaemonError::AlreadyStopped);
            }
            d.stop()
        })
    }

    pub fn restart(&self) -> Outcome {
        self.control("Restarting", |d| {
            if !d.installed() {
                return Err(DaemonError::NotInstalled);
            }
            d.restart()
        })
    }

    pub fn reload(&self) -> Outcome {
        if !self.driver.can_reload() {
            return Outcome::failed(String::new(), DaemonError::UnsupportedPlatform);
        }
        self.control("Reloading", |d| {
            if !d.installed() {
                return Err(DaemonError::NotInstalled);
            }
            if !d.running().1 {
                return Err(DaemonError::NotStarted);
            }
            d.reload()
        })
    }

    pub fn pause(&self) -> Outcome {
        if !self.driver.can_pause() {
            return Outcome::failed(String::new(), DaemonError::UnsupportedPlatform);
        }
        self.control("Pausing", |d| d.pause())
    }

    pub fn resume(&self) -> Outcome {
        if !self.driver.can_pause() {
            return Outcome::failed(String::new(), DaemonError::UnsupportedPlatform);
        }
        self.control("Resuming", |d| d.resume())
    }

    /// Human readable state of the installed service.
    pub fn status(&self) -> Outcome {
        if let Err(e) = self.check_privileges() {
            return Outcome::failed(String::new(), e);
        }
        if !self.driver.installed() {
            return Outcome::failed(STATUS_NOT_INSTALLED.to_string(), DaemonError::NotInstalled);
        }
        match self.driver.status() {
            Ok(status) => Outcome::ok(status),
            Err(e) => Outcome::failed(
                failed(&format!("Getting status {}:", self.config.description)),
                e,
            ),
        }
    }

    /// Runs the service in the foreground until it is told to stop.
    ///
    /// A configured run handler is called as is. Otherwise the start handler
    /// runs and the process waits for termination signals (or, on Windows,
    /// service manager requests) dispatching them to the other handlers.
    pub fn run(&self) -> Result<()> {
        if let Some(run) = &self.config.run_handler {
            return run().map_err(|e| DaemonError::Handler {
                code: 1,
                msg: e.to_string(),
            });
        }
        self.run_default()
    }

    #[cfg(unix)]
    fn run_default(&self) -> Result<()> {
        crate::signals::run(&self.config)
    }

    #[cfg(windows)]
    fn run_default(&self) -> Result<()> {
        svc::winsvc::run(self.config.clone())
    }

    #[cfg(not(any(unix, windows)))]
    fn run_default(&self) -> Result<()> {
        Err(DaemonError::UnsupportedPlatform)
    }
}
