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

//! One driver per init subsystem, all behind [`Driver`].

use std::borrow::Cow;
use std::sync::Arc;

use regex::Regex;

use crate::config::Config;
use crate::error::{DaemonError, Result};
use crate::probe::Subsystem;
use crate::system::System;
use crate::templates::TemplateContext;

#[cfg(unix)]
pub(crate) mod launchd;
#[cfg(unix)]
pub(crate) mod rcd;
#[cfg(unix)]
pub(crate) mod systemd;
#[cfg(unix)]
pub(crate) mod sysv;
#[cfg(unix)]
pub(crate) mod upstart;

#[cfg(target_os = "windows")]
pub(crate) mod winsvc;

#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) const STATUS_STOPPED: &str = "Service is stopped";

/// Operations every init subsystem implements against its native tooling.
///
/// Drivers do not check preconditions; [`crate::Daemon`] does.
pub(crate) trait Driver: Send + Sync {
    /// Unit file location, or the registered name for the SCM.
    fn path(&self) -> String;
    fn installed(&self) -> bool;
    /// Human readable state and whether the service runs.
    fn running(&self) -> (String, bool);

    fn install(&self, args: &[String]) -> Result<()>;
    fn uninstall(&self) -> Result<()>;
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn restart(&self) -> Result<()>;

    fn can_reload(&self) -> bool {
        false
    }

    fn reload(&self) -> Result<()> {
        Err(DaemonError::UnsupportedPlatform)
    }

    fn can_pause(&self) -> bool {
        false
    }

    fn pause(&self) -> Result<()> {
        Err(DaemonError::UnsupportedPlatform)
    }

    fn resume(&self) -> Result<()> {
        Err(DaemonError::UnsupportedPlatform)
    }

    fn status(&self) -> Result<String> {
        Ok(self.running().0)
    }
}

pub(crate) fn new_driver(
    kind: Subsystem,
    config: Arc<Config>,
    system: Arc<System>,
) -> Result<Box<dyn Driver>> {
    log::debug!("Managing {} via {}", config.name, kind);
    match kind {
        #[cfg(unix)]
        Subsystem::SystemD => Ok(Box::new(systemd::SystemD::new(config, system))),
        #[cfg(unix)]
        Subsystem::Upstart => Ok(Box::new(upstart::Upstart::new(config, system))),
        #[cfg(unix)]
        Subsystem::SystemV => Ok(Box::new(sysv::SystemV::new(config, system))),
        #[cfg(unix)]
        Subsystem::Launchd => Ok(Box::new(launchd::Launchd::new(config, system))),
        #[cfg(unix)]
        Subsystem::RcD => Ok(Box::new(rcd::RcD::new(config, system))),
        #[cfg(target_os = "windows")]
        Subsystem::Scm => Ok(Box::new(winsvc::Scm::new(config))),
        #[allow(unreachable_patterns)]
        _ => Err(DaemonError::UnsupportedPlatform),
    }
}

/// Interprets status command output: `marker` decides whether the service
/// runs, `pid` extracts the process id from its first capture group.
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) fn parse_running(output: &str, marker: &Regex, pid: &Regex) -> (String, bool) {
    if !marker.is_match(output) {
        return (STATUS_STOPPED.to_string(), false);
    }
    match pid.captures(output).and_then(|caps| caps.get(1)) {
        Some(m) => (format!("Service (pid  {}) is running...", m.as_str()), true),
        None => ("Service is running...".to_string(), true),
    }
}

/// Runs a status command and parses it with [`parse_running`]. A command
/// that cannot run or exits non-zero means stopped.
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) fn check_running(
    system: &System,
    marker: &Regex,
    pid: &Regex,
    program: &str,
    args: &[&str],
) -> (String, bool) {
    match system.output(program, args) {
        Ok(output) if output.success() => parse_running(&output.stdout, marker, pid),
        _ => (STATUS_STOPPED.to_string(), false),
    }
}

/// Regex matching `literal` verbatim.
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) fn literal(literal: &str) -> Option<Regex> {
    Regex::new(&regex::escape(literal)).ok()
}

/// Base template values shared by the file based subsystems. `quote` shell
/// quotes each argument.
#[cfg_attr(not(unix), allow(dead_code))]
pub(crate) fn template_context(
    config: &Config,
    system: &System,
    args: &[String],
    quote: bool,
) -> Result<TemplateContext> {
    let joined = if quote {
        args.iter()
            .map(|a| shell_escape::unix::escape(Cow::from(a.as_str())).to_string())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        args.join(" ")
    };
    Ok(TemplateContext {
        name: config.name.clone(),
        description: config.description.clone(),
        dependencies: config.dependencies.join(" "),
        path: system.executable_path(&config.name)?,
        args: joined,
        arg_list: args.to_vec(),
        pid_file: config.pid_file(),
        ..TemplateContext::default()
    })
}
