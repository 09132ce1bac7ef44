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

//! Install and control a program as a system service.
//!
//! The init subsystem of the host (systemd, SystemV, Upstart, launchd,
//! FreeBSD rc.d or the Windows service control manager) is detected once,
//! when a [`Daemon`] is built from a validated [`Config`].

pub mod config;
pub mod control;
pub mod daemon;
pub mod error;
pub mod options;
pub mod probe;
#[cfg(unix)]
mod signals;
mod svc;
pub mod system;
pub mod templates;

pub use config::{check, Config, ConfigFile, ConfigOption, Handler, LogSink, StartMode};
pub use control::{ControlEvent, Controller, LogReporter, State, StatusReporter};
pub use daemon::{Daemon, Outcome};
pub use error::{DaemonError, HandlerError, Result};
pub use probe::{detect, probe, Subsystem};
pub use system::{CommandOutput, CommandRunner, HostRunner, Probe, System};
pub use templates::{render, TemplateContext};
