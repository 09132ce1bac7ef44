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

use custom_error::custom_error;

/// Error returned by a lifecycle callback.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

custom_error! {pub DaemonError
    ConfigMissing = "service configuration is not specified",
    ErrorHandlerMissing = "error method are not specified in service configuration",
    InfoHandlerMissing = "info method are not specified in service configuration",
    RequiredHandlersMissing{missing: String} = "some methods are not specified in service configuration: {missing}",
    UnsupportedPlatform = "unsupported system",
    InsufficientPrivileges = "you must have root user privileges. Possibly using 'sudo' command should help",
    AlreadyInstalled = "service has already been installed",
    NotInstalled = "service is not installed",
    AlreadyRunning = "service is already running",
    AlreadyStopped = "service has already been stopped",
    NotStarted = "service is not started",
    Io{source: std::io::Error} = "I/O error: {source}",
    Template{source: tera::Error} = "failed to render service template: {source}",
    CommandFailed{command: String, code: i32} = "`{command}` exited with status {code}",
    ConfigFile{msg: String} = "Invalid config file: {msg}",
    Handler{code: i32, msg: String} = "handler failed with exit code {code}: {msg}",
    Panicked{msg: String} = "run() panic: {msg}",
    Scm{msg: String} = "service control manager: {msg}",
}

pub type Result<T> = std::result::Result<T, DaemonError>;

impl DaemonError {
    /// Process exit code the default run loop reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            DaemonError::Handler { code, .. } => *code,
            DaemonError::Panicked { .. } => 100,
            _ => 1,
        }
    }
}
