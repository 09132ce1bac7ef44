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

use crate::system::Probe;

const SYSTEMD_RUNTIME_DIR: &str = "/run/systemd/system";
const UPSTART_INITCTL: &str = "/sbin/initctl";

/// Init subsystem a [`Daemon`](crate::Daemon) drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subsystem {
    SystemD,
    Upstart,
    SystemV,
    Launchd,
    RcD,
    Scm,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subsystem::SystemD => "systemd",
            Subsystem::Upstart => "upstart",
            Subsystem::SystemV => "sysvinit",
            Subsystem::Launchd => "launchd",
            Subsystem::RcD => "rc.d",
            Subsystem::Scm => "winsvc",
        };
        f.write_str(name)
    }
}

/// Picks the Linux init system. Newer subsystems win.
pub fn probe(fs: &dyn Probe) -> Subsystem {
    if fs.exists(SYSTEMD_RUNTIME_DIR) {
        Subsystem::SystemD
    } else if fs.exists(UPSTART_INITCTL) {
        Subsystem::Upstart
    } else {
        Subsystem::SystemV
    }
}

/// Subsystem for the build target, probing `fs` on Linux.
#[allow(unused_variables)]
pub fn detect(fs: &dyn Probe) -> Option<Subsystem> {
    #[cfg(target_os = "linux")]
    return Some(probe(fs));
    #[cfg(target_os = "macos")]
    return Some(Subsystem::Launchd);
    #[cfg(target_os = "freebsd")]
    return Some(Subsystem::RcD);
    #[cfg(target_os = "windows")]
    return Some(Subsystem::Scm);
    #[allow(unreachable_code)]
    None
}
