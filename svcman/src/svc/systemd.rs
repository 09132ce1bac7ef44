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

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use super::{check_running, template_context, Driver};
use crate::config::Config;
use crate::error::Result;
use crate::system::System;
use crate::templates;

lazy_static! {
    static ref ACTIVE: Regex = Regex::new("Active: active").unwrap();
    static ref MAIN_PID: Regex = Regex::new("Main PID: ([0-9]+)").unwrap();
}

pub(crate) struct SystemD {
    config: Arc<Config>,
    system: Arc<System>,
}

impl SystemD {
    pub(crate) fn new(config: Arc<Config>, system: Arc<System>) -> Self {
        SystemD { config, system }
    }

    fn unit(&self) -> String {
        format!("{}.service", self.config.name)
    }

    fn systemctl(&self, verb: &str) -> Result<()> {
        self.system.run("systemctl", &[verb, &self.unit()])
    }
}

impl Driver for SystemD {
    fn path(&self) -> String {
        format!("/etc/systemd/system/{}", self.unit())
    }

    fn installed(&self) -> bool {
        self.system.exists(&self.path())
    }

    fn running(&self) -> (String, bool) {
        check_running(
            &self.system,
            &ACTIVE,
            &MAIN_PID,
            "systemctl",
            &["status", &self.unit()],
        )
    }

    fn install(&self, args: &[String]) -> Result<()> {
        let ctx = template_context(&self.config, &self.system, args, true)?;
        let unit = templates::render(&self.config.template_linux_systemd, &ctx)?;
        self.system.write_file(&self.path(), &unit, None)?;

        self.system.run("systemctl", &["daemon-reload"])?;
        self.systemctl("enable")
    }

    fn uninstall(&self) -> Result<()> {
        self.systemctl("disable")?;
        self.system.remove_file(&self.path())?;
        self.system.run("systemctl", &["daemon-reload"])
    }

    fn start(&self) -> Result<()> {
        self.systemctl("start")
    }

    fn stop(&self) -> Result<()> {
        self.systemctl("stop")
    }

    fn restart(&self) -> Result<()> {
        self.systemctl("restart")
    }

    fn can_reload(&self) -> bool {
        true
    }

    fn reload(&self) -> Result<()> {
        self.systemctl("reload")
    }
}
