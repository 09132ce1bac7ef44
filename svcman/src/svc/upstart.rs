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

use super::{check_running, literal, template_context, Driver, STATUS_STOPPED};
use crate::config::Config;
use crate::error::Result;
use crate::system::System;
use crate::templates::{self, run_levels};

lazy_static! {
    static ref PROCESS: Regex = Regex::new("process ([0-9]+)").unwrap();
}

pub(crate) struct Upstart {
    config: Arc<Config>,
    system: Arc<System>,
}

impl Upstart {
    pub(crate) fn new(config: Arc<Config>, system: Arc<System>) -> Self {
        Upstart { config, system }
    }
}

impl Driver for Upstart {
    fn path(&self) -> String {
        format!("/etc/init/{}.conf", self.config.name)
    }

    fn installed(&self) -> bool {
        self.system.exists(&self.path())
    }

    fn running(&self) -> (String, bool) {
        match literal(&format!("{} start/running", self.config.name)) {
            Some(marker) => check_running(
                &self.system,
                &marker,
                &PROCESS,
                "service",
                &[&self.config.name, "status"],
            ),
            None => (STATUS_STOPPED.to_string(), false),
        }
    }

    fn install(&self, args: &[String]) -> Result<()> {
        let mut ctx = template_context(&self.config, &self.system, args, true)?;
        ctx.start_run_levels = run_levels(&self.config.start_run_levels, "");
        ctx.stop_run_levels = run_levels(&self.config.stop_run_levels, "");
        let job = templates::render(&self.config.template_linux_upstart, &ctx)?;
        self.system.write_file(&self.path(), &job, Some(0o755))
    }

    fn uninstall(&self) -> Result<()> {
        self.system.remove_file(&self.path())
    }

    fn start(&self) -> Result<()> {
        self.system.run("start", &[&self.config.name])
    }

    fn stop(&self) -> Result<()> {
        self.system.run("stop", &[&self.config.name])
    }

    fn restart(&self) -> Result<()> {
        self.system.run("restart", &[&self.config.name])
    }

    fn can_reload(&self) -> bool {
        true
    }

    fn reload(&self) -> Result<()> {
        self.system.run("reload", &[&self.config.name])
    }
}
