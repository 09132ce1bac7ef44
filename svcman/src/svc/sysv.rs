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
    static ref PID: Regex = Regex::new(r"pid\s+([0-9]+)").unwrap();
}

pub(crate) struct SystemV {
    config: Arc<Config>,
    system: Arc<System>,
}

impl SystemV {
    pub(crate) fn new(config: Arc<Config>, system: Arc<System>) -> Self {
        SystemV { config, system }
    }

    fn service(&self, verb: &str) -> Result<()> {
        self.system.run("service", &[&self.config.name, verb])
    }

    /// Every run-level symlink: `S87<name>` per start level, then
    /// `K17<name>` per stop level.
    pub(crate) fn links(&self) -> Vec<String> {
        let start = self
            .config
            .start_run_levels
            .iter()
            .map(|lvl| format!("/etc/rc{}.d/S87{}", lvl, self.config.name));
        let stop = self
            .config
            .stop_run_levels
            .iter()
            .map(|lvl| format!("/etc/rc{}.d/K17{}", lvl, self.config.name));
        start.chain(stop).collect()
    }
}

impl Driver for SystemV {
    fn path(&self) -> String {
        format!("/etc/init.d/{}", self.config.name)
    }

    fn installed(&self) -> bool {
        self.system.exists(&self.path())
    }

    fn running(&self) -> (String, bool) {
        match literal(&self.config.name) {
            Some(marker) => check_running(
                &self.system,
                &marker,
                &PID,
                "service",
                &[&self.config.name, "status"],
            ),
            None => (STATUS_STOPPED.to_string(), false),
        }
    }

    fn install(&self, args: &[String]) -> Result<()> {
        let srv_path = self.path();
        let mut ctx = template_context(&self.config, &self.system, args, true)?;
        ctx.start_run_levels = run_levels(&self.config.start_run_levels, " ");
        ctx.stop_run_levels = run_levels(&self.config.stop_run_levels, " ");
        let script = templates::render(&self.config.template_linux_systemv, &ctx)?;
        self.system.write_file(&srv_path, &script, Some(0o755))?;

        // Missing rc directories or stale links do not fail the install.
        for link in self.links() {
            if let Err(e) = self.system.symlink(&srv_path, &link) {
                log::warn!("Skipping run level link {}: {}", link, e);
            }
        }
        Ok(())
    }

    fn uninstall(&self) -> Result<()> {
        self.system.remove_file(&self.path())?;
        for link in self.links() {
            if let Err(e) = self.system.remove_file(&link) {
                log::debug!("Run level link {} not removed: {}", link, e);
            }
        }
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.service("start")
    }

    fn stop(&self) -> Result<()> {
        self.service("stop")
    }

    fn restart(&self) -> Result<()> {
        self.service("restart")
    }

    fn can_reload(&self) -> bool {
        true
    }

    fn reload(&self) -> Result<()> {
        self.service("reload")
    }
}
