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
use crate::templates;

lazy_static! {
    static ref PID: Regex = Regex::new(r#""PID" = ([0-9]+);"#).unwrap();
}

pub(crate) struct Launchd {
    config: Arc<Config>,
    system: Arc<System>,
}

impl Launchd {
    pub(crate) fn new(config: Arc<Config>, system: Arc<System>) -> Self {
        Launchd { config, system }
    }

    fn launchctl(&self, verb: &str) -> Result<()> {
        self.system.run("launchctl", &[verb, &self.path()])
    }
}

impl Driver for Launchd {
    fn path(&self) -> String {
        format!("/Library/LaunchDaemons/{}.plist", self.config.name)
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
                "launchctl",
                &["list", &self.config.name],
            ),
            None => (STATUS_STOPPED.to_string(), false),
        }
    }

    fn install(&self, args: &[String]) -> Result<()> {
        // plist strings are not shell interpreted
        let ctx = template_context(&self.config, &self.system, args, false)?;
        let plist = templates::render(&self.config.template_macos_plist, &ctx)?;
        self.system.write_file(&self.path(), &plist, None)
    }

    fn uninstall(&self) -> Result<()> {
        self.system.remove_file(&self.path())
    }

    fn start(&self) -> Result<()> {
        self.launchctl("load")
    }

    fn stop(&self) -> Result<()> {
        self.launchctl("unload")
    }

    fn restart(&self) -> Result<()> {
        self.launchctl("unload")?;
        self.launchctl("load")
    }
}
