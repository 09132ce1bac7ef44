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

const RC_CONF: &str = "/etc/rc.conf";

lazy_static! {
    static ref IS_RUNNING: Regex = Regex::new("is running").unwrap();
    static ref PID: Regex = Regex::new("pid ([0-9]+)").unwrap();
}

pub(crate) struct RcD {
    config: Arc<Config>,
    system: Arc<System>,
}

/// Whether `rc_conf` enables `name`.
///
/// Only the first line mentioning `<name>_enable="YES"` counts. It enables
/// the service when its first character other than a space is not `#`, so
/// a commented-out line ahead of a real one still reads as disabled.
pub(crate) fn rc_enabled(rc_conf: &str, name: &str) -> bool {
    let re = match Regex::new(&format!(r#".*{}_enable="YES".*"#, regex::escape(name))) {
        Ok(re) => re,
        Err(_) => return false,
    };
    let line = re.find(rc_conf).map(|m| m.as_str()).unwrap_or_default();
    match line.chars().find(|c| *c != ' ') {
        Some('#') | None => false,
        Some(_) => true,
    }
}

impl RcD {
    pub(crate) fn new(config: Arc<Config>, system: Arc<System>) -> Self {
        RcD { config, system }
    }

    fn enabled(&self) -> bool {
        match self.system.read_to_string(RC_CONF) {
            Ok(rc_conf) => rc_enabled(&rc_conf, &self.config.name),
            Err(e) => {
                log::warn!("Error opening {}: {}", RC_CONF, e);
                false
            }
        }
    }

    /// `verb`, or `one<verb>` when rc.conf does not enable the service.
    fn cmd(&self, verb: &str) -> String {
        if self.enabled() {
            verb.to_string()
        } else {
            log::info!("Daemon is not enabled, using one{} instead", verb);
            format!("one{}", verb)
        }
    }

    fn service(&self, verb: &str) -> Result<()> {
        self.system.run("service", &[&self.config.name, &self.cmd(verb)])
    }
}

impl Driver for RcD {
    fn path(&self) -> String {
        format!("/usr/local/etc/rc.d/{}", self.config.name)
    }

    fn installed(&self) -> bool {
        self.system.exists(&self.path())
    }

    fn running(&self) -> (String, bool) {
        check_running(
            &self.system,
            &IS_RUNNING,
            &PID,
            "service",
            &[&self.config.name, &self.cmd("status")],
        )
    }

    fn install(&self, args: &[String]) -> Result<()> {
        let ctx = template_context(&self.config, &self.system, args, true)?;
        let script = templates::render(&self.config.template_freebsd_rcd, &ctx)?;
        self.system.write_file(&self.path(), &script, Some(0o755))
    }

    fn uninstall(&self) -> Result<()> {
        self.system.remove_file(&self.path())
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
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::sync::Arc;

    use super::*;
    use crate::options;
    use crate::system::fake::ScriptedRunner;

    #[test]
    fn test_rc_enabled() {
        assert!(rc_enabled("echod_enable=\"YES\"\n", "echod"));
        assert!(rc_enabled("sshd_enable=\"YES\"\n  echod_enable=\"YES\"\n", "echod"));
        assert!(!rc_enabled("# echod_enable=\"YES\"\n", "echod"));
        assert!(!rc_enabled("   #echod_enable=\"YES\"\n", "echod"));
        assert!(!rc_enabled("echod_enable=\"NO\"\n", "echod"));
        assert!(!rc_enabled("", "echod"));
    }

    #[test]
    fn test_rc_enabled_first_match_only() {
        let rc_conf = "#echod_enable=\"YES\"\nechod_enable=\"YES\"\n";
        assert!(!rc_enabled(rc_conf, "echod"));
    }

    fn driver(rc_conf: Option<&str>) -> (tempfile::TempDir, Arc<ScriptedRunner>, RcD) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("usr/local/etc/rc.d")).unwrap();
        if let Some(rc_conf) = rc_conf {
            fs::create_dir_all(dir.path().join("etc")).unwrap();
            fs::write(dir.path().join("etc/rc.conf"), rc_conf).unwrap();
        }
        let runner = Arc::new(ScriptedRunner::default());
        let system = Arc::new(System::with_root(dir.path(), runner.clone()));
        let config = Arc::new(Config::new(vec![options::name("echod")]));
        (dir, runner, RcD::new(config, system))
    }

    #[test]
    fn test_one_prefix_when_not_enabled() {
        let (_dir, runner, d) = driver(None);
        d.start().unwrap();
        let (_dir2, runner2, d2) = driver(Some("echod_enable=\"YES\"\n"));
        d2.start().unwrap();
        assert_eq!(runner.calls(), vec!["service echod onestart"]);
        assert_eq!(runner2.calls(), vec!["service echod start"]);
    }

    #[test]
    fn test_running() {
        let (_dir, runner, d) = driver(Some("echod_enable=\"YES\"\n"));
        runner.reply("service echod status", 0, "echod is running as pid 5150.\n");
        assert_eq!(d.running(), ("Service (pid  5150) is running...".to_string(), true));
        runner.reply("service echod status", 1, "echod is not running.\n");
        assert!(!d.running().1);
    }

    #[test]
    fn test_install_script() {
        let (dir, _runner, d) = driver(None);
        d.install(&[]).unwrap();
        let script = fs::read_to_string(dir.path().join("usr/local/etc/rc.d/echod")).unwrap();
        assert!(script.contains("rcvar=\"echod_enable\""));
        assert!(script.contains("pidfile=\"/run/echod.pid\""));
        assert!(!d.can_reload());
    }
}
