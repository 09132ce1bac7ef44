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

#![cfg(unix)]

use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};

use svcman::{options, CommandOutput, CommandRunner, Config, Daemon, DaemonError, Subsystem, System};

#[derive(Default)]
struct Host {
    replies: Mutex<HashMap<String, (i32, String)>>,
    calls: Mutex<Vec<String>>,
}

impl Host {
    fn reply(&self, cmdline: &str, code: i32, stdout: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(cmdline.to_string(), (code, stdout.to_string()));
    }

    fn ran(&self, cmdline: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == cmdline)
    }
}

impl CommandRunner for Host {
    fn output(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let mut cmdline = vec![program];
        cmdline.extend_from_slice(args);
        let cmdline = cmdline.join(" ");
        self.calls.lock().unwrap().push(cmdline.clone());
        let (code, stdout) = self
            .replies
            .lock()
            .unwrap()
            .get(&cmdline)
            .cloned()
            .unwrap_or((0, String::new()));
        Ok(CommandOutput {
            code: Some(code),
            stdout,
        })
    }
}

struct Fixture {
    root: tempfile::TempDir,
    host: Arc<Host>,
    daemon: Daemon,
}

fn setup(kind: Subsystem) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    for dir in [
        "etc/systemd/system",
        "etc/init",
        "etc/init.d",
        "etc/rc0.d",
        "etc/rc1.d",
        "etc/rc2.d",
        "etc/rc3.d",
        "etc/rc4.d",
        "etc/rc5.d",
        "etc/rc6.d",
        "Library/LaunchDaemons",
        "usr/local/etc/rc.d",
    ] {
        fs::create_dir_all(root.path().join(dir)).unwrap();
    }
    let host = Arc::new(Host::default());
    host.reply("id -g", 0, "0\n");

    let config = Config::new(vec![
        options::name("echod"),
        options::description("Echo daemon"),
        options::start_handler(|| Ok(())),
        options::stop_handler(|| Ok(())),
        options::hide_methods_warning(true),
    ]);
    let system = System::with_root(root.path(), host.clone());
    let daemon = Daemon::with_system(config, system, kind).unwrap();
    Fixture { root, host, daemon }
}

#[test]
fn install_then_uninstall() {
    for kind in [
        Subsystem::SystemD,
        Subsystem::SystemV,
        Subsystem::Upstart,
        Subsystem::Launchd,
        Subsystem::RcD,
    ] {
        let f = setup(kind);
        assert!(!f.daemon.installed(), "{}", kind);
        let outcome = f.daemon.install(&["--port".to_string(), "9977".to_string()]);
        assert!(outcome.is_ok(), "{}: {:?}", kind, outcome.result);
        assert!(f.daemon.installed(), "{}", kind);

        let uninstalled = f.daemon.uninstall();
        assert!(uninstalled.is_ok(), "{}: {:?}", kind, uninstalled.result);
        assert!(!f.daemon.installed(), "{}", kind);
    }
}

#[test]
fn systemd_unit_contents() {
    let f = setup(Subsystem::SystemD);
    assert!(f.daemon.install(&["-c".to_string(), "/etc/echo d.toml".to_string()]).is_ok());
    let unit = fs::read_to_string(f.root.path().join("etc/systemd/system/echod.service")).unwrap();
    assert!(unit.contains("Description=Echo daemon"));
    assert!(unit.contains("-c '/etc/echo d.toml'"));
    assert!(f.host.ran("systemctl daemon-reload"));
    assert!(f.host.ran("systemctl enable echod.service"));
}

#[test]
fn systemv_run_level_links() {
    let f = setup(Subsystem::SystemV);
    assert!(f.daemon.install(&[]).is_ok());
    for lvl in 2..=5 {
        let link = f.root.path().join(format!("etc/rc{}.d/S87echod", lvl));
        assert_eq!(
            fs::read_link(link).unwrap().to_str(),
            Some("/etc/init.d/echod")
        );
    }
    for lvl in [0, 1, 6] {
        let link = f.root.path().join(format!("etc/rc{}.d/K17echod", lvl));
        assert!(fs::symlink_metadata(link).is_ok());
    }
}

#[test]
fn start_when_running_issues_nothing() {
    let f = setup(Subsystem::SystemD);
    assert!(f.daemon.install(&[]).is_ok());
    f.host.reply(
        "systemctl status echod.service",
        0,
        "Active: active (running)\nMain PID: 31337 (echod)\n",
    );
    let outcome = f.daemon.start();
    assert!(matches!(outcome.result, Err(DaemonError::AlreadyRunning)));
    assert!(outcome.message.contains("FAILED"));
    assert!(!f.host.ran("systemctl start echod.service"));
    assert_eq!(f.daemon.status().message, "Service (pid  31337) is running...");
}

#[test]
fn stop_when_stopped() {
    let f = setup(Subsystem::Upstart);
    assert!(f.daemon.install(&[]).is_ok());
    f.host.reply("service echod status", 0, "echod stop/waiting\n");
    assert!(matches!(f.daemon.stop().result, Err(DaemonError::AlreadyStopped)));
    assert!(!f.host.ran("stop echod"));
}

#[test]
fn reload_requires_running_service() {
    let f = setup(Subsystem::SystemD);
    assert!(f.daemon.install(&[]).is_ok());
    f.host.reply("systemctl status echod.service", 3, "Active: inactive (dead)\n");
    assert!(matches!(f.daemon.reload().result, Err(DaemonError::NotStarted)));
    assert!(!f.host.ran("systemctl reload echod.service"));
}

#[test]
fn reload_unsupported_on_launchd() {
    let f = setup(Subsystem::Launchd);
    assert!(f.daemon.install(&[]).is_ok());
    assert!(matches!(
        f.daemon.reload().result,
        Err(DaemonError::UnsupportedPlatform)
    ));
}

#[test]
fn unprivileged_caller_is_refused() {
    let f = setup(Subsystem::SystemD);
    f.host.reply("id -g", 0, "1000\n");
    assert!(matches!(
        f.daemon.install(&[]).result,
        Err(DaemonError::InsufficientPrivileges)
    ));
    assert!(!f.daemon.installed());
}

#[test]
fn invalid_config_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let system = System::with_root(root.path(), Arc::new(Host::default()));
    let config = Config::new(vec![
        options::start_handler(|| Ok(())),
        options::hide_methods_warning(true),
    ]);
    assert!(matches!(
        Daemon::with_system(config, system, Subsystem::SystemD),
        Err(DaemonError::RequiredHandlersMissing { .. })
    ));
}
