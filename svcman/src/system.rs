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

//! Access to the host: files below a root directory and external commands.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::error::{DaemonError, Result};

/// Captured result of an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands. Replaced by a scripted fake in tests.
pub trait CommandRunner: Send + Sync {
    /// Spawns `program` and waits for it. `Err` only when it could not run.
    fn output(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;
}

/// Spawns real processes.
pub struct HostRunner;

impl CommandRunner for HostRunner {
    fn output(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        log::debug!("Executing {} {:?}", program, args);
        let output = Command::new(program).args(args).output()?;
        log::debug!("{} exited with {:?}", program, output.status.code());
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        })
    }
}

/// Tells whether a path exists. Used by the subsystem probe.
pub trait Probe {
    fn exists(&self, path: &str) -> bool;
}

/// Filesystem root plus command runner the drivers operate on.
#[derive(Clone)]
pub struct System {
    root: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl System {
    pub fn host() -> Self {
        System {
            root: PathBuf::from("/"),
            runner: Arc::new(HostRunner),
        }
    }

    /// Resolves every absolute path below `root` and runs commands with `runner`.
    pub fn with_root<P: Into<PathBuf>>(root: P, runner: Arc<dyn CommandRunner>) -> Self {
        System {
            root: root.into(),
            runner,
        }
    }

    /// Maps an absolute host path below the root.
    pub fn path(&self, abs: &str) -> PathBuf {
        self.root.join(abs.trim_start_matches('/'))
    }

    pub fn exists(&self, abs: &str) -> bool {
        self.path(abs).exists()
    }

    pub fn read_to_string(&self, abs: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path(abs))?)
    }

    /// Creates (or truncates) `abs` with `contents`, optionally chmod'ing it.
    pub fn write_file(&self, abs: &str, contents: &str, mode: Option<u32>) -> Result<()> {
        let target = self.path(abs);
        fs::write(&target, contents)?;
        if let Some(mode) = mode {
            set_mode(&target, mode)?;
        }
        Ok(())
    }

    pub fn remove_file(&self, abs: &str) -> Result<()> {
        Ok(fs::remove_file(self.path(abs))?)
    }

    /// Creates `link` pointing at `target`. The link target is stored as the
    /// host path, not the root-relative one.
    #[cfg(unix)]
    pub fn symlink(&self, target: &str, link: &str) -> Result<()> {
        Ok(std::os::unix::fs::symlink(target, self.path(link))?)
    }

    /// Output of a command regardless of its exit status.
    pub fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        Ok(self.runner.output(program, args)?)
    }

    /// Runs a command and fails unless it exits with 0.
    pub fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        let output = self.output(program, args)?;
        if output.success() {
            Ok(())
        } else {
            Err(DaemonError::CommandFailed {
                command: std::iter::once(program)
                    .chain(args.iter().copied())
                    .collect::<Vec<_>>()
                    .join(" "),
                code: output.code.unwrap_or(-1),
            })
        }
    }

    /// Succeeds when the effective group is root.
    pub fn check_privileges(&self) -> Result<()> {
        let output = match self.output("id", &["-g"]) {
            Ok(output) if output.success() => output,
            _ => return Err(DaemonError::UnsupportedPlatform),
        };
        match output.stdout.trim().parse::<u32>() {
            Ok(0) => Ok(()),
            Ok(_) => Err(DaemonError::InsufficientPrivileges),
            Err(_) => Err(DaemonError::UnsupportedPlatform),
        }
    }

    /// Binary named `name` on the search path if it exists on disk, else the
    /// running executable.
    pub fn executable_path(&self, name: &str) -> Result<String> {
        if let Ok(found) = which::which(name) {
            if found.exists() {
                return Ok(found.to_string_lossy().to_string());
            }
        }
        Ok(std::env::current_exe()?.to_string_lossy().to_string())
    }
}

impl Probe for System {
    fn exists(&self, path: &str) -> bool {
        System::exists(self, path)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::io;
    use std::sync::Mutex;

    use super::{CommandOutput, CommandRunner};

    /// Replays canned outputs keyed by the full command line and records
    /// every invocation.
    #[derive(Default)]
    pub struct ScriptedRunner {
        pub replies: Mutex<HashMap<String, CommandOutput>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn reply(&self, cmdline: &str, code: i32, stdout: &str) {
            self.replies.lock().unwrap().insert(
                cmdline.to_string(),
                CommandOutput {
                    code: Some(code),
                    stdout: stdout.to_string(),
                },
            );
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn output(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
            let cmdline = std::iter::once(program)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" ");
            self.calls.lock().unwrap().push(cmdline.clone());
            match self.replies.lock().unwrap().get(&cmdline) {
                Some(reply) => Ok(reply.clone()),
                None => Ok(CommandOutput {
                    code: Some(0),
                    stdout: String::new(),
                }),
            }
        }
    }
}
