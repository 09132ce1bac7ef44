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

//! Option mutators for [`Config::new`](crate::Config::new).

use crate::config::{ConfigFile, ConfigOption, StartMode};
use crate::error::HandlerError;

pub fn name<S: Into<String>>(name: S) -> ConfigOption {
    let name = name.into();
    Box::new(move |c| c.name = name)
}

pub fn description<S: Into<String>>(description: S) -> ConfigOption {
    let description = description.into();
    Box::new(move |c| c.description = description)
}

pub fn dependencies<I, S>(dependencies: I) -> ConfigOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let dependencies: Vec<String> = dependencies.into_iter().map(Into::into).collect();
    Box::new(move |c| c.dependencies = dependencies)
}

pub fn pid_dir<S: Into<String>>(dir: S) -> ConfigOption {
    let dir = dir.into();
    Box::new(move |c| c.pid_dir = dir)
}

pub fn pid_name<S: Into<String>>(name: S) -> ConfigOption {
    let name = name.into();
    Box::new(move |c| c.pid_name = name)
}

pub fn start_run_levels(levels: &[u8]) -> ConfigOption {
    let levels = levels.to_vec();
    Box::new(move |c| c.start_run_levels = levels)
}

pub fn stop_run_levels(levels: &[u8]) -> ConfigOption {
    let levels = levels.to_vec();
    Box::new(move |c| c.stop_run_levels = levels)
}

pub fn template_linux_upstart<S: Into<String>>(template: S) -> ConfigOption {
    let template = template.into();
    Box::new(move |c| c.template_linux_upstart = template)
}

pub fn template_linux_systemv<S: Into<String>>(template: S) -> ConfigOption {
    let template = template.into();
    Box::new(move |c| c.template_linux_systemv = template)
}

pub fn template_linux_systemd<S: Into<String>>(template: S) -> ConfigOption {
    let template = template.into();
    Box::new(move |c| c.template_linux_systemd = template)
}

pub fn template_macos_plist<S: Into<String>>(template: S) -> ConfigOption {
    let template = template.into();
    Box::new(move |c| c.template_macos_plist = template)
}

pub fn template_freebsd_rcd<S: Into<String>>(template: S) -> ConfigOption {
    let template = template.into();
    Box::new(move |c| c.template_freebsd_rcd = template)
}

pub fn hide_methods_warning(hide: bool) -> ConfigOption {
    Box::new(move |c| c.hide_methods_warning = hide)
}

pub fn windows_start_mode(mode: StartMode) -> ConfigOption {
    Box::new(move |c| c.windows_start_mode = mode)
}

pub fn windows_account_name<S: Into<String>>(name: S) -> ConfigOption {
    let name = name.into();
    Box::new(move |c| c.windows_account_name = Some(name))
}

pub fn windows_account_password<S: Into<String>>(password: S) -> ConfigOption {
    let password = password.into();
    Box::new(move |c| c.windows_account_password = Some(password))
}

pub fn start_handler<F>(f: F) -> ConfigOption
where
    F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Box::new(move |c| c.start_handler = Some(Box::new(f)))
}

pub fn stop_handler<F>(f: F) -> ConfigOption
where
    F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Box::new(move |c| c.stop_handler = Some(Box::new(f)))
}

pub fn pause_handler<F>(f: F) -> ConfigOption
where
    F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Box::new(move |c| c.pause_handler = Some(Box::new(f)))
}

pub fn continue_handler<F>(f: F) -> ConfigOption
where
    F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Box::new(move |c| c.continue_handler = Some(Box::new(f)))
}

pub fn reload_handler<F>(f: F) -> ConfigOption
where
    F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Box::new(move |c| c.reload_handler = Some(Box::new(f)))
}

/// Blocking entry point; the default signal loop is skipped when set.
pub fn run_handler<F>(f: F) -> ConfigOption
where
    F: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Box::new(move |c| c.run_handler = Some(Box::new(f)))
}

pub fn error_sink<F>(f: F) -> ConfigOption
where
    F: Fn(&str) + Send + Sync + 'static,
{
    Box::new(move |c| c.error_sink = Some(Box::new(f)))
}

pub fn info_sink<F>(f: F) -> ConfigOption
where
    F: Fn(&str) + Send + Sync + 'static,
{
    Box::new(move |c| c.info_sink = Some(Box::new(f)))
}

/// Applies every key present in a parsed configuration file.
pub fn file(file: ConfigFile) -> ConfigOption {
    Box::new(move |c| file.apply_to(c))
}
