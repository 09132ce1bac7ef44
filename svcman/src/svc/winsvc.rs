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

// Service dispatch follows the windows-service crate example
// Licensed under Apache-2.0

use std::ffi::{OsStr, OsString};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use windows_service::service::{
    Service, ServiceAccess, ServiceAction, ServiceActionType, ServiceControl,
    ServiceControlAccept, ServiceDependency, ServiceErrorControl, ServiceExitCode,
    ServiceFailureActions, ServiceFailureResetPeriod, ServiceInfo, ServiceStartType,
    ServiceState, ServiceStatus, ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult, ServiceStatusHandle};
use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};
use windows_service::{define_windows_service, service_dispatcher};
use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ};
use winreg::RegKey;

use super::Driver;
use crate::config::{Config, StartMode};
use crate::control::{ControlEvent, Controller, LogReporter, State, StatusReporter};
use crate::error::{DaemonError, Result};

const SERVICE_TYPE: ServiceType = ServiceType::OWN_PROCESS;
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(20000);
const PAUSE_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_TICK: Duration = Duration::from_millis(50);
// ERROR_FAILED_SERVICE_CONTROLLER_CONNECT
const NOT_A_SERVICE: i32 = 1063;

fn scm(e: windows_service::Error) -> DaemonError {
    let msg = match &e {
        windows_service::Error::Winapi(source) => format!("{}: {}", e, source),
        _ => e.to_string(),
    };
    DaemonError::Scm { msg }
}

/// The dispatcher refuses processes the SCM did not start, e.g. one run
/// from a console.
fn started_from_console(e: &windows_service::Error) -> bool {
    matches!(
        e,
        windows_service::Error::Winapi(source) if source.raw_os_error() == Some(NOT_A_SERVICE)
    )
}

pub(crate) fn state_name(state: ServiceState) -> &'static str {
    #[allow(unreachable_patterns)]
    match state {
        ServiceState::Stopped => "SERVICE_STOPPED",
        ServiceState::StartPending => "SERVICE_START_PENDING",
        ServiceState::StopPending => "SERVICE_STOP_PENDING",
        ServiceState::Running => "SERVICE_RUNNING",
        ServiceState::ContinuePending => "SERVICE_CONTINUE_PENDING",
        ServiceState::PausePending => "SERVICE_PAUSE_PENDING",
        ServiceState::Paused => "SERVICE_PAUSED",
        _ => "SERVICE_UNKNOWN",
    }
}

/// Stop timeout configured for the machine, see KB146092.
fn stop_timeout() -> Duration {
    RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey_with_flags(r"SYSTEM\CurrentControlSet\Control", KEY_READ)
        .and_then(|key| key.get_value::<String, _>("WaitToKillServiceTimeout"))
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_STOP_TIMEOUT)
}

/// Polls until the service reaches `to`, giving up after `timeout`.
fn wait_for(service: &Service, mut status: ServiceStatus, to: ServiceState, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout + POLL_TICK * 2;
    while status.current_state != to {
        if Instant::now() >= deadline {
            return Err(DaemonError::Scm {
                msg: format!("timed out waiting for {}", state_name(to)),
            });
        }
        thread::sleep(POLL_TICK);
        status = service.query_status().map_err(scm)?;
    }
    Ok(())
}

fn start_type(mode: StartMode) -> ServiceStartType {
    match mode {
        StartMode::Auto => ServiceStartType::AutoStart,
        StartMode::OnDemand => ServiceStartType::OnDemand,
        StartMode::Disabled => ServiceStartType::Disabled,
        StartMode::Boot => ServiceStartType::BootStart,
        StartMode::System => ServiceStartType::SystemStart,
    }
}

pub(crate) struct Scm {
    config: Arc<Config>,
}

impl Scm {
    pub(crate) fn new(config: Arc<Config>) -> Self {
        Scm { config }
    }

    fn open(&self, access: ServiceAccess) -> Result<Service> {
        let manager = ServiceManager::local_computer(None::<&str>, ServiceManagerAccess::CONNECT)
            .map_err(scm)?;
        manager.open_service(&self.config.name, access).map_err(scm)
    }

    fn query(&self) -> Result<ServiceState> {
        let service = self.open(ServiceAccess::QUERY_STATUS)?;
        Ok(service.query_status().map_err(scm)?.current_state)
    }
}

impl Driver for Scm {
    fn path(&self) -> String {
        self.config.name.clone()
    }

    fn installed(&self) -> bool {
        self.open(ServiceAccess::QUERY_STATUS).is_ok()
    }

    fn running(&self) -> (String, bool) {
        match self.query() {
            Ok(state) => (state_name(state).to_string(), state == ServiceState::Running),
            Err(_) => ("SERVICE_UNKNOWN".to_string(), false),
        }
    }

    fn status(&self) -> Result<String> {
        let state = self.query()?;
        Ok(format!("Status {}:{}", self.config.description, state_name(state)))
    }

    fn install(&self, args: &[String]) -> Result<()> {
        let manager_access = ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE;
        let manager = ServiceManager::local_computer(None::<&str>, manager_access).map_err(scm)?;

        let service_info = ServiceInfo {
            name: OsString::from(&self.config.name),
            display_name: OsString::from(&self.config.name),
            service_type: SERVICE_TYPE,
            start_type: start_type(self.config.windows_start_mode),
            error_control: ServiceErrorControl::Normal,
            executable_path: std::env::current_exe()?,
            launch_arguments: args.iter().map(OsString::from).collect(),
            dependencies: self
                .config
                .dependencies
                .iter()
                .map(|d| ServiceDependency::Service(OsString::from(d)))
                .collect(),
            account_name: self.config.windows_account_name.as_ref().map(OsString::from),
            account_password: self
                .config
                .windows_account_password
                .as_ref()
                .map(OsString::from),
        };
        let service = manager
            .create_service(&service_info, ServiceAccess::CHANGE_CONFIG | ServiceAccess::START)
            .map_err(scm)?;
        service
            .set_description(&self.config.description)
            .map_err(scm)?;

        // Restart after 5 seconds for the first 3 failures, after 1 minute
        // afterwards. The failure count resets after a day.
        let restart = |secs| ServiceAction {
            action_type: ServiceActionType::Restart,
            delay: Duration::from_secs(secs),
        };
        service
            .update_failure_actions(ServiceFailureActions {
                reset_period: ServiceFailureResetPeriod::After(Duration::from_secs(86400)),
                reboot_msg: None,
                command: None,
                actions: Some(vec![restart(5), restart(5), restart(5), restart(60)]),
            })
            .map_err(scm)
    }

    fn uninstall(&self) -> Result<()> {
        self.open(ServiceAccess::DELETE)?.delete().map_err(scm)
    }

    fn start(&self) -> Result<()> {
        self.open(ServiceAccess::START)?
            .start(&[] as &[&OsStr])
            .map_err(scm)
    }

    fn stop(&self) -> Result<()> {
        let service = self.open(ServiceAccess::STOP | ServiceAccess::QUERY_STATUS)?;
        let status = service.stop().map_err(scm)?;
        wait_for(&service, status, ServiceState::Stopped, stop_timeout())
    }

    fn restart(&self) -> Result<()> {
        let service =
            self.open(ServiceAccess::STOP | ServiceAccess::START | ServiceAccess::QUERY_STATUS)?;
        let status = service.stop().map_err(scm)?;
        wait_for(&service, status, ServiceState::Stopped, stop_timeout())?;
        service.start(&[] as &[&OsStr]).map_err(scm)
    }

    fn can_pause(&self) -> bool {
        true
    }

    fn pause(&self) -> Result<()> {
        let service = self.open(ServiceAccess::PAUSE_CONTINUE | ServiceAccess::QUERY_STATUS)?;
        let status = service.pause().map_err(scm)?;
        wait_for(&service, status, ServiceState::Paused, PAUSE_TIMEOUT)
    }

    fn resume(&self) -> Result<()> {
        let service = self.open(ServiceAccess::PAUSE_CONTINUE | ServiceAccess::QUERY_STATUS)?;
        let status = service.resume().map_err(scm)?;
        wait_for(&service, status, ServiceState::Running, PAUSE_TIMEOUT)
    }
}

lazy_static! {
    static ref SERVICE: Mutex<Option<Arc<Config>>> = Mutex::new(None);
    static ref OUTCOME: Mutex<Option<Result<()>>> = Mutex::new(None);
}

define_windows_service!(ffi_service_main, service_main);

/// Hands the process to the service control manager and blocks until the
/// service stops. Outside the SCM the service runs in the console until
/// Ctrl+C or the console closes.
pub(crate) fn run(config: Arc<Config>) -> Result<()> {
    let name = config.name.clone();
    if let Ok(mut slot) = SERVICE.lock() {
        *slot = Some(config.clone());
    }
    match service_dispatcher::start(&name, ffi_service_main) {
        Ok(()) => {}
        Err(e) if started_from_console(&e) => {
            log::info!(
                "{} is not running under the service manager, using the console",
                name
            );
            return run_console(&config);
        }
        Err(e) => return Err(scm(e)),
    }
    match OUTCOME.lock() {
        Ok(mut slot) => slot.take().unwrap_or(Ok(())),
        Err(_) => Ok(()),
    }
}

fn run_console(config: &Config) -> Result<()> {
    let (tx, rx) = crossbeam_channel::unbounded();
    ctrlc::set_handler(move || {
        if tx.send(ControlEvent::Stop).is_err() {
            log::debug!("Console stop after the service ended");
        }
    })
    .map_err(|e| DaemonError::Scm {
        msg: format!("console control handler: {}", e),
    })?;
    Controller::new(config, &mut LogReporter).run(&rx)
}

fn service_main(_args: Vec<OsString>) {
    let config = match SERVICE.lock().ok().and_then(|slot| slot.clone()) {
        Some(config) => config,
        None => return,
    };
    let result = run_service(&config);
    if let Err(e) = &result {
        config.error(&format!("execute: {}", e));
    }
    if let Ok(mut slot) = OUTCOME.lock() {
        *slot = Some(result);
    }
}

struct ScmReporter {
    handle: ServiceStatusHandle,
    accepts: ServiceControlAccept,
}

impl StatusReporter for ScmReporter {
    fn report(&mut self, state: State) {
        let (current_state, controls_accepted) = match state {
            State::Starting => (ServiceState::StartPending, ServiceControlAccept::empty()),
            State::Running => (ServiceState::Running, self.accepts),
            State::Paused => (ServiceState::Paused, self.accepts),
            State::Stopping => (ServiceState::StopPending, ServiceControlAccept::empty()),
            State::Stopped => (ServiceState::Stopped, ServiceControlAccept::empty()),
        };
        let status = ServiceStatus {
            service_type: SERVICE_TYPE,
            current_state,
            controls_accepted,
            exit_code: ServiceExitCode::Win32(0),
            checkpoint: 0,
            wait_hint: Duration::default(),
            process_id: None,
        };
        if let Err(e) = self.handle.set_service_status(status) {
            log::warn!("Failed to report {:?} to the service manager: {}", state, e);
        }
    }
}

fn run_service(config: &Config) -> Result<()> {
    let (tx, rx) = crossbeam_channel::unbounded();

    let event_handler = move |control_event| -> ServiceControlHandlerResult {
        let (event, result) = match control_event {
            // Always NoError, the controller re-reports the current state.
            ServiceControl::Interrogate => (ControlEvent::Interrogate, ServiceControlHandlerResult::NoError),
            ServiceControl::Stop | ServiceControl::Shutdown => {
                (ControlEvent::Stop, ServiceControlHandlerResult::NoError)
            }
            ServiceControl::Pause => (ControlEvent::Pause, ServiceControlHandlerResult::NoError),
            ServiceControl::Continue => (ControlEvent::Continue, ServiceControlHandlerResult::NoError),
            other => (
                ControlEvent::Unknown(format!("{:?}", other)),
                ServiceControlHandlerResult::NotImplemented,
            ),
        };
        if tx.send(event).is_err() {
            return ServiceControlHandlerResult::NotImplemented;
        }
        result
    };

    let handle = service_control_handler::register(&config.name, event_handler).map_err(scm)?;

    let mut accepts = ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN;
    if config.can_pause() {
        accepts |= ServiceControlAccept::PAUSE_CONTINUE;
    }
    let mut reporter = ScmReporter { handle, accepts };
    Controller::new(config, &mut reporter).run(&rx)
}

#[cfg(test)]
mod test {
    use std::io;

    use super::*;

    #[test]
    fn test_console_detection() {
        let console = windows_service::Error::Winapi(io::Error::from_raw_os_error(NOT_A_SERVICE));
        assert!(started_from_console(&console));

        // ERROR_ACCESS_DENIED
        let denied = windows_service::Error::Winapi(io::Error::from_raw_os_error(5));
        assert!(!started_from_console(&denied));
        assert!(!started_from_console(&windows_service::Error::ServiceNameHasNulByte));
    }

    #[test]
    fn test_scm_error_keeps_os_message() {
        let err = scm(windows_service::Error::Winapi(io::Error::from_raw_os_error(5)));
        let msg = err.to_string();
        assert!(msg.starts_with("service control manager: IO error in winapi call: "));
        assert!(msg.len() > "service control manager: IO error in winapi call: ".len());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(state_name(ServiceState::Running), "SERVICE_RUNNING");
        assert_eq!(state_name(ServiceState::StopPending), "SERVICE_STOP_PENDING");
    }
}
