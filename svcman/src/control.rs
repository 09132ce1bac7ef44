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

//! Service state machine driven by abstract control events.
//!
//! OS specific adapters (signals on POSIX, the service control manager on
//! Windows) translate their notifications into [`ControlEvent`]s and feed
//! them through a channel; [`Controller`] calls the configured handlers.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::config::{Config, Handler};
use crate::error::{DaemonError, Result};

const RUNNING_TICK: Duration = Duration::from_millis(500);
const PAUSED_TICK: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Starting,
    Running,
    Paused,
    Stopping,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    Stop,
    Reload,
    Pause,
    Continue,
    /// Asks for the current state to be reported again.
    Interrogate,
    Unknown(String),
}

/// Receives every state transition.
pub trait StatusReporter {
    fn report(&mut self, state: State);
}

/// Reporter for platforms without a service manager to notify.
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report(&mut self, state: State) {
        log::debug!("Service state: {:?}", state);
    }
}

pub struct Controller<'a, R: StatusReporter> {
    config: &'a Config,
    reporter: &'a mut R,
    state: State,
}

impl<'a, R: StatusReporter> Controller<'a, R> {
    pub fn new(config: &'a Config, reporter: &'a mut R) -> Self {
        Controller {
            config,
            reporter,
            state: State::Stopped,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// How long to block for the next event.
    pub fn cadence(&self) -> Duration {
        match self.state {
            State::Paused => PAUSED_TICK,
            _ => RUNNING_TICK,
        }
    }

    /// Starts the service and dispatches `events` until it stops.
    ///
    /// A handler failure ends the loop with exit code 1, a panic inside any
    /// handler is reported through the error sink and ends it with 100.
    pub fn run(&mut self, events: &Receiver<ControlEvent>) -> Result<()> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.serve(events))) {
            Ok(result) => result,
            Err(payload) => {
                let msg = format!(
                    "{}; {}",
                    panic_message(payload.as_ref()),
                    Backtrace::force_capture()
                );
                self.config.error(&format!("run() panic: {}", msg));
                self.set(State::Stopped);
                Err(DaemonError::Panicked { msg })
            }
        }
    }

    fn serve(&mut self, events: &Receiver<ControlEvent>) -> Result<()> {
        self.set(State::Starting);
        if let Err(e) = self.invoke(&self.config.start_handler, "Start") {
            self.set(State::Stopped);
            return Err(e);
        }
        self.set(State::Running);

        loop {
            let event = match events.recv_timeout(self.cadence()) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("Control channel closed, stopping");
                    ControlEvent::Stop
                }
            };
            if let Some(result) = self.dispatch(event) {
                return result;
            }
        }
    }

    /// Handles one event. `Some` ends the loop with that result.
    pub fn dispatch(&mut self, event: ControlEvent) -> Option<Result<()>> {
        log::debug!("Control event {:?} in state {:?}", event, self.state);
        let handled = match event {
            ControlEvent::Interrogate => {
                self.reporter.report(self.state);
                Ok(())
            }
            ControlEvent::Stop => {
                self.set(State::Stopping);
                let result = self.invoke(&self.config.stop_handler, "Stop");
                self.set(State::Stopped);
                return Some(result);
            }
            ControlEvent::Reload if self.config.reload_handler.is_some() => {
                self.invoke(&self.config.reload_handler, "Reload")
            }
            ControlEvent::Pause if self.state == State::Running && self.config.can_pause() => {
                let result = self.invoke(&self.config.pause_handler, "Pause");
                self.set(State::Paused);
                result
            }
            ControlEvent::Continue if self.state == State::Paused && self.config.can_pause() => {
                let result = self.invoke(&self.config.continue_handler, "Continue");
                self.set(State::Running);
                result
            }
            other => {
                self.config
                    .error(&format!("unexpected control request {:?}", other));
                Ok(())
            }
        };

        match handled {
            Ok(()) => None,
            Err(e) => {
                self.set(State::Stopped);
                Some(Err(e))
            }
        }
    }

    fn set(&mut self, state: State) {
        self.state = state;
        self.reporter.report(state);
    }

    fn invoke(&self, handler: &Option<Handler>, name: &str) -> Result<()> {
        match handler {
            Some(h) => h().map_err(|e| {
                log::debug!("{} handler failed: {}", name, e);
                DaemonError::Handler {
                    code: 1,
                    msg: e.to_string(),
                }
            }),
            None => Ok(()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crossbeam_channel::unbounded;

    use super::*;
    use crate::options;

    #[derive(Default)]
    struct Recorder(Vec<State>);

    impl StatusReporter for Recorder {
        fn report(&mut self, state: State) {
            self.0.push(state);
        }
    }

    fn config(extra: Vec<crate::config::ConfigOption>) -> (Config, Arc<Mutex<Vec<String>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        let mut cfg = Config::new(vec![
            options::start_handler(|| Ok(())),
            options::stop_handler(|| Ok(())),
            options::error_sink(move |m| e.lock().unwrap().push(m.to_string())),
        ]);
        cfg.apply(extra);
        (cfg, errors)
    }

    #[test]
    fn test_start_then_stop() {
        let (cfg, _) = config(vec![]);
        let (tx, rx) = unbounded();
        tx.send(ControlEvent::Stop).unwrap();
        let mut rec = Recorder::default();
        let result = Controller::new(&cfg, &mut rec).run(&rx);
        assert!(result.is_ok());
        assert_eq!(
            rec.0,
            vec![State::Starting, State::Running, State::Stopping, State::Stopped]
        );
    }

    #[test]
    fn test_start_failure_exits_with_one() {
        let (cfg, _) = config(vec![options::start_handler(|| Err("port in use".into()))]);
        let (_tx, rx) = unbounded();
        let mut rec = Recorder::default();
        let err = Controller::new(&cfg, &mut rec).run(&rx).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(rec.0, vec![State::Starting, State::Stopped]);
    }

    #[test]
    fn test_reload_keeps_running() {
        let reloads = Arc::new(AtomicUsize::new(0));
        let r = reloads.clone();
        let (cfg, _) = config(vec![options::reload_handler(move || {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })]);
        let (tx, rx) = unbounded();
        tx.send(ControlEvent::Reload).unwrap();
        tx.send(ControlEvent::Reload).unwrap();
        tx.send(ControlEvent::Stop).unwrap();
        let mut rec = Recorder::default();
        assert!(Controller::new(&cfg, &mut rec).run(&rx).is_ok());
        assert_eq!(reloads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reload_failure_ends_loop() {
        let (cfg, _) = config(vec![options::reload_handler(|| Err("bad config".into()))]);
        let (tx, rx) = unbounded();
        tx.send(ControlEvent::Reload).unwrap();
        let mut rec = Recorder::default();
        match Controller::new(&cfg, &mut rec).run(&rx) {
            Err(DaemonError::Handler { code, msg }) => {
                assert_eq!(code, 1);
                assert_eq!(msg, "bad config");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_panic_exits_with_100() {
        let (cfg, errors) = config(vec![options::stop_handler(|| panic!("stop exploded"))]);
        let (tx, rx) = unbounded();
        tx.send(ControlEvent::Stop).unwrap();
        let mut rec = Recorder::default();
        let err = Controller::new(&cfg, &mut rec).run(&rx).unwrap_err();
        assert_eq!(err.exit_code(), 100);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("run() panic: stop exploded"));
    }

    #[test]
    fn test_pause_and_continue() {
        let (cfg, _) = config(vec![
            options::pause_handler(|| Ok(())),
            options::continue_handler(|| Ok(())),
        ]);
        let mut rec = Recorder::default();
        let mut ctl = Controller::new(&cfg, &mut rec);
        ctl.set(State::Running);
        assert_eq!(ctl.cadence(), RUNNING_TICK);

        assert!(ctl.dispatch(ControlEvent::Pause).is_none());
        assert_eq!(ctl.state(), State::Paused);
        assert_eq!(ctl.cadence(), PAUSED_TICK);

        assert!(ctl.dispatch(ControlEvent::Continue).is_none());
        assert_eq!(ctl.state(), State::Running);
        assert_eq!(ctl.cadence(), RUNNING_TICK);
    }

    #[test]
    fn test_unsupported_events_are_logged() {
        let (cfg, errors) = config(vec![]);
        let mut rec = Recorder::default();
        let mut ctl = Controller::new(&cfg, &mut rec);
        ctl.set(State::Running);
        assert!(ctl.dispatch(ControlEvent::Pause).is_none());
        assert!(ctl.dispatch(ControlEvent::Unknown("0x80".to_string())).is_none());
        assert_eq!(ctl.state(), State::Running);
        assert_eq!(errors.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_interrogate_reports_current_state() {
        let (cfg, _) = config(vec![]);
        let mut rec = Recorder::default();
        {
            let mut ctl = Controller::new(&cfg, &mut rec);
            ctl.set(State::Running);
            assert!(ctl.dispatch(ControlEvent::Interrogate).is_none());
        }
        assert_eq!(rec.0, vec![State::Running, State::Running]);
    }

    #[test]
    fn test_closed_channel_stops() {
        let (cfg, _) = config(vec![]);
        let (tx, rx) = unbounded::<ControlEvent>();
        drop(tx);
        let mut rec = Recorder::default();
        assert!(Controller::new(&cfg, &mut rec).run(&rx).is_ok());
        assert_eq!(rec.0.last(), Some(&State::Stopped));
    }
}
