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

//! POSIX signal adapter for the default run loop.

use std::thread;

use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGTSTP};
use signal_hook::iterator::Signals;

use crate::config::Config;
use crate::control::{ControlEvent, Controller, LogReporter};
use crate::error::Result;

/// Short name and how the signal is usually sent.
pub(crate) fn describe(sig: i32) -> (&'static str, &'static str) {
    match sig {
        SIGHUP => ("reload", "kill -SIGHUP XXXX"),
        SIGINT => ("terminate", "kill -SIGINT XXXX or `Ctrl+C`"),
        SIGTERM => ("force terminate (kill)", "kill -SIGTERM XXXX or kill -9 XXXX"),
        SIGQUIT => ("terminate and core dump", "kill -SIGQUIT XXXX or `Ctrl+\\`"),
        SIGTSTP => ("console terminate", "kill -SIGTSTP XXXX or `Ctrl+Z`"),
        _ => ("Unknown signal", "unknown"),
    }
}

pub(crate) fn event_for(sig: i32) -> ControlEvent {
    match sig {
        SIGHUP => ControlEvent::Reload,
        _ => ControlEvent::Stop,
    }
}

/// Blocks running the service until a terminating signal arrives.
///
/// SIGHUP is only subscribed to when a reload handler exists.
pub(crate) fn run(config: &Config) -> Result<()> {
    let mut subscribed = vec![SIGINT, SIGTERM, SIGQUIT, SIGTSTP];
    if config.reload_handler.is_some() {
        subscribed.push(SIGHUP);
    }
    let mut signals = Signals::new(&subscribed)?;
    let handle = signals.handle();
    let (tx, rx) = crossbeam_channel::unbounded();

    thread::scope(|s| {
        s.spawn(move || {
            for sig in signals.forever() {
                let (name, desc) = describe(sig);
                config.info(&format!("SIGNAL {} catched ({})", name, desc));
                if tx.send(event_for(sig)).is_err() {
                    break;
                }
            }
        });

        let result = Controller::new(config, &mut LogReporter).run(&rx);
        handle.close();
        result
    })
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use signal_hook::low_level::raise;

    use super::*;
    use crate::options;

    #[test]
    fn test_signal_mapping() {
        assert_eq!(event_for(SIGHUP), ControlEvent::Reload);
        for sig in [SIGINT, SIGTERM, SIGQUIT, SIGTSTP] {
            assert_eq!(event_for(sig), ControlEvent::Stop);
        }
        assert_eq!(describe(SIGHUP).0, "reload");
        assert_eq!(describe(SIGINT).0, "terminate");
    }

    #[test]
    fn test_reload_then_terminate() {
        let reloads = Arc::new(AtomicUsize::new(0));
        let seen = reloads.clone();
        let counter = reloads.clone();
        let config = Config::new(vec![
            options::name("echod"),
            // Signals are subscribed before the start handler runs.
            options::start_handler(move || {
                let seen = seen.clone();
                thread::spawn(move || {
                    raise(SIGHUP).unwrap();
                    let deadline = Instant::now() + Duration::from_secs(5);
                    while seen.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
                        thread::sleep(Duration::from_millis(10));
                    }
                    raise(SIGTERM).unwrap();
                });
                Ok(())
            }),
            options::stop_handler(|| Ok(())),
            options::reload_handler(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            options::hide_methods_warning(true),
            options::info_sink(|_| {}),
        ]);

        assert!(run(&config).is_ok());
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
    }
}
