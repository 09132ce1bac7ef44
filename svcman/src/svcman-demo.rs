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

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use clap::Parser;
use svcman::{options, Config, ConfigFile, Daemon, DaemonError, HandlerError};

#[derive(clap::Parser)]
#[clap(about, version, author)]
struct Args {
    #[clap(long, short = 'c', value_name = "CONFIG")]
    config: Option<PathBuf>,

    #[clap(long, short = 'l', value_name = "ADDR", default_value = "127.0.0.1:9977")]
    listen: String,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Register the service; trailing arguments are passed to it
    Install { args: Vec<String> },
    Uninstall,
    Start,
    Stop,
    Restart,
    Reload,
    Status,
    Pause,
    Continue,
}

/// Echoes every connection back to the client until stopped.
struct Echo {
    addr: String,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Echo {
    fn new(addr: String) -> Self {
        Echo {
            addr,
            stop: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    fn start(&self) -> Result<(), HandlerError> {
        let listener = TcpListener::bind(&self.addr)?;
        listener.set_nonblocking(true)?;
        log::info!("Echo listening on {}", self.addr);
        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();
        let worker = thread::spawn(move || serve(listener, stop));
        *self.worker.lock().map_err(|e| e.to_string())? = Some(worker);
        Ok(())
    }

    fn stop(&self) -> Result<(), HandlerError> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().map_err(|e| e.to_string())?.take() {
            worker.join().map_err(|_| "echo worker panicked")?;
        }
        log::info!("Echo on {} stopped", self.addr);
        Ok(())
    }
}

fn serve(listener: TcpListener, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::debug!("Connection from {}", peer);
                thread::spawn(move || echo(stream));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(100));
            }
            Err(e) => log::warn!("accept failed: {}", e),
        }
    }
}

fn echo(mut stream: TcpStream) {
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                if stream.write_all(&buf[..n]).is_err() {
                    return;
                }
            }
        }
    }
}

fn config(args: &Args, echo: Arc<Echo>) -> Result<Config, DaemonError> {
    let (start, stop) = (echo.clone(), echo);
    let mut opts = vec![
        options::name("svcman-demo"),
        options::description("svcman echo service"),
        options::dependencies(["network.target"]),
        options::start_handler(move || start.start()),
        options::stop_handler(move || stop.stop()),
        options::error_sink(|msg| log::error!("{}", msg)),
        options::info_sink(|msg| log::info!("{}", msg)),
    ];
    if let Some(path) = &args.config {
        opts.push(options::file(ConfigFile::read(path)?));
    }
    Ok(Config::new(opts))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let echo = Arc::new(Echo::new(args.listen.clone()));
    let daemon = match config(&args, echo).and_then(Daemon::new) {
        Ok(daemon) => daemon,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    };

    let outcome = match &args.command {
        Some(Command::Install { args }) => daemon.install(args),
        Some(Command::Uninstall) => daemon.uninstall(),
        Some(Command::Start) => daemon.start(),
        Some(Command::Stop) => daemon.stop(),
        Some(Command::Restart) => daemon.restart(),
        Some(Command::Reload) => daemon.reload(),
        Some(Command::Status) => daemon.status(),
        Some(Command::Pause) => daemon.pause(),
        Some(Command::Continue) => daemon.resume(),
        None => {
            if let Err(e) = daemon.run() {
                log::error!("{}", e);
                exit(e.exit_code());
            }
            return;
        }
    };

    if !outcome.message.is_empty() {
        println!("{}", outcome.message);
    }
    if let Err(e) = outcome.result {
        eprintln!("Error: {}", e);
        exit(1);
    }
}
