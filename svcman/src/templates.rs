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

//! Default unit/script templates and their renderer.
//!
//! Templates use Tera syntax. The fields available to every template are
//! `Name`, `Description`, `Dependencies`, `Path`, `Args`, `ArgList`,
//! `PIDFile`, `StartRunLevels` and `StopRunLevels`.
//!
//! Rendering does not escape anything. XML templates pass user values
//! through the `escape_xml` filter.

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::Result;

/// Values substituted into a template.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TemplateContext {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Description")]
    pub description: String,
    /// Space separated.
    #[serde(rename = "Dependencies")]
    pub dependencies: String,
    #[serde(rename = "Path")]
    pub path: String,
    /// Space separated, already quoted for the target format.
    #[serde(rename = "Args")]
    pub args: String,
    #[serde(rename = "ArgList")]
    pub arg_list: Vec<String>,
    #[serde(rename = "PIDFile")]
    pub pid_file: String,
    #[serde(rename = "StartRunLevels")]
    pub start_run_levels: String,
    #[serde(rename = "StopRunLevels")]
    pub stop_run_levels: String,
}

pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let context = Context::from_serialize(ctx)?;
    Ok(Tera::one_off(template, &context, false)?)
}

/// Joins run levels with `sep`, e.g. `2 3 4 5` or `2345`.
pub fn run_levels(levels: &[u8], sep: &str) -> String {
    levels
        .iter()
        .map(|lvl| lvl.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

pub const MACOS_PLIST: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>KeepAlive</key>
	<true/>
	<key>Label</key>
	<string>{{ Name | escape_xml }}</string>
	<key>ProgramArguments</key>
	<array>
		<string>{{ Path | escape_xml }}</string>
		{% for arg in ArgList %}<string>{{ arg | escape_xml }}</string>
		{% endfor %}
	</array>
	<key>RunAtLoad</key>
	<true/>
	<key>WorkingDirectory</key>
	<string>/usr/local/var</string>
	<key>StandardErrorPath</key>
	<string>/usr/local/var/log/{{ Name | escape_xml }}.err</string>
	<key>StandardOutPath</key>
	<string>/usr/local/var/log/{{ Name | escape_xml }}.log</string>
</dict>
</plist>
"##;

pub const FREEBSD_RCD: &str = r##"#!/bin/sh
#
# PROVIDE: {{ Name }}
# REQUIRE: networking syslog
# KEYWORD:
# Add the following lines to /etc/rc.conf to enable the {{ Name }}:
#
# {{ Name }}_enable="YES"
#
. /etc/rc.subr
name="{{ Name }}"
rcvar="{{ Name }}_enable"
command="{{ Path }}"
pidfile="{{ PIDFile }}"
start_cmd="/usr/sbin/daemon -p $pidfile -f $command {{ Args }}"
load_rc_config $name
run_rc_command "$1"
"##;

pub const LINUX_SYSTEMD: &str = r##"[Unit]
Description={{ Description }}
{% if Dependencies %}Requires={{ Dependencies }}
After={{ Dependencies }}
{% endif %}
[Service]
ExecStart={{ Path }} {{ Args }}
Restart=on-failure

[Install]
WantedBy=multi-user.target
"##;

pub const LINUX_SYSTEMV: &str = r##"#! /bin/sh
#
#       /etc/rc.d/init.d/{{ Name }}
#
#       Starts {{ Name }} as a daemon
#
# chkconfig: 2345 87 17
# description: Starts and stops a single {{ Name }} instance on this system
### BEGIN INIT INFO
# Provides: {{ Name }}
# Required-Start: $network $named
# Required-Stop: $network $named
# Default-Start: {{ StartRunLevels }}
# Default-Stop: {{ StopRunLevels }}
# Short-Description: This service manages the {{ Description }}.
# Description: {{ Description }}
### END INIT INFO
#
# Source function library.
#
if [ -f /etc/rc.d/init.d/functions ]; then
    . /etc/rc.d/init.d/functions
fi
exec="{{ Path }}"
servname="{{ Description }}"
proc="{{ Name }}"
pidfile="{{ PIDFile }}"
lockfile="/var/lock/subsys/$proc"
stdoutlog="/var/log/$proc.log"
stderrlog="/var/log/$proc.err"
[ -d $(dirname $lockfile) ] || mkdir -p $(dirname $lockfile)
[ -e /etc/sysconfig/$proc ] && . /etc/sysconfig/$proc
start() {
    [ -x $exec ] || exit 5
    if [ -f $pidfile ]; then
        if ! [ -d "/proc/$(cat $pidfile)" ]; then
            rm $pidfile
            if [ -f $lockfile ]; then
                rm $lockfile
            fi
        fi
    fi
    if ! [ -f $pidfile ]; then
        printf "Starting $servname:\t"
        echo "$(date)" >> $stdoutlog
        $exec {{ Args }} >> $stdoutlog 2>> $stderrlog &
        echo $! > $pidfile
        touch $lockfile
        success
        echo
    else
        echo
        printf "$pidfile still exists...\n"
        exit 7
    fi
}
stop() {
    echo -n $"Stopping $servname: "
    killproc -p $pidfile $proc
    retval=$?
    echo
    [ $retval -eq 0 ] && rm -f $lockfile
    return $retval
}
restart() {
    stop
    start
}
reload() {
    echo -n $"Reloading $servname: "
    killproc -p ${pidfile} $proc -HUP
    retval=$?
    echo
    return $retval
}
rh_status() {
    status -p $pidfile $proc
}
rh_status_q() {
    rh_status >/dev/null 2>&1
}
case "$1" in
    start)
        rh_status_q && exit 0
        $1
        ;;
    stop)
        rh_status_q || exit 0
        $1
        ;;
    restart)
        $1
        ;;
    reload)
        rh_status_q || exit 0
        $1
        ;;
    status)
        rh_status
        ;;
    *)
        echo $"Usage: $0 {start|stop|status|restart|reload}"
        exit 2
esac
exit $?
"##;

pub const LINUX_UPSTART: &str = r##"# {{ Name }} {{ Description }}
description     "{{ Description }}"
start on runlevel [{{ StartRunLevels }}]
stop on runlevel [{{ StopRunLevels }}]
respawn
exec {{ Path }} {{ Args }} >> /var/log/{{ Name }}.log 2>> /var/log/{{ Name }}.err
"##;
