//! Command-driven foreground window probes, one fallback list per platform.
//!
//! Every strategy shells out to a tool that ships with the desktop (or is
//! commonly installed) and parses its stdout. Native windowing APIs are not
//! linked.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::process::{resolve_window, RawWindow};
use super::{ProbeChain, ProbeError, WindowProbe, WindowSample};

/// Title reported when a strategy can name the process but not its window.
pub const FALLBACK_TITLE: &str = "Active Window";

type Parser = fn(&str) -> Result<Option<RawWindow>, String>;

/// Runs one external command and parses its stdout.
pub struct CommandProbe {
    name: &'static str,
    program: String,
    args: Vec<String>,
    parse: Parser,
}

impl CommandProbe {
    pub fn new(name: &'static str, program: &str, args: &[&str], parse: Parser) -> Self {
        Self {
            name,
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            parse,
        }
    }
}

#[async_trait]
impl WindowProbe for CommandProbe {
    fn name(&self) -> &str {
        self.name
    }

    async fn probe(&self) -> Result<Option<WindowSample>, ProbeError> {
        // kill_on_drop lets the chain's timeout reap a hung helper.
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| ProbeError::Command {
                program: self.program.clone(),
                message: err.to_string(),
            })?;

        if !output.status.success() {
            return Err(ProbeError::Command {
                program: self.program.clone(),
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(None);
        }

        let raw = (self.parse)(&stdout).map_err(|message| ProbeError::Parse {
            probe: self.name.to_string(),
            message,
        })?;

        match raw {
            Some(raw) => tokio::task::spawn_blocking(move || resolve_window(raw))
                .await
                .map_err(|err| ProbeError::Command {
                    program: self.program.clone(),
                    message: format!("process lookup worker failed: {err}"),
                }),
            None => Ok(None),
        }
    }
}

/// Default fallback chain for the platform this binary was built for.
pub fn platform_chain(attempt_timeout: Duration) -> ProbeChain {
    ProbeChain::new(platform_probes(), attempt_timeout)
}

#[cfg(target_os = "windows")]
fn platform_probes() -> Vec<Box<dyn WindowProbe>> {
    vec![
        Box::new(CommandProbe::new(
            "powershell-win32",
            "powershell",
            &["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command", WIN32_FOREGROUND_SCRIPT],
            parse_powershell_json,
        )),
        Box::new(CommandProbe::new(
            "powershell-process-name",
            "powershell",
            &["-NoProfile", "-Command", WIN32_PROCESS_NAME_SCRIPT],
            parse_process_name,
        )),
        Box::new(CommandProbe::new(
            "powershell-busiest-window",
            "powershell",
            &["-NoProfile", "-Command", BUSIEST_WINDOW_SCRIPT],
            parse_powershell_json,
        )),
    ]
}

#[cfg(target_os = "macos")]
fn platform_probes() -> Vec<Box<dyn WindowProbe>> {
    vec![Box::new(CommandProbe::new(
        "osascript-system-events",
        "osascript",
        &["-e", FRONTMOST_APPLESCRIPT],
        parse_pid_name_title,
    ))]
}

#[cfg(target_os = "linux")]
fn platform_probes() -> Vec<Box<dyn WindowProbe>> {
    vec![
        Box::new(CommandProbe::new(
            "xdotool",
            "xdotool",
            &["getactivewindow", "getwindowpid", "getwindowname"],
            parse_xdotool,
        )),
        Box::new(CommandProbe::new(
            "xprop",
            "sh",
            &["-c", XPROP_SCRIPT],
            parse_xprop,
        )),
    ]
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
fn platform_probes() -> Vec<Box<dyn WindowProbe>> {
    Vec::new()
}

#[cfg(target_os = "windows")]
const WIN32_FOREGROUND_SCRIPT: &str = r#"
Add-Type @"
using System;
using System.Runtime.InteropServices;
using System.Text;
public class PcTimerWin32 {
  [DllImport("user32.dll")] public static extern IntPtr GetForegroundWindow();
  [DllImport("user32.dll")] public static extern int GetWindowText(IntPtr hWnd, StringBuilder text, int count);
  [DllImport("user32.dll")] public static extern uint GetWindowThreadProcessId(IntPtr hWnd, out uint lpdwProcessId);
}
"@
$handle = [PcTimerWin32]::GetForegroundWindow()
$title = New-Object System.Text.StringBuilder 256
[PcTimerWin32]::GetWindowText($handle, $title, $title.Capacity) | Out-Null
$processId = 0
[PcTimerWin32]::GetWindowThreadProcessId($handle, [ref]$processId) | Out-Null
if ($processId -ne 0) {
  $process = Get-Process -Id $processId -ErrorAction SilentlyContinue
  if ($process) {
    @{ ProcessName = $process.ProcessName; WindowTitle = $title.ToString(); ProcessPath = "$($process.Path)" } | ConvertTo-Json -Compress
  }
}
"#;

#[cfg(target_os = "windows")]
const WIN32_PROCESS_NAME_SCRIPT: &str = r#"
Add-Type @"
using System;
using System.Runtime.InteropServices;
public class PcTimerUser32 {
  [DllImport("user32.dll")] public static extern IntPtr GetForegroundWindow();
  [DllImport("user32.dll")] public static extern uint GetWindowThreadProcessId(IntPtr hWnd, out uint lpdwProcessId);
}
"@
$processId = 0
[PcTimerUser32]::GetWindowThreadProcessId([PcTimerUser32]::GetForegroundWindow(), [ref]$processId) | Out-Null
if ($processId -gt 0) { (Get-Process -Id $processId -ErrorAction SilentlyContinue).ProcessName }
"#;

#[cfg(target_os = "windows")]
const BUSIEST_WINDOW_SCRIPT: &str = r#"Get-Process | Where-Object { $_.MainWindowTitle -ne "" } | Sort-Object CPU -Descending | Select-Object -First 1 ProcessName | ConvertTo-Json -Compress"#;

#[cfg(target_os = "macos")]
const FRONTMOST_APPLESCRIPT: &str = r#"
tell application "System Events"
  set frontApp to first application process whose frontmost is true
  set appName to name of frontApp
  set appPid to unix id of frontApp
  set winTitle to ""
  try
    set winTitle to name of front window of frontApp
  end try
end tell
return (appPid as text) & linefeed & appName & linefeed & winTitle
"#;

#[cfg(target_os = "linux")]
const XPROP_SCRIPT: &str =
    r#"xprop -id "$(xprop -root _NET_ACTIVE_WINDOW | awk '{print $NF}')" _NET_WM_PID WM_CLASS _NET_WM_NAME"#;

#[derive(Deserialize)]
struct PowershellWindow {
    #[serde(rename = "ProcessName")]
    process_name: Option<String>,
    #[serde(rename = "WindowTitle")]
    window_title: Option<String>,
    #[serde(rename = "ProcessPath")]
    process_path: Option<String>,
}

/// `{"ProcessName": .., "WindowTitle": .., "ProcessPath": ..}`; only the name is required.
pub fn parse_powershell_json(stdout: &str) -> Result<Option<RawWindow>, String> {
    let window: PowershellWindow =
        serde_json::from_str(stdout.trim()).map_err(|err| err.to_string())?;

    let Some(process_name) = window.process_name.filter(|name| !name.trim().is_empty()) else {
        return Ok(None);
    };

    Ok(Some(RawWindow {
        pid: None,
        process_name: Some(process_name),
        window_title: window
            .window_title
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string()),
        process_path: Some(window.process_path.unwrap_or_default()),
    }))
}

/// A bare process name on the first non-empty line.
pub fn parse_process_name(stdout: &str) -> Result<Option<RawWindow>, String> {
    Ok(first_line(stdout).map(|name| RawWindow {
        pid: None,
        process_name: Some(name.to_string()),
        window_title: FALLBACK_TITLE.to_string(),
        process_path: Some(String::new()),
    }))
}

/// Three lines: pid, process name, window title (title may be empty).
pub fn parse_pid_name_title(stdout: &str) -> Result<Option<RawWindow>, String> {
    let mut lines = stdout.lines().map(str::trim);
    let pid = lines.next().and_then(|line| line.parse::<u32>().ok());
    let name = lines.next().filter(|name| !name.is_empty());
    let title = lines.next().unwrap_or_default();

    if pid.is_none() && name.is_none() {
        return Err(format!("unexpected output: {}", stdout.trim()));
    }

    Ok(Some(RawWindow {
        pid,
        process_name: name.map(str::to_string),
        window_title: title.to_string(),
        process_path: None,
    }))
}

/// `xdotool getactivewindow getwindowpid getwindowname`: pid line, then title line.
pub fn parse_xdotool(stdout: &str) -> Result<Option<RawWindow>, String> {
    let mut lines = stdout.lines();
    let pid_line = lines.next().unwrap_or_default().trim();
    let pid = pid_line
        .parse::<u32>()
        .map_err(|_| format!("expected a pid, got '{pid_line}'"))?;
    let title = lines.next().unwrap_or_default().trim();

    Ok(Some(RawWindow {
        pid: Some(pid),
        process_name: None,
        window_title: title.to_string(),
        process_path: None,
    }))
}

/// `xprop` property dump with `_NET_WM_PID`, `WM_CLASS` and `_NET_WM_NAME`.
pub fn parse_xprop(stdout: &str) -> Result<Option<RawWindow>, String> {
    let mut raw = RawWindow::default();

    for line in stdout.lines() {
        let Some((key, value)) = line.split_once(" = ") else {
            continue;
        };
        let value = value.trim();

        if key.starts_with("_NET_WM_PID") {
            raw.pid = value.parse().ok();
        } else if key.starts_with("_NET_WM_NAME") {
            raw.window_title = unquote(value).to_string();
        } else if key.starts_with("WM_CLASS") {
            // WM_CLASS(STRING) = "instance", "Class"; the class reads better.
            raw.process_name = value
                .split(", ")
                .last()
                .map(unquote)
                .filter(|class| !class.is_empty())
                .map(str::to_string);
        }
    }

    if raw.pid.is_none() && raw.process_name.is_none() {
        return Err(format!("no pid or class in output: {}", stdout.trim()));
    }

    // Prefer the real process name from the pid over the X11 class.
    if raw.pid.is_some() {
        raw.process_name = None;
    }

    Ok(Some(raw))
}

fn first_line(stdout: &str) -> Option<&str> {
    stdout.lines().map(str::trim).find(|line| !line.is_empty())
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('"')
}
