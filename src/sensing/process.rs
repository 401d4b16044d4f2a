use sysinfo::{Pid, ProcessesToUpdate, System};

use super::WindowSample;

/// Partially filled window record as printed by a probe command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawWindow {
    pub pid: Option<u32>,
    pub process_name: Option<String>,
    pub window_title: String,
    pub process_path: Option<String>,
}

/// Fills in name and executable path from the process table when the probe
/// only reported a PID. Returns `None` if no process name can be found.
pub fn resolve_window(raw: RawWindow) -> Option<WindowSample> {
    let needs_lookup = raw.process_name.is_none() || raw.process_path.is_none();
    let looked_up = match (needs_lookup, raw.pid) {
        (true, Some(pid)) => lookup_process(pid),
        _ => None,
    };

    let (looked_up_name, looked_up_path) = looked_up.unwrap_or_default();
    let process_name = raw
        .process_name
        .filter(|name| !name.is_empty())
        .or(looked_up_name)?;
    let process_path = raw.process_path.or(looked_up_path).unwrap_or_default();

    Some(WindowSample {
        process_name,
        window_title: raw.window_title,
        process_path,
    })
}

fn lookup_process(pid: u32) -> Option<(Option<String>, Option<String>)> {
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

    system.process(pid).map(|process| {
        let name = process.name().to_string_lossy().into_owned();
        let path = process.exe().map(|exe| exe.display().to_string());
        ((!name.is_empty()).then_some(name), path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_fields_are_kept_without_lookup() {
        let sample = resolve_window(RawWindow {
            pid: None,
            process_name: Some("Code".into()),
            window_title: "main.rs".into(),
            process_path: Some("/usr/bin/code".into()),
        })
        .unwrap();

        assert_eq!(sample, WindowSample::new("Code", "main.rs", "/usr/bin/code"));
    }

    #[test]
    fn own_pid_resolves_to_a_process_name() {
        let sample = resolve_window(RawWindow {
            pid: Some(std::process::id()),
            window_title: "tests".into(),
            ..RawWindow::default()
        })
        .unwrap();

        assert!(!sample.process_name.is_empty());
        assert_eq!(sample.window_title, "tests");
    }

    #[test]
    fn nothing_to_go_on_yields_none() {
        assert!(resolve_window(RawWindow::default()).is_none());
    }
}
