//! Desktop side effects: notifications, clipboard, external URLs, developer
//! terminals, auto-start registration.
//!
//! Everything here is fire-and-forget. A nicety that cannot be delivered is
//! logged and dropped, never escalated into an application failure.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crc_commander::Preset;

pub const APP_TITLE: &str = "Red Hat OpenShift Local";

/// `oc` binary name for composed login commands.
pub fn oc_command() -> &'static str {
    if cfg!(windows) {
        "oc.exe"
    } else {
        "oc"
    }
}

pub fn notify(body: &str) {
    if let Err(err) = notify_rust::Notification::new()
        .summary(APP_TITLE)
        .body(body)
        .show()
    {
        debug!(error = %err, "notification not shown");
    }
}

pub fn copy_to_clipboard(text: &str) {
    match arboard::Clipboard::new() {
        Ok(mut clipboard) => {
            if let Err(err) = clipboard.set_text(text.to_owned()) {
                debug!(error = %err, "clipboard write failed");
            }
        }
        Err(err) => debug!(error = %err, "clipboard unavailable"),
    }
}

pub fn open_external(url: &str) {
    if let Err(err) = open::that(url) {
        warn!(error = %err, url, "failed to open in default handler");
    }
}

fn env_subcommand(preset: Preset) -> Option<&'static str> {
    match preset {
        Preset::OpenShift => Some("oc-env"),
        Preset::Podman => Some("podman-env"),
        Preset::Unknown => None,
    }
}

/// Open a terminal whose environment is prepared for the preset
/// (`crc oc-env` / `crc podman-env` evaluated into the shell).
pub fn open_dev_terminal(crc_binary: &Path, preset: Preset) {
    let Some(subcommand) = env_subcommand(preset) else {
        notify("A developer terminal is only available once a preset is selected");
        return;
    };

    #[cfg(target_os = "macos")]
    {
        let script = format!(
            "tell application \"Terminal\"\n    do script \"eval $('{}' {})\"\nend tell\n",
            crc_binary.display(),
            subcommand
        );
        let script_path = std::env::temp_dir().join("crc-dev-terminal.scpt");
        if let Err(err) = std::fs::write(&script_path, script) {
            warn!(error = %err, "failed to stage terminal script");
            notify("Failed to open developer terminal");
            return;
        }
        spawn_detached(Command::new("osascript").arg(&script_path));
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        const EMULATORS: [&str; 4] = ["x-terminal-emulator", "gnome-terminal", "konsole", "xterm"];
        let Some(emulator) = EMULATORS.iter().find_map(|name| which::which(name).ok()) else {
            notify("No terminal emulator found to open a developer terminal");
            return;
        };
        let shell_line = format!(
            "eval \"$('{}' {})\"; exec \"${{SHELL:-/bin/sh}}\"",
            crc_binary.display(),
            subcommand
        );
        let mut command = Command::new(&emulator);
        if emulator
            .file_name()
            .map(|name| name == "gnome-terminal")
            .unwrap_or(false)
        {
            command.arg("--").arg("sh").arg("-c").arg(&shell_line);
        } else {
            command.arg("-e").arg(format!("sh -c '{shell_line}'"));
        }
        spawn_detached(&mut command);
    }

    #[cfg(windows)]
    {
        let Ok(powershell) = which::which("powershell.exe") else {
            notify("PowerShell not found to open a developer terminal");
            return;
        };
        let cmd = format!(
            "-NoExit -Command \"&{{'{}' {} | Invoke-Expression}}\"",
            crc_binary.display(),
            subcommand
        );
        spawn_detached(Command::new(powershell).arg(cmd));
    }
}

fn spawn_detached(command: &mut Command) {
    let spawned = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    match spawned {
        Ok(child) => {
            // Not reaped; the terminal outlives us.
            drop(child);
        }
        Err(err) => {
            warn!(error = %err, "failed to spawn developer terminal");
            notify("Failed to open developer terminal");
        }
    }
}

const AUTOSTART_ENTRY: &str = "crc-tray.desktop";

fn autostart_entry_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|dir| dir.join("autostart").join(AUTOSTART_ENTRY))
}

/// Register the tray to start at login (XDG autostart entry). Failures are
/// logged; the registration is an OS nicety, not application state.
pub fn enable_autostart() {
    let Some(path) = autostart_entry_path() else {
        return;
    };
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(err) => {
            warn!(error = %err, "cannot resolve own executable for autostart");
            return;
        }
    };
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            warn!(error = %err, "cannot create autostart directory");
            return;
        }
    }
    let entry = format!(
        "[Desktop Entry]\nType=Application\nName={APP_TITLE}\nExec={}\nX-GNOME-Autostart-enabled=true\n",
        exe.display()
    );
    if let Err(err) = std::fs::write(&path, entry) {
        warn!(error = %err, entry = %path.display(), "failed to write autostart entry");
    } else {
        debug!(entry = %path.display(), "autostart enabled");
    }
}

pub fn disable_autostart() {
    let Some(path) = autostart_entry_path() else {
        return;
    };
    match std::fs::remove_file(&path) {
        Ok(()) => debug!(entry = %path.display(), "autostart disabled"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(error = %err, "failed to remove autostart entry"),
    }
}

pub fn is_autostart_enabled() -> bool {
    autostart_entry_path()
        .map(|path| path.exists())
        .unwrap_or(false)
}
