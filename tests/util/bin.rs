use std::{
    process::{Child, Command},
    time::{Duration, Instant},
};

pub fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_spacedrop")
}

pub fn ctl_path() -> &'static str {
    env!("CARGO_BIN_EXE_dropctl")
}

/// Spawned server that is always killed, so a failing test never leaves it running.
pub struct ManagedChild {
    child: Child,
}

impl ManagedChild {
    pub fn spawn(mut cmd: Command) -> std::io::Result<Self> {
        let child = cmd.spawn()?;
        Ok(Self { child })
    }

    /// Wait up to `max` for the process to exit on its own. Returns its exit status if it did.
    pub fn wait_for(&mut self, max: Duration) -> Option<std::process::ExitStatus> {
        let deadline = Instant::now() + max;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for ManagedChild {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Server command isolated from the caller's environment and home directory.
pub fn cmd(home: &std::path::Path) -> Command {
    let mut c = Command::new(bin_path());
    for var in [
        "HOST",
        "PORT",
        "APP_TITLE",
        "DOWNLOADS_DIR",
        "CONF_DIR",
        "CONF_PATH",
        "VALID_MODES",
        "ICON_PATH",
        "REQUIRE_CONFIRM_ON_FOREIGN",
        "CONFIRM_ON_SELF",
        "APPROVAL_TIMEOUT",
        "MAX_UPLOAD_BYTES",
        "TAILSCALE_BIN",
        "SPACEDROP_CONFIG",
    ] {
        c.env_remove(var);
    }
    c.env("HOME", home).current_dir(home);
    c
}
