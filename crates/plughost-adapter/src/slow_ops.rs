//! Idle-thread pump for plugin requests, timers and descriptors.

use crate::host::{poll_fd, HostHandle};
use crate::instance::NativeInstance;
use std::time::Instant;
use tracing::{debug, trace};

/// Adapter operations the pump needs to answer plugin requests.
pub trait Lifecycle {
    fn set_active(&self, active: bool);
    fn set_enabled(&self, enabled: bool);
    /// Move scheduled parameter values to the plugin via `flush`, if requested.
    fn flush_params(&self);
    fn latency_changed(&self);
    fn mark_dirty(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Regular `idle()`/`ui_idle()` pass; may restart the plugin.
    Idle,
    /// Run right after another NRT operation; never restarts.
    Inline,
}

pub struct SlowOpsPump;

impl SlowOpsPump {
    /// One pass over every pending request. Restart goes before process-enable.
    pub fn run(
        host: &HostHandle,
        instance: &dyn NativeInstance,
        lifecycle: &dyn Lifecycle,
        pass: PassKind,
    ) {
        if pass == PassKind::Idle && host.restart_or_process_pending() {
            let needs_restart = host.take_restart();
            if needs_restart {
                debug!("restarting plugin");
                lifecycle.set_active(false);
            }
            if host.take_process() {
                lifecycle.set_enabled(true);
                lifecycle.set_active(true);
            } else if needs_restart {
                lifecycle.set_active(true);
            }
        }

        lifecycle.flush_params();

        let ext = instance.extensions();
        if host.take_callback() && ext.main_thread_hook {
            instance.on_main_thread();
        }

        if ext.posix_fd_support {
            for entry in host.fds() {
                poll_fd(entry, |fd, flags| instance.on_fd(fd, flags));
            }
        }

        if ext.timer_support {
            for id in host.due_timers(Instant::now()) {
                trace!(timer = id, "timer fired");
                instance.on_timer(id);
            }
        }

        if host.take_latency_changed() {
            lifecycle.latency_changed();
        }
        if host.take_mark_dirty() {
            lifecycle.mark_dirty();
        }
    }
}
