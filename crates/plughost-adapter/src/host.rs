//! Host-side callback state shared with the plugin.
//!
//! Plugins call back into the host from arbitrary threads and often from inside
//! another host → plugin call. Callbacks therefore only flip atomics or touch
//! the small registries in [`HostHandle`]; the idle and UI passes pick the
//! requests up later.

use crate::protocol::MAX_POSIX_FD_POLLS;
use clap_sys::ext::gui::{clap_host_gui, CLAP_EXT_GUI};
use clap_sys::ext::latency::{clap_host_latency, CLAP_EXT_LATENCY};
use clap_sys::ext::posix_fd_support::{
    clap_host_posix_fd_support, clap_posix_fd_flags, CLAP_EXT_POSIX_FD_SUPPORT,
    CLAP_POSIX_FD_ERROR, CLAP_POSIX_FD_READ, CLAP_POSIX_FD_WRITE,
};
use clap_sys::ext::state::{clap_host_state, CLAP_EXT_STATE};
use clap_sys::ext::timer_support::{clap_host_timer_support, CLAP_EXT_TIMER_SUPPORT};
use clap_sys::host::clap_host;
use clap_sys::id::clap_id;
use clap_sys::version::CLAP_VERSION;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::ffi::{c_char, c_void, CStr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostTimer {
    pub id: u32,
    pub period: Duration,
    pub last_fired: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFd {
    pub fd: i32,
    pub flags: u32,
}

/// GUI requests waiting for the next UI pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GuiRequests {
    pub resize: Option<(u32, u32)>,
    /// `Some(was_destroyed)` once the plugin closed its floating window.
    pub closed: Option<bool>,
}

/// Sticky one-shot requests raised from plugin callbacks.
#[derive(Debug, Default)]
struct RequestFlags {
    restart: AtomicBool,
    process: AtomicBool,
    callback: AtomicBool,
    latency_changed: AtomicBool,
    mark_dirty: AtomicBool,
}

#[derive(Debug, Default)]
pub struct HostHandle {
    flags: RequestFlags,
    window_open: AtomicBool,
    gui: Mutex<GuiRequests>,
    timers: Mutex<Vec<HostTimer>>,
    fds: Mutex<Vec<HostFd>>,
}

impl HostHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_restart(&self) {
        debug!("plugin requested restart");
        self.flags.restart.store(true, Ordering::Release);
    }

    pub fn request_process(&self) {
        debug!("plugin requested process");
        self.flags.process.store(true, Ordering::Release);
    }

    pub fn request_callback(&self) {
        self.flags.callback.store(true, Ordering::Release);
    }

    pub fn latency_changed(&self) {
        self.flags.latency_changed.store(true, Ordering::Release);
    }

    pub fn mark_dirty(&self) {
        self.flags.mark_dirty.store(true, Ordering::Release);
    }

    pub fn take_restart(&self) -> bool {
        self.flags.restart.swap(false, Ordering::AcqRel)
    }

    pub fn take_process(&self) -> bool {
        self.flags.process.swap(false, Ordering::AcqRel)
    }

    pub fn take_callback(&self) -> bool {
        self.flags.callback.swap(false, Ordering::AcqRel)
    }

    pub fn take_latency_changed(&self) -> bool {
        self.flags.latency_changed.swap(false, Ordering::AcqRel)
    }

    pub fn take_mark_dirty(&self) -> bool {
        self.flags.mark_dirty.swap(false, Ordering::AcqRel)
    }

    pub fn restart_or_process_pending(&self) -> bool {
        self.flags.restart.load(Ordering::Acquire) || self.flags.process.load(Ordering::Acquire)
    }

    /// Set by the UI coordinator while an embedding window exists.
    pub fn set_window_open(&self, open: bool) {
        self.window_open.store(open, Ordering::Release);
    }

    /// Plugin asks for a new UI size. Refused when there is no window to resize.
    pub fn request_resize(&self, width: u32, height: u32) -> bool {
        if !self.window_open.load(Ordering::Acquire) {
            return false;
        }
        debug!(width, height, "plugin requested resize");
        self.gui.lock().resize = Some((width, height));
        true
    }

    pub fn gui_closed(&self, was_destroyed: bool) {
        debug!(was_destroyed, "plugin closed its UI");
        self.gui.lock().closed = Some(was_destroyed);
    }

    pub fn take_gui_requests(&self) -> GuiRequests {
        std::mem::take(&mut *self.gui.lock())
    }

    /// Ids start at 1 and follow the last registered timer.
    pub fn register_timer(&self, period_ms: u32) -> u32 {
        let mut timers = self.timers.lock();
        let id = timers.last().map_or(1, |t| t.id + 1);
        timers.push(HostTimer {
            id,
            period: Duration::from_millis(u64::from(period_ms)),
            last_fired: Instant::now(),
        });
        debug!(id, period_ms, "timer registered");
        id
    }

    pub fn unregister_timer(&self, id: u32) -> bool {
        let mut timers = self.timers.lock();
        let before = timers.len();
        timers.retain(|t| t.id != id);
        timers.len() != before
    }

    pub fn timer_count(&self) -> usize {
        self.timers.lock().len()
    }

    /// Ids of timers whose period elapsed by `now`; their clocks restart.
    pub fn due_timers(&self, now: Instant) -> SmallVec<[u32; 8]> {
        let mut timers = self.timers.lock();
        let mut due = SmallVec::new();
        for timer in timers.iter_mut() {
            if now.saturating_duration_since(timer.last_fired) >= timer.period {
                timer.last_fired = now;
                due.push(timer.id);
            }
        }
        due
    }

    pub fn register_fd(&self, fd: i32, flags: clap_posix_fd_flags) -> bool {
        if flags & (CLAP_POSIX_FD_READ | CLAP_POSIX_FD_WRITE) == 0 {
            return false;
        }
        let mut fds = self.fds.lock();
        if fds.iter().any(|f| f.fd == fd) {
            return false;
        }
        fds.push(HostFd { fd, flags });
        true
    }

    pub fn modify_fd(&self, fd: i32, flags: clap_posix_fd_flags) -> bool {
        match self.fds.lock().iter_mut().find(|f| f.fd == fd) {
            Some(entry) => {
                entry.flags = flags;
                true
            }
            None => false,
        }
    }

    pub fn unregister_fd(&self, fd: i32) -> bool {
        let mut fds = self.fds.lock();
        let before = fds.len();
        fds.retain(|f| f.fd != fd);
        fds.len() != before
    }

    pub fn fds(&self) -> SmallVec<[HostFd; 4]> {
        self.fds.lock().iter().copied().collect()
    }

    /// Drop everything the previous plugin incarnation registered.
    pub fn clear(&self) {
        self.timers.lock().clear();
        self.fds.lock().clear();
        *self.gui.lock() = GuiRequests::default();
    }
}

/// Poll one descriptor without blocking, calling `on_fd` for each readiness,
/// at most [`MAX_POSIX_FD_POLLS`] times.
#[cfg(unix)]
pub fn poll_fd(entry: HostFd, mut on_fd: impl FnMut(i32, u32)) {
    let mut events: libc::c_short = 0;
    if entry.flags & CLAP_POSIX_FD_READ != 0 {
        events |= libc::POLLIN;
    }
    if entry.flags & CLAP_POSIX_FD_WRITE != 0 {
        events |= libc::POLLOUT;
    }
    for _ in 0..MAX_POSIX_FD_POLLS {
        let mut pfd = libc::pollfd {
            fd: entry.fd,
            events,
            revents: 0,
        };
        // SAFETY: one valid pollfd, zero timeout.
        let ready = unsafe { libc::poll(&mut pfd, 1, 0) };
        if ready < 0 || pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            trace!(fd = entry.fd, "fd error");
            on_fd(entry.fd, entry.flags | CLAP_POSIX_FD_ERROR);
            return;
        }
        if ready == 0 {
            return;
        }
        on_fd(entry.fd, entry.flags);
    }
}

#[cfg(not(unix))]
pub fn poll_fd(_entry: HostFd, _on_fd: impl FnMut(i32, u32)) {}

// ---------------------------------------------------------------------------
// clap_host vtable

unsafe fn handle<'a>(host: *const clap_host) -> Option<&'a HostHandle> {
    if host.is_null() || (*host).host_data.is_null() {
        return None;
    }
    Some(&*((*host).host_data as *const HostHandle))
}

unsafe extern "C" fn host_get_extension(
    host: *const clap_host,
    extension_id: *const c_char,
) -> *const c_void {
    if handle(host).is_none() || extension_id.is_null() {
        return std::ptr::null();
    }
    let id = CStr::from_ptr(extension_id);
    if id == CLAP_EXT_LATENCY {
        &HOST_LATENCY as *const _ as *const c_void
    } else if id == CLAP_EXT_STATE {
        &HOST_STATE as *const _ as *const c_void
    } else if id == CLAP_EXT_GUI {
        &HOST_GUI as *const _ as *const c_void
    } else if id == CLAP_EXT_TIMER_SUPPORT {
        &HOST_TIMER_SUPPORT as *const _ as *const c_void
    } else if id == CLAP_EXT_POSIX_FD_SUPPORT && cfg!(unix) {
        &HOST_POSIX_FD_SUPPORT as *const _ as *const c_void
    } else {
        trace!(extension = ?id, "plugin requested unsupported host extension");
        std::ptr::null()
    }
}

unsafe extern "C" fn host_request_restart(host: *const clap_host) {
    if let Some(h) = handle(host) {
        h.request_restart();
    }
}

unsafe extern "C" fn host_request_process(host: *const clap_host) {
    if let Some(h) = handle(host) {
        h.request_process();
    }
}

unsafe extern "C" fn host_request_callback(host: *const clap_host) {
    if let Some(h) = handle(host) {
        h.request_callback();
    }
}

unsafe extern "C" fn host_latency_changed(host: *const clap_host) {
    if let Some(h) = handle(host) {
        h.latency_changed();
    }
}

unsafe extern "C" fn host_mark_dirty(host: *const clap_host) {
    if let Some(h) = handle(host) {
        h.mark_dirty();
    }
}

unsafe extern "C" fn host_resize_hints_changed(_host: *const clap_host) {}

unsafe extern "C" fn host_request_resize(host: *const clap_host, width: u32, height: u32) -> bool {
    handle(host).is_some_and(|h| h.request_resize(width, height))
}

unsafe extern "C" fn host_request_show(_host: *const clap_host) -> bool {
    false
}

unsafe extern "C" fn host_request_hide(_host: *const clap_host) -> bool {
    false
}

unsafe extern "C" fn host_gui_closed(host: *const clap_host, was_destroyed: bool) {
    if let Some(h) = handle(host) {
        h.gui_closed(was_destroyed);
    }
}

unsafe extern "C" fn host_register_timer(
    host: *const clap_host,
    period_ms: u32,
    timer_id: *mut clap_id,
) -> bool {
    let Some(h) = handle(host) else {
        return false;
    };
    if timer_id.is_null() {
        return false;
    }
    *timer_id = h.register_timer(period_ms);
    true
}

unsafe extern "C" fn host_unregister_timer(host: *const clap_host, timer_id: clap_id) -> bool {
    handle(host).is_some_and(|h| h.unregister_timer(timer_id))
}

unsafe extern "C" fn host_register_fd(
    host: *const clap_host,
    fd: i32,
    flags: clap_posix_fd_flags,
) -> bool {
    handle(host).is_some_and(|h| h.register_fd(fd, flags))
}

unsafe extern "C" fn host_modify_fd(
    host: *const clap_host,
    fd: i32,
    flags: clap_posix_fd_flags,
) -> bool {
    handle(host).is_some_and(|h| h.modify_fd(fd, flags))
}

unsafe extern "C" fn host_unregister_fd(host: *const clap_host, fd: i32) -> bool {
    handle(host).is_some_and(|h| h.unregister_fd(fd))
}

static HOST_LATENCY: clap_host_latency = clap_host_latency {
    changed: Some(host_latency_changed),
};

static HOST_STATE: clap_host_state = clap_host_state {
    mark_dirty: Some(host_mark_dirty),
};

static HOST_GUI: clap_host_gui = clap_host_gui {
    resize_hints_changed: Some(host_resize_hints_changed),
    request_resize: Some(host_request_resize),
    request_show: Some(host_request_show),
    request_hide: Some(host_request_hide),
    closed: Some(host_gui_closed),
};

static HOST_TIMER_SUPPORT: clap_host_timer_support = clap_host_timer_support {
    register_timer: Some(host_register_timer),
    unregister_timer: Some(host_unregister_timer),
};

static HOST_POSIX_FD_SUPPORT: clap_host_posix_fd_support = clap_host_posix_fd_support {
    register_fd: Some(host_register_fd),
    modify_fd: Some(host_modify_fd),
    unregister_fd: Some(host_unregister_fd),
};

/// The `clap_host` the plugin is created with. Boxed so its address is stable;
/// keeps the [`HostHandle`] its `host_data` points to alive.
pub struct ClapHostShell {
    raw: Box<clap_host>,
    handle: Arc<HostHandle>,
}

// The raw struct only holds static strings, fn pointers and the Arc'd handle.
unsafe impl Send for ClapHostShell {}
unsafe impl Sync for ClapHostShell {}

impl ClapHostShell {
    pub fn new(handle: Arc<HostHandle>) -> Self {
        let raw = Box::new(clap_host {
            clap_version: CLAP_VERSION,
            host_data: Arc::as_ptr(&handle) as *mut c_void,
            name: c"plughost".as_ptr(),
            vendor: c"plughost".as_ptr(),
            url: c"".as_ptr(),
            version: c"0.1.0".as_ptr(),
            get_extension: Some(host_get_extension),
            request_restart: Some(host_request_restart),
            request_process: Some(host_request_process),
            request_callback: Some(host_request_callback),
        });
        Self { raw, handle }
    }

    pub fn as_ptr(&self) -> *const clap_host {
        &*self.raw
    }

    pub fn handle(&self) -> &Arc<HostHandle> {
        &self.handle
    }
}
