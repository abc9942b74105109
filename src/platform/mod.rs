//! Platform abstraction layer
//!
//! Handles browser/native differences for:
//! - Time (`Clock`)
//! - User agent lookup and device sniffing
//! - Spawning single-threaded background work

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;

use serde::Serialize;

/// Source of wall-clock time in ms since the Unix epoch
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Real time: `Date.now()` on the web, `SystemTime` natively
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(target_arch = "wasm32")]
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now_ms(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Hand-driven clock; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Current user agent string (best effort)
#[cfg(target_arch = "wasm32")]
pub fn user_agent() -> String {
    web_sys::window()
        .and_then(|w| w.navigator().user_agent().ok())
        .unwrap_or_default()
}

#[cfg(not(target_arch = "wasm32"))]
pub fn user_agent() -> String {
    format!("native/{}", std::env::consts::OS)
}

/// Device class sniffed from the user agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceProfile {
    pub is_mobile: bool,
    pub is_ios: bool,
    pub is_android: bool,
}

impl DeviceProfile {
    pub fn from_user_agent(ua: &str) -> Self {
        let ua = ua.to_lowercase();
        let is_ios = ["iphone", "ipad", "ipod"].iter().any(|m| ua.contains(m));
        let is_android = ua.contains("android");
        let is_mobile = is_ios
            || is_android
            || ["mobile", "webos", "blackberry", "iemobile", "opera mini"]
                .iter()
                .any(|m| ua.contains(m));

        Self {
            is_mobile,
            is_ios,
            is_android,
        }
    }
}

/// Run a future on the current thread's event loop.
///
/// On the web this queues a microtask. Natively there is no event loop and
/// every backing store is in memory, so the future is polled once in place.
#[cfg(target_arch = "wasm32")]
pub fn spawn_local<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_local<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    use futures::FutureExt;

    if future.now_or_never().is_none() {
        log::warn!("Background task did not complete in place, dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new(100);
        let other = clock.clone();
        clock.advance(50);
        assert_eq!(other.now_ms(), 150);
        other.set(7);
        assert_eq!(clock.now_ms(), 7);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_device_profile_iphone() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 \
                  (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
        let profile = DeviceProfile::from_user_agent(ua);
        assert!(profile.is_ios);
        assert!(profile.is_mobile);
        assert!(!profile.is_android);
    }

    #[test]
    fn test_device_profile_android() {
        let ua = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0 Mobile Safari/537.36";
        let profile = DeviceProfile::from_user_agent(ua);
        assert!(profile.is_android);
        assert!(profile.is_mobile);
        assert!(!profile.is_ios);
    }

    #[test]
    fn test_device_profile_desktop() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
        assert_eq!(DeviceProfile::from_user_agent(ua), DeviceProfile::default());
    }

    #[test]
    fn test_spawn_local_runs_natively() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        spawn_local(async move { flag.set(true) });
        assert!(ran.get());
    }
}
