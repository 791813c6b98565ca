use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

/// Process-wide registry of claimed camera devices.
///
/// A device can be held by one session at a time. Claims are released when
/// the returned `DeviceClaim` is dropped.
pub struct DeviceClaims;

fn claimed() -> &'static Mutex<HashSet<String>> {
    static CLAIMED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    CLAIMED.get_or_init(|| Mutex::new(HashSet::new()))
}

impl DeviceClaims {
    /// Claim `device_id`. Returns `None` if another session holds it.
    pub fn try_claim(device_id: &str) -> Option<DeviceClaim> {
        // A poisoned set is still consistent: inserts and removes are single calls.
        let mut set = claimed().lock().unwrap_or_else(|e| e.into_inner());
        if set.insert(device_id.to_string()) {
            log::debug!("device {} claimed", device_id);
            Some(DeviceClaim {
                device_id: device_id.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_claimed(device_id: &str) -> bool {
        claimed()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(device_id)
    }
}

/// Exclusive hold on a camera device.
#[derive(Debug)]
pub struct DeviceClaim {
    device_id: String,
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        let mut set = claimed().lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.device_id);
        log::debug!("device {} released", self.device_id);
    }
}
