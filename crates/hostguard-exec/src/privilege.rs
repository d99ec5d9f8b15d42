//! Administrative privilege checks

/// Reports whether the current process may perform privileged work
pub trait Elevation: Send + Sync {
    fn is_elevated(&self) -> bool;
}

/// Elevated when the effective user id is root
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectiveUid;

impl Elevation for EffectiveUid {
    #[cfg(unix)]
    fn is_elevated(&self) -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    fn is_elevated(&self) -> bool {
        false
    }
}

/// Fixed answer, for hosts where privilege is decided elsewhere and for tests
#[derive(Debug, Clone, Copy)]
pub struct StaticElevation(pub bool);

impl Elevation for StaticElevation {
    fn is_elevated(&self) -> bool {
        self.0
    }
}
