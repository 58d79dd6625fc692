use std::fmt;

/// Result of one release step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    AlreadyReleased,
    Failed(String),
}

impl ReleaseOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ReleaseOutcome::Failed(_))
    }
}

/// Exclusive owner of one hardware resource.
///
/// The resource is taken out exactly once by [`HardwareHandle::release_with`]; later
/// calls are no-ops. A failed release still counts as released: the resource is
/// never handed to a second release attempt.
pub struct HardwareHandle<T> {
    label: &'static str,
    resource: Option<T>,
}

impl<T: fmt::Debug> HardwareHandle<T> {
    /// An empty slot for a resource of the given kind
    pub fn vacant(label: &'static str) -> Self {
        Self {
            label,
            resource: None,
        }
    }

    /// Take ownership of `resource`.
    ///
    /// Returns the previously held resource if the slot was not empty; callers
    /// treat that as a leak they must release themselves.
    pub fn acquire(&mut self, resource: T) -> Option<T> {
        log::debug!("Acquired {} {:?}", self.label, resource);
        self.resource.replace(resource)
    }

    pub fn get(&self) -> Option<&T> {
        self.resource.as_ref()
    }

    pub fn is_held(&self) -> bool {
        self.resource.is_some()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Release the resource through `release`, logging any failure
    pub fn release_with<E, F>(&mut self, release: F) -> ReleaseOutcome
    where
        E: fmt::Display,
        F: FnOnce(T) -> Result<(), E>,
    {
        let Some(resource) = self.resource.take() else {
            return ReleaseOutcome::AlreadyReleased;
        };

        let description = format!("{:?}", resource);
        match release(resource) {
            Ok(()) => {
                log::debug!("Released {} {}", self.label, description);
                ReleaseOutcome::Released
            }
            Err(e) => {
                log::warn!("Failed to release {} {}: {}", self.label, description, e);
                ReleaseOutcome::Failed(e.to_string())
            }
        }
    }
}

impl<T> fmt::Debug for HardwareHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareHandle")
            .field("label", &self.label)
            .field("held", &self.resource.is_some())
            .finish()
    }
}

impl<T> Drop for HardwareHandle<T> {
    fn drop(&mut self) {
        if self.resource.is_some() {
            log::warn!("{} dropped while still held; hardware resource leaked", self.label);
        }
    }
}
