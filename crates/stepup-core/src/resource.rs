use sysinfo::System;

/// Headroom required before another step may run.
pub const DEFAULT_MIN_HEADROOM_BYTES: u64 = 2 * 1024 * 1024;

/// Pre-flight check consulted between upgrade steps.
pub trait ResourceProbe {
    fn has_headroom(&self, min_bytes: u64) -> bool;
}

impl<P: ResourceProbe + ?Sized> ResourceProbe for &P {
    fn has_headroom(&self, min_bytes: u64) -> bool {
        (**self).has_headroom(min_bytes)
    }
}

impl<P: ResourceProbe + ?Sized> ResourceProbe for Box<P> {
    fn has_headroom(&self, min_bytes: u64) -> bool {
        (**self).has_headroom(min_bytes)
    }
}

/// Never refuses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl ResourceProbe for Unlimited {
    fn has_headroom(&self, _min_bytes: u64) -> bool {
        true
    }
}

/// Reports a fixed amount of available bytes.
#[derive(Debug, Clone, Copy)]
pub struct FixedHeadroom(pub u64);

impl ResourceProbe for FixedHeadroom {
    fn has_headroom(&self, min_bytes: u64) -> bool {
        self.0 >= min_bytes
    }
}

/// Asks the operating system for available memory through `sysinfo`.
///
/// When the figure is unknown (or reported as zero) the probe answers `true`,
/// the same as a host without a memory limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemoryProbe;

impl SystemMemoryProbe {
    pub fn available_bytes(&self) -> Option<u64> {
        let mut system = System::new();
        system.refresh_memory();
        Some(system.available_memory()).filter(|bytes| *bytes > 0)
    }
}

impl ResourceProbe for SystemMemoryProbe {
    fn has_headroom(&self, min_bytes: u64) -> bool {
        headroom_available(self.available_bytes(), min_bytes)
    }
}

pub(crate) fn headroom_available(available: Option<u64>, min_bytes: u64) -> bool {
    match available {
        Some(available) => available >= min_bytes,
        None => {
            tracing::debug!("available memory unknown; treating headroom as unlimited");
            true
        }
    }
}
