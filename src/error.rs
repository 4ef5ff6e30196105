//! Error types surfaced by the public API.
//!
//! Fallible native calls return [`vk::Result`] internally; the public surface
//! converts them into [`Error::Backend`]. Every error is logged at ERROR when
//! it is raised, before it unwinds to the caller. Contract violations
//! (pop-frame label mismatch, recording a non-graphics invocation inside a
//! render pass) are programming errors and panic instead.

use ash::vk;

use crate::buffer::HostAccess;
use crate::task::ResourceType;

/// The error type for all fallible operations in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested device index exceeds the number of enumerated devices.
    #[error("device index {index} out of range, {count} devices available")]
    DeviceUnavailable { index: u32, count: u32 },

    /// A device feature required by the configuration is not supported.
    #[error("required device feature unsupported: {0}")]
    FeatureUnsupported(&'static str),

    /// A native API call failed with a status that is neither success nor an
    /// expected timeout.
    #[error("backend error: {0:?}")]
    Backend(vk::Result),

    /// A view of an incompatible kind was bound to a resource pool slot.
    #[error("slot {slot} expects {expected:?}, got {got}")]
    InvalidBinding {
        slot: u32,
        expected: ResourceType,
        got: &'static str,
    },

    /// A mapping was requested with access the buffer or image was not
    /// created with.
    #[error("host access {requested:?} not permitted, buffer allows {allowed:?}")]
    HostAccessDenied {
        requested: HostAccess,
        allowed: HostAccess,
    },
}

impl From<vk::Result> for Error {
    fn from(result: vk::Result) -> Self {
        tracing::error!(?result, "backend call failed");
        Error::Backend(result)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct CountErrors(Arc<AtomicUsize>);
    impl tracing::Subscriber for CountErrors {
        fn enabled(&self, metadata: &tracing::Metadata<'_>) -> bool {
            *metadata.level() == tracing::Level::ERROR
        }
        fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
            tracing::span::Id::from_u64(1)
        }
        fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}
        fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}
        fn event(&self, _: &tracing::Event<'_>) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
        fn enter(&self, _: &tracing::span::Id) {}
        fn exit(&self, _: &tracing::span::Id) {}
    }

    #[test]
    fn test_backend_conversion_logs_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let error = tracing::subscriber::with_default(CountErrors(hits.clone()), || {
            Error::from(vk::Result::ERROR_DEVICE_LOST)
        });
        assert!(matches!(error, Error::Backend(vk::Result::ERROR_DEVICE_LOST)));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
