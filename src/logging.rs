//! The in-process log-level table the control socket mutates at runtime.
//!
//! This crate never installs a global subscriber on its own (that remains a
//! host decision); `init` is an opt-in convenience for binaries/tests that
//! want one, grounded on the `EnvFilter`/`Registry`/`fmt::layer` shape used
//! elsewhere in the pack.

use std::fmt;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::{EnvFilter, Registry};

pub struct Handle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("logging::Handle").finish_non_exhaustive()
    }
}

impl Handle {
    /// Replaces the active filter directive string wholesale, e.g.
    /// `"dpif=debug,vconn=trace"`. This is what the control socket's `set`
    /// command drives.
    pub fn set_directive(&self, directive: &str) -> Result<(), String> {
        let filter = EnvFilter::try_new(directive).map_err(|e| e.to_string())?;
        self.filter
            .reload(filter)
            .map_err(|e| format!("could not reload log filter: {e}"))
    }

    /// A human-readable rendering of the current filter, for the control
    /// socket's `list` command.
    pub fn current(&self) -> String {
        self.filter
            .with_current(|f| f.to_string())
            .unwrap_or_else(|_| "<unavailable>".to_string())
    }
}

/// Installs a global subscriber backed by a reloadable `EnvFilter`, and
/// returns a `Handle` to mutate it later. Initial directives come from
/// `RUST_LOG` if set, else `default_directive`.
pub fn init(default_directive: &str) -> Result<Handle, String> {
    let initial = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let (filter_layer, reload_handle) = reload::Layer::new(initial);
    let fmt_layer = tracing_subscriber::fmt::layer();
    let subscriber = Registry::default().with(filter_layer).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("failed to set global tracing subscriber: {e}"))?;
    Ok(Handle {
        filter: reload_handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_malformed_directive() {
        // EnvFilter parsing happens before any global state is touched, so
        // this is safe to call without an active subscriber.
        assert!(EnvFilter::try_new("not a valid directive===").is_err());
    }
}
