//! Re-inject mixin code into a minified bundle at positions taken from the
//! bundle's original sources, bridged by the bundle's source map.
//!
//! The pipeline is driven by [`orchestrator::run`]:
//!
//! 1. read the bundle and find its source map,
//! 2. resolve mixin files into [`model::NormalizedMixin`]s in priority order,
//! 3. parse each target's original source out of the map,
//! 4. for each injection, locate the method, map its first statement to a
//!    generated position, extract the mixin fragment and splice it in,
//!    adjusting for every splice applied before it,
//! 5. write the patched bundle to the output folder.

use std::sync::Once;

pub mod config;
pub mod error;
pub mod extract;
pub mod locator;
pub mod mixin;
pub mod model;
pub mod orchestrator;
pub mod parse;
pub mod patcher;
pub mod source_map;
pub mod targets;

pub use config::{MixinDefaults, PatchConfig};
pub use error::{PatchError, Result};
pub use model::{AppliedInjection, Injection, InjectionPoint, NormalizedMixin, Position};
pub use orchestrator::{run, RunReport, Stage, StageReport};

static TRACING_INIT: Once = Once::new();

/// Install the `tracing` subscriber once.
///
/// Only active when `RUST_LOG` is set, e.g. `RUST_LOG=swc_mixin_patcher=debug`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}
