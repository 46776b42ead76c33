//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-sync`, `core-runtime`, `provider-spotify`, ...).
//! Host applications can depend on `playlist-sync-workspace` and enable the
//! documented features without needing to wire each crate individually.
//!
//! - `desktop-shims` (default): sync core, runtime and the reqwest HTTP bridge
//! - `spotify`: adds the Spotify Web API connector
//! - `cli`: builds the `playlist-sync` binary

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
#[cfg(feature = "desktop-shims")]
pub use bridge_traits;
#[cfg(feature = "desktop-shims")]
pub use core_runtime;
#[cfg(feature = "desktop-shims")]
pub use core_sync;
#[cfg(feature = "spotify")]
pub use provider_spotify;
