#![deny(warnings)]
pub mod belief;
pub mod error;
pub mod model;
pub mod terrain;
pub mod transition;

pub struct AppInfo;

impl AppInfo {
    pub const fn name() -> &'static str {
        "seeker"
    }

    pub const fn codename() -> &'static str {
        "Terrain Sweep"
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
