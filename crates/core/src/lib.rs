//! opsdeck-core: the concurrent application core of the opsdeck appliance.
//!
//! One authoritative [`state::AppState`] is shared by the UI loop and the
//! payload workers; [`payload::PayloadRunner`] executes external tools in
//! the background with single-flight, timeout, and process-group-kill
//! guarantees; [`mode::Mode`] is the capability set of an operational
//! screen, rendered through the [`canvas`] display-list boundary.

pub mod canvas;
pub mod loot;
pub mod mode;
pub mod payload;
pub mod profiles;
pub mod settings;
pub mod state;
pub mod util;

pub use canvas::{Canvas, Frame, Tone};
pub use mode::{Ctx, Menu, MenuItem, Mode};
pub use payload::{PayloadHandle, PayloadRequest, PayloadRunner};
pub use settings::Settings;
pub use state::{Alert, AlertLevel, AppState, PayloadInfo, PayloadStatus};
