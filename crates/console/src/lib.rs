//! opsdeck-console: operator surfaces for the opsdeck appliance.
//!
//! The terminal front end stands in for the LCD/button hardware behind
//! the same display/input boundary; the modes are the operational
//! screens; the dispatcher routes button events into the active mode.

pub mod dispatch;
pub mod display;
pub mod logging;
pub mod modes;
pub mod net;
pub mod term;
