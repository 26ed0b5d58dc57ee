//! The display module drives the status LCD: the sink capability the
//! hardware sits behind, the render layouts, and the backlight scheduler.

pub mod layout;
pub mod scheduler;
pub mod sink;

pub use layout::DisplayLayout;
pub use scheduler::{DisplayScheduler, DisplayState, DisplayTiming, Transition, WakeTrigger};
pub use sink::{ConsoleDisplay, DisplayOp, DisplaySink, RecordingDisplay};
