// Bar window maintenance and the indicator feed that drives it
pub mod bar_window;
pub mod indicator_feed;

pub use bar_window::{BarWindow, UpdateOutcome};
pub use indicator_feed::IndicatorFeed;
