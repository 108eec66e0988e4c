#[cfg(feature = "browser")]
pub mod browser;
pub mod solver;

#[cfg(feature = "browser")]
pub use browser::{BrowserOptions, ChromiumPage};
pub use solver::RuCaptchaSolver;
