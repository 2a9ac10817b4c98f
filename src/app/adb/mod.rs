pub mod apps;
pub mod intent;
pub mod locator;
pub mod parse;
pub mod runner;
