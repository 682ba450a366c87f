// Library surface for the binary and for headless/integration tests.
pub mod classifier;
pub mod clock;
pub mod config;
pub mod controller;
pub mod difficulty;
pub mod labels;
pub mod ledger;
pub mod logging;
pub mod raster;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod sketch;
pub mod util;
