//! Side-effecting helpers: settings loading, process execution, the ledger
//! file and the run directory layout.

pub mod config;
pub mod invoke;
pub mod ledger;
pub mod process;
pub mod run_dir;
