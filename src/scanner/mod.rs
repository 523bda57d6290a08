// Scan orchestration: checker trait, concurrent fan-out, score aggregation

pub mod registry;
pub mod scan;
pub mod types;

pub use registry::{CheckerRegistry, RegistryRun};
pub use scan::Scanner;
pub use types::{CheckResult, Checker, ScanResult, Verdict};
