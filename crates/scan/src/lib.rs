pub mod checker;
pub mod workspace;

pub use checker::{Checker, ScanError, Scanner};
pub use workspace::{GitMaterializer, MaterializeError, Materializer, Workspace};
