pub mod condition;
pub mod heap;
pub mod monitor;
pub mod name;
pub mod pipeline;
pub mod route;
pub mod route_builder;
pub mod router;
pub mod scanner;

pub use condition::ConditionCompiler;
pub use heap::{Heap, HeapError, HeapObject, Heaplet, HeapletRegistry};
pub use monitor::{DirectoryMonitor, FileChangeSet};
pub use name::Name;
pub use route::{Route, RouteDescriptor, RouteState};
pub use route_builder::{RouteBuilder, RouteError};
pub use router::{ReloadReport, Router, RouterError};
pub use scanner::{ChangeListener, PeriodicScanner, ScannerError};
