//! Pattern detection over decoded runtime code.

pub mod dispatcher;

pub use dispatcher::{
    DispatchEntry, DispatcherInfo, ExtractionPattern, detect_function_dispatcher,
};
