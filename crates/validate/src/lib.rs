//! Exploit validation.
//!
//! [`ValidationHarness`] drives a wallet-like target through a functional smoke test and a
//! scripted drain attempt. [`Protocol`] strings everything together: resolve, compile and
//! rewrite first, then deploy behind a proxy, prove the exploit works, hot-swap the patched
//! logic and prove the exploit no longer works.

pub mod harness;
pub mod protocol;
pub mod result;

pub use harness::{HarnessConfig, SmokeOutcome, ValidationHarness, ValidationOutcome};
pub use protocol::{PreparedPatch, Protocol, Verdict};
pub use result::{Error, ExploitStage, Result};
