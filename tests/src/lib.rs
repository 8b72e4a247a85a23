//! Integration tests for the splint workspace.
//!
//! Everything runs against a hand-assembled `Wallet` and the in-process [`LocalNode`], so
//! neither `solc` nor a running node is needed.
//!
//! [`LocalNode`]: splint_deploy::LocalNode

pub mod fixtures;

#[cfg(test)]
mod core;
#[cfg(test)]
mod e2e;
#[cfg(test)]
mod patch;
