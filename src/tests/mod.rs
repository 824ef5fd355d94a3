//! Integration scenarios exercising several modules together: assembly,
//! interpretation, serialization, debugging and SSA construction against
//! the same handful of toy programs. Per-module unit tests live next to
//! their modules; this directory is for scenarios that don't belong to
//! any single one of them.

mod debugger_hook;
mod fibonacci;
mod serialize_roundtrip;
mod ssa_from_fibonacci;
