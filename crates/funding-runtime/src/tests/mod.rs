//! Shared test doubles and end-to-end scenarios for the funding runtime

pub mod fakes;
