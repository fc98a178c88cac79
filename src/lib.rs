// src/lib.rs

//! Misuse-injection harness for the CAS-2D sharpening library.
//!
//! The library's four C entry points are driven through [`native::CasApi`],
//! guarded by the lifecycle model in [`lifecycle`]. Kernel launch limits are
//! probed by [`compute`]. [`scenario`] holds the misuse catalog and runs one
//! scenario in-process; [`runner`] runs each scenario in its own worker
//! process and judges what happened; [`report`] prints the verdicts.

pub mod compute;
pub mod config;
pub mod lifecycle;
pub mod native;
pub mod report;
pub mod runner;
pub mod scenario;
