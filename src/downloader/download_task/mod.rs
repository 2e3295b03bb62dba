//! Download task execution -- per-job pipeline and artifact finalization.
//!
//! Split into focused submodules:
//! - [`orchestration`] - Top-level download task lifecycle and the pass loop
//! - [`finalization`] - Scratch-directory walk and artifact placement

mod finalization;
mod orchestration;


pub(crate) use finalization::remove_scratch_dir;
