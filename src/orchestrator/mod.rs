//! Application-level orchestration utilities.
//!
//! This module owns the fetch lifecycle (watch/refresh/quit) and the post-fetch
//! processing that folds results into the tracker. UI/CLI layers call into this
//! module so that only one of them ever mutates tracker state.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, FetchCommand};
pub(crate) use post_process::{absorb_event, absorb_runs, refresh_plan, AbsorbOutcome};
