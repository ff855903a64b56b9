//! clinsupply - hybrid decision dispatch for clinical-trial resupply
//!
//! Every site gets a resupply decision. Priority sites go to a remote
//! reasoning service, routine ones to a deterministic rule engine, and any
//! reasoning failure degrades to the rules so a run always completes.
//! Decisions then feed a depot allocation plan.

pub mod allocation;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod forecast;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod reasoning;
pub mod rules;
pub mod site;
