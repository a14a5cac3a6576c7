//! routine-core: materialises skincare routine steps into dated, deadline-
//! bearing completion records and keeps them consistent as routines change.

pub mod clock;
pub mod command;
pub mod compliance;
pub mod config;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod event;
pub mod frequency;
pub mod generator;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod types;
pub mod window;
