//! Domain layer: the card parser, ticket formatting, the workflow machine and
//! the ports its collaborators implement.
//!
//! Nothing in here performs I/O.

pub mod card;
pub mod context;
pub mod ports;
pub mod ticket;
pub mod workflow;
