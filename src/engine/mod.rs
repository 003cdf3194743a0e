//! Core engine: favorites, the bet ledger, board rows and the desk that
//! routes user requests through them.

pub mod alerts;
pub mod desk;
pub mod favorites;
pub mod ledger;
pub mod rows;
