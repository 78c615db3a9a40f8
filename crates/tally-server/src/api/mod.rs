//! Counter API (`/api/counter`).

pub mod counter;
