// Pure order decomposition
pub mod requirements;

// Stock ledger and matching
pub mod back_model;
pub mod stock_ledger;

// Reservation and admission
pub mod admission;
pub mod handler_directory;
pub mod reservation;

// Order store read side
pub mod orders;
