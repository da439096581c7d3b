pub mod handler;
pub mod order;
pub mod stock_record;
