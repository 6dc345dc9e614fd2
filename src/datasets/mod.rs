pub mod credit_card;
pub mod synthetic;
mod utils;
