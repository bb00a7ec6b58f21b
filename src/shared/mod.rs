pub mod models;
pub mod schema;
pub mod seed;
pub mod state;
pub mod utils;
