pub mod arn;
pub mod balance;
pub mod contexts;
pub mod setup;
pub mod ui;
