pub mod accounts;
pub mod health;

pub use accounts::{create_account, delete_account, find_account, get_account, update_account};
pub use health::health_check;
