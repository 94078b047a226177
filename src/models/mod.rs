pub mod account;
pub mod login_method;

pub use account::{Account, AccountChanges, AccountRow, NewAccount};
pub use login_method::{LoginMethod, UnknownLoginMethod};
