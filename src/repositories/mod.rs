pub mod account;
pub mod memory;
pub mod postgres;

pub use account::{AccountRepository, RepositoryError};
pub use memory::MemoryAccountRepository;
pub use postgres::PgAccountRepository;
