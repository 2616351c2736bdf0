//! Account service for opening, funding, closing and deleting user accounts

pub mod service;
pub mod repository;
pub mod config;
pub mod transactions;

pub use service::AccountService;
pub use service::RepositoryType;
pub use repository::AccountRepository;
pub use config::AccountServiceConfig;
pub use transactions::{HttpTransactionSource, TransactionSource};
