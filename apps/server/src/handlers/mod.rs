pub mod appointments;
pub mod checkout;
pub mod clients;
pub mod export;
pub mod health;
pub mod inventory;
pub mod professionals;
pub mod reports;
pub mod services;
