//! Database query functions organized by domain.

pub mod config;
pub mod gift_cards;
pub mod merchants;
pub mod skus;
pub mod transactions;
pub mod users;
pub mod wallets;
