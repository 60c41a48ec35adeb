pub mod access;
pub mod api;
pub mod catalog;
pub mod clock;
pub mod search;
pub mod validation;

#[cfg(any(feature = "client", test))]
pub mod client;

#[cfg(any(feature = "client", test))]
pub mod session_gate;

#[cfg(any(feature = "client", test))]
pub mod views;

#[cfg(any(feature = "server", test))]
pub mod accounts_repository;

#[cfg(any(feature = "server", test))]
pub mod app_config;

#[cfg(any(feature = "server", test))]
pub mod auth;

#[cfg(any(feature = "server", test))]
pub mod books_repository;

#[cfg(any(feature = "server", test))]
pub mod cover_storage;

#[cfg(any(feature = "server", test))]
mod handlers;

#[cfg(any(feature = "server", test))]
pub mod postgres;

#[cfg(any(feature = "server", test))]
pub mod profiles_repository;

#[cfg(any(feature = "server", test))]
pub mod reviews_repository;

#[cfg(any(feature = "server", test))]
pub mod settings;

#[cfg(any(feature = "server", test))]
pub mod state;

#[cfg(any(feature = "server", test))]
pub mod telemetry;
