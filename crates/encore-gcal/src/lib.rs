//! encore-gcal: Google Calendar sync for encore
//!
//! ## Features
//!
//! - Calendar aggregate to Google event transform
//! - Service-account token cache (memory, then database, then JWT exchange)
//! - Events client (insert, update, delete)
//! - Write hook that queues sync jobs in the local transaction
//! - Background dispatcher with bounded retries
//!
//! ## Usage
//!
//! ```rust,ignore
//! use encore_gcal::{Dispatcher, SyncHook};
//!
//! store.register_hook(Arc::new(SyncHook::new()))?;
//! let dispatcher = Dispatcher::from_config(store.clone(), &config)?.start();
//! // ...
//! dispatcher.stop().await;
//! ```

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod hook;
pub mod token;
pub mod transform;

pub use client::GoogleCalendarClient;
pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use error::{GcalError, Result};
pub use hook::SyncHook;
pub use token::{ServiceAccountKey, TokenCache};
pub use transform::{EventDateTime, GoogleEvent, to_google};
