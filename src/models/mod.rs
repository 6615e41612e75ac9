//! Data models for the CarMart backend.
//!
//! Field names serialize in camelCase to match the web client.

mod enquiry;
mod geocode;
mod interaction;
mod listing;
mod loan;
mod notification;
mod payment;
mod session;

pub use enquiry::*;
pub use geocode::*;
pub use interaction::*;
pub use listing::*;
pub use loan::*;
pub use notification::*;
pub use payment::*;
pub use session::*;
