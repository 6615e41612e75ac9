//! Role-based access control.
//!
//! A caller holds a [`RoleSet`]. Gates compare it against a [`Requirement`]
//! (explicit roles, or a [`Module`] resolved through a fixed table) with ANY or
//! ALL semantics; the `powerdesk` role passes every gate. Real authorization of
//! stored rows is the repository's job; a gate only decides what is shown.

mod gate;
mod roles;

pub use gate::*;
pub use roles::*;
