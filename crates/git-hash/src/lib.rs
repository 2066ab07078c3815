//! Object identity.
//!
//! Every blob, tree, and commit is named by the SHA-1 of its canonical
//! serialization. This crate owns that identity: the [`Oid`] type, the
//! streaming [`hasher::Hasher`], hex encode/decode, and the collections
//! ([`collections::OidSet`], [`collections::OidMap`], [`collections::OidArray`])
//! and [`fanout::FanoutTable`] built on top of it that the rest of the
//! workspace shares.

mod error;
pub mod hex;
mod oid;
pub mod hasher;
pub mod collections;
pub mod fanout;

pub use error::HashError;
pub use oid::Oid;

pub type Result<T> = std::result::Result<T, HashError>;
