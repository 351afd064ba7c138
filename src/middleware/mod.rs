//! Built-in plugins.
//!
//! Plugins are installed on a [`Router`](crate::Router) and decorate the
//! handlers of the routes they care about once, when the router is built.
//!
//! - [`mysql`]: one MySQL connection per request, committed or rolled back
//!   by how the handler finished.

pub mod mysql;
