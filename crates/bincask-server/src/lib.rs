//! Bincask front ends: a TCP server speaking a length-prefixed array
//! protocol with SET/GET/DEL verbs, and a line-oriented REPL.
//!
//! Both are pure consumers of the engine's three-operation API.

pub mod repl;
pub mod resp;
pub mod server;
