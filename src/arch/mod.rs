//! Architecture-specific pieces: register numbering, register rendering,
//! and the target description served to the client.

pub mod ppc;
