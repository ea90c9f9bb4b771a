// # Keysmith: key generation for the key-check VM
//
// This crate solves for keys accepted by a small byte-code check program.
// Bit-vector constraints over the four 32-bit key words are bit-blasted into
// CNF and handed to an in-process SAT solver (CaDiCaL by default, or any of the
// rustsat backends). The same byte-code interpreter runs concretely to check a
// key and symbolically to derive the constraints of an arbitrary check program.

/// 32-bit bit-vector terms and equality constraints.
pub mod bitvec;

/// SAT backends and the Tseitin CNF builder.
pub mod sat;

/// Bit-vector solver: declare, assert, check, model.
pub mod solver;

/// The key generator over `k[0]..k[3]`.
pub mod keygen;

/// 16-byte keys and their textual forms.
pub mod key;

/// Byte-code instruction set of the check VM.
pub mod instruction;

/// The check VM interpreter, generic over concrete and symbolic words.
pub mod vm;

/// Running keys through a check program.
pub mod checker;

/// Symbolic execution of check programs.
pub mod symbolic;

pub use key::Key;
pub use keygen::KeyGenerator;
pub use sat::Backend;
pub use solver::{Model, SatStatus, Solver};
