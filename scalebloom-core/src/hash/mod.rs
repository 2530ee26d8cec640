//! Hash derivation and bit-position generation
//!
//! A filter element is hashed once into four words of [`HashMaterial`].
//! Every segment then derives its `k` bit positions from those words with
//! a Kirsch-Mitzenmacher style linear combination, so adding segments never
//! requires rehashing the element.

mod digest;
mod index;

pub use digest::{derive, HashMaterial, HASH_WORDS};
pub use index::{position, positions};
